fn main() -> std::process::ExitCode {
    order_ledger_lib::run()
}
