mod automation;
mod commands;
mod config;
mod db;
mod error;
mod excel;
mod models;
mod pdf;
mod services;
mod types;

pub use automation::OrderAutomation;
pub use commands::ConsoleNotifier;
pub use config::AppConfig;
pub use db::Db;
pub use error::{Error, Result};
pub use excel::{LedgerStore, LedgerWriter, LockNotifier, SilentNotifier, XlsxLedgerWriter};
pub use models::{DuplicateSet, Ledger, LedgerRow};
pub use pdf::{PageText, PdfDocument};
pub use services::order_extractor::{Clock, IdentityFn, OrderExtractor, SystemClock};
pub use services::order_search::search_ledger;
pub use types::{
    HistoryRecord, OrderKind, OrderRecord, ProcessReport, QueryOutcome, SaveOutcome, SearchField,
    StatusCode,
};

use clap::Parser;
use commands::Cli;
use std::process::ExitCode;

/// CLI entry point: logging, configuration, then one subcommand.
pub fn run() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match run_cli(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: &Cli) -> anyhow::Result<u8> {
    config::load_env_file(cli.env_file.as_deref())?;
    let mut config = AppConfig::from_env()?;
    if let Some(ledger) = &cli.ledger {
        config.ledger_path = ledger.clone();
    }
    if cli.no_history {
        config.history_path = None;
    }

    let history = config.history_path.as_deref().and_then(|path| match Db::new(path) {
        Ok(db) => Some(db),
        Err(e) => {
            log::warn!("history disabled, could not open {}: {}", path.display(), e);
            None
        }
    });

    let mut automation = OrderAutomation::new(config, Box::new(ConsoleNotifier));
    if let Some(db) = history {
        automation = automation.with_history(db);
    }
    commands::execute(&automation, &cli.command, cli.json)
}
