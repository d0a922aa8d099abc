use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::automation::OrderAutomation;
use crate::excel::LockNotifier;
use crate::pdf;
use crate::types::{HistoryRecord, OrderRecord, ProcessReport, QueryOutcome, SearchField, StatusCode};

/// Exit code when the ledger stayed locked and nothing was saved.
pub const EXIT_SAVE_BLOCKED: u8 = 101;

#[derive(Parser)]
#[command(name = "pdf-order-ledger")]
#[command(about = "Record order numbers from PDFs in an Excel ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Ledger workbook (overrides EXCEL_FILENAME)
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,
    /// Load environment variables from this file instead of ./.env
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,
    /// Do not read or write the processing history
    #[arg(long, global = true)]
    pub no_history: bool,
    /// Machine-readable output
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Extract order numbers from a PDF and add them to the ledger.
    Process { pdf: PathBuf },

    /// Look up ledger rows.
    Search {
        /// order | identifier | date | user
        #[arg(long = "by", default_value = "order")]
        by: String,
        value: String,
    },

    /// List previously processed documents.
    History {
        /// Only documents whose path contains this text
        #[arg(long)]
        search: Option<String>,
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Open the ledger in the default spreadsheet application.
    Open,
}

/// Asks the operator to close the workbook and waits for Enter.
pub struct ConsoleNotifier;

impl LockNotifier for ConsoleNotifier {
    fn file_in_use(&self, path: &Path) {
        let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        eprintln!(
            "The file '{}' is currently open. Please close the Excel file and press Enter to continue.",
            name
        );
        let mut line = String::new();
        if let Err(e) = io::stdin().lock().read_line(&mut line) {
            log::warn!("could not read confirmation from stdin: {}", e);
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessResponse<'a> {
    status: Option<StatusCode>,
    #[serde(flatten)]
    report: &'a ProcessReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse<'a> {
    status: StatusCode,
    field: SearchField,
    value: &'a str,
    results: &'a [OrderRecord],
}

/// Run one subcommand; returns the process exit code.
pub fn execute(automation: &OrderAutomation, command: &Command, json: bool) -> anyhow::Result<u8> {
    match command {
        Command::Process { pdf } => process(automation, pdf, json),
        Command::Search { by, value } => search(automation, by, value, json),
        Command::History { search, limit } => history(automation, search.as_deref(), *limit, json),
        Command::Open => open_ledger(automation),
    }
}

fn process(automation: &OrderAutomation, path: &Path, json: bool) -> anyhow::Result<u8> {
    pdf::validate_document_file(path).map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
    let report = automation
        .process_document(path)
        .with_context(|| format!("Failed to process {}", path.display()))?;

    if json {
        let response = ProcessResponse {
            status: report.status_code(),
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render_report(&report, automation.ledger_path()));
    }
    Ok(match report.status_code() {
        Some(StatusCode::SaveBlocked) => EXIT_SAVE_BLOCKED,
        _ => 0,
    })
}

fn search(automation: &OrderAutomation, by: &str, value: &str, json: bool) -> anyhow::Result<u8> {
    let field: SearchField = by.parse()?;
    let value = value.trim();
    if value.is_empty() {
        bail!("Please enter a value to search for");
    }
    let outcome = automation.run_query(field, value)?;

    if json {
        let response = SearchResponse {
            status: outcome.status_code(),
            field,
            value,
            results: outcome.records(),
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print!("{}", render_search(&outcome, value, automation.ledger_path()));
    }
    Ok(0)
}

fn history(automation: &OrderAutomation, search: Option<&str>, limit: usize, json: bool) -> anyhow::Result<u8> {
    let Some(db) = automation.history() else {
        bail!("Processing history is disabled (HISTORY_DB=off or --no-history)");
    };
    let records = db.get_history(search, limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print!("{}", render_history(&records));
    }
    Ok(0)
}

fn open_ledger(automation: &OrderAutomation) -> anyhow::Result<u8> {
    let path = automation.ledger_path();
    if !path.exists() {
        println!("{}", no_data_hint(path));
        return Ok(0);
    }
    opener::open(path).with_context(|| format!("Could not open {}", path.display()))?;
    Ok(0)
}

fn no_data_hint(ledger: &Path) -> String {
    format!(
        "No data yet: {} does not exist. Process a PDF first to create it.",
        ledger.display()
    )
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

pub fn render_report(report: &ProcessReport, ledger: &Path) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} order(s) found, {} added to {}",
        report.document,
        report.extracted.len(),
        report.appended,
        ledger.display()
    );
    if !report.duplicates.is_empty() {
        let _ = writeln!(out, "Duplicate Orders Skipped: {}", join_ids(&report.duplicates));
    }
    match report.status_code() {
        Some(StatusCode::SaveBlocked) => {
            let _ = writeln!(
                out,
                "Changes Not Saved! You need to process the PDF again after closing the Excel file ({}).",
                ledger.display()
            );
        }
        _ => {
            let _ = writeln!(out, "PDF processed successfully");
        }
    }
    out
}

pub fn render_search(outcome: &QueryOutcome, value: &str, ledger: &Path) -> String {
    match outcome {
        QueryOutcome::NoData => format!("{}\n", no_data_hint(ledger)),
        QueryOutcome::NotFound => format!("No orders found matching '{}'\n", value),
        QueryOutcome::Found(records) => {
            let mut out = String::new();
            let _ = writeln!(out, "{:<14} {:<12} {:<10} {}", "ORDER", "DATE", "TIME", "USER");
            for r in records {
                let _ = writeln!(
                    out,
                    "{:<14} {:<12} {:<10} {}",
                    r.identifier, r.captured_date, r.captured_time, r.captured_by
                );
            }
            let _ = writeln!(out, "{} match(es)", records.len());
            out
        }
    }
}

pub fn render_history(records: &[HistoryRecord]) -> String {
    if records.is_empty() {
        return "No documents processed yet\n".to_string();
    }
    let mut out = String::new();
    for r in records {
        let _ = write!(
            out,
            "#{} {} {} [{}] {} order(s)",
            r.id,
            r.created_at,
            r.document,
            r.status,
            r.extracted.len()
        );
        if !r.duplicates.is_empty() {
            let _ = write!(out, ", {} duplicate(s)", r.duplicates.len());
        }
        if let Some(msg) = &r.error_message {
            let _ = write!(out, ": {}", msg);
        }
        out.push('\n');
    }
    out
}
