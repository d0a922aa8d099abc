//! Error types for the order ledger.
//!
//! Expected absences (no ledger yet, no search matches, save blocked by a lock)
//! are not errors; they are outcome variants in [`crate::types`].

use std::path::PathBuf;

use crate::types::OrderKind;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input document does not exist
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Malformed or encrypted PDF
    #[error("Could not read PDF {}: {reason}", .path.display())]
    UnreadableDocument { path: PathBuf, reason: String },

    /// Order kind is recognised but has no extraction logic
    #[error("Extraction for '{0}' orders is not supported yet")]
    NotSupported(OrderKind),

    #[error("Unknown order kind '{0}' (expected web, ebay or payslips)")]
    InvalidOrderKind(String),

    #[error("Unknown search field '{0}' (expected order, date or user)")]
    InvalidSearchField(String),

    /// Matched order label whose number part is not an integer
    #[error("Could not read an order number from '{0}'")]
    MalformedIdentifier(String),

    /// Ledger file exists but cannot be interpreted
    #[error("Ledger {} is unreadable: {reason}", .path.display())]
    CorruptLedger { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot write to file: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    /// Appending to an existing workbook failed
    #[error("Cannot write to file: {0}")]
    Workbook(String),

    #[error("History database error: {0}")]
    History(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
