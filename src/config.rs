//! Startup configuration. Built once in `run()` and handed to the automation.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::OrderKind;

const ENV_LEDGER_FILE: &str = "EXCEL_FILENAME";
const ENV_LEDGER_FILE_ALT: &str = "EXCEL_FILE";
const ENV_ORDER_KIND: &str = "ORDER_KIND";
const ENV_USER_COLUMN: &str = "LEDGER_USER_COLUMN";
const ENV_HISTORY_DB: &str = "HISTORY_DB";

pub const DEFAULT_LEDGER_FILE: &str = "boltworld.xlsx";
pub const DEFAULT_USER_COLUMN: &str = "USER";
const APP_DIR_NAME: &str = "pdf-order-ledger";
const HISTORY_FILE_NAME: &str = "history.db";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ledger_path: PathBuf,
    pub order_kind: OrderKind,
    /// Label of the fourth ledger column ("USER" or "PRINTED_BY" in older ledgers).
    pub user_column_label: String,
    /// None disables the processing history.
    pub history_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            ledger_path: ledger_path.into(),
            order_kind: OrderKind::Web,
            user_column_label: DEFAULT_USER_COLUMN.to_string(),
            history_path: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ledger_path = get(ENV_LEDGER_FILE)
            .or_else(|| get(ENV_LEDGER_FILE_ALT))
            .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string());
        if !ledger_path.to_lowercase().ends_with(".xlsx") {
            return Err(Error::Config(format!(
                "{} must point to an .xlsx file, got '{}'",
                ENV_LEDGER_FILE, ledger_path
            )));
        }

        let order_kind = match get(ENV_ORDER_KIND) {
            Some(kind) => kind.parse()?,
            None => OrderKind::Web,
        };

        let user_column_label = get(ENV_USER_COLUMN).unwrap_or_else(|| DEFAULT_USER_COLUMN.to_string());

        // Unset falls back to the data dir; an explicit "off"/"none" turns history off.
        let history_path = match lookup(ENV_HISTORY_DB).map(|v| v.trim().to_string()) {
            Some(v) if v.is_empty() || v.eq_ignore_ascii_case("off") || v.eq_ignore_ascii_case("none") => None,
            Some(v) => Some(PathBuf::from(v)),
            None => default_history_path(),
        };

        Ok(Self {
            ledger_path: PathBuf::from(ledger_path),
            order_kind,
            user_column_label,
            history_path,
        })
    }

    /// Header row written when a new ledger is created.
    pub fn ledger_headers(&self) -> Vec<String> {
        vec![
            "ORDER_DETAILS".to_string(),
            "DATE".to_string(),
            "TIME".to_string(),
            self.user_column_label.clone(),
        ]
    }
}

fn default_history_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join(APP_DIR_NAME).join(HISTORY_FILE_NAME))
}

/// Load a `.env` file into the process environment. An explicit path must exist;
/// without one, a `.env` in the working directory is used when present.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            dotenvy::from_path(p).map_err(|e| Error::Config(format!("Could not load {}: {}", p.display(), e)))?;
            log::debug!("loaded environment from {}", p.display());
        }
        None => {
            if let Ok(p) = dotenvy::dotenv() {
                log::debug!("loaded environment from {}", p.display());
            }
        }
    }
    Ok(())
}
