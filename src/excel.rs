use calamine::{open_workbook_auto, Data, DataType, Range, Reader};
use edit_xlsx::Write as _;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{Ledger, LedgerRow};
use crate::types::{OrderRecord, SaveOutcome};

/// Worksheet name for newly created ledgers.
pub const DEFAULT_SHEET_NAME: &str = "Order_Details";

/// Identifier, date, time, user.
const LEDGER_COLUMNS: u32 = 4;
const COLUMN_WIDTHS: [f64; 4] = [18.0, 14.0, 12.0, 22.0];

/// Largest magnitude an f64 cell holds without losing integer precision (2^53).
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Told when the ledger is locked by another program, before the single retry.
/// Implementations may block until the operator has had a chance to close the file.
pub trait LockNotifier: Send + Sync {
    fn file_in_use(&self, path: &Path);
}

/// Retries immediately without telling anyone.
pub struct SilentNotifier;

impl LockNotifier for SilentNotifier {
    fn file_in_use(&self, path: &Path) {
        log::debug!("{} is in use, retrying without notice", path.display());
    }
}

/// Puts a ledger's unsaved rows on disk.
pub trait LedgerWriter: Send + Sync {
    fn write(&self, path: &Path, ledger: &Ledger) -> Result<()>;
}

/// Appends below the existing rows of the workbook with edit_xlsx, so other sheets,
/// extra columns and formatting stay as they are. A missing file is written from scratch.
pub struct XlsxLedgerWriter;

impl LedgerWriter for XlsxLedgerWriter {
    fn write(&self, path: &Path, ledger: &Ledger) -> Result<()> {
        if path.exists() {
            append_rows(path, ledger)
        } else {
            write_workbook(path, ledger).map_err(Error::from)
        }
    }
}

/// Owns the ledger file at one fixed path.
pub struct LedgerStore {
    path: PathBuf,
    notifier: Box<dyn LockNotifier>,
    writer: Box<dyn LedgerWriter>,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>, notifier: Box<dyn LockNotifier>) -> Self {
        Self {
            path: path.into(),
            notifier,
            writer: Box::new(XlsxLedgerWriter),
        }
    }

    pub fn with_writer(mut self, writer: Box<dyn LedgerWriter>) -> Self {
        self.writer = writer;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger if the file exists; its header is trusted as-is.
    /// Otherwise create it with `header` (and save right away) when `create_if_missing`,
    /// or return `Ok(None)` so the caller can report "no data yet".
    pub fn open_or_create(&self, header: &[String], create_if_missing: bool) -> Result<Option<Ledger>> {
        if self.path.exists() {
            let mut ledger = read_ledger(&self.path)?;
            if ledger.header().is_empty() && ledger.rows().is_empty() && !header.is_empty() {
                log::info!("{} has an empty first sheet, header will be added", self.path.display());
                ledger.adopt_header(header);
            }
            return Ok(Some(ledger));
        }
        if !create_if_missing {
            log::debug!("{} does not exist yet", self.path.display());
            return Ok(None);
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut ledger = Ledger::new(DEFAULT_SHEET_NAME, header.to_vec());
        write_workbook(&self.path, &ledger)?;
        ledger.mark_saved();
        log::info!("created ledger {}", self.path.display());
        Ok(Some(ledger))
    }

    /// Persist the rows appended since the last save. A lock held by another program gets
    /// one notice and one retry; if it is still locked the outcome is `Blocked`, the file is
    /// untouched and the rows stay unsaved.
    pub fn save(&self, ledger: &mut Ledger) -> Result<SaveOutcome> {
        if !ledger.has_unsaved_changes() {
            log::debug!("{}: nothing new to save", self.path.display());
            return Ok(SaveOutcome::Saved);
        }
        let outcome = save_with_retry(&self.path, self.notifier.as_ref(), || {
            self.writer.write(&self.path, ledger)
        })?;
        if outcome == SaveOutcome::Saved {
            ledger.mark_saved();
        }
        Ok(outcome)
    }
}

fn save_with_retry<F>(path: &Path, notifier: &dyn LockNotifier, mut write: F) -> Result<SaveOutcome>
where
    F: FnMut() -> Result<()>,
{
    match write() {
        Ok(()) => {
            log::info!("saved {}", path.display());
            return Ok(SaveOutcome::Saved);
        }
        Err(e) if is_file_locked(&e) => {
            log::warn!("{} is locked by another program: {}", path.display(), e);
        }
        Err(e) => return Err(e),
    }

    notifier.file_in_use(path);

    match write() {
        Ok(()) => {
            log::info!("saved {} on retry", path.display());
            Ok(SaveOutcome::Saved)
        }
        Err(e) if is_file_locked(&e) => {
            log::warn!("{} still locked, changes not saved", path.display());
            Ok(SaveOutcome::Blocked)
        }
        Err(e) => Err(e),
    }
}

/// PermissionDenied on Unix; a sharing violation ("being used by another process") on Windows.
fn is_file_locked(err: &Error) -> bool {
    let io_error = match err {
        Error::Io(e) => Some(e),
        Error::Xlsx(XlsxError::IoError(e)) => Some(e),
        _ => None,
    };
    if io_error.is_some_and(|e| e.kind() == io::ErrorKind::PermissionDenied) {
        return true;
    }
    let msg = err.to_string();
    msg.contains("Permission denied") || msg.contains("being used")
}

/// A1 reference for a zero-based column and a one-based row.
fn cell_ref(col: u32, row: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col;
    loop {
        letters.push(b'A' + (n % 26) as u8);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    let column: String = letters.iter().rev().map(|&b| b as char).collect();
    format!("{}{}", column, row)
}

fn read_ledger(path: &Path) -> Result<Ledger> {
    let corrupt = |reason: String| Error::CorruptLedger {
        path: path.to_path_buf(),
        reason,
    };
    let mut workbook = open_workbook_auto(path).map_err(|e| corrupt(format!("Could not open Excel file: {}", e)))?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| corrupt("workbook has no sheets".to_string()))?;
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| corrupt(format!("Sheet not found: {}", e)))?;

    let Some((end_row, end_col)) = range.end() else {
        return Ok(Ledger::from_parts(sheet_name, Vec::new(), Vec::new()));
    };

    // Row 1 is the header. Trailing empty cells are not part of it.
    let mut header: Vec<String> = (0..=end_col).map(|col| cell_text_at(&range, 0, col)).collect();
    while header.last().map(|h| h.trim().is_empty()).unwrap_or(false) {
        header.pop();
    }

    let mut rows = Vec::with_capacity(end_row as usize);
    for row in 1..=end_row {
        let identifier = match range.get_value((row, 0)) {
            Some(cell) => cell_identifier(cell).map_err(|value| {
                corrupt(format!(
                    "cell {} holds '{}', expected an order number",
                    cell_ref(0, row + 1),
                    value
                ))
            })?,
            None => None,
        };
        let Some((identifier, cell)) = identifier else {
            let rest = (1..=end_col).map(|col| cell_text_at(&range, row, col)).collect();
            rows.push(LedgerRow::Blank(rest));
            continue;
        };
        rows.push(LedgerRow::Order {
            record: OrderRecord {
                identifier,
                captured_date: cell_text_at(&range, row, 1),
                captured_time: cell_text_at(&range, row, 2),
                captured_by: cell_text_at(&range, row, LEDGER_COLUMNS - 1),
            },
            cell,
        });
    }

    log::debug!("read {} data rows from {}", rows.len(), path.display());
    Ok(Ledger::from_parts(sheet_name, header, rows))
}

fn cell_text_at(range: &Range<Data>, row: u32, col: u32) -> String {
    range
        .get_value((row, col))
        .and_then(|c| c.as_string())
        .unwrap_or_default()
}

/// The identifier and the cell's own text. `Ok(None)` for an empty cell;
/// `Err(text)` when the cell is not a whole number that fits losslessly.
fn cell_identifier(cell: &Data) -> std::result::Result<Option<(i64, String)>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::Int(i) => Ok(Some((*i, i.to_string()))),
        Data::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
            let id = *f as i64;
            Ok(Some((id, id.to_string())))
        }
        Data::Float(f) => Err(f.to_string()),
        Data::String(s) if s.trim().is_empty() => Ok(None),
        Data::String(s) => {
            let text = s.trim();
            text.parse::<i64>()
                .map(|id| Some((id, text.to_string())))
                .map_err(|_| s.clone())
        }
        other => Err(other.as_string().unwrap_or_else(|| format!("{:?}", other))),
    }
}

/// Drop control characters (except tab/newline/CR) and markup characters that break sheet XML.
fn sanitize_cell(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let u = c as u32;
        match c {
            '\t' | '\n' | '\r' => out.push(c),
            _ if u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF => {}
            '&' => out.push_str(" and "),
            '<' | '>' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Identifier, date, time and user as written to a new row. Identifiers go in as text so
/// values above 2^53 keep every digit; reading accepts text and numeric cells alike.
fn order_cells(record: &OrderRecord) -> [String; 4] {
    [
        record.identifier.to_string(),
        sanitize_cell(&record.captured_date),
        sanitize_cell(&record.captured_time),
        sanitize_cell(&record.captured_by),
    ]
}

fn workbook_error<E: Display>(e: E) -> Error {
    Error::Workbook(e.to_string())
}

fn append_rows(path: &Path, ledger: &Ledger) -> Result<()> {
    let mut workbook = edit_xlsx::Workbook::from_path(path).map_err(workbook_error)?;
    let worksheet = workbook
        .get_worksheet_mut_by_name(ledger.sheet_name())
        .map_err(|e| Error::Workbook(format!("Sheet not found: {}", e)))?;

    if !ledger.header_saved() {
        for (col, header) in ledger.header().iter().enumerate() {
            worksheet
                .write_string(&cell_ref(col as u32, 1), sanitize_cell(header))
                .map_err(workbook_error)?;
        }
    }

    // Spreadsheet rows are 1-based and row 1 is the header.
    let first_row = ledger.saved_row_count() as u32 + 2;
    for (offset, row) in ledger.unsaved_rows().iter().enumerate() {
        let LedgerRow::Order { record, .. } = row else {
            continue;
        };
        let row_number = first_row + offset as u32;
        for (col, value) in order_cells(record).into_iter().enumerate() {
            worksheet
                .write_string(&cell_ref(col as u32, row_number), value)
                .map_err(workbook_error)?;
        }
    }

    workbook.save_as(path).map_err(workbook_error)?;
    log::debug!("appended {} row(s) to {}", ledger.unsaved_rows().len(), path.display());
    Ok(())
}

fn write_workbook(path: &Path, ledger: &Ledger) -> std::result::Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(ledger.sheet_name())?;

    let header_format = Format::new().set_bold();
    for (col, header) in ledger.header().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, sanitize_cell(header), &header_format)?;
    }
    for (col, &width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet.set_column_width(col as u16, width)?;
    }

    for (idx, row) in ledger.rows().iter().enumerate() {
        let r = (idx + 1) as u32;
        match row {
            LedgerRow::Order { record, .. } => {
                for (col, value) in order_cells(record).into_iter().enumerate() {
                    worksheet.write_string(r, col as u16, value)?;
                }
            }
            LedgerRow::Blank(rest) => {
                for (offset, text) in rest.iter().enumerate().filter(|(_, t)| !t.is_empty()) {
                    worksheet.write_string(r, (offset + 1) as u16, sanitize_cell(text))?;
                }
            }
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    workbook.save(path)
}
