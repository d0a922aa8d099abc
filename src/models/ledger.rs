use std::collections::HashSet;

use crate::types::OrderRecord;

/// A data row below the header. Rows with an empty identifier cell are kept in place,
/// together with whatever text sits in their other columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRow {
    Order {
        record: OrderRecord,
        /// Identifier cell as stored, e.g. "00123" for a legacy text cell.
        cell: String,
    },
    /// Text of the columns after the (empty) identifier.
    Blank(Vec<String>),
}

impl LedgerRow {
    pub fn order(record: OrderRecord) -> Self {
        let cell = record.identifier.to_string();
        LedgerRow::Order { record, cell }
    }
}

/// Identifiers rejected by one `append` call, in the order they were seen.
pub type DuplicateSet = Vec<i64>;

/// In-memory copy of the ledger worksheet. Append-only: rows are never edited or reordered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    sheet_name: String,
    header: Vec<String>,
    rows: Vec<LedgerRow>,
    /// Leading rows already present in the file on disk.
    saved_rows: usize,
    header_saved: bool,
}

impl Ledger {
    pub fn new(sheet_name: impl Into<String>, header: Vec<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            header,
            rows: Vec::new(),
            saved_rows: 0,
            header_saved: false,
        }
    }

    /// A ledger as read from disk: every row is already saved.
    pub(crate) fn from_parts(sheet_name: String, header: Vec<String>, rows: Vec<LedgerRow>) -> Self {
        let saved_rows = rows.len();
        Self {
            sheet_name,
            header,
            rows,
            saved_rows,
            header_saved: true,
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    /// Stored orders, skipping blank rows.
    pub fn records(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders().map(|(record, _)| record)
    }

    /// Stored orders with the text of their identifier cell.
    pub fn orders(&self) -> impl Iterator<Item = (&OrderRecord, &str)> {
        self.rows.iter().filter_map(|row| match row {
            LedgerRow::Order { record, cell } => Some((record, cell.as_str())),
            LedgerRow::Blank(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows that are in the file on disk.
    pub fn saved_row_count(&self) -> usize {
        self.saved_rows
    }

    /// Rows appended since the last successful save.
    pub fn unsaved_rows(&self) -> &[LedgerRow] {
        &self.rows[self.saved_rows..]
    }

    pub fn header_saved(&self) -> bool {
        self.header_saved
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.header_saved || self.saved_rows < self.rows.len()
    }

    pub(crate) fn mark_saved(&mut self) {
        self.saved_rows = self.rows.len();
        self.header_saved = true;
    }

    /// Give a headerless sheet the standard header; it is written with the next save.
    pub(crate) fn adopt_header(&mut self, header: &[String]) {
        self.header = header.to_vec();
        self.header_saved = false;
    }

    /// Append candidates in order, skipping any identifier already stored or already
    /// appended earlier in this call. Only mutates memory; saving is the store's job.
    pub fn append<I>(&mut self, candidates: I) -> DuplicateSet
    where
        I: IntoIterator<Item = OrderRecord>,
    {
        let mut present: HashSet<i64> = self.records().map(|r| r.identifier).collect();
        let mut duplicates = Vec::new();
        for candidate in candidates {
            if present.insert(candidate.identifier) {
                self.rows.push(LedgerRow::order(candidate));
            } else {
                duplicates.push(candidate.identifier);
            }
        }
        if !duplicates.is_empty() {
            log::warn!("skipped {} duplicate order(s): {:?}", duplicates.len(), duplicates);
        }
        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: i64) -> OrderRecord {
        OrderRecord {
            identifier: id,
            captured_date: "01-01-2026".to_string(),
            captured_time: "10:00 AM".to_string(),
            captured_by: "Alice".to_string(),
        }
    }

    fn ledger() -> Ledger {
        Ledger::new("Order_Details", vec!["ORDER_DETAILS".into(), "DATE".into(), "TIME".into(), "USER".into()])
    }

    #[test]
    fn appending_twice_is_idempotent() {
        let mut l = ledger();
        let batch = vec![order(1), order(2), order(3)];
        assert!(l.append(batch.clone()).is_empty());
        let dups = l.append(batch);
        assert_eq!(l.len(), 3);
        assert_eq!(dups, vec![1, 2, 3]);
    }

    #[test]
    fn row_order_follows_candidate_order() {
        let mut l = ledger();
        l.append(vec![order(30), order(10), order(20)]);
        let ids: Vec<i64> = l.records().map(|r| r.identifier).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn repeats_within_one_call_are_duplicates() {
        let mut l = ledger();
        let dups = l.append(vec![order(5), order(6), order(5)]);
        assert_eq!(dups, vec![5]);
        assert_eq!(l.len(), 2);
    }

    #[test]
    fn blank_rows_are_ignored_for_dedup() {
        let mut l = Ledger::from_parts(
            "Order_Details".to_string(),
            vec!["ORDER_DETAILS".into()],
            vec![LedgerRow::order(order(1)), LedgerRow::Blank(Vec::new())],
        );
        let dups = l.append(vec![order(1), order(2)]);
        assert_eq!(dups, vec![1]);
        assert_eq!(l.rows().len(), 3);
        assert_eq!(l.rows()[2], LedgerRow::order(order(2)));
    }

    #[test]
    fn only_appended_rows_are_unsaved() {
        let mut l = Ledger::from_parts(
            "Order_Details".to_string(),
            vec!["ORDER_DETAILS".into()],
            vec![LedgerRow::order(order(1))],
        );
        assert!(!l.has_unsaved_changes());
        l.append(vec![order(1)]);
        assert!(!l.has_unsaved_changes());

        l.append(vec![order(2), order(3)]);
        assert_eq!(l.saved_row_count(), 1);
        assert_eq!(l.unsaved_rows().len(), 2);
        l.mark_saved();
        assert!(l.unsaved_rows().is_empty());
        assert!(!l.has_unsaved_changes());
    }

    #[test]
    fn new_ledger_needs_its_header_written() {
        let mut l = ledger();
        assert!(!l.header_saved());
        assert!(l.has_unsaved_changes());
        l.mark_saved();
        l.adopt_header(&["ID".to_string()]);
        assert!(l.has_unsaved_changes());
        assert_eq!(l.header(), ["ID".to_string()].as_slice());
    }
}
