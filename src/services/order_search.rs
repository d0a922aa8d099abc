//! Linear lookups over the ledger rows.

use crate::error::Result;
use crate::excel::LedgerStore;
use crate::models::Ledger;
use crate::types::{OrderRecord, QueryOutcome, SearchField};

/// Search the store's ledger. A missing ledger file is reported as `NoData` and is never created.
pub fn search(store: &LedgerStore, field: SearchField, value: &str) -> Result<QueryOutcome> {
    let Some(ledger) = store.open_or_create(&[], false)? else {
        return Ok(QueryOutcome::NoData);
    };
    let results = search_ledger(&ledger, field, value);
    log::info!("search {}='{}': {} match(es)", field, value, results.len());
    if results.is_empty() {
        Ok(QueryOutcome::NotFound)
    } else {
        Ok(QueryOutcome::Found(results))
    }
}

/// Matching rows in ledger order. Blank rows never match.
/// Identifiers compare against the cell text, so a stored "00123" is found by "00123".
pub fn search_ledger(ledger: &Ledger, field: SearchField, value: &str) -> Vec<OrderRecord> {
    let needle = value.to_lowercase();
    ledger
        .orders()
        .filter(|(record, cell)| match field {
            SearchField::Identifier => *cell == value,
            SearchField::Date => record.captured_date == value,
            SearchField::User => record.captured_by.to_lowercase().contains(&needle),
        })
        .map(|(record, _)| record.clone())
        .collect()
}
