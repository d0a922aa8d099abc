pub mod ledger;

pub use ledger::{DuplicateSet, Ledger, LedgerRow};
