use std::path::Path;

use crate::config::AppConfig;
use crate::db::{Db, NewHistoryRecord};
use crate::error::Result;
use crate::excel::{LedgerStore, LedgerWriter, LockNotifier, DEFAULT_SHEET_NAME};
use crate::models::Ledger;
use crate::pdf::{PageText, PdfDocument};
use crate::services::order_extractor::OrderExtractor;
use crate::services::order_search;
use crate::types::{OrderRecord, ProcessReport, QueryOutcome, SaveOutcome, SearchField};

/// Runs one document or one query at a time against the configured ledger.
pub struct OrderAutomation {
    config: AppConfig,
    store: LedgerStore,
    extractor: OrderExtractor,
    history: Option<Db>,
}

impl OrderAutomation {
    pub fn new(config: AppConfig, notifier: Box<dyn LockNotifier>) -> Self {
        let store = LedgerStore::new(config.ledger_path.clone(), notifier);
        Self {
            config,
            store,
            extractor: OrderExtractor::default(),
            history: None,
        }
    }

    pub fn with_extractor(mut self, extractor: OrderExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_history(mut self, history: Db) -> Self {
        self.history = Some(history);
        self
    }

    /// Replace how the ledger reaches disk (the default appends with edit_xlsx).
    pub fn with_ledger_writer(self, writer: Box<dyn LedgerWriter>) -> Self {
        Self {
            store: self.store.with_writer(writer),
            ..self
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn history(&self) -> Option<&Db> {
        self.history.as_ref()
    }

    /// Extract every order in the PDF, merge into the ledger, save.
    /// Nothing touches the ledger until the whole document has been read.
    pub fn process_document(&self, path: &Path) -> Result<ProcessReport> {
        let result = PdfDocument::open(path).and_then(|doc| self.process_pages(path, doc.pages()));
        self.record_history(path, &result);
        result
    }

    /// Same as [`process_document`](Self::process_document), for page text obtained elsewhere.
    pub fn process_pages<I>(&self, document: &Path, pages: I) -> Result<ProcessReport>
    where
        I: IntoIterator<Item = PageText>,
    {
        let kind = self.config.order_kind;
        let mut candidates: Vec<OrderRecord> = Vec::new();
        for page in pages {
            if let Some(record) = self.extractor.extract(&page.text, kind)? {
                log::debug!("page {}: order {}", page.number, record.identifier);
                candidates.push(record);
            }
        }
        let extracted: Vec<i64> = candidates.iter().map(|r| r.identifier).collect();
        log::info!("{}: {} order(s) found", document.display(), extracted.len());

        let headers = self.config.ledger_headers();
        let mut ledger = match self.store.open_or_create(&headers, true)? {
            Some(ledger) => ledger,
            None => Ledger::new(DEFAULT_SHEET_NAME, headers),
        };
        let before = ledger.len();
        let duplicates = ledger.append(candidates);
        let appended = ledger.len() - before;
        let outcome = self.store.save(&mut ledger)?;

        Ok(ProcessReport {
            document: document.display().to_string(),
            order_kind: kind,
            extracted,
            appended,
            duplicates,
            outcome,
        })
    }

    pub fn run_query(&self, field: SearchField, value: &str) -> Result<QueryOutcome> {
        order_search::search(&self.store, field, value)
    }

    pub fn ledger_path(&self) -> &Path {
        self.store.path()
    }

    fn record_history(&self, path: &Path, result: &Result<ProcessReport>) {
        let Some(db) = &self.history else {
            return;
        };
        let document = path.display().to_string();
        let error_text = result.as_ref().err().map(|e| e.to_string());
        let record = match result {
            Ok(report) => NewHistoryRecord {
                document: &document,
                order_kind: report.order_kind.as_str(),
                extracted: &report.extracted,
                duplicates: &report.duplicates,
                status: match report.outcome {
                    SaveOutcome::Saved => "saved",
                    SaveOutcome::Blocked => "save_blocked",
                },
                error_message: None,
            },
            Err(_) => NewHistoryRecord {
                document: &document,
                order_kind: self.config.order_kind.as_str(),
                extracted: &[],
                duplicates: &[],
                status: "failed",
                error_message: error_text.as_deref(),
            },
        };
        if let Err(e) = db.add_history_record(&record) {
            log::warn!("could not record history for {}: {}", document, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::excel::tests::LockedWriter;
    use crate::excel::SilentNotifier;
    use crate::pdf::tests::write_pdf;
    use crate::services::order_extractor::tests::fixed_extractor;
    use crate::types::OrderKind;

    fn automation(dir: &Path) -> OrderAutomation {
        let config = AppConfig::new(dir.join("ledger.xlsx"));
        OrderAutomation::new(config, Box::new(SilentNotifier))
            .with_extractor(fixed_extractor("alice"))
            .with_history(Db::in_memory().unwrap())
    }

    fn page(number: u32, text: &str) -> PageText {
        PageText {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn pages_flow_into_the_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let auto = automation(dir.path());
        let report = auto
            .process_pages(
                Path::new("orders.pdf"),
                vec![page(1, "Order Number: 48213"), page(2, "nothing"), page(3, "Order Number: 48214")],
            )
            .unwrap();
        assert_eq!(report.extracted, vec![48213, 48214]);
        assert_eq!(report.appended, 2);
        assert!(report.duplicates.is_empty());
        assert_eq!(report.outcome, SaveOutcome::Saved);
        assert_eq!(report.status_code(), None);

        let found = auto.run_query(SearchField::Identifier, "48214").unwrap();
        assert_eq!(found.records()[0].captured_by, "alice");
    }

    #[test]
    fn second_run_reports_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let auto = automation(dir.path());
        let pages = || vec![page(1, "Order Number: 7"), page(2, "Order Number: 8")];
        auto.process_pages(Path::new("a.pdf"), pages()).unwrap();
        let report = auto.process_pages(Path::new("a.pdf"), pages()).unwrap();
        assert_eq!(report.appended, 0);
        assert_eq!(report.duplicates, vec![7, 8]);
    }

    #[test]
    fn locked_ledger_is_blocked_and_left_as_is() {
        let dir = tempfile::tempdir().unwrap();
        automation(dir.path())
            .process_pages(Path::new("first.pdf"), vec![page(1, "Order Number: 100")])
            .unwrap();
        let ledger_path = dir.path().join("ledger.xlsx");
        let before = std::fs::read(&ledger_path).unwrap();

        let auto = automation(dir.path()).with_ledger_writer(Box::new(LockedWriter));
        let pdf = dir.path().join("second.pdf");
        write_pdf(&pdf, &[&["Order Number: 101"], &["Order Number: 100"]]);
        let report = auto.process_document(&pdf).unwrap();

        assert_eq!(report.outcome, SaveOutcome::Blocked);
        assert_eq!(report.status_code().map(|s| s.code()), Some(101));
        assert_eq!(report.appended, 1);
        assert_eq!(report.duplicates, vec![100]);
        assert_eq!(std::fs::read(&ledger_path).unwrap(), before);
        assert_eq!(
            auto.run_query(SearchField::Identifier, "101").unwrap(),
            QueryOutcome::NotFound
        );

        let history = auto.history().unwrap().get_history(None, 10).unwrap();
        assert_eq!(history[0].status, "save_blocked");
    }

    #[test]
    fn unsupported_kind_leaves_ledger_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::new(dir.path().join("ledger.xlsx"));
        config.order_kind = OrderKind::Ebay;
        let auto = OrderAutomation::new(config, Box::new(SilentNotifier)).with_extractor(fixed_extractor("alice"));
        let err = auto
            .process_pages(Path::new("a.pdf"), vec![page(1, "Order Number: 1")])
            .unwrap_err();
        assert!(matches!(err, Error::NotSupported(OrderKind::Ebay)));
        assert!(!dir.path().join("ledger.xlsx").exists());
    }

    #[test]
    fn unreadable_document_is_fatal_and_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let auto = automation(dir.path());
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"%PDF-1.4 garbage").unwrap();

        let err = auto.process_document(&bad).unwrap_err();
        assert!(matches!(err, Error::UnreadableDocument { .. }));
        assert!(!dir.path().join("ledger.xlsx").exists());

        let history = auto.history().unwrap().get_history(None, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, "failed");
    }

    #[test]
    fn real_pdf_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("orders.pdf");
        write_pdf(&pdf, &[&["Web order", "Order Number: 5001"], &["Order Number: 5002"]]);
        let auto = automation(dir.path());

        let report = auto.process_document(&pdf).unwrap();
        assert_eq!(report.extracted, vec![5001, 5002]);

        let history = auto.history().unwrap().get_history(None, 10).unwrap();
        assert_eq!(history[0].status, "saved");
        assert_eq!(history[0].extracted, vec![5001, 5002]);
    }
}
