use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One order entry: extracted from a PDF page or read back from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub identifier: i64,
    /// DD-MM-YYYY
    pub captured_date: String,
    /// 12-hour HH:MM AM/PM
    pub captured_time: String,
    pub captured_by: String,
}

/// Document templates the extractor knows about. Only `Web` has extraction logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Web,
    Ebay,
    Payslips,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Web => "web",
            OrderKind::Ebay => "ebay",
            OrderKind::Payslips => "payslips",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(OrderKind::Web),
            "ebay" => Ok(OrderKind::Ebay),
            "payslips" => Ok(OrderKind::Payslips),
            _ => Err(Error::InvalidOrderKind(s.to_string())),
        }
    }
}

/// Ledger column a search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchField {
    /// Exact match on the order number's text form.
    Identifier,
    /// Exact match on the stored DD-MM-YYYY text.
    Date,
    /// Case-insensitive substring match.
    User,
}

impl fmt::Display for SearchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchField::Identifier => "order",
            SearchField::Date => "date",
            SearchField::User => "user",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "order" | "identifier" => Ok(SearchField::Identifier),
            "date" => Ok(SearchField::Date),
            "user" => Ok(SearchField::User),
            _ => Err(Error::InvalidSearchField(s.to_string())),
        }
    }
}

/// Numeric codes the front end understands. Only used as the external encoding of outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Found = 100,
    SaveBlocked = 101,
    NoData = 102,
    NotFound = 103,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        self as u16
    }
}

impl Serialize for StatusCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.code())
    }
}

/// Result of one save attempt (including its single retry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved,
    /// Ledger stayed locked through the retry; nothing was persisted.
    Blocked,
}

impl SaveOutcome {
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            SaveOutcome::Saved => None,
            SaveOutcome::Blocked => Some(StatusCode::SaveBlocked),
        }
    }
}

/// Result of a ledger lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Found(Vec<OrderRecord>),
    /// The ledger file does not exist yet.
    NoData,
    NotFound,
}

impl QueryOutcome {
    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryOutcome::Found(_) => StatusCode::Found,
            QueryOutcome::NoData => StatusCode::NoData,
            QueryOutcome::NotFound => StatusCode::NotFound,
        }
    }

    pub fn records(&self) -> &[OrderRecord] {
        match self {
            QueryOutcome::Found(records) => records,
            _ => &[],
        }
    }
}

/// Summary of one processed document, handed back to the front end.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub document: String,
    pub order_kind: OrderKind,
    /// Identifiers found in the document, in page order.
    pub extracted: Vec<i64>,
    pub appended: usize,
    /// Identifiers skipped because the ledger already had them.
    pub duplicates: Vec<i64>,
    pub outcome: SaveOutcome,
}

impl ProcessReport {
    pub fn status_code(&self) -> Option<StatusCode> {
        self.outcome.status_code()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: i64,
    pub created_at: String,
    pub document: String,
    pub order_kind: String,
    pub extracted: Vec<i64>,
    pub duplicates: Vec<i64>,
    pub status: String,
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_kind_parses_known_names() {
        assert_eq!("web".parse::<OrderKind>().unwrap(), OrderKind::Web);
        assert_eq!("EBAY".parse::<OrderKind>().unwrap(), OrderKind::Ebay);
        assert_eq!(" payslips ".parse::<OrderKind>().unwrap(), OrderKind::Payslips);
    }

    #[test]
    fn unknown_order_kind_is_rejected() {
        let err = "amazon".parse::<OrderKind>().unwrap_err();
        assert!(matches!(err, Error::InvalidOrderKind(ref s) if s == "amazon"));
    }

    #[test]
    fn search_field_accepts_order_alias() {
        assert_eq!("order".parse::<SearchField>().unwrap(), SearchField::Identifier);
        assert_eq!("identifier".parse::<SearchField>().unwrap(), SearchField::Identifier);
        assert!("total".parse::<SearchField>().is_err());
    }

    #[test]
    fn outcomes_map_to_wire_codes() {
        assert_eq!(QueryOutcome::Found(vec![]).status_code().code(), 100);
        assert_eq!(SaveOutcome::Blocked.status_code().map(StatusCode::code), Some(101));
        assert_eq!(QueryOutcome::NoData.status_code().code(), 102);
        assert_eq!(QueryOutcome::NotFound.status_code().code(), 103);
        assert_eq!(SaveOutcome::Saved.status_code(), None);
        assert!(QueryOutcome::NotFound.records().is_empty());
    }

    #[test]
    fn status_code_serializes_as_number() {
        let json = serde_json::to_string(&StatusCode::NotFound).unwrap();
        assert_eq!(json, "103");
    }
}
