//! Finds order numbers in page text and stamps them with capture time and operator.

use chrono::NaiveDateTime;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::types::{OrderKind, OrderRecord};

pub const DATE_FORMAT: &str = "%d-%m-%Y";
pub const TIME_FORMAT: &str = "%I:%M %p";

/// "Order Number", then at least two characters, up to the last digit on that line.
fn web_order_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Order Number..+[0-9]").expect("web order regex"))
}

pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

pub type IdentityFn = Box<dyn Fn() -> String + Send + Sync>;

/// Login name of the operating user, from the usual environment variables.
pub fn os_user() -> String {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct OrderExtractor {
    clock: Box<dyn Clock>,
    identity: IdentityFn,
}

impl Default for OrderExtractor {
    fn default() -> Self {
        Self::new(Box::new(SystemClock), Box::new(os_user))
    }
}

impl OrderExtractor {
    pub fn new(clock: Box<dyn Clock>, identity: IdentityFn) -> Self {
        Self { clock, identity }
    }

    /// At most one record per page. `Ok(None)` when the page has no order label.
    pub fn extract(&self, page_text: &str, kind: OrderKind) -> Result<Option<OrderRecord>> {
        match kind {
            OrderKind::Web => self.extract_web(page_text),
            OrderKind::Ebay | OrderKind::Payslips => Err(Error::NotSupported(kind)),
        }
    }

    /// Same as [`extract`](Self::extract) for a kind given by name, e.g. from the UI.
    pub fn extract_named(&self, page_text: &str, kind: &str) -> Result<Option<OrderRecord>> {
        self.extract(page_text, kind.parse()?)
    }

    fn extract_web(&self, page_text: &str) -> Result<Option<OrderRecord>> {
        let Some(m) = web_order_regex().find(page_text) else {
            return Ok(None);
        };
        let identifier = parse_identifier(m.as_str())?;
        let now = self.clock.now();
        Ok(Some(OrderRecord {
            identifier,
            captured_date: now.format(DATE_FORMAT).to_string(),
            captured_time: now.format(TIME_FORMAT).to_string(),
            captured_by: (self.identity)(),
        }))
    }
}

/// "Order Number: 48213" -> 48213. The number is everything after the first ": ".
fn parse_identifier(matched: &str) -> Result<i64> {
    let (_, number) = matched
        .split_once(": ")
        .ok_or_else(|| Error::MalformedIdentifier(matched.to_string()))?;
    number
        .trim()
        .parse::<i64>()
        .map_err(|_| Error::MalformedIdentifier(matched.to_string()))
}
