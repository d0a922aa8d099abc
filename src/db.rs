use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use crate::error::Result;
use crate::types::HistoryRecord;

/// One row per processed document: what was found, what was skipped, how the save went.
pub struct Db {
    conn: Mutex<Connection>,
}

pub struct NewHistoryRecord<'a> {
    pub document: &'a str,
    pub order_kind: &'a str,
    pub extracted: &'a [i64],
    pub duplicates: &'a [i64],
    pub status: &'a str,
    pub error_message: Option<&'a str>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                document TEXT NOT NULL,
                order_kind TEXT NOT NULL,
                extracted TEXT NOT NULL,
                duplicates TEXT NOT NULL,
                status TEXT NOT NULL,
                error_message TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_history_created ON history(created_at);
            ",
        )?;
        Ok(Db {
            conn: Mutex::new(conn),
        })
    }

    pub fn add_history_record(&self, record: &NewHistoryRecord<'_>) -> Result<i64> {
        let created_at = chrono::Utc::now().to_rfc3339();
        let extracted = serde_json::to_string(record.extracted)?;
        let duplicates = serde_json::to_string(record.duplicates)?;
        let conn = self.lock();
        conn.execute(
            "INSERT INTO history (created_at, document, order_kind, extracted, duplicates, status, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                created_at,
                record.document,
                record.order_kind,
                extracted,
                duplicates,
                record.status,
                record.error_message
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest first. `search` is a substring match on the document path.
    pub fn get_history(&self, search: Option<&str>, limit: usize) -> Result<Vec<HistoryRecord>> {
        let conn = self.lock();
        let base = "SELECT id, created_at, document, order_kind, extracted, duplicates, status, error_message FROM history";
        let (sql, pattern) = match search.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => (
                format!("{} WHERE document LIKE ?1 ORDER BY id DESC LIMIT ?2", base),
                format!("%{}%", s),
            ),
            None => (
                format!("{} WHERE ?1 = ?1 ORDER BY id DESC LIMIT ?2", base),
                String::new(),
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, created_at, document, order_kind, extracted, duplicates, status, error_message) = row?;
            out.push(HistoryRecord {
                id,
                created_at,
                document,
                order_kind,
                extracted: serde_json::from_str(&extracted)?,
                duplicates: serde_json::from_str(&duplicates)?,
                status,
                error_message,
            });
        }
        Ok(out)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself intact.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record<'a>(document: &'a str, extracted: &'a [i64], status: &'a str) -> NewHistoryRecord<'a> {
        NewHistoryRecord {
            document,
            order_kind: "web",
            extracted,
            duplicates: &[],
            status,
            error_message: None,
        }
    }

    #[test]
    fn records_come_back_newest_first() {
        let db = Db::in_memory().unwrap();
        db.add_history_record(&record("a.pdf", &[1, 2], "saved")).unwrap();
        db.add_history_record(&record("b.pdf", &[3], "save_blocked")).unwrap();

        let all = db.get_history(None, 10).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].document, "b.pdf");
        assert_eq!(all[0].status, "save_blocked");
        assert_eq!(all[1].extracted, vec![1, 2]);
    }

    #[test]
    fn search_and_limit_apply() {
        let db = Db::in_memory().unwrap();
        for name in ["jan/orders.pdf", "feb/orders.pdf", "feb/refunds.pdf"] {
            db.add_history_record(&record(name, &[], "saved")).unwrap();
        }
        assert_eq!(db.get_history(Some("feb/"), 10).unwrap().len(), 2);
        assert_eq!(db.get_history(None, 1).unwrap()[0].document, "feb/refunds.pdf");
        assert_eq!(db.get_history(Some("  "), 10).unwrap().len(), 3);
    }

    #[test]
    fn file_backed_db_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        let db = Db::new(&path).unwrap();
        let id = db
            .add_history_record(&NewHistoryRecord {
                document: "x.pdf",
                order_kind: "web",
                extracted: &[],
                duplicates: &[],
                status: "failed",
                error_message: Some("Could not read PDF"),
            })
            .unwrap();
        assert!(id > 0);
        assert!(path.exists());
        let rows = db.get_history(None, 5).unwrap();
        assert_eq!(rows[0].error_message.as_deref(), Some("Could not read PDF"));
    }
}
