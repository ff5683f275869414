//! SQLite-backed [`RecordStore`].
//!
//! Every statement runs in autocommit mode: there is no transaction spanning a
//! sync pass, so an interrupted run keeps every record it finished inserting.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use crate::model::record::MailRecord;
use crate::store::{RecordFilter, RecordStore};

/// Schema DDL run on open. `path` uniqueness is enforced here, not in code.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS emails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    from_addr TEXT NOT NULL DEFAULT '',
    to_addr TEXT NOT NULL DEFAULT '',
    delivered_to TEXT NOT NULL DEFAULT '',
    subject TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT '',
    body_html TEXT,
    date INTEGER NOT NULL,
    is_seen INTEGER NOT NULL DEFAULT 0,
    is_replied INTEGER NOT NULL DEFAULT 0,
    is_flagged INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_emails_date ON emails(date DESC);
";

const COLUMNS: &str = "path, from_addr, to_addr, delivered_to, subject, body, body_html, \
                       date, is_seen, is_replied, is_flagged";

/// A mail record table in a single SQLite database file.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::io(parent, e))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "Opened record store");
        Ok(store)
    }

    /// A private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Number of stored records.
    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM emails", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Stored records matching `filter`, newest first.
    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<MailRecord>> {
        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        match filter.seen {
            Some(true) => conditions.push("is_seen = 1"),
            Some(false) => conditions.push("is_seen = 0"),
            None => {}
        }
        if filter.flagged {
            conditions.push("is_flagged = 1");
        }
        if filter.replied {
            conditions.push("is_replied = 1");
        }
        if let Some(ref needle) = filter.search {
            conditions.push("(subject LIKE ?1 ESCAPE '\\' OR from_addr LIKE ?1 ESCAPE '\\')");
            values.push(format!("%{}%", escape_like(needle)));
        }

        let mut sql = format!("SELECT {COLUMNS} FROM emails");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY date DESC, path ASC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        debug!(sql = %sql, "Listing records");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), record_from_row)?;
        let records = rows.collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every stored record, newest first.
    pub fn all_records(&self) -> Result<Vec<MailRecord>> {
        self.list(&RecordFilter::default())
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: &MailRecord) -> Result<()> {
        let result = self.conn.execute(
            &format!(
                "INSERT INTO emails ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
            ),
            params![
                record.path,
                record.from,
                record.to,
                record.delivered_to,
                record.subject,
                record.body,
                record.body_html,
                record.date.timestamp_millis(),
                record.is_seen,
                record.is_replied,
                record.is_flagged,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(SyncError::DuplicateKey(record.path.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn find_by_path(&self, path: &str) -> Result<Option<MailRecord>> {
        let record = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM emails WHERE path = ?1"),
                params![path],
                record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete_by_path(&self, path: &str) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM emails WHERE path = ?1", params![path])?;
        Ok(changed > 0)
    }

    fn all_paths(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM emails")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;
        Ok(paths)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MailRecord> {
    let millis: i64 = row.get(7)?;
    Ok(MailRecord {
        path: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        delivered_to: row.get(3)?,
        subject: row.get(4)?,
        body: row.get(5)?,
        body_html: row.get(6)?,
        date: DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_default(),
        is_seen: row.get(8)?,
        is_replied: row.get(9)?,
        is_flagged: row.get(10)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => {
            err.code == ErrorCode::ConstraintViolation
                && (err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// Escape `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(path: &str, subject: &str) -> MailRecord {
        MailRecord {
            path: path.to_string(),
            from: "Alice <alice@example.com>".to_string(),
            to: "bob@example.com".to_string(),
            delivered_to: String::new(),
            subject: subject.to_string(),
            body: "hello".to_string(),
            body_html: None,
            date: Utc.with_ymd_and_hms(2024, 1, 4, 10, 0, 0).unwrap(),
            is_seen: false,
            is_replied: false,
            is_flagged: false,
        }
    }

    #[test]
    fn test_insert_and_find() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rec = record("cur/1,S", "Hi");
        store.insert(&rec).unwrap();
        assert_eq!(store.find_by_path("cur/1,S").unwrap(), Some(rec));
        assert_eq!(store.find_by_path("cur/2").unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record("cur/1,S", "Hi")).unwrap();
        let err = store.insert(&record("cur/1,S", "Other")).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateKey(ref p) if p == "cur/1,S"));
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.find_by_path("cur/1,S").unwrap().unwrap().subject, "Hi");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert(&record("a", "A")).unwrap();
        assert!(store.delete_by_path("a").unwrap());
        assert!(!store.delete_by_path("a").unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_all_paths() {
        let store = SqliteStore::open_in_memory().unwrap();
        for p in ["c", "a", "b"] {
            store.insert(&record(p, p)).unwrap();
        }
        let paths: Vec<String> = store.all_paths().unwrap().into_iter().collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_filters() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut seen = record("seen,S", "Quarterly report");
        seen.is_seen = true;
        let mut flagged = record("flagged,F", "100% off_sale");
        flagged.is_flagged = true;
        flagged.date = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        store.insert(&seen).unwrap();
        store.insert(&flagged).unwrap();
        store.insert(&record("plain,", "Lunch")).unwrap();

        let all = store.all_records().unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].path, "flagged,F", "newest first");

        let unseen = store
            .list(&RecordFilter {
                seen: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(unseen.len(), 2);

        let flagged_only = store
            .list(&RecordFilter {
                flagged: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(flagged_only.len(), 1);

        let search = store
            .list(&RecordFilter {
                search: Some("100%".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(search.len(), 1);
        assert_eq!(search[0].path, "flagged,F");

        let by_sender = store
            .list(&RecordFilter {
                search: Some("ALICE".into()),
                limit: Some(2),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_sender.len(), 2);
    }

    #[test]
    fn test_open_on_disk_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("nested").join("mail.db");
        {
            let store = SqliteStore::open(&db).unwrap();
            store.insert(&record("a", "A")).unwrap();
        }
        let store = SqliteStore::open(&db).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_a\\b"), "50\\%\\_a\\\\b");
    }
}
