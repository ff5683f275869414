//! Persistent record storage keyed by file path.

pub mod sqlite;

use std::collections::BTreeSet;

use crate::error::Result;
use crate::model::record::MailRecord;

pub use sqlite::SqliteStore;

/// Path-keyed persistence used by the sync engine.
///
/// Implementations must enforce path uniqueness themselves: a second
/// [`insert`](RecordStore::insert) for a stored path fails with
/// [`SyncError::DuplicateKey`](crate::error::SyncError::DuplicateKey).
pub trait RecordStore {
    /// Insert a new record.
    fn insert(&self, record: &MailRecord) -> Result<()>;

    /// Look up a record by exact path. A missing record is `Ok(None)`.
    fn find_by_path(&self, path: &str) -> Result<Option<MailRecord>>;

    /// Delete the record for `path`. Returns whether a record was removed;
    /// deleting an absent path is not an error.
    fn delete_by_path(&self, path: &str) -> Result<bool>;

    /// Every stored path.
    fn all_paths(&self) -> Result<BTreeSet<String>>;
}

/// Selection criteria for listing stored records.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// `Some(true)` for seen only, `Some(false)` for unseen only.
    pub seen: Option<bool>,
    pub flagged: bool,
    pub replied: bool,
    /// Case-insensitive substring of the subject or sender.
    pub search: Option<String>,
    pub limit: Option<usize>,
}
