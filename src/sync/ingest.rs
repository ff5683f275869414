//! Ingestion: turn newly seen mail files into stored records.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::maildir::flags::MaildirFlags;
use crate::maildir::scanner::path_key;
use crate::model::envelope::Envelope;
use crate::model::record::MailRecord;
use crate::parser::envelope::EnvelopeExtractor;
use crate::parser::header::parse_date;
use crate::store::RecordStore;

/// What happened to one scanned path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A new record was stored.
    Ingested,
    /// The path was already stored before this attempt.
    AlreadyStored,
    /// The insert lost a race against another writer for the same path.
    Duplicate,
    /// The file could not be read.
    Unreadable,
    /// The file is not a parseable message.
    ParseFailed,
    /// The store failed for a reason other than a duplicate path.
    StoreFailed,
}

impl IngestOutcome {
    pub fn is_ingested(self) -> bool {
        self == Self::Ingested
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ingested => "ingested",
            Self::AlreadyStored => "known",
            Self::Duplicate => "duplicate",
            Self::Unreadable => "unreadable",
            Self::ParseFailed => "unparseable",
            Self::StoreFailed => "store error",
        }
    }
}

impl fmt::Display for IngestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Counters for one ingestion run. `scanned == ingested + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub scanned: u64,
    pub ingested: u64,
    pub skipped: u64,
}

impl IngestReport {
    fn record(&mut self, outcome: IngestOutcome) {
        self.scanned += 1;
        if outcome.is_ingested() {
            self.ingested += 1;
        } else {
            self.skipped += 1;
        }
    }
}

/// Progress callback: `(current, total, path, outcome)`, called once per path.
pub type IngestProgress<'a> = &'a dyn Fn(usize, usize, &Path, IngestOutcome);

/// Ingest every path, never failing on a single item.
pub fn ingest<S, E>(
    paths: &[PathBuf],
    store: &S,
    extractor: &E,
    progress: Option<IngestProgress<'_>>,
) -> IngestReport
where
    S: RecordStore + ?Sized,
    E: EnvelopeExtractor + ?Sized,
{
    let mut report = IngestReport::default();
    let total = paths.len();

    for (i, path) in paths.iter().enumerate() {
        let outcome = ingest_one(path, store, extractor);
        report.record(outcome);
        debug!(path = %path.display(), outcome = %outcome, "Processed");
        if let Some(cb) = progress {
            cb(i + 1, total, path, outcome);
        }
    }

    info!(
        scanned = report.scanned,
        ingested = report.ingested,
        skipped = report.skipped,
        "Ingestion finished"
    );
    report
}

/// Run the pipeline for a single file.
pub fn ingest_one<S, E>(path: &Path, store: &S, extractor: &E) -> IngestOutcome
where
    S: RecordStore + ?Sized,
    E: EnvelopeExtractor + ?Sized,
{
    let key = path_key(path);

    match store.find_by_path(&key) {
        Ok(Some(_)) => return IngestOutcome::AlreadyStored,
        Ok(None) => {}
        Err(e) => {
            warn!(path = %key, error = %e, "Lookup failed, skipping");
            return IngestOutcome::StoreFailed;
        }
    }

    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %SyncError::io(path, e), "Skipping unreadable file");
            return IngestOutcome::Unreadable;
        }
    };

    let envelope = match extractor.extract(&raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(path = %key, error = %e, "Skipping unparseable message");
            return IngestOutcome::ParseFailed;
        }
    };

    let record = build_record(key, &envelope);
    match store.insert(&record) {
        Ok(()) => IngestOutcome::Ingested,
        Err(SyncError::DuplicateKey(_)) => {
            debug!(path = %record.path, "Already inserted by another writer");
            IngestOutcome::Duplicate
        }
        Err(e) => {
            warn!(path = %record.path, error = %e, "Insert failed, skipping");
            IngestOutcome::StoreFailed
        }
    }
}

/// Assemble the record for `path` from its envelope and file-name flags.
///
/// An absent or unparseable `Date:` header falls back to the current time.
pub fn build_record(path: String, envelope: &Envelope) -> MailRecord {
    let date = envelope
        .header("date")
        .and_then(parse_date)
        .unwrap_or_else(Utc::now);
    let flags = MaildirFlags::parse(path.as_str());

    MailRecord {
        from: envelope.header_or_empty("from"),
        to: envelope.header_or_empty("to"),
        delivered_to: envelope.header_or_empty("delivered-to"),
        subject: envelope.header_or_empty("subject"),
        body: envelope.text.clone().unwrap_or_default(),
        body_html: envelope.html.clone(),
        date,
        is_seen: flags.is_seen(),
        is_replied: flags.is_replied(),
        is_flagged: flags.is_flagged(),
        path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::parser::envelope::MailParserExtractor;
    use crate::store::SqliteStore;
    use std::cell::Cell;

    const MESSAGE: &[u8] = b"From: Alice <alice@example.com>\n\
To: bob@example.com\n\
Delivered-To: bob@example.com\n\
Subject: Hello\n\
Date: Thu, 04 Jan 2024 10:00:00 +0000\n\
\n\
Body text\n";

    struct FailingExtractor;

    impl EnvelopeExtractor for FailingExtractor {
        fn extract(&self, _raw: &[u8]) -> Result<Envelope> {
            Err(SyncError::parse("always fails"))
        }
    }

    /// Pretends the path is absent on lookup so the insert hits the constraint.
    struct RacingStore(SqliteStore);

    impl RecordStore for RacingStore {
        fn insert(&self, record: &MailRecord) -> Result<()> {
            self.0.insert(record)
        }
        fn find_by_path(&self, _path: &str) -> Result<Option<MailRecord>> {
            Ok(None)
        }
        fn delete_by_path(&self, path: &str) -> Result<bool> {
            self.0.delete_by_path(path)
        }
        fn all_paths(&self) -> Result<std::collections::BTreeSet<String>> {
            self.0.all_paths()
        }
    }

    fn write(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_ingest_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "1.host,U=1:2,FS", MESSAGE);
        let store = SqliteStore::open_in_memory().unwrap();

        let outcome = ingest_one(&path, &store, &MailParserExtractor::default());
        assert_eq!(outcome, IngestOutcome::Ingested);

        let rec = store.find_by_path(&path_key(&path)).unwrap().unwrap();
        assert_eq!(rec.from, "Alice <alice@example.com>");
        assert_eq!(rec.delivered_to, "bob@example.com");
        assert_eq!(rec.subject, "Hello");
        assert!(rec.body.contains("Body text"));
        assert_eq!(rec.date.to_rfc3339(), "2024-01-04T10:00:00+00:00");
        assert!(rec.is_seen && rec.is_flagged && !rec.is_replied);
    }

    #[test]
    fn test_ingest_twice_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "1.host,S", MESSAGE);
        let store = SqliteStore::open_in_memory().unwrap();
        let extractor = MailParserExtractor::default();
        let paths = vec![path.clone(), path];

        let report = ingest(&paths, &store, &extractor, None);
        assert_eq!(
            report,
            IngestReport {
                scanned: 2,
                ingested: 1,
                skipped: 1
            }
        );
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_insert_is_a_skip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "1.host,S", MESSAGE);
        let store = RacingStore(SqliteStore::open_in_memory().unwrap());
        let extractor = MailParserExtractor::default();

        assert_eq!(ingest_one(&path, &store, &extractor), IngestOutcome::Ingested);
        assert_eq!(ingest_one(&path, &store, &extractor), IngestOutcome::Duplicate);
        assert_eq!(store.0.count().unwrap(), 1);
    }

    #[test]
    fn test_parse_failure_is_a_skip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write(tmp.path(), "1.host,S", MESSAGE);
        let store = SqliteStore::open_in_memory().unwrap();

        let report = ingest(&[path], &store, &FailingExtractor, None);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.ingested, 0);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_unreadable_file_is_a_skip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let outcome = ingest_one(
            &tmp.path().join("vanished,S"),
            &store,
            &MailParserExtractor::default(),
        );
        assert_eq!(outcome, IngestOutcome::Unreadable);
    }

    #[test]
    fn test_missing_date_falls_back_to_now() {
        let envelope = Envelope {
            headers: vec![
                ("from".into(), "a@example.com".into()),
                ("date".into(), "sometime last week".into()),
            ],
            ..Default::default()
        };
        let before = Utc::now();
        let rec = build_record("cur/x,".to_string(), &envelope);
        let after = Utc::now();
        assert!(rec.date >= before && rec.date <= after);
        assert_eq!(rec.subject, "");
        assert_eq!(rec.body, "");
    }

    #[test]
    fn test_progress_called_per_path() {
        let tmp = tempfile::tempdir().unwrap();
        let a = write(tmp.path(), "a,S", MESSAGE);
        let b = write(tmp.path(), "b,", b"");
        let store = SqliteStore::open_in_memory().unwrap();
        let calls = Cell::new(0usize);
        let ingested = Cell::new(0usize);

        let cb = |current: usize, total: usize, _path: &Path, outcome: IngestOutcome| {
            calls.set(calls.get() + 1);
            assert_eq!(current, calls.get());
            assert_eq!(total, 2);
            if outcome.is_ingested() {
                ingested.set(ingested.get() + 1);
            }
        };
        ingest(&[a, b], &store, &MailParserExtractor::default(), Some(&cb));
        assert_eq!(calls.get(), 2);
        assert_eq!(ingested.get(), 1);
    }

    /// Fails lookups and inserts for paths naming the failure.
    struct FlakyStore(SqliteStore);

    impl RecordStore for FlakyStore {
        fn insert(&self, record: &MailRecord) -> Result<()> {
            if record.path.contains("insert-fails") {
                return Err(SyncError::Database(rusqlite::Error::QueryReturnedNoRows));
            }
            self.0.insert(record)
        }
        fn find_by_path(&self, path: &str) -> Result<Option<MailRecord>> {
            if path.contains("lookup-fails") {
                return Err(SyncError::Database(rusqlite::Error::QueryReturnedNoRows));
            }
            self.0.find_by_path(path)
        }
        fn delete_by_path(&self, path: &str) -> Result<bool> {
            self.0.delete_by_path(path)
        }
        fn all_paths(&self) -> Result<std::collections::BTreeSet<String>> {
            self.0.all_paths()
        }
    }

    #[test]
    fn test_store_errors_are_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let lookup = write(tmp.path(), "lookup-fails,S", MESSAGE);
        let insert = write(tmp.path(), "insert-fails,S", MESSAGE);
        let ok = write(tmp.path(), "ok,S", MESSAGE);
        let store = FlakyStore(SqliteStore::open_in_memory().unwrap());
        let extractor = MailParserExtractor::default();

        assert_eq!(ingest_one(&lookup, &store, &extractor), IngestOutcome::StoreFailed);
        assert_eq!(ingest_one(&insert, &store, &extractor), IngestOutcome::StoreFailed);

        let report = ingest(&[lookup, insert, ok.clone()], &store, &extractor, None);
        assert_eq!(report.scanned, 3);
        assert_eq!(report.ingested, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(store.0.all_paths().unwrap().len(), 1);
        assert!(store.0.find_by_path(&path_key(&ok)).unwrap().is_some());
    }
}
