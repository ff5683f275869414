//! The synchronization pass: scan, ingest new files, reconcile removals.
//!
//! A pass is safe to interrupt and to repeat. Each record write commits on
//! its own, already-stored paths are skipped, and the reconciler only runs
//! after ingestion has returned.

pub mod ingest;
pub mod reconcile;

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::maildir::scanner::{self, ScanOptions};
use crate::parser::envelope::EnvelopeExtractor;
use crate::store::RecordStore;

pub use ingest::{IngestOutcome, IngestProgress, IngestReport};
pub use reconcile::ReconcileReport;

/// Summary of one full pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncReport {
    /// Files found by the ingestion scan.
    pub scanned: u64,
    /// New records stored.
    pub ingested: u64,
    /// Files not stored this pass (already known, unreadable, unparseable, ...).
    pub skipped: u64,
    /// Records removed because their file disappeared.
    pub deleted: u64,
    /// Orphaned records whose delete failed.
    pub delete_failures: u64,
    /// Missing records kept because their directory could not be read.
    pub unverified: u64,
}

impl SyncReport {
    fn new(ingest: IngestReport, reconcile: ReconcileReport) -> Self {
        Self {
            scanned: ingest.scanned,
            ingested: ingest.ingested,
            skipped: ingest.skipped,
            deleted: reconcile.deleted,
            delete_failures: reconcile.failed,
            unverified: reconcile.unverified,
        }
    }
}

/// Run one ingest + reconcile pass over `root`.
///
/// Fails before touching the store if `root` is not a readable directory, and
/// propagates structural walk failures from either scan. Per-file problems are
/// only counted. Keys are built from the canonical form of `root`.
pub fn run_pass<S, E>(
    root: &Path,
    store: &S,
    extractor: &E,
    options: ScanOptions,
    progress: Option<IngestProgress<'_>>,
) -> Result<SyncReport>
where
    S: RecordStore + ?Sized,
    E: EnvelopeExtractor + ?Sized,
{
    let root = scanner::resolve_root(root)?;
    info!(root = %root.display(), "Starting sync pass");

    let paths = scanner::scan(&root, options)?;
    let ingested = ingest::ingest(&paths, store, extractor, progress);
    let reconciled = reconcile::reconcile(&root, store, options)?;

    Ok(SyncReport::new(ingested, reconciled))
}
