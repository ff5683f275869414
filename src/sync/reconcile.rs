//! Reconciliation: drop records whose backing file is gone.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::maildir::scanner::{self, ScanOptions, ScanOutcome};
use crate::store::RecordStore;

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReconcileReport {
    /// Records actually removed.
    pub deleted: u64,
    /// Deletes that failed and were left for the next pass.
    pub failed: u64,
    /// Missing records kept because the walk could not read their directory.
    pub unverified: u64,
}

/// Compare the store against a fresh scan of `root` and delete orphans.
///
/// The scan here is independent of the one ingestion used, so files removed
/// while ingestion was running are still caught in this pass.
pub fn reconcile<S>(root: &Path, store: &S, options: ScanOptions) -> Result<ReconcileReport>
where
    S: RecordStore + ?Sized,
{
    let scan = scanner::scan_tree(root, options)?;
    let on_disk: BTreeSet<String> = scan.files.iter().map(|p| scanner::path_key(p)).collect();
    reconcile_against(store, &on_disk, &scan)
}

/// Delete every stored record whose path is not in `fs_paths`, except those
/// under an entry `scan` could not read.
///
/// Failing to enumerate the store is returned; a failing delete is logged,
/// counted, and skipped.
pub fn reconcile_against<S>(
    store: &S,
    fs_paths: &BTreeSet<String>,
    scan: &ScanOutcome,
) -> Result<ReconcileReport>
where
    S: RecordStore + ?Sized,
{
    let stored = store.all_paths()?;
    let mut report = ReconcileReport::default();

    for orphan in stored.difference(fs_paths) {
        if scan.is_unverified(orphan) {
            debug!(path = %orphan, "Keeping record under unreadable directory");
            report.unverified += 1;
            continue;
        }
        match store.delete_by_path(orphan) {
            Ok(true) => {
                debug!(path = %orphan, "Deleted record for missing file");
                report.deleted += 1;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(path = %orphan, error = %e, "Could not delete record");
                report.failed += 1;
            }
        }
    }

    info!(
        stored = stored.len(),
        on_disk = fs_paths.len(),
        deleted = report.deleted,
        unverified = report.unverified,
        "Reconciliation finished"
    );
    Ok(report)
}
