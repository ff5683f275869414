//! Recursive listing of the regular files under a mailbox root.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Filters applied while walking the mailbox tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Ignore files and directories whose name starts with `.`.
    pub skip_hidden: bool,
    /// Ignore maildir `tmp/` directories (deliveries still in progress).
    pub skip_tmp: bool,
    /// Descend into symlinked directories and list symlinked files.
    pub follow_links: bool,
}

/// Result of one walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Regular files with UTF-8 paths, sorted by file name per directory.
    pub files: Vec<PathBuf>,
    /// Entries the walk could not read. Stored paths at or below these are
    /// unknown rather than gone.
    pub unreadable: Vec<PathBuf>,
}

impl ScanOutcome {
    /// Whether `key` lies at or below an entry the walk could not read.
    pub fn is_unverified(&self, key: &str) -> bool {
        let path = Path::new(key);
        self.unreadable.iter().any(|dir| path.starts_with(dir))
    }
}

/// Fail with [`SyncError::DirectoryAccess`] unless `root` is an existing directory.
pub fn check_root(root: &Path) -> Result<()> {
    let meta = std::fs::metadata(root).map_err(|e| SyncError::DirectoryAccess {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(SyncError::DirectoryAccess {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    Ok(())
}

/// Check `root` and return its canonical absolute form.
///
/// Store keys are built from the canonical root, so `Maildir`, `./Maildir/`
/// and `/home/me/Maildir` all produce the same keys.
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    check_root(root)?;
    std::fs::canonicalize(root).map_err(|e| SyncError::DirectoryAccess {
        path: root.to_path_buf(),
        reason: e.to_string(),
    })
}

/// List every regular file reachable from `root`, sorted by file name per directory.
///
/// Unreadable entries are logged and skipped. The walk only aborts when the
/// root itself fails, which is reported as [`SyncError::Walk`].
pub fn scan(root: &Path, options: ScanOptions) -> Result<Vec<PathBuf>> {
    Ok(scan_tree(root, options)?.files)
}

/// Like [`scan`], but also report which entries could not be read.
pub fn scan_tree(root: &Path, options: ScanOptions) -> Result<ScanOutcome> {
    check_root(root)?;
    walk(root, options)
}

fn walk(root: &Path, options: ScanOptions) -> Result<ScanOutcome> {
    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| entry.depth() == 0 || !is_excluded(entry, options));

    let mut outcome = ScanOutcome::default();
    for entry in walker {
        match entry {
            Ok(entry) => {
                if !entry.file_type().is_file() {
                    continue;
                }
                if entry.path().to_str().is_none() {
                    warn!(path = ?entry.path(), "Skipping file with a non-UTF-8 name");
                    continue;
                }
                outcome.files.push(entry.into_path());
            }
            Err(e) => {
                if e.depth() == 0 || !root.is_dir() {
                    return Err(SyncError::Walk {
                        path: root.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                warn!(
                    path = ?e.path(),
                    error = %e,
                    "Skipping unreadable entry"
                );
                if let Some(path) = e.path() {
                    outcome.unreadable.push(path.to_path_buf());
                }
            }
        }
    }

    debug!(
        root = %root.display(),
        count = outcome.files.len(),
        unreadable = outcome.unreadable.len(),
        "Scanned mail directory"
    );
    Ok(outcome)
}

/// Scan `root` and return the store keys of every file found.
pub fn path_set(root: &Path, options: ScanOptions) -> Result<BTreeSet<String>> {
    Ok(scan(root, options)?
        .iter()
        .map(|p| path_key(p))
        .collect())
}

/// Render a filesystem path as the key it is stored under.
///
/// Scanned paths are always valid UTF-8, so the conversion is lossless for them.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_excluded(entry: &walkdir::DirEntry, options: ScanOptions) -> bool {
    let name = entry.file_name().to_string_lossy();
    if options.skip_hidden && name.starts_with('.') {
        return true;
    }
    options.skip_tmp && entry.file_type().is_dir() && name == "tmp"
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, b"From: a@b.com\n\nbody\n").unwrap();
    }

    #[test]
    fn test_scan_recurses_and_skips_directories() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("cur/1.host,S"));
        touch(&tmp.path().join("new/2.host"));
        touch(&tmp.path().join("sub/cur/3.host,FS"));
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();

        let files = scan(tmp.path(), ScanOptions::default()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_scan_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        let err = scan(&missing, ScanOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::DirectoryAccess { .. }));
    }

    #[test]
    fn test_scan_root_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file");
        touch(&file);
        let err = scan(&file, ScanOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::DirectoryAccess { .. }));
    }

    #[test]
    fn test_scan_options() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("cur/1.host,S"));
        touch(&tmp.path().join("tmp/2.host"));
        touch(&tmp.path().join(".DS_Store"));

        assert_eq!(scan(tmp.path(), ScanOptions::default()).unwrap().len(), 3);

        let opts = ScanOptions {
            skip_hidden: true,
            skip_tmp: true,
            ..Default::default()
        };
        let files = scan(tmp.path(), opts).unwrap();
        assert_eq!(files, vec![tmp.path().join("cur/1.host,S")]);
    }

    #[test]
    fn test_path_set_matches_scan() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("cur/a,S"));
        touch(&tmp.path().join("cur/b,"));
        let set = path_set(tmp.path(), ScanOptions::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&path_key(&tmp.path().join("cur/a,S"))));
    }

    #[test]
    fn test_resolve_root_normalizes_spelling() {
        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("m/cur/1.host,S"));
        let plain = resolve_root(&tmp.path().join("m")).unwrap();
        let dotted = resolve_root(&tmp.path().join("m").join(".").join("cur").join("..")).unwrap();
        assert_eq!(plain, dotted);
        assert!(plain.is_absolute());
        assert!(matches!(
            resolve_root(&tmp.path().join("absent")),
            Err(SyncError::DirectoryAccess { .. })
        ));
    }

    #[test]
    fn test_walk_failure_at_root_is_structural() {
        let tmp = tempfile::tempdir().unwrap();
        let err = walk(&tmp.path().join("vanished"), ScanOptions::default()).unwrap_err();
        assert!(matches!(err, SyncError::Walk { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_entry_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("m");
        touch(&root.join("cur/1.host,S"));
        std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();

        let opts = ScanOptions {
            follow_links: true,
            ..Default::default()
        };
        let outcome = scan_tree(&root, opts).unwrap();
        assert_eq!(outcome.files, vec![root.join("cur/1.host,S")]);
        assert_eq!(outcome.unreadable, vec![root.join("loop")]);
        assert!(outcome.is_unverified(&path_key(&root.join("loop/cur/old,S"))));
        assert!(!outcome.is_unverified(&path_key(&root.join("cur/old,S"))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_skipped() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        touch(&tmp.path().join("cur/good,S"));
        touch(&tmp.path().join("cur").join(std::ffi::OsStr::from_bytes(b"bad\xff,S")));

        let files = scan(tmp.path(), ScanOptions::default()).unwrap();
        assert_eq!(files, vec![tmp.path().join("cur/good,S")]);
    }
}
