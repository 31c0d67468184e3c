//! Lifecycle of the files a session writes to disk.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::{debug, error, info};
use regex::Regex;
use tempfile::NamedTempFile;

use crate::preset::Preset;

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r#"[/\\:*?"<>|]"#).unwrap();
}

/// Replace characters that are unsafe in file names with `_`.
pub fn safe_filename(name: &str) -> String {
    UNSAFE_CHARS.replace_all(name, "_").into_owned()
}

/// `true` for `*.pdf`, any case.
pub fn has_pdf_extension(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

/// `report.pdf` + small -> `report-small.pdf`
pub fn artifact_filename(source_name: &str, preset: Preset) -> String {
    let stem = Path::new(source_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}-{}.pdf", safe_filename(&stem), preset)
}

/// Write `bytes` to `path` through a temporary sibling and rename it into
/// place, so `path` either holds the complete payload or is untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Outcome of a cleanup sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Every path the session created and has not yet deleted.
#[derive(Debug, Default)]
pub struct TempFileSet {
    paths: BTreeSet<PathBuf>,
}

impl TempFileSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the path was already tracked.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> bool {
        self.paths.insert(path.into())
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.paths.iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every tracked path not in `preserve`, then track exactly the
    /// preserved paths that were tracked before.
    ///
    /// A file that is already gone counts as removed. Other failures are
    /// logged and the sweep carries on; failed paths are dropped from the set.
    pub fn cleanup(&mut self, preserve: &BTreeSet<PathBuf>) -> CleanupReport {
        info!("Cleaning up {} temporary files", self.paths.len());
        let mut report = CleanupReport::default();

        for path in std::mem::take(&mut self.paths) {
            if preserve.contains(&path) {
                self.paths.insert(path);
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed temporary file: {:?}", path);
                    report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("Temporary file already gone: {:?}", path);
                    report.removed.push(path);
                }
                Err(e) => {
                    error!("Error removing file {:?}: {}", path, e);
                    report.failed.push(path);
                }
            }
        }
        report
    }
}
