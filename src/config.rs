use std::path::{Path, PathBuf};

use log::debug;
use tempfile::TempDir;

use crate::error::{Result, SessionError};

/// Session configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Parent of the per-session directory holding the source copy and
    /// artifacts. `None` uses the system temporary directory. The
    /// per-session directory is removed together with the session; the
    /// parent and anything else in it are left alone.
    pub work_dir: Option<PathBuf>,
}

impl SessionConfig {
    pub fn with_work_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: Some(dir.into()),
        }
    }
}

/// Private per-session directory. Every file the session writes lives here,
/// so nothing outside it can be overwritten or deleted by cleanup.
#[derive(Debug)]
pub(crate) struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub(crate) fn create(config: &SessionConfig) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pdf-preset-");
        let dir = match &config.work_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SessionError::io("creating work directory", e))?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| SessionError::io("creating session directory", e))?;
        debug!("Using session directory {:?}", dir.path());
        Ok(Workspace { dir })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_directory_is_nested_under_work_dir() {
        let parent = tempfile::tempdir().unwrap();
        let nested = parent.path().join("jobs");
        let workspace = Workspace::create(&SessionConfig::with_work_dir(&nested)).unwrap();

        assert_eq!(workspace.path().parent(), Some(nested.as_path()));
        assert_ne!(workspace.path(), nested.as_path());

        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
        assert!(nested.exists());
    }
}
