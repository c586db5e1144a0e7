//! Storage backends for the preferences blob.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::application::repos::{PreferenceStore, RepoError};
use crate::util::lock::{rw_read, rw_write};

const SOURCE: &str = "infra::preferences";

/// Keeps the blob in a JSON file, replaced atomically on every store.
#[derive(Debug, Clone)]
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn load(&self) -> Result<Option<String>, RepoError> {
        match fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                warn!(
                    target_module = SOURCE,
                    op = "preferences::load",
                    path = %self.path.display(),
                    error = %err,
                    "Failed to read preferences file"
                );
                Err(RepoError::from_persistence(err))
            }
        }
    }

    fn store(&self, blob: &str) -> Result<(), RepoError> {
        let directory = self.directory();
        fs::create_dir_all(directory).map_err(RepoError::from_persistence)?;

        // Written next to the target so the rename stays on one filesystem.
        let mut staged = NamedTempFile::new_in(directory).map_err(RepoError::from_persistence)?;
        staged
            .write_all(blob.as_bytes())
            .map_err(RepoError::from_persistence)?;
        staged.flush().map_err(RepoError::from_persistence)?;
        staged
            .persist(&self.path)
            .map_err(|err| RepoError::from_persistence(err.error))?;

        debug!(
            target_module = SOURCE,
            op = "preferences::store",
            path = %self.path.display(),
            bytes = blob.len(),
            "Preferences written"
        );
        Ok(())
    }
}

/// Keeps the blob for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    blob: RwLock<Option<String>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RwLock::new(Some(blob.into())),
        }
    }
}

impl PreferenceStore for InMemoryPreferenceStore {
    fn load(&self) -> Result<Option<String>, RepoError> {
        Ok(rw_read(&self.blob, SOURCE, "load").clone())
    }

    fn store(&self, blob: &str) -> Result<(), RepoError> {
        *rw_write(&self.blob, SOURCE, "store") = Some(blob.to_string());
        Ok(())
    }
}
