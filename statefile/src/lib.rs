//! Small JSON documents kept on local storage.
//!
//! Every operation reads or writes the whole document. Writes go to a sibling
//! temporary file first and are then renamed over the target, so a crash in
//! the middle of a write leaves the previous version intact.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const TMP_SUFFIX: &str = "tmp";

#[derive(Error, Debug)]
pub enum StateFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StateFileError {
    pub fn is_parse_error(&self) -> bool {
        matches!(self, StateFileError::Json { .. })
    }
}

#[derive(Clone, Debug)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and deserialize the document.
    ///
    /// A missing file, or one containing only whitespace, yields `Ok(None)`.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Option<T>, StateFileError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StateFileError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Serialize as 2-space indented JSON and replace the document.
    pub fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StateFileError> {
        let body = serde_json::to_string_pretty(value).map_err(|source| StateFileError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
            }
        }

        let tmp_path = self.sibling(TMP_SUFFIX);
        let write_tmp = || -> io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(body.as_bytes())?;
            file.sync_all()
        };
        write_tmp().map_err(|e| self.io_err(e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| self.io_err(e))?;
        log::trace!("Wrote {} bytes to {}", body.len(), self.path.display());
        Ok(())
    }

    /// Delete the document. Deleting a missing document is not an error.
    pub fn remove(&self) -> Result<(), StateFileError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    /// Move the document aside as `<name>.<suffix>` and return the new path.
    pub fn quarantine(&self, suffix: &str) -> Result<PathBuf, StateFileError> {
        let target = self.sibling(suffix);
        fs::rename(&self.path, &target).map_err(|e| self.io_err(e))?;
        log::warn!(
            "Moved unreadable {} to {}",
            self.path.display(),
            target.display()
        );
        Ok(target)
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".");
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: io::Error) -> StateFileError {
        StateFileError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
