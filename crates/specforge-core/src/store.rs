//! Per-run artifact directory.
//!
//! Every phase persists exactly one well-known file here. Existence of a
//! valid file is how the pipeline knows a phase already ran, so writes go
//! through [`crate::io::atomic_write`] and nothing is ever deleted.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ForgeError, Result};
use crate::io;
use crate::paths;

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open (and create if needed) the task directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        io::ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_file()
    }

    pub fn read_text(&self, name: &str) -> Result<String> {
        let path = self.path(name);
        if !path.is_file() {
            return Err(ForgeError::ArtifactNotFound(path));
        }
        Ok(std::fs::read_to_string(&path)?)
    }

    pub fn read_json(&self, name: &str) -> Result<serde_json::Value> {
        self.read_as(name)
    }

    /// Typed read. Malformed JSON and missing required keys are both
    /// reported as [`ForgeError::CorruptArtifact`].
    pub fn read_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let text = self.read_text(name)?;
        serde_json::from_str(&text).map_err(|e| ForgeError::CorruptArtifact {
            path: self.path(name),
            reason: e.to_string(),
        })
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let path = self.path(name);
        let data = serde_json::to_string_pretty(value)?;
        io::atomic_write(&path, data.as_bytes())?;
        tracing::debug!(artifact = name, "wrote artifact");
        Ok(path)
    }

    pub fn write_text(&self, name: &str, text: &str) -> Result<PathBuf> {
        let path = self.path(name);
        io::atomic_write(&path, text.as_bytes())?;
        tracing::debug!(artifact = name, "wrote artifact");
        Ok(path)
    }

    /// Seed `name` from a file computed elsewhere (e.g. a shared project index).
    pub fn copy_from(&self, external: &Path, name: &str) -> Result<PathBuf> {
        if !external.is_file() {
            return Err(ForgeError::ArtifactNotFound(external.to_path_buf()));
        }
        let path = self.path(name);
        io::atomic_copy(external, &path)?;
        Ok(path)
    }

    /// Replace the `NNN-pending` placeholder with `NNN-<derived_name>`.
    ///
    /// Returns `true` only when the directory was actually moved. A
    /// directory that no longer carries the placeholder, or whose target
    /// already exists, is left alone.
    pub fn rename_from_placeholder(&mut self, derived_name: &str) -> Result<bool> {
        if !paths::is_placeholder(&self.dir) {
            return Ok(false);
        }
        let current = self
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = paths::number_prefix(&current).unwrap_or("");
        let Some(parent) = self.dir.parent() else {
            return Ok(false);
        };
        let target = parent.join(format!("{prefix}{derived_name}"));
        if target.exists() {
            tracing::debug!(target = %target.display(), "rename target exists; keeping placeholder");
            return Ok(false);
        }
        std::fs::rename(&self.dir, &target)?;
        tracing::info!(from = %current, to = %target.display(), "renamed spec directory");
        self.dir = target;
        Ok(true)
    }
}
