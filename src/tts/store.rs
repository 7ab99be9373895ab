//! Audio artifact storage

use std::io::Write;
use std::path::{Path, PathBuf};

use super::{ArtifactId, AudioArtifact};
use crate::{Error, Result};

/// Writes artifacts to a directory served under a URL prefix
#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
    url_prefix: String,
}

impl AudioStore {
    /// Open (and create) the audio directory
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    /// External URL for an artifact
    #[must_use]
    pub fn url_for(&self, id: &ArtifactId) -> String {
        format!("{}/{}", self.url_prefix, id.file_name())
    }

    /// Path on disk for an artifact
    #[must_use]
    pub fn path_for(&self, id: &ArtifactId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    /// Persist an artifact and return its URL
    ///
    /// The file appears under its final name only once fully written, and
    /// an existing file is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub async fn store(&self, artifact: &AudioArtifact) -> Result<String> {
        let dir = self.dir.clone();
        let path = self.path_for(&artifact.id);
        let bytes = artifact.bytes.clone();

        tokio::task::spawn_blocking(move || write_new(&dir, &path, &bytes))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        tracing::debug!(artifact = %artifact.id, "stored audio");
        Ok(self.url_for(&artifact.id))
    }
}

fn write_new(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist_noclobber(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
