use crate::error::Result;
use crate::utils::sanitize_filename;
use chrono::Utc;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Where unrecoverable raw model responses go for later inspection.
pub trait ArtifactSink: Send + Sync {
    /// Stores `bytes` under a name derived from `name` and returns where it went.
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Writes artifacts as `{name}-{timestamp}.txt` files in a debug directory.
///
/// The directory is created on the first write, so constructing the sink has
/// no side effects.
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for FsArtifactSink {
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<String> {
        std::fs::create_dir_all(&self.dir)?;
        let file_name = format!(
            "{}-{}.txt",
            sanitize_filename(name),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );
        let path = self.dir.join(file_name);
        std::fs::write(&path, bytes)?;
        debug!("Persisted raw response to {}", path.display());
        Ok(path.display().to_string())
    }
}

/// Logs artifacts instead of storing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullArtifactSink;

impl ArtifactSink for NullArtifactSink {
    fn persist(&self, name: &str, bytes: &[u8]) -> Result<String> {
        warn!(
            "Unrecoverable response {} ({} bytes):\n{}",
            name,
            bytes.len(),
            String::from_utf8_lossy(bytes)
        );
        Ok(format!("log:{}", name))
    }
}
