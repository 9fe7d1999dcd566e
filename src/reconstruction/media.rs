use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ffmpeg;

/// A source recording handed to a reconstruction engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub path: PathBuf,
    pub name: String,
    /// Seconds, 0 when unknown
    pub duration: f64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Bytes on disk
    pub size: u64,
}

impl MediaSource {
    /// Describe a file from filesystem metadata only
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .with_context(|| format!("Failed to read media metadata: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            name: file_name(path),
            duration: 0.0,
            width: None,
            height: None,
            size: metadata.len(),
        })
    }

    /// Describe a file, filling duration and dimensions from ffmpeg
    pub async fn probe(path: impl AsRef<Path>, ffmpeg_path: &Path) -> Result<Self> {
        let mut source = Self::from_path(path)?;
        let info = ffmpeg::probe(ffmpeg_path, &source.path).await?;

        source.duration = info.duration.unwrap_or(0.0);
        source.width = info.width;
        source.height = info.height;
        Ok(source)
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    /// Lower-case file extension
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn has_video(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
