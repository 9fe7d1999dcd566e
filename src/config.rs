//! Editor configuration
//!
//! Loaded from a JSON file, then overridden from the environment.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::reconstruction::backends::split::DEFAULT_MIN_CLIP_DURATION;
use crate::reconstruction::engine::{EngineType, ProcessingOptions};
use crate::transcript::history::DEFAULT_MERGE_THRESHOLD;

pub const FFMPEG_ENV: &str = "TRANSCRIPT_CUT_FFMPEG";
pub const WORK_DIR_ENV: &str = "TRANSCRIPT_CUT_WORK_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Window in which same-fragment text edits share one undo entry
    pub merge_threshold_ms: u64,
    /// Clips shorter than this (seconds) are dropped by split backends
    pub min_clip_duration: f64,
    /// Backend priority for selection
    pub engine_order: Vec<EngineType>,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    /// Parent of per-source work directories
    pub work_dir: PathBuf,
    pub default_options: ProcessingOptions,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            merge_threshold_ms: DEFAULT_MERGE_THRESHOLD.as_millis() as u64,
            min_clip_duration: DEFAULT_MIN_CLIP_DURATION,
            engine_order: vec![EngineType::Split, EngineType::CommandGraph],
            ffmpeg_path: None,
            work_dir: dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("transcript-cut"),
            default_options: ProcessingOptions::default(),
        }
    }
}

impl EditorConfig {
    /// Read a JSON config file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config: {}", path.display()))?;
        info!("Loaded editor config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise, then apply the environment
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = if path.exists() {
            Self::load(path)?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        Ok(config.apply_env())
    }

    pub fn apply_env(self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ffmpeg) = var(FFMPEG_ENV).filter(|v| !v.is_empty()) {
            debug!("{} overrides ffmpeg path: {}", FFMPEG_ENV, ffmpeg);
            self.ffmpeg_path = Some(PathBuf::from(ffmpeg));
        }
        if let Some(dir) = var(WORK_DIR_ENV).filter(|v| !v.is_empty()) {
            debug!("{} overrides work dir: {}", WORK_DIR_ENV, dir);
            self.work_dir = PathBuf::from(dir);
        }
        self
    }

    pub fn merge_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.merge_threshold_ms)
    }
}
