//! Reconstruction engine trait and types
//!
//! Defines the common interface for all media reconstruction backends (split
//! based, command graph) plus the options, progress and error types they share

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::media::MediaSource;
use crate::timeline::segments::VideoSegment;

/// Error types for reconstruction operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconstructionError {
    /// Backend cannot run in this environment or for this media
    Unsupported(String),
    /// Backend threw while initializing
    InitializationFailed(String),
    /// `process` called before a successful `initialize`
    NotInitialized,
    /// `process` called while the engine is not `Ready`
    NotReady(EngineState),
    /// Every segment is deleted
    NothingToKeep,
    /// Options the backend cannot honour
    InvalidOptions(String),
    /// Error during a processing run, fatal for that run
    ProcessingFailed(String),
    /// External toolchain binary missing
    ToolchainNotFound(String),
    /// Filesystem / pipe error
    Io(String),
    /// Run abandoned by the caller
    Cancelled,
    /// Selection exhausted every backend
    NoEngineAvailable(Vec<EngineAttempt>),
    /// Engine type not registered
    UnknownEngine(String),
}

impl fmt::Display for ReconstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconstructionError::Unsupported(msg) => write!(f, "Engine not supported: {}", msg),
            ReconstructionError::InitializationFailed(msg) => {
                write!(f, "Engine initialization failed: {}", msg)
            }
            ReconstructionError::NotInitialized => write!(f, "Engine not initialized"),
            ReconstructionError::NotReady(state) => {
                write!(f, "Engine not ready (current state: {})", state)
            }
            ReconstructionError::NothingToKeep => {
                write!(f, "Nothing to keep: every segment is deleted")
            }
            ReconstructionError::InvalidOptions(msg) => write!(f, "Invalid options: {}", msg),
            ReconstructionError::ProcessingFailed(msg) => write!(f, "Processing failed: {}", msg),
            ReconstructionError::ToolchainNotFound(msg) => write!(f, "Toolchain not found: {}", msg),
            ReconstructionError::Io(msg) => write!(f, "I/O error: {}", msg),
            ReconstructionError::Cancelled => write!(f, "Processing cancelled"),
            ReconstructionError::NoEngineAvailable(attempts) => {
                write!(f, "No reconstruction engine available")?;
                for (i, attempt) in attempts.iter().enumerate() {
                    write!(f, "{}{}", if i == 0 { ": " } else { "; " }, attempt)?;
                }
                Ok(())
            }
            ReconstructionError::UnknownEngine(name) => write!(f, "Unknown engine type: {}", name),
        }
    }
}

impl std::error::Error for ReconstructionError {}

impl From<std::io::Error> for ReconstructionError {
    fn from(err: std::io::Error) -> Self {
        ReconstructionError::Io(err.to_string())
    }
}

/// One failed backend during selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineAttempt {
    pub engine: EngineType,
    pub reason: String,
}

impl fmt::Display for EngineAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.engine, self.reason)
    }
}

/// Backend type enum for serialization and registry keys
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EngineType {
    /// In-process clip splitting
    Split,
    /// External trim/concat toolchain (ffmpeg)
    CommandGraph,
    /// Registered at runtime
    Custom(String),
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineType::Split => write!(f, "split"),
            EngineType::CommandGraph => write!(f, "command_graph"),
            EngineType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Engine lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Processing,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Uninitialized => "uninitialized",
            EngineState::Initializing => "initializing",
            EngineState::Ready => "ready",
            EngineState::Processing => "processing",
            EngineState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Feature flags reported by a backend
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineFeatures {
    pub trim: bool,
    pub concat: bool,
    pub audio_processing: bool,
    pub subtitle_burn: bool,
    pub quality_control: bool,
}

/// Result of a capability probe. Never cached across media inputs.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EngineCapabilities {
    pub supported: bool,
    /// Why the backend is unsupported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Output formats, by extension
    pub formats: Vec<String>,
    /// Largest accepted source in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u64>,
    pub features: EngineFeatures,
}

impl EngineCapabilities {
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self {
            supported: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    /// Whether the backend can write `format`. An empty list places no limit.
    pub fn supports_format(&self, format: OutputFormat) -> bool {
        self.formats.is_empty() || self.formats.iter().any(|f| f == format.extension())
    }
}

/// Output container
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp4,
    Webm,
    Avi,
    Mov,
    Mkv,
    Wav,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Avi => "avi",
            OutputFormat::Mov => "mov",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
            OutputFormat::Avi => "video/x-msvideo",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Mkv => "video/x-matroska",
            OutputFormat::Wav => "audio/wav",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "mp4" => Some(OutputFormat::Mp4),
            "webm" => Some(OutputFormat::Webm),
            "avi" => Some(OutputFormat::Avi),
            "mov" => Some(OutputFormat::Mov),
            "mkv" => Some(OutputFormat::Mkv),
            "wav" => Some(OutputFormat::Wav),
            _ => None,
        }
    }
}

/// Encoding quality preset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    High,
    #[default]
    Medium,
    Low,
}

impl Quality {
    /// x264 constant rate factor; higher quality means a lower value
    pub fn crf(&self) -> u8 {
        match self {
            Quality::High => 18,
            Quality::Medium => 23,
            Quality::Low => 28,
        }
    }
}

/// Options for one processing run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingOptions {
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default = "default_preserve_audio")]
    pub preserve_audio: bool,
}

fn default_preserve_audio() -> bool {
    true
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            quality: Quality::default(),
            preserve_audio: true,
        }
    }
}

/// Coarse pipeline stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStage {
    Initializing,
    Analyzing,
    Processing,
    Complete,
    Error,
}

/// Progress event delivered to a `ProgressSink`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingProgress {
    pub stage: ProcessingStage,
    /// 0-100
    pub progress: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub engine: String,
}

impl ProcessingProgress {
    pub fn new(stage: ProcessingStage, progress: f64, message: impl Into<String>, engine: impl Into<String>) -> Self {
        Self {
            stage,
            progress: if progress.is_finite() { progress.clamp(0.0, 100.0) } else { 0.0 },
            message: message.into(),
            error: None,
            engine: engine.into(),
        }
    }
}

/// Callback for progress events
pub type ProgressSink = Arc<dyn Fn(ProcessingProgress) + Send + Sync>;

/// Progress helper carried by backends between `initialize` and `cleanup`
#[derive(Clone, Default)]
pub struct ProgressReporter {
    sink: Option<ProgressSink>,
    engine: String,
}

impl ProgressReporter {
    pub fn new(sink: Option<ProgressSink>, engine: impl Into<String>) -> Self {
        Self {
            sink,
            engine: engine.into(),
        }
    }

    pub fn report(&self, stage: ProcessingStage, progress: f64, message: impl Into<String>) {
        if let Some(sink) = &self.sink {
            sink(ProcessingProgress::new(stage, progress, message, self.engine.clone()));
        }
    }

    /// Terminal error stage carrying the failure message
    pub fn fail(&self, err: &ReconstructionError) {
        if let Some(sink) = &self.sink {
            let mut event = ProcessingProgress::new(
                ProcessingStage::Error,
                0.0,
                "Processing failed",
                self.engine.clone(),
            );
            event.error = Some(err.to_string());
            sink(event);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("engine", &self.engine)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

/// Snapshot of the processor's active engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineInfo {
    pub name: String,
    pub engine_type: EngineType,
    pub version: Option<String>,
    pub state: EngineState,
}

/// The main trait that all reconstruction backends must implement
#[async_trait]
pub trait ReconstructionEngine: Send + Sync {
    /// Human readable backend name
    fn name(&self) -> &'static str;

    fn engine_type(&self) -> EngineType;

    fn version(&self) -> Option<String> {
        None
    }

    fn state(&self) -> EngineState;

    /// Pure probe of the environment; no side effects, safe to call repeatedly
    async fn check_capabilities(&self) -> EngineCapabilities;

    /// Bind the engine to a source. Re-initializing releases the prior binding first.
    async fn initialize(
        &mut self,
        source: &MediaSource,
        progress: Option<ProgressSink>,
    ) -> Result<(), ReconstructionError>;

    /// Produce the edited media. Only valid from `Ready`.
    async fn process(
        &mut self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError>;

    /// Release everything and return to `Uninitialized`. Idempotent.
    async fn cleanup(&mut self);

    /// Backend specific tuning, never required for baseline operation
    fn configure(&mut self, _config: &serde_json::Value) -> Result<(), ReconstructionError> {
        Ok(())
    }
}

/// Validates the state precondition shared by every backend's `process`
pub fn ensure_ready(state: EngineState) -> Result<(), ReconstructionError> {
    match state {
        EngineState::Ready => Ok(()),
        EngineState::Uninitialized => Err(ReconstructionError::NotInitialized),
        other => Err(ReconstructionError::NotReady(other)),
    }
}

/// Kept segments of a run, or `NothingToKeep`
pub fn kept_only(segments: &[VideoSegment]) -> Result<Vec<VideoSegment>, ReconstructionError> {
    let mut kept: Vec<VideoSegment> = segments
        .iter()
        .filter(|s| s.keep && s.end > s.start)
        .copied()
        .collect();
    if kept.is_empty() {
        return Err(ReconstructionError::NothingToKeep);
    }
    kept.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_supports_format() {
        let wav_only = EngineCapabilities {
            supported: true,
            formats: vec!["wav".to_string()],
            ..Default::default()
        };
        assert!(wav_only.supports_format(OutputFormat::Wav));
        assert!(!wav_only.supports_format(OutputFormat::Mp4));

        let unrestricted = EngineCapabilities {
            supported: true,
            ..Default::default()
        };
        assert!(unrestricted.supports_format(OutputFormat::Mkv));
    }

    #[test]
    fn test_quality_crf_ordering() {
        assert_eq!(Quality::High.crf(), 18);
        assert_eq!(Quality::Medium.crf(), 23);
        assert_eq!(Quality::Low.crf(), 28);
    }

    #[test]
    fn test_output_format_mapping() {
        assert_eq!(OutputFormat::Webm.mime_type(), "video/webm");
        assert_eq!(OutputFormat::Mov.extension(), "mov");
        assert_eq!(OutputFormat::from_extension("MKV"), Some(OutputFormat::Mkv));
        assert_eq!(OutputFormat::from_extension("flv"), None);
    }

    #[test]
    fn test_progress_is_clamped() {
        assert_eq!(ProcessingProgress::new(ProcessingStage::Processing, 140.0, "", "x").progress, 100.0);
        assert_eq!(ProcessingProgress::new(ProcessingStage::Processing, -3.0, "", "x").progress, 0.0);
        assert_eq!(ProcessingProgress::new(ProcessingStage::Processing, f64::NAN, "", "x").progress, 0.0);
    }

    #[test]
    fn test_reporter_fail_carries_message() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();
        let sink: ProgressSink = Arc::new(move |p: ProcessingProgress| captured.lock().unwrap().push(p));

        ProgressReporter::new(Some(sink), "split").fail(&ReconstructionError::NothingToKeep);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].stage, ProcessingStage::Error);
        assert_eq!(events[0].engine, "split");
        assert!(events[0].error.as_deref().unwrap_or_default().contains("Nothing to keep"));
    }

    #[test]
    fn test_ensure_ready() {
        assert!(ensure_ready(EngineState::Ready).is_ok());
        assert_eq!(ensure_ready(EngineState::Uninitialized), Err(ReconstructionError::NotInitialized));
        assert_eq!(
            ensure_ready(EngineState::Failed),
            Err(ReconstructionError::NotReady(EngineState::Failed))
        );
    }

    #[test]
    fn test_kept_only() {
        let segments = vec![
            VideoSegment::new(4.0, 6.0, true),
            VideoSegment::new(2.0, 4.0, false),
            VideoSegment::new(0.0, 2.0, true),
        ];
        let kept = kept_only(&segments).unwrap();
        assert_eq!(kept[0].start, 0.0);
        assert_eq!(kept.len(), 2);

        assert_eq!(
            kept_only(&[VideoSegment::new(0.0, 1.0, false)]),
            Err(ReconstructionError::NothingToKeep)
        );
    }

    #[test]
    fn test_no_engine_available_names_every_attempt() {
        let err = ReconstructionError::NoEngineAvailable(vec![
            EngineAttempt { engine: EngineType::Split, reason: "no decoder".into() },
            EngineAttempt { engine: EngineType::CommandGraph, reason: "ffmpeg missing".into() },
        ]);
        let message = err.to_string();
        assert!(message.contains("split (no decoder)"));
        assert!(message.contains("command_graph (ffmpeg missing)"));
    }
}
