//! Split-based reconstruction
//!
//! Cuts deleted ranges out of a single working clip by repeated splitting and
//! lays the surviving pieces end to end. The media library is abstracted by
//! `ClipToolkit`, so the same walk drives any in-process decoder.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::reconstruction::engine::{
    ensure_ready, kept_only, EngineCapabilities, EngineState, EngineType, ProcessingOptions,
    ProcessingStage, ProgressReporter, ProgressSink, ReconstructionEngine, ReconstructionError,
};
use crate::reconstruction::media::MediaSource;
use crate::timeline::ranges::{merge_ranges, TimeRange};
use crate::timeline::segments::VideoSegment;

/// Leftover pieces at or below this length are treated as rounding noise
pub const DEFAULT_MIN_CLIP_DURATION: f64 = 0.01;

/// A splittable handle onto decoded media
pub trait MediaClip: Clone + Send + Sync + 'static {
    /// Seconds
    fn duration(&self) -> f64;

    /// Where the clip begins on the source timeline, after any rounding the
    /// toolkit applied when it was split off
    fn start(&self) -> f64;

    /// Split `at` seconds from the clip start into (front, back)
    fn split(&self, at: f64) -> Result<(Self, Self)>;
}

/// A clip positioned on the output timeline
#[derive(Debug, Clone)]
pub struct PlacedClip<C> {
    pub clip: C,
    pub offset: f64,
}

/// Media library behind `SplitEngine`. Calls run on the blocking pool.
pub trait ClipToolkit: Send + Sync + 'static {
    type Clip: MediaClip;

    fn name(&self) -> &'static str;

    fn capabilities(&self) -> EngineCapabilities;

    fn open(&self, source: &MediaSource) -> Result<Self::Clip>;

    /// Reject options this toolkit cannot produce before any work starts
    fn check_options(&self, _options: &ProcessingOptions) -> Result<(), ReconstructionError> {
        Ok(())
    }

    fn compose(&self, placed: Vec<PlacedClip<Self::Clip>>, options: &ProcessingOptions) -> Result<Vec<u8>>;

    /// Source bytes unchanged
    fn passthrough(&self, source: &MediaSource) -> Result<Vec<u8>> {
        Ok(std::fs::read(&source.path)?)
    }
}

/// Walk merged deletions over one working clip and return the kept pieces.
///
/// Split offsets are measured from the working clip's actual start, so
/// toolkits that snap splits to frames do not drift across many deletions.
/// Pieces not longer than `min_duration` are dropped.
pub fn cut_clips<C: MediaClip>(
    clip: C,
    deletions: &[TimeRange],
    min_duration: f64,
    reporter: &ProgressReporter,
) -> Result<Vec<C>> {
    let mut output = Vec::new();
    let mut working = Some(clip);
    let total = deletions.len().max(1) as f64;

    for (i, deletion) in deletions.iter().enumerate() {
        let Some(mut current) = working.take() else {
            break;
        };

        let keep_len = deletion.start - current.start();
        if keep_len > 0.0 {
            if keep_len >= current.duration() {
                // Deletion starts past the end of the media
                if current.duration() > min_duration {
                    output.push(current);
                }
                break;
            }

            let (front, back) = current.split(keep_len)?;
            if front.duration() > min_duration {
                output.push(front);
            } else {
                perf_trace!("Dropping {:.4}s piece before deletion at {:.3}s", front.duration(), deletion.start);
            }
            current = back;
        }

        let skip_len = deletion.end - current.start();
        if current.duration() <= skip_len {
            // Deletion runs past the available media
            perf_debug!("Deletion [{:.3}, {:.3}] consumes the rest of the clip", deletion.start, deletion.end);
            break;
        }

        working = Some(if skip_len > 0.0 {
            current.split(skip_len)?.1
        } else {
            current
        });

        reporter.report(
            ProcessingStage::Processing,
            10.0 + 70.0 * (i + 1) as f64 / total,
            format!("Removed segment {} of {}", i + 1, deletions.len()),
        );
    }

    if let Some(rest) = working {
        if rest.duration() > min_duration {
            output.push(rest);
        }
    }

    Ok(output)
}

/// Lay clips end to end with no gaps
pub fn place_clips<C: MediaClip>(clips: Vec<C>) -> Vec<PlacedClip<C>> {
    let mut offset = 0.0;
    clips
        .into_iter()
        .map(|clip| {
            let placed = PlacedClip { offset, clip };
            offset += placed.clip.duration();
            placed
        })
        .collect()
}

pub struct SplitEngine<T: ClipToolkit> {
    toolkit: Arc<T>,
    state: EngineState,
    source: Option<MediaSource>,
    clip: Option<T::Clip>,
    reporter: ProgressReporter,
    min_clip_duration: f64,
}

impl<T: ClipToolkit> SplitEngine<T> {
    pub fn new(toolkit: T) -> Self {
        Self {
            toolkit: Arc::new(toolkit),
            state: EngineState::Uninitialized,
            source: None,
            clip: None,
            reporter: ProgressReporter::default(),
            min_clip_duration: DEFAULT_MIN_CLIP_DURATION,
        }
    }

    pub fn with_min_clip_duration(mut self, min_clip_duration: f64) -> Self {
        self.min_clip_duration = min_clip_duration;
        self
    }

    pub fn min_clip_duration(&self) -> f64 {
        self.min_clip_duration
    }

    async fn run(
        &self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError> {
        let source = self.source.clone().ok_or(ReconstructionError::NotInitialized)?;
        let clip = self.clip.clone().ok_or(ReconstructionError::NotInitialized)?;
        let toolkit = self.toolkit.clone();

        self.reporter
            .report(ProcessingStage::Analyzing, 5.0, "Analyzing segments");
        let deletions = merge_ranges(segments.iter().filter(|s| !s.keep).map(|s| s.range()));

        if deletions.is_empty() {
            info!("No deletions, returning source media unchanged");
            let bytes = tokio::task::spawn_blocking(move || toolkit.passthrough(&source))
                .await
                .map_err(|e| ReconstructionError::ProcessingFailed(format!("Task failed: {}", e)))?
                .map_err(|e| ReconstructionError::ProcessingFailed(e.to_string()))?;
            return Ok(Bytes::from(bytes));
        }

        debug!(
            "Cutting {} merged deletions out of {:.2}s of media",
            deletions.len(),
            clip.duration()
        );

        let min_duration = self.min_clip_duration;
        let reporter = self.reporter.clone();
        let options = options.clone();

        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let pieces = cut_clips(clip, &deletions, min_duration, &reporter)?;
            if pieces.is_empty() {
                return Err(anyhow::anyhow!("No media left after removing deleted segments"));
            }

            let placed = place_clips(pieces);
            reporter.report(
                ProcessingStage::Processing,
                85.0,
                format!("Composing {} clips", placed.len()),
            );
            toolkit.compose(placed, &options)
        })
        .await
        .map_err(|e| ReconstructionError::ProcessingFailed(format!("Task failed: {}", e)))?
        .map_err(|e| ReconstructionError::ProcessingFailed(e.to_string()))?;

        Ok(Bytes::from(bytes))
    }
}

#[async_trait]
impl<T: ClipToolkit> ReconstructionEngine for SplitEngine<T> {
    fn name(&self) -> &'static str {
        self.toolkit.name()
    }

    fn engine_type(&self) -> EngineType {
        EngineType::Split
    }

    fn version(&self) -> Option<String> {
        Some(env!("CARGO_PKG_VERSION").to_string())
    }

    fn state(&self) -> EngineState {
        self.state
    }

    async fn check_capabilities(&self) -> EngineCapabilities {
        self.toolkit.capabilities()
    }

    async fn initialize(
        &mut self,
        source: &MediaSource,
        progress: Option<ProgressSink>,
    ) -> Result<(), ReconstructionError> {
        if self.state != EngineState::Uninitialized {
            self.cleanup().await;
        }

        self.state = EngineState::Initializing;
        self.reporter = ProgressReporter::new(progress, self.name());
        self.reporter
            .report(ProcessingStage::Initializing, 0.0, format!("Opening {}", source.name));

        let toolkit = self.toolkit.clone();
        let owned = source.clone();
        let opened = tokio::task::spawn_blocking(move || toolkit.open(&owned))
            .await
            .map_err(|e| anyhow::anyhow!("Task failed: {}", e))
            .and_then(|result| result);

        match opened {
            Ok(clip) => {
                info!(
                    "{} engine ready: {} ({:.2}s)",
                    self.name(),
                    source.name,
                    clip.duration()
                );
                self.clip = Some(clip);
                self.source = Some(source.clone());
                self.state = EngineState::Ready;
                self.reporter
                    .report(ProcessingStage::Initializing, 100.0, "Engine ready");
                Ok(())
            }
            Err(e) => {
                let err = ReconstructionError::InitializationFailed(e.to_string());
                warn!("{} engine failed to open {}: {}", self.name(), source.name, e);
                self.state = EngineState::Failed;
                self.reporter.fail(&err);
                Err(err)
            }
        }
    }

    async fn process(
        &mut self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError> {
        ensure_ready(self.state)?;
        kept_only(segments)?;
        self.toolkit.check_options(options)?;

        self.state = EngineState::Processing;
        let result = self.run(segments, options).await;

        match &result {
            Ok(bytes) => {
                self.state = EngineState::Ready;
                self.reporter.report(
                    ProcessingStage::Complete,
                    100.0,
                    format!("Done, {} bytes", bytes.len()),
                );
            }
            Err(e) => {
                error!("{} processing failed: {}", self.name(), e);
                self.state = EngineState::Failed;
                self.reporter.fail(e);
            }
        }

        result
    }

    async fn cleanup(&mut self) {
        if self.state != EngineState::Uninitialized {
            debug!("Cleaning up {} engine", self.name());
        }
        self.clip = None;
        self.source = None;
        self.reporter = ProgressReporter::default();
        self.state = EngineState::Uninitialized;
    }

    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ReconstructionError> {
        if let Some(value) = config.get("min_clip_duration") {
            let min = value
                .as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(|| {
                    ReconstructionError::InvalidOptions(format!(
                        "min_clip_duration must be a non-negative number, got {}",
                        value
                    ))
                })?;
            self.min_clip_duration = min;
        }
        Ok(())
    }
}
