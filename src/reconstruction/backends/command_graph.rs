//! Command-graph reconstruction
//!
//! Describes the edit as an ffmpeg trim/concat filter graph and runs it as a
//! child process in a private work directory.

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::reconstruction::engine::{
    ensure_ready, kept_only, EngineCapabilities, EngineFeatures, EngineState, EngineType,
    OutputFormat, ProcessingOptions, ProcessingStage, ProgressReporter, ProgressSink,
    ReconstructionEngine, ReconstructionError,
};
use crate::reconstruction::ffmpeg::{self, find_ffmpeg_path, parse_progress_seconds};
use crate::reconstruction::media::MediaSource;
use crate::timeline::segments::VideoSegment;

/// Lines of ffmpeg stderr kept for error messages
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandGraphConfig {
    /// Explicit ffmpeg binary, searched for when unset
    pub ffmpeg_path: Option<PathBuf>,
    /// Parent of the per-source work directory, system temp when unset
    pub work_root: Option<PathBuf>,
    /// Extra encoder arguments placed before the output path
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Build the ffmpeg argument list for the kept segments.
///
/// One segment is a plain output-side trim. Several segments become a
/// `filter_complex` that trims each stream independently and concatenates
/// them in order. Audio is left out of the graph entirely unless preserved.
pub fn build_command_args(
    input: &str,
    output: &str,
    kept: &[VideoSegment],
    options: &ProcessingOptions,
    has_video: bool,
) -> Result<Vec<String>, ReconstructionError> {
    let video = has_video && options.format != OutputFormat::Wav;
    if !video && !options.preserve_audio {
        return Err(ReconstructionError::InvalidOptions(
            "Output would contain neither video nor audio".to_string(),
        ));
    }
    if kept.is_empty() {
        return Err(ReconstructionError::NothingToKeep);
    }

    let mut args: Vec<String> = vec!["-y".into(), "-i".into(), input.into()];

    if let [segment] = kept {
        args.push("-ss".into());
        args.push(secs(segment.start));
        args.push("-t".into());
        args.push(secs(segment.duration()));
    } else {
        let mut chains = Vec::new();
        for (i, segment) in kept.iter().enumerate() {
            if video {
                chains.push(format!(
                    "[0:v]trim=start={}:end={},setpts=PTS-STARTPTS[v{}]",
                    secs(segment.start),
                    secs(segment.end),
                    i
                ));
            }
            if options.preserve_audio {
                chains.push(format!(
                    "[0:a]atrim=start={}:end={},asetpts=PTS-STARTPTS[a{}]",
                    secs(segment.start),
                    secs(segment.end),
                    i
                ));
            }
        }

        let n = kept.len();
        if video {
            let inputs: String = (0..n).map(|i| format!("[v{}]", i)).collect();
            chains.push(format!("{}concat=n={}:v=1:a=0[outv]", inputs, n));
        }
        if options.preserve_audio {
            let inputs: String = (0..n).map(|i| format!("[a{}]", i)).collect();
            chains.push(format!("{}concat=n={}:v=0:a=1[outa]", inputs, n));
        }

        args.push("-filter_complex".into());
        args.push(chains.join(";"));
        if video {
            args.push("-map".into());
            args.push("[outv]".into());
        }
        if options.preserve_audio {
            args.push("-map".into());
            args.push("[outa]".into());
        }
    }

    if video {
        let codec = match options.format {
            OutputFormat::Webm => "libvpx-vp9",
            _ => "libx264",
        };
        args.extend(["-c:v".into(), codec.into()]);
        args.extend(["-crf".into(), options.quality.crf().to_string()]);
    } else {
        args.push("-vn".into());
    }

    if options.preserve_audio {
        let codec = match options.format {
            OutputFormat::Wav => "pcm_s16le",
            OutputFormat::Webm => "libopus",
            _ => "aac",
        };
        args.extend(["-c:a".into(), codec.into()]);
    } else {
        args.push("-an".into());
    }

    args.push(output.into());
    Ok(args)
}

pub struct CommandGraphEngine {
    config: CommandGraphConfig,
    state: EngineState,
    ffmpeg: Option<PathBuf>,
    source: Option<MediaSource>,
    has_video: bool,
    work_dir: Option<TempDir>,
    staged_input: Option<PathBuf>,
    reporter: ProgressReporter,
}

impl CommandGraphEngine {
    pub fn new(config: CommandGraphConfig) -> Self {
        Self {
            config,
            state: EngineState::Uninitialized,
            ffmpeg: None,
            source: None,
            has_video: false,
            work_dir: None,
            staged_input: None,
            reporter: ProgressReporter::default(),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(CommandGraphConfig::default())
    }

    pub fn config(&self) -> &CommandGraphConfig {
        &self.config
    }

    /// Private directory holding the staged source while initialized
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(|dir| dir.path())
    }

    fn resolve_ffmpeg(&self) -> Option<PathBuf> {
        find_ffmpeg_path(self.config.ffmpeg_path.as_deref())
    }

    /// Copy (or hard link) the source into the work directory
    async fn stage_source(&mut self, source: &MediaSource) -> Result<(), ReconstructionError> {
        let work_dir = match &self.config.work_root {
            Some(root) => {
                tokio::fs::create_dir_all(root).await?;
                tempfile::Builder::new()
                    .prefix("transcript-cut-")
                    .tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("transcript-cut-").tempdir()?,
        };

        let ext = source.extension().unwrap_or_else(|| "bin".to_string());
        let staged = work_dir.path().join(format!("input.{}", ext));

        if tokio::fs::hard_link(&source.path, &staged).await.is_err() {
            tokio::fs::copy(&source.path, &staged).await.map_err(|e| {
                ReconstructionError::InitializationFailed(format!(
                    "Failed to stage {}: {}",
                    source.path.display(),
                    e
                ))
            })?;
        }

        debug!("Staged {} into {}", source.name, work_dir.path().display());
        self.staged_input = Some(staged);
        self.work_dir = Some(work_dir);
        Ok(())
    }

    async fn bind(&mut self, source: &MediaSource) -> Result<(), ReconstructionError> {
        let ffmpeg_path = self.resolve_ffmpeg().ok_or_else(|| {
            ReconstructionError::ToolchainNotFound("ffmpeg executable not found".to_string())
        })?;

        self.has_video = if source.has_video() {
            true
        } else {
            let info = ffmpeg::probe(&ffmpeg_path, &source.path)
                .await
                .map_err(|e| ReconstructionError::InitializationFailed(e.to_string()))?;
            info.width.is_some()
        };

        self.stage_source(source).await?;
        self.ffmpeg = Some(ffmpeg_path);
        self.source = Some(source.clone());
        Ok(())
    }

    async fn run(
        &self,
        kept: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError> {
        let ffmpeg_path = self.ffmpeg.as_ref().ok_or(ReconstructionError::NotInitialized)?;
        let input = self.staged_input.as_ref().ok_or(ReconstructionError::NotInitialized)?;
        let work_dir = self.work_dir.as_ref().ok_or(ReconstructionError::NotInitialized)?;
        let output = work_dir
            .path()
            .join(format!("output.{}", options.format.extension()));

        self.reporter.report(ProcessingStage::Analyzing, 10.0, "Building filter graph");
        let mut args = build_command_args(
            &input.to_string_lossy(),
            &output.to_string_lossy(),
            kept,
            options,
            self.has_video,
        )?;
        // Extra encoder args go right before the output path
        if let Some(output_arg) = args.pop() {
            args.extend(self.config.extra_args.iter().cloned());
            args.push(output_arg);
        }

        let total: f64 = kept.iter().map(|s| s.duration()).sum();
        info!(
            "Running ffmpeg over {} kept segments ({:.2}s of output)",
            kept.len(),
            total
        );
        debug!("FFmpeg args: {:?}", args);

        let result = self.encode(ffmpeg_path, &args, &output, total).await;

        // Partial output from a failed run goes too
        match tokio::fs::remove_file(&output).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", output.display(), e),
        }

        result
    }

    /// Run ffmpeg to completion and read back `output`
    async fn encode(
        &self,
        ffmpeg_path: &Path,
        args: &[String],
        output: &Path,
        total: f64,
    ) -> Result<Bytes, ReconstructionError> {
        let mut cmd = Command::new(ffmpeg_path);

        #[cfg(target_os = "windows")]
        cmd.creation_flags(ffmpeg::CREATE_NO_WINDOW);

        cmd.arg("-hide_banner")
            .arg("-nostats")
            .arg("-progress")
            .arg("pipe:1")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ReconstructionError::ProcessingFailed(format!("Failed to spawn ffmpeg: {}", e))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ReconstructionError::ProcessingFailed("Failed to capture ffmpeg stdout".to_string())
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            ReconstructionError::ProcessingFailed("Failed to capture ffmpeg stderr".to_string())
        })?;

        // Drain stderr alongside progress so neither pipe fills up
        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        self.reporter.report(ProcessingStage::Processing, 20.0, "Encoding");
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(done) = parse_progress_seconds(&line) {
                if total > 0.0 {
                    let fraction = (done / total).clamp(0.0, 1.0);
                    perf_trace!("ffmpeg progress {:.2}s / {:.2}s", done, total);
                    self.reporter.report(
                        ProcessingStage::Processing,
                        20.0 + 70.0 * fraction,
                        format!("Encoded {:.1}s of {:.1}s", done, total),
                    );
                }
            }
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let tail: Vec<&str> = stderr_text.lines().rev().take(STDERR_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            error!("FFmpeg exited with {}: {}", status, tail.join("\n"));
            return Err(ReconstructionError::ProcessingFailed(format!(
                "ffmpeg exited with {}: {}",
                status,
                tail.last().copied().unwrap_or("no output")
            )));
        }

        self.reporter.report(ProcessingStage::Processing, 95.0, "Reading output");
        let bytes = tokio::fs::read(output).await?;
        Ok(Bytes::from(bytes))
    }
}

impl Default for CommandGraphEngine {
    fn default() -> Self {
        Self::with_default_config()
    }
}

#[async_trait]
impl ReconstructionEngine for CommandGraphEngine {
    fn name(&self) -> &'static str {
        "command graph (ffmpeg)"
    }

    fn engine_type(&self) -> EngineType {
        EngineType::CommandGraph
    }

    fn state(&self) -> EngineState {
        self.state
    }

    async fn check_capabilities(&self) -> EngineCapabilities {
        if self.resolve_ffmpeg().is_none() {
            return EngineCapabilities::unsupported(
                "ffmpeg executable not found (set ffmpeg_path or install ffmpeg)",
            );
        }

        EngineCapabilities {
            supported: true,
            reason: None,
            formats: [
                OutputFormat::Mp4,
                OutputFormat::Webm,
                OutputFormat::Avi,
                OutputFormat::Mov,
                OutputFormat::Mkv,
                OutputFormat::Wav,
            ]
            .iter()
            .map(|f| f.extension().to_string())
            .collect(),
            max_size: None,
            features: EngineFeatures {
                trim: true,
                concat: true,
                audio_processing: true,
                subtitle_burn: false,
                quality_control: true,
            },
        }
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
            .report(ProcessingStage::Initializing, 0.0, format!("Preparing {}", source.name));

        match self.bind(source).await {
            Ok(()) => {
                info!("Command graph engine ready for {}", source.name);
                self.state = EngineState::Ready;
                self.reporter
                    .report(ProcessingStage::Initializing, 100.0, "Engine ready");
                Ok(())
            }
            Err(e) => {
                warn!("Command graph engine failed to initialize: {}", e);
                self.reporter.fail(&e);
                // Drop whatever was staged before the failure
                self.work_dir = None;
                self.staged_input = None;
                self.state = EngineState::Failed;
                Err(match e {
                    ReconstructionError::InitializationFailed(_) => e,
                    other => ReconstructionError::InitializationFailed(other.to_string()),
                })
            }
        }
    }

    async fn process(
        &mut self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError> {
        ensure_ready(self.state)?;
        let kept = kept_only(segments)?;

        self.state = EngineState::Processing;
        let result = self.run(&kept, options).await;

        match &result {
            Ok(bytes) => {
                self.state = EngineState::Ready;
                self.reporter.report(
                    ProcessingStage::Complete,
                    100.0,
                    format!("Done, {} bytes", bytes.len()),
                );
            }
            Err(ReconstructionError::InvalidOptions(_)) => {
                self.state = EngineState::Ready;
            }
            Err(e) => {
                error!("Command graph processing failed: {}", e);
                self.state = EngineState::Failed;
                self.reporter.fail(e);
            }
        }

        result
    }

    async fn cleanup(&mut self) {
        if let Some(work_dir) = self.work_dir.take() {
            let path = work_dir.path().to_path_buf();
            if let Err(e) = work_dir.close() {
                warn!("Failed to remove work directory {}: {}", path.display(), e);
            }
        }
        self.staged_input = None;
        self.source = None;
        self.ffmpeg = None;
        self.has_video = false;
        self.reporter = ProgressReporter::default();
        self.state = EngineState::Uninitialized;
    }

    fn configure(&mut self, config: &serde_json::Value) -> Result<(), ReconstructionError> {
        if let Some(path) = config.get("ffmpeg_path") {
            let path = path.as_str().ok_or_else(|| {
                ReconstructionError::InvalidOptions("ffmpeg_path must be a string".to_string())
            })?;
            self.config.ffmpeg_path = Some(PathBuf::from(path));
        }
        if let Some(extra) = config.get("extra_args") {
            self.config.extra_args = serde_json::from_value(extra.clone()).map_err(|e| {
                ReconstructionError::InvalidOptions(format!("extra_args: {}", e))
            })?;
        }
        Ok(())
    }
}
