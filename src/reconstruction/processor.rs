//! Video processor - owns the active reconstruction engine for one source
//!
//! Wraps selection, engine switching and cancellable processing around the
//! registry and the engine trait.

use bytes::Bytes;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use super::engine::{
    EngineCapabilities, EngineInfo, EngineType, OutputFormat, ProcessingOptions, ProgressSink,
    ReconstructionEngine, ReconstructionError,
};
use super::media::MediaSource;
use super::registry::EngineRegistry;
use crate::config::EditorConfig;
use crate::timeline::segments::VideoSegment;

pub struct VideoProcessor {
    registry: EngineRegistry,
    engine: Option<Box<dyn ReconstructionEngine>>,
    /// Source and priority order the current engine was selected with
    source: Option<MediaSource>,
    order: Vec<EngineType>,
    default_order: Vec<EngineType>,
    progress: Option<ProgressSink>,
}

impl VideoProcessor {
    pub fn new(registry: EngineRegistry) -> Self {
        Self {
            registry,
            engine: None,
            source: None,
            order: Vec::new(),
            default_order: vec![EngineType::Split, EngineType::CommandGraph],
            progress: None,
        }
    }

    pub fn with_config(config: &EditorConfig) -> Self {
        let mut processor = Self::new(EngineRegistry::with_config(config));
        processor.default_order = config.engine_order.clone();
        processor
    }

    /// Sink handed to every engine this processor initializes
    pub fn set_progress_sink(&mut self, sink: Option<ProgressSink>) {
        self.progress = sink;
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EngineRegistry {
        &mut self.registry
    }

    /// Select an engine for `source`, trying `preferred` then `fallback`.
    /// With neither given, the configured order is used.
    pub async fn initialize(
        &mut self,
        source: &MediaSource,
        preferred: Option<EngineType>,
        fallback: &[EngineType],
    ) -> Result<(), ReconstructionError> {
        self.cleanup().await;

        let mut order: Vec<EngineType> = Vec::new();
        if let Some(preferred) = preferred {
            order.push(preferred);
        }
        for engine_type in fallback {
            if !order.contains(engine_type) {
                order.push(engine_type.clone());
            }
        }
        if order.is_empty() {
            order = self.default_order.clone();
        }

        let engine = self
            .registry
            .select(&order, source, self.progress.clone())
            .await?;
        info!("Video processor using {} for {}", engine.name(), source.name);
        self.engine = Some(engine);
        self.source = Some(source.clone());
        self.order = order;
        Ok(())
    }

    /// Replace the current engine with `engine_type`, with no fallback
    pub async fn switch_engine(
        &mut self,
        engine_type: EngineType,
        source: &MediaSource,
    ) -> Result<(), ReconstructionError> {
        info!("Switching reconstruction engine to {}", engine_type);
        self.initialize(source, Some(engine_type), &[]).await
    }

    pub async fn process(
        &mut self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
    ) -> Result<Bytes, ReconstructionError> {
        if !segments.iter().any(|s| s.keep && s.end > s.start) {
            return Err(ReconstructionError::NothingToKeep);
        }

        let engine = self.engine.as_ref().ok_or(ReconstructionError::NotInitialized)?;
        if !engine.check_capabilities().await.supports_format(options.format) {
            self.reselect_for_format(options.format).await?;
        }

        let engine = self.engine.as_mut().ok_or(ReconstructionError::NotInitialized)?;
        engine.process(segments, options).await
    }

    /// Move to the next backend in priority order that writes `format`.
    /// The current engine is kept if none does.
    async fn reselect_for_format(&mut self, format: OutputFormat) -> Result<(), ReconstructionError> {
        let source = self.source.clone().ok_or(ReconstructionError::NotInitialized)?;
        let current = self.engine.as_ref().map(|engine| engine.engine_type());

        let mut candidates: Vec<EngineType> = Vec::new();
        for engine_type in self.order.iter().chain(self.default_order.iter()) {
            if current.as_ref() != Some(engine_type) && !candidates.contains(engine_type) {
                candidates.push(engine_type.clone());
            }
        }

        info!(
            "Current engine cannot write {}, trying {:?}",
            format.extension(),
            candidates
        );
        let engine = self
            .registry
            .select_for_format(&candidates, &source, self.progress.clone(), Some(format))
            .await?;

        if let Some(mut previous) = self.engine.replace(engine) {
            previous.cleanup().await;
        }
        Ok(())
    }

    /// Like `process`, but abandons the run as soon as `token` is cancelled.
    ///
    /// The abandoned engine is cleaned up; child processes die with the run,
    /// blocking work may finish in the background and is discarded.
    pub async fn process_with_cancel(
        &mut self,
        segments: &[VideoSegment],
        options: &ProcessingOptions,
        token: CancellationToken,
    ) -> Result<Bytes, ReconstructionError> {
        if token.is_cancelled() {
            return Err(ReconstructionError::Cancelled);
        }

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            result = self.process(segments, options) => Some(result),
        };

        match outcome {
            Some(result) => result,
            None => {
                warn!("Processing cancelled, releasing engine");
                self.cleanup().await;
                Err(ReconstructionError::Cancelled)
            }
        }
    }

    /// Pass backend specific settings to the current engine
    pub fn configure_engine(&mut self, config: &serde_json::Value) -> Result<(), ReconstructionError> {
        let engine = self.engine.as_mut().ok_or(ReconstructionError::NotInitialized)?;
        engine.configure(config)
    }

    pub fn current_engine_info(&self) -> Option<EngineInfo> {
        self.engine.as_ref().map(|engine| EngineInfo {
            name: engine.name().to_string(),
            engine_type: engine.engine_type(),
            version: engine.version(),
            state: engine.state(),
        })
    }

    pub async fn check_all_engines(&self) -> Vec<(EngineType, EngineCapabilities)> {
        self.registry.check_all().await
    }

    pub async fn cleanup(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.cleanup().await;
        }
        self.source = None;
        self.order.clear();
    }
}

impl Default for VideoProcessor {
    fn default() -> Self {
        Self::new(EngineRegistry::new())
    }
}
