// Shared editor state for hosts that drive the store and processor from
// several tasks

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::EditorConfig;
use crate::reconstruction::engine::{EngineType, ProcessingOptions, ReconstructionError};
use crate::reconstruction::media::MediaSource;
use crate::reconstruction::processor::VideoProcessor;
use crate::transcript::history::HistoryStore;
use crate::transcript::types::TranscriptionResult;

pub struct EditorState {
    config: EditorConfig,
    /// Fragment list and undo history
    pub history: Arc<RwLock<HistoryStore>>,
    /// Reconstruction engine for the current source
    pub processor: Arc<RwLock<VideoProcessor>>,
    /// Media the processor is bound to
    source: Arc<RwLock<Option<MediaSource>>>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::with_config(EditorConfig::default())
    }

    pub fn with_config(config: EditorConfig) -> Self {
        let history = HistoryStore::with_merge_threshold(config.merge_threshold());
        let processor = VideoProcessor::with_config(&config);

        Self {
            config,
            history: Arc::new(RwLock::new(history)),
            processor: Arc::new(RwLock::new(processor)),
            source: Arc::new(RwLock::new(None)),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Replace the transcript, dropping all history
    pub async fn load_transcript(&self, result: TranscriptionResult) {
        self.history.write().await.load(result);
    }

    /// Bind the processor to a new source, trying `preferred` first
    pub async fn open_media(
        &self,
        source: MediaSource,
        preferred: Option<EngineType>,
    ) -> Result<(), ReconstructionError> {
        let fallback = self.config.engine_order.clone();
        let mut processor = self.processor.write().await;
        let result = processor.initialize(&source, preferred, &fallback).await;

        *self.source.write().await = result.as_ref().ok().map(|_| source);
        result
    }

    pub async fn source(&self) -> Option<MediaSource> {
        self.source.read().await.clone()
    }

    /// Reconstruct the media from the current edits
    pub async fn render(
        &self,
        options: Option<ProcessingOptions>,
        token: CancellationToken,
    ) -> Result<Bytes, ReconstructionError> {
        let segments = self.history.read().await.video_segments();
        let options = options.unwrap_or_else(|| self.config.default_options.clone());

        let mut processor = self.processor.write().await;
        let result = processor.process_with_cancel(&segments, &options, token).await;
        if matches!(result, Err(ReconstructionError::Cancelled)) {
            *self.source.write().await = None;
        }
        result
    }

    pub async fn close_media(&self) {
        self.processor.write().await.cleanup().await;
        *self.source.write().await = None;
    }
}

impl Default for EditorState {
    fn default() -> Self {
        Self::new()
    }
}
