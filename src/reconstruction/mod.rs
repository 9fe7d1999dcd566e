//! Media reconstruction
//!
//! Rebuilds a recording from the kept segments of an edited transcript.
//! Backends:
//! - Split: in-process clip splitting (WAV via hound)
//! - Command graph: ffmpeg trim/concat filter graph in a child process

pub mod backends;
pub mod engine;
pub mod ffmpeg;
pub mod media;
pub mod processor;
pub mod registry;

pub use engine::{
    EngineAttempt, EngineCapabilities, EngineFeatures, EngineInfo, EngineState, EngineType,
    OutputFormat, ProcessingOptions, ProcessingProgress, ProcessingStage, ProgressReporter,
    ProgressSink, Quality, ReconstructionEngine, ReconstructionError,
};
pub use media::MediaSource;
pub use processor::VideoProcessor;
pub use registry::{EngineFactory, EngineRegistry};
