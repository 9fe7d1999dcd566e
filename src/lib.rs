// transcript-cut - edit a recording by editing its transcript
//
// - Fragment edit store with undo/redo (transcript)
// - Kept/deleted segment derivation and preview timing (timeline)
// - Media reconstruction through pluggable backends (reconstruction)

// Performance logging macros - exported for use by other modules
#[macro_use]
pub mod macros;

pub mod config;
pub mod reconstruction;
pub mod state;
pub mod timeline;
pub mod transcript;

pub use config::EditorConfig;
pub use reconstruction::{
    EngineRegistry, EngineType, MediaSource, OutputFormat, ProcessingOptions, Quality,
    ReconstructionEngine, ReconstructionError, VideoProcessor,
};
pub use state::EditorState;
pub use timeline::{TimeRange, TimeSegment, VideoSegment};
pub use transcript::{Fragment, FragmentPatch, HistoryStore, TranscriptionResult};

/// Initialize env_logger on stderr (reads RUST_LOG, defaults to info)
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
