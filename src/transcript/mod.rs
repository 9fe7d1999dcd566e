pub mod history;
pub mod types;

pub use history::{HistoryStore, DEFAULT_MERGE_THRESHOLD};
pub use types::{EditOperation, Fragment, FragmentPatch, RecognizedFragment, TranscriptionResult};
