pub mod command_graph;
pub mod pcm;
pub mod split;

pub use command_graph::{build_command_args, CommandGraphConfig, CommandGraphEngine};
pub use pcm::{PcmClip, PcmSplitEngine, PcmToolkit};
pub use split::{ClipToolkit, MediaClip, PlacedClip, SplitEngine, DEFAULT_MIN_CLIP_DURATION};
