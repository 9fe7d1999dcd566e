pub mod playback;
pub mod ranges;
pub mod segments;

pub use playback::{compressed_duration, compressed_position, preview_action, seek_target, PreviewAction};
pub use ranges::{format_time, format_time_with_ms, merge_ranges, overlap, parse_time, TimeRange};
pub use segments::{
    deleted_segments, editing_stats, format_time_saved, is_time_in_kept_segments, kept_segments,
    map_to_new_time, map_to_original_time, to_video_segments, EditingStats, TimeSegment,
    VideoSegment,
};
