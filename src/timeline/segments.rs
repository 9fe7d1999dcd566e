// Segment deriver - turns fragment deletion flags into kept/deleted time segments
// and maps times between the original and the compressed (edited) timeline

use serde::{Deserialize, Serialize};

use super::ranges::{merge_ranges, TimeRange};
use crate::transcript::types::Fragment;

/// A contiguous kept or deleted span.
///
/// `start`/`end` are positions on the compressed timeline (for deleted
/// segments they equal the original positions, since removed time has no
/// compressed position). `original_start`/`original_end` are positions in the
/// source recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSegment {
    pub start: f64,
    pub end: f64,
    pub original_start: f64,
    pub original_end: f64,
    pub duration: f64,
}

/// Reconstruction input on the original timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSegment {
    pub start: f64,
    pub end: f64,
    /// true = keep, false = delete
    pub keep: bool,
}

impl VideoSegment {
    pub fn new(start: f64, end: f64, keep: bool) -> Self {
        Self { start, end, keep }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Summary of an editing session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditingStats {
    pub original_duration: f64,
    pub current_duration: f64,
    pub total_deleted_time: f64,
    /// current / original, 0 when the original duration is unknown
    pub compression_ratio: f64,
    pub deleted_fragments: usize,
    pub kept_fragments: usize,
}

fn merged_ranges_where<F>(fragments: &[Fragment], predicate: F) -> Vec<TimeRange>
where
    F: Fn(&Fragment) -> bool,
{
    merge_ranges(
        fragments
            .iter()
            .filter(|fragment| predicate(fragment))
            .map(|fragment| fragment.time_range),
    )
}

/// Kept segments, laid end to end on the compressed timeline
pub fn kept_segments(fragments: &[Fragment]) -> Vec<TimeSegment> {
    let mut cursor = 0.0;

    merged_ranges_where(fragments, |f| !f.deleted)
        .into_iter()
        .map(|range| {
            let duration = range.duration();
            let segment = TimeSegment {
                start: cursor,
                end: cursor + duration,
                original_start: range.start,
                original_end: range.end,
                duration,
            };
            cursor += duration;
            segment
        })
        .collect()
}

/// Deleted segments, reported on the original timeline only
pub fn deleted_segments(fragments: &[Fragment]) -> Vec<TimeSegment> {
    merged_ranges_where(fragments, |f| f.deleted)
        .into_iter()
        .map(|range| TimeSegment {
            start: range.start,
            end: range.end,
            original_start: range.start,
            original_end: range.end,
            duration: range.duration(),
        })
        .collect()
}

/// Map a compressed-timeline time back onto the source timeline.
///
/// Out-of-range queries clamp: at or before zero to the first segment's
/// original start, past the end to the last segment's original end, and 0 when
/// there are no segments at all.
pub fn map_to_original_time(compressed_time: f64, kept: &[TimeSegment]) -> f64 {
    if let Some(segment) = kept
        .iter()
        .find(|s| compressed_time >= s.start && compressed_time <= s.end)
    {
        let offset = (compressed_time - segment.start).clamp(0.0, segment.duration.max(0.0));
        return segment.original_start + offset;
    }

    if compressed_time <= 0.0 {
        return kept.first().map(|s| s.original_start).unwrap_or(0.0);
    }

    kept.last().map(|s| s.original_end).unwrap_or(0.0)
}

/// Map a source time onto the compressed timeline.
///
/// `None` means the time falls inside a deleted gap; callers treat that as
/// "currently in a deleted region", not as an error.
pub fn map_to_new_time(original_time: f64, kept: &[TimeSegment]) -> Option<f64> {
    let segment = kept
        .iter()
        .find(|s| original_time >= s.original_start && original_time <= s.original_end)?;

    let offset = (original_time - segment.original_start).clamp(0.0, segment.duration.max(0.0));
    Some(segment.start + offset)
}

pub fn is_time_in_kept_segments(original_time: f64, kept: &[TimeSegment]) -> bool {
    kept.iter()
        .any(|s| original_time >= s.original_start && original_time <= s.original_end)
}

/// Flatten kept and deleted segments into the reconstruction contract,
/// ordered by original start
pub fn to_video_segments(kept: &[TimeSegment], deleted: &[TimeSegment]) -> Vec<VideoSegment> {
    let mut segments: Vec<VideoSegment> = kept
        .iter()
        .map(|s| VideoSegment::new(s.original_start, s.original_end, true))
        .chain(
            deleted
                .iter()
                .map(|s| VideoSegment::new(s.original_start, s.original_end, false)),
        )
        .collect();

    segments.sort_by(|a, b| a.start.total_cmp(&b.start));
    segments
}

pub fn editing_stats(fragments: &[Fragment], original_duration: f64) -> EditingStats {
    let current_duration: f64 = kept_segments(fragments).iter().map(|s| s.duration).sum();
    let total_deleted_time: f64 = deleted_segments(fragments).iter().map(|s| s.duration).sum();
    let deleted_fragments = fragments.iter().filter(|f| f.deleted).count();

    EditingStats {
        original_duration,
        current_duration,
        total_deleted_time,
        compression_ratio: if original_duration > 0.0 {
            current_duration / original_duration
        } else {
            0.0
        },
        deleted_fragments,
        kept_fragments: fragments.len() - deleted_fragments,
    }
}

/// Human readable time saved: `12.5s`, `3m 5s`, `1h 2m`
pub fn format_time_saved(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor() as u64;
        let secs = (seconds % 60.0).floor() as u64;
        format!("{}m {}s", minutes, secs)
    } else {
        let hours = (seconds / 3600.0).floor() as u64;
        let minutes = ((seconds % 3600.0) / 60.0).floor() as u64;
        format!("{}h {}m", hours, minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use quickcheck_macros::quickcheck;

    fn fragment(id: &str, start: f64, end: f64, deleted: bool) -> Fragment {
        let mut f = Fragment::new(id, id, TimeRange::new(start, end));
        f.deleted = deleted;
        f
    }

    fn abc_with_b_deleted() -> Vec<Fragment> {
        vec![
            fragment("a", 0.0, 2.0, false),
            fragment("b", 2.0, 4.0, true),
            fragment("c", 5.0, 7.0, false),
        ]
    }

    #[test]
    fn test_kept_segments_compress_timeline() {
        let kept = kept_segments(&abc_with_b_deleted());

        assert_eq!(
            kept,
            vec![
                TimeSegment { start: 0.0, end: 2.0, original_start: 0.0, original_end: 2.0, duration: 2.0 },
                TimeSegment { start: 2.0, end: 4.0, original_start: 5.0, original_end: 7.0, duration: 2.0 },
            ]
        );
    }

    #[test]
    fn test_kept_segments_merge_touching_fragments() {
        let fragments = vec![
            fragment("a", 0.0, 2.0, false),
            fragment("b", 2.0, 4.0, false),
            fragment("c", 5.0, 7.0, false),
        ];
        let kept = kept_segments(&fragments);

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].original_end, 4.0);
        assert_eq!(kept[1].start, 4.0);
        assert_eq!(kept[1].end, 6.0);
    }

    #[test]
    fn test_kept_segments_overlapping_fragments() {
        let fragments = vec![fragment("a", 1.0, 3.0, false), fragment("b", 0.5, 2.0, false)];
        let kept = kept_segments(&fragments);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].original_start, 0.5);
        assert_eq!(kept[0].original_end, 3.0);
        assert_eq!(kept[0].duration, 2.5);
    }

    #[test]
    fn test_deleted_segments_stay_on_original_timeline() {
        let deleted = deleted_segments(&abc_with_b_deleted());

        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].start, 2.0);
        assert_eq!(deleted[0].end, 4.0);
        assert_eq!(deleted[0].original_start, 2.0);
    }

    #[test]
    fn test_map_to_original_time() {
        let kept = kept_segments(&abc_with_b_deleted());

        assert_abs_diff_eq!(map_to_original_time(1.0, &kept), 1.0);
        assert_abs_diff_eq!(map_to_original_time(3.0, &kept), 6.0);
        // Clamping
        assert_abs_diff_eq!(map_to_original_time(-1.0, &kept), 0.0);
        assert_abs_diff_eq!(map_to_original_time(10.0, &kept), 7.0);
        assert_eq!(map_to_original_time(1.0, &[]), 0.0);
    }

    #[test]
    fn test_map_to_new_time() {
        let kept = kept_segments(&abc_with_b_deleted());

        assert_eq!(map_to_new_time(1.5, &kept), Some(1.5));
        assert_eq!(map_to_new_time(6.0, &kept), Some(3.0));
        // Inside the deleted gap
        assert_eq!(map_to_new_time(3.0, &kept), None);
        assert_eq!(map_to_new_time(4.5, &kept), None);
    }

    #[test]
    fn test_is_time_in_kept_segments() {
        let kept = kept_segments(&abc_with_b_deleted());

        assert!(is_time_in_kept_segments(0.0, &kept));
        assert!(is_time_in_kept_segments(2.0, &kept));
        assert!(!is_time_in_kept_segments(3.0, &kept));
        assert!(is_time_in_kept_segments(7.0, &kept));
    }

    #[test]
    fn test_to_video_segments() {
        let fragments = abc_with_b_deleted();
        let segments = to_video_segments(&kept_segments(&fragments), &deleted_segments(&fragments));

        assert_eq!(
            segments,
            vec![
                VideoSegment::new(0.0, 2.0, true),
                VideoSegment::new(2.0, 4.0, false),
                VideoSegment::new(5.0, 7.0, true),
            ]
        );
    }

    #[test]
    fn test_editing_stats() {
        let stats = editing_stats(&abc_with_b_deleted(), 8.0);

        assert_eq!(stats.current_duration, 4.0);
        assert_eq!(stats.total_deleted_time, 2.0);
        assert_eq!(stats.compression_ratio, 0.5);
        assert_eq!(stats.deleted_fragments, 1);
        assert_eq!(stats.kept_fragments, 2);

        assert_eq!(editing_stats(&[], 0.0).compression_ratio, 0.0);
    }

    #[test]
    fn test_format_time_saved() {
        assert_eq!(format_time_saved(12.5), "12.5s");
        assert_eq!(format_time_saved(185.0), "3m 5s");
        assert_eq!(format_time_saved(3720.0), "1h 2m");
    }

    #[quickcheck]
    fn prop_round_trip_inside_compressed_span(raw: Vec<(u16, u8, bool)>, probe: u16) -> bool {
        let fragments: Vec<Fragment> = raw
            .iter()
            .enumerate()
            .map(|(i, &(start, len, deleted))| {
                let start = f64::from(start % 300);
                fragment(&i.to_string(), start, start + f64::from(len % 20) + 1.0, deleted)
            })
            .collect();
        let kept = kept_segments(&fragments);
        let Some(total) = kept.last().map(|s| s.end) else {
            return true;
        };

        let t = total * f64::from(probe) / f64::from(u16::MAX);
        let original = map_to_original_time(t, &kept);
        match map_to_new_time(original, &kept) {
            Some(back) => (back - t).abs() < 1e-9,
            None => false,
        }
    }
}
