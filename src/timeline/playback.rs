// Live preview helpers - keeps a player on kept material while it runs over
// the original recording

use serde::{Deserialize, Serialize};

use super::segments::TimeSegment;

/// What a previewing player should do at its current original-timeline position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PreviewAction {
    /// Inside kept material, keep playing
    Play,
    /// Inside a deleted region, jump forward to this original time
    SkipTo(f64),
    /// Past the last kept segment
    Stop,
}

/// Total length of the compressed timeline
pub fn compressed_duration(kept: &[TimeSegment]) -> f64 {
    kept.iter().map(|s| s.duration).sum()
}

/// Position on the compressed timeline for an original time.
///
/// Unlike `map_to_new_time` this never fails: a time inside a deleted gap
/// reports the compressed position the player will resume from.
pub fn compressed_position(original_time: f64, kept: &[TimeSegment]) -> f64 {
    let mut position = 0.0;

    for segment in kept {
        if original_time >= segment.original_start && original_time <= segment.original_end {
            position += original_time - segment.original_start;
            break;
        } else if original_time > segment.original_end {
            position += segment.duration;
        } else {
            break;
        }
    }

    position
}

/// Original time to seek to for a compressed-timeline position.
/// Positions past the end land on the last kept original end.
pub fn seek_target(compressed_time: f64, kept: &[TimeSegment]) -> f64 {
    let mut remaining = compressed_time.max(0.0);

    for segment in kept {
        if remaining <= segment.duration {
            return segment.original_start + remaining;
        }
        remaining -= segment.duration;
    }

    kept.last().map(|s| s.original_end).unwrap_or(0.0)
}

/// Decide how playback continues at `original_time`.
///
/// With no kept segments at all there is nothing to skip to, so playback
/// continues over the untouched recording.
pub fn preview_action(original_time: f64, kept: &[TimeSegment]) -> PreviewAction {
    if kept.is_empty() {
        return PreviewAction::Play;
    }

    if kept
        .iter()
        .any(|s| original_time >= s.original_start && original_time <= s.original_end)
    {
        return PreviewAction::Play;
    }

    match kept.iter().find(|s| s.original_start > original_time) {
        Some(next) => PreviewAction::SkipTo(next.original_start),
        None => PreviewAction::Stop,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::ranges::TimeRange;
    use crate::timeline::segments::kept_segments;
    use crate::transcript::types::Fragment;
    use approx::assert_abs_diff_eq;

    fn kept() -> Vec<TimeSegment> {
        let mut b = Fragment::new("b", "b", TimeRange::new(2.0, 4.0));
        b.deleted = true;
        kept_segments(&[
            Fragment::new("a", "a", TimeRange::new(0.0, 2.0)),
            b,
            Fragment::new("c", "c", TimeRange::new(5.0, 7.0)),
        ])
    }

    #[test]
    fn test_compressed_position() {
        let kept = kept();

        assert_abs_diff_eq!(compressed_position(1.0, &kept), 1.0);
        assert_abs_diff_eq!(compressed_position(3.0, &kept), 2.0);
        assert_abs_diff_eq!(compressed_position(6.5, &kept), 3.5);
        assert_abs_diff_eq!(compressed_position(9.0, &kept), 4.0);
        assert_abs_diff_eq!(compressed_duration(&kept), 4.0);
    }

    #[test]
    fn test_seek_target() {
        let kept = kept();

        assert_abs_diff_eq!(seek_target(1.5, &kept), 1.5);
        assert_abs_diff_eq!(seek_target(3.0, &kept), 6.0);
        assert_abs_diff_eq!(seek_target(42.0, &kept), 7.0);
        assert_eq!(seek_target(1.0, &[]), 0.0);
    }

    #[test]
    fn test_preview_action() {
        let kept = kept();

        assert_eq!(preview_action(1.0, &kept), PreviewAction::Play);
        assert_eq!(preview_action(3.0, &kept), PreviewAction::SkipTo(5.0));
        assert_eq!(preview_action(7.5, &kept), PreviewAction::Stop);
        assert_eq!(preview_action(3.0, &[]), PreviewAction::Play);
    }
}
