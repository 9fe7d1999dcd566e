// Time range arithmetic - merging and overlap of [start, end] ranges in seconds
// Foundation for segment derivation and split-based reconstruction

use serde::{Deserialize, Serialize};

/// A closed time range in seconds on the original timeline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Closed-interval membership (both ends inclusive)
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }
}

impl From<(f64, f64)> for TimeRange {
    fn from((start, end): (f64, f64)) -> Self {
        Self { start, end }
    }
}

impl From<[f64; 2]> for TimeRange {
    fn from([start, end]: [f64; 2]) -> Self {
        Self { start, end }
    }
}

/// Merge overlapping or touching ranges.
///
/// Ranges are sorted by start and folded left; the next range is absorbed
/// whenever `next.start <= current.end`. There is no gap tolerance, so
/// `[0,2]` and `[2,4]` merge but `[0,2]` and `[2.001,4]` do not.
pub fn merge_ranges<I>(ranges: I) -> Vec<TimeRange>
where
    I: IntoIterator<Item = TimeRange>,
{
    let mut sorted: Vec<TimeRange> = ranges.into_iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeRange> = Vec::with_capacity(sorted.len());
    for range in sorted {
        match merged.last_mut() {
            Some(last) if range.start <= last.end => {
                last.end = last.end.max(range.end);
            }
            _ => merged.push(range),
        }
    }

    merged
}

/// Positive-length intersection of two ranges
pub fn overlap(a: TimeRange, b: TimeRange) -> Option<TimeRange> {
    let start = a.start.max(b.start);
    let end = a.end.min(b.end);

    if start < end {
        Some(TimeRange { start, end })
    } else {
        None
    }
}

/// Format seconds as `MM:SS`, or `HH:MM:SS` when hours are present or requested
pub fn format_time(seconds: f64, include_hours: bool) -> String {
    if !seconds.is_finite() {
        return "00:00".to_string();
    }

    let total = seconds.max(0.0).floor() as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if include_hours || hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format seconds as `MM:SS.mmm` (subtitle style, minutes are not wrapped into hours)
pub fn format_time_with_ms(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "00:00.000".to_string();
    }

    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    let millis = ((seconds % 1.0) * 1000.0).floor() as u64;

    format!("{:02}:{:02}.{:03}", minutes, secs, millis)
}

/// Parse `MM:SS` or `HH:MM:SS` into seconds. Malformed input yields 0.
pub fn parse_time(value: &str) -> f64 {
    let parts: Vec<f64> = match value
        .trim()
        .split(':')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(parts) => parts,
        Err(_) => return 0.0,
    };

    match parts.as_slice() {
        [minutes, secs] => minutes * 60.0 + secs,
        [hours, minutes, secs] => hours * 3600.0 + minutes * 60.0 + secs,
        _ => 0.0,
    }
}
