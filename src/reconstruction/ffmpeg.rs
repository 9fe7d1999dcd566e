//! FFmpeg discovery and output parsing
//!
//! The command-graph backend and media probing both shell out to an ffmpeg
//! binary; this module finds one and reads what it prints.

use anyhow::{anyhow, Context, Result};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Windows flag to prevent console window from appearing
#[cfg(target_os = "windows")]
pub(crate) const CREATE_NO_WINDOW: u32 = 0x08000000;

static DURATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").expect("valid duration regex")
});

static VIDEO_SIZE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Stream #.*Video:.*?\b(\d{2,5})x(\d{2,5})\b").expect("valid video size regex")
});

/// Locate an ffmpeg executable.
///
/// Order: explicit override, `PATH`, then a binary previously downloaded by
/// ffmpeg-sidecar.
pub fn find_ffmpeg_path(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        warn!("Configured ffmpeg not found at {}, searching PATH", path.display());
    }

    if let Ok(path) = which::which("ffmpeg") {
        debug!("Found ffmpeg on PATH: {}", path.display());
        return Some(path);
    }

    let sidecar = ffmpeg_sidecar::paths::ffmpeg_path();
    if sidecar.is_absolute() && sidecar.exists() {
        debug!("Found ffmpeg-sidecar binary: {}", sidecar.display());
        return Some(sidecar);
    }

    None
}

/// What ffmpeg's input banner says about a file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeInfo {
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub fn parse_probe_output(stderr: &str) -> ProbeInfo {
    let duration = DURATION_RE.captures(stderr).and_then(|caps| {
        let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
        let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
        let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    });

    let (width, height) = VIDEO_SIZE_RE
        .captures(stderr)
        .map(|caps| {
            (
                caps.get(1).and_then(|m| m.as_str().parse().ok()),
                caps.get(2).and_then(|m| m.as_str().parse().ok()),
            )
        })
        .unwrap_or((None, None));

    ProbeInfo {
        duration,
        width,
        height,
    }
}

/// Run `ffmpeg -i <media>` and parse the stream banner
pub async fn probe(ffmpeg: &Path, media: &Path) -> Result<ProbeInfo> {
    let mut cmd = Command::new(ffmpeg);

    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);

    // No output file, so ffmpeg exits non-zero after printing the banner
    let output = cmd
        .arg("-hide_banner")
        .arg("-i")
        .arg(media)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("Failed to run ffmpeg at {}", ffmpeg.display()))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    let info = parse_probe_output(&stderr);

    if info.duration.is_none() {
        return Err(anyhow!(
            "Could not determine media duration for {}",
            media.display()
        ));
    }

    Ok(info)
}

/// Seconds of output written so far, from a `-progress` key=value line
pub fn parse_progress_seconds(line: &str) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Both keys are microseconds despite the name
        "out_time_ms" | "out_time_us" => value.parse::<f64>().ok().map(|us| us / 1_000_000.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANNER: &str = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':\n  \
        Duration: 00:01:05.50, start: 0.000000, bitrate: 1205 kb/s\n  \
        Stream #0:0(und): Video: h264 (High) (avc1 / 0x31637661), yuv420p, 1280x720 [SAR 1:1 DAR 16:9], 1072 kb/s, 30 fps\n  \
        Stream #0:1(und): Audio: aac (LC) (mp4a / 0x6134706D), 44100 Hz, stereo, fltp, 128 kb/s\n";

    #[test]
    fn test_parse_probe_output() {
        let info = parse_probe_output(BANNER);
        assert_eq!(info.duration, Some(65.5));
        assert_eq!(info.width, Some(1280));
        assert_eq!(info.height, Some(720));
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let info = parse_probe_output(
            "Input #0, wav, from 'a.wav':\n  Duration: 01:00:00.00, bitrate: 256 kb/s\n  \
             Stream #0:0: Audio: pcm_s16le ([1][0][0][0] / 0x0001), 16000 Hz, 1 channels, s16, 256 kb/s\n",
        );
        assert_eq!(info.duration, Some(3600.0));
        assert_eq!(info.width, None);
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        assert_eq!(parse_probe_output("No such file or directory"), ProbeInfo::default());
    }

    #[test]
    fn test_parse_progress_seconds() {
        assert_eq!(parse_progress_seconds("out_time_ms=2500000"), Some(2.5));
        assert_eq!(parse_progress_seconds("out_time_us=1000000\n"), Some(1.0));
        assert_eq!(parse_progress_seconds("out_time=00:00:02.500000"), None);
        assert_eq!(parse_progress_seconds("progress=end"), None);
        assert_eq!(parse_progress_seconds("out_time_ms=N/A"), None);
    }

    #[test]
    fn test_missing_override_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no-ffmpeg-here");
        // Whatever is found, it is never the missing override
        assert_ne!(find_ffmpeg_path(Some(&missing)), Some(missing));
    }
}
