// PCM clip toolkit - WAV decode, frame-accurate splitting and re-encode via hound
use anyhow::{anyhow, Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::{debug, info};
use std::io::Cursor;
use std::sync::Arc;

use super::split::{ClipToolkit, MediaClip, PlacedClip, SplitEngine};
use crate::reconstruction::engine::{
    EngineCapabilities, EngineFeatures, OutputFormat, ProcessingOptions, ReconstructionError,
};
use crate::reconstruction::media::MediaSource;

/// Split engine over WAV sources
pub type PcmSplitEngine = SplitEngine<PcmToolkit>;

/// Decoded interleaved samples, shared by every clip cut from one source
#[derive(Debug, Clone)]
enum Samples {
    Int(Arc<[i32]>),
    Float(Arc<[f32]>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Samples::Int(s) => s.len(),
            Samples::Float(s) => s.len(),
        }
    }
}

/// A frame range over a decoded WAV
#[derive(Debug, Clone)]
pub struct PcmClip {
    spec: WavSpec,
    samples: Samples,
    start_frame: usize,
    end_frame: usize,
}

impl PcmClip {
    fn channels(&self) -> usize {
        usize::from(self.spec.channels.max(1))
    }

    pub fn frames(&self) -> usize {
        self.end_frame - self.start_frame
    }

    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    fn write_to<W>(&self, writer: &mut WavWriter<W>) -> Result<()>
    where
        W: std::io::Write + std::io::Seek,
    {
        let channels = self.channels();
        let range = self.start_frame * channels..self.end_frame * channels;

        match &self.samples {
            Samples::Int(samples) => {
                for &sample in &samples[range] {
                    writer.write_sample(sample)?;
                }
            }
            Samples::Float(samples) => {
                for &sample in &samples[range] {
                    writer.write_sample(sample)?;
                }
            }
        }
        Ok(())
    }
}

impl MediaClip for PcmClip {
    fn duration(&self) -> f64 {
        self.frames() as f64 / f64::from(self.spec.sample_rate.max(1))
    }

    fn start(&self) -> f64 {
        self.start_frame as f64 / f64::from(self.spec.sample_rate.max(1))
    }

    fn split(&self, at: f64) -> Result<(Self, Self)> {
        if !at.is_finite() || at < 0.0 {
            return Err(anyhow!("Invalid split offset: {}", at));
        }

        let offset = (at * f64::from(self.spec.sample_rate)).round() as usize;
        let mid = (self.start_frame + offset).min(self.end_frame);

        let front = PcmClip {
            end_frame: mid,
            ..self.clone()
        };
        let back = PcmClip {
            start_frame: mid,
            ..self.clone()
        };
        Ok((front, back))
    }
}

/// In-process WAV toolkit
#[derive(Debug, Clone, Default)]
pub struct PcmToolkit;

impl PcmToolkit {
    pub fn new() -> Self {
        Self
    }

    pub fn engine() -> PcmSplitEngine {
        SplitEngine::new(Self)
    }

    fn write_silence<W>(writer: &mut WavWriter<W>, spec: &WavSpec, frames: usize) -> Result<()>
    where
        W: std::io::Write + std::io::Seek,
    {
        let samples = frames * usize::from(spec.channels.max(1));
        for _ in 0..samples {
            match spec.sample_format {
                SampleFormat::Int => writer.write_sample(0i32)?,
                SampleFormat::Float => writer.write_sample(0f32)?,
            }
        }
        Ok(())
    }
}

impl ClipToolkit for PcmToolkit {
    type Clip = PcmClip;

    fn name(&self) -> &'static str {
        "split (pcm)"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supported: true,
            reason: None,
            formats: vec![OutputFormat::Wav.extension().to_string()],
            max_size: None,
            features: EngineFeatures {
                trim: true,
                concat: true,
                audio_processing: true,
                subtitle_burn: false,
                quality_control: false,
            },
        }
    }

    fn open(&self, source: &MediaSource) -> Result<PcmClip> {
        if source.extension().as_deref() != Some("wav") {
            return Err(anyhow!(
                "PCM toolkit only decodes WAV sources, got {}",
                source.name
            ));
        }

        let mut reader = WavReader::open(&source.path)
            .with_context(|| format!("Failed to open WAV: {}", source.path.display()))?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            SampleFormat::Int => Samples::Int(
                reader
                    .samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("Failed to decode integer samples")?
                    .into(),
            ),
            SampleFormat::Float => Samples::Float(
                reader
                    .samples::<f32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .context("Failed to decode float samples")?
                    .into(),
            ),
        };

        let frames = samples.len() / usize::from(spec.channels.max(1));
        info!(
            "Decoded {}: {} Hz, {} channel(s), {} frames",
            source.name, spec.sample_rate, spec.channels, frames
        );

        Ok(PcmClip {
            spec,
            samples,
            start_frame: 0,
            end_frame: frames,
        })
    }

    fn check_options(&self, options: &ProcessingOptions) -> Result<(), ReconstructionError> {
        if options.format != OutputFormat::Wav {
            return Err(ReconstructionError::InvalidOptions(format!(
                "PCM toolkit writes wav, not {}",
                options.format.extension()
            )));
        }
        if !options.preserve_audio {
            return Err(ReconstructionError::InvalidOptions(
                "PCM toolkit output is audio only, preserve_audio must be set".to_string(),
            ));
        }
        Ok(())
    }

    fn compose(&self, placed: Vec<PlacedClip<PcmClip>>, _options: &ProcessingOptions) -> Result<Vec<u8>> {
        let spec = placed
            .first()
            .map(|p| p.clip.spec())
            .ok_or_else(|| anyhow!("Nothing to compose"))?;
        let rate = f64::from(spec.sample_rate);

        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut buffer, spec).context("Failed to start WAV output")?;
            let mut written_frames = 0usize;

            for p in &placed {
                let target = (p.offset * rate).round() as usize;
                if target > written_frames {
                    Self::write_silence(&mut writer, &spec, target - written_frames)?;
                    written_frames = target;
                }
                p.clip.write_to(&mut writer)?;
                written_frames += p.clip.frames();
            }

            debug!("Composed {} clips into {} frames", placed.len(), written_frames);
            writer.finalize().context("Failed to finalize WAV output")?;
        }

        Ok(buffer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruction::backends::split::{cut_clips, DEFAULT_MIN_CLIP_DURATION};
    use crate::reconstruction::engine::{ProgressReporter, ReconstructionEngine};
    use crate::timeline::ranges::TimeRange;
    use crate::timeline::segments::VideoSegment;
    use approx::assert_abs_diff_eq;
    use std::path::Path;

    const RATE: u32 = 8000;

    /// Mono 16-bit WAV where every sample holds `1000 * second`
    fn write_stepped_wav(path: &Path, seconds: u32) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for second in 0..seconds {
            for _ in 0..RATE {
                writer.write_sample((second * 1000) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn wav_options() -> ProcessingOptions {
        ProcessingOptions {
            format: OutputFormat::Wav,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_keep_drop_keep_over_six_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.wav");
        write_stepped_wav(&path, 6);

        let source = MediaSource::from_path(&path).unwrap();
        let mut engine = PcmToolkit::engine();
        engine.initialize(&source, None).await.unwrap();

        let segments = vec![
            VideoSegment::new(0.0, 2.0, true),
            VideoSegment::new(2.0, 4.0, false),
            VideoSegment::new(4.0, 6.0, true),
        ];
        let output = engine.process(&segments, &wav_options()).await.unwrap();

        let mut reader = WavReader::new(Cursor::new(output.to_vec())).unwrap();
        assert_eq!(reader.spec().sample_rate, RATE);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();

        assert_abs_diff_eq!(samples.len() as f64 / f64::from(RATE), 4.0);
        // [0,2) then [4,6) with no gap
        assert_eq!(samples[0], 0);
        assert_eq!(samples[RATE as usize - 1], 0);
        assert_eq!(samples[RATE as usize], 1000);
        assert_eq!(samples[2 * RATE as usize], 4000);
        assert_eq!(samples[samples.len() - 1], 5000);
    }

    #[tokio::test]
    async fn test_video_source_fails_to_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.mp4");
        std::fs::write(&path, b"not really a video").unwrap();

        let mut engine = PcmToolkit::engine();
        let err = engine
            .initialize(&MediaSource::from_path(&path).unwrap(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ReconstructionError::InitializationFailed(_)));
    }

    #[tokio::test]
    async fn test_rejects_non_wav_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.wav");
        write_stepped_wav(&path, 2);

        let mut engine = PcmToolkit::engine();
        engine.initialize(&MediaSource::from_path(&path).unwrap(), None).await.unwrap();

        let segments = [VideoSegment::new(0.0, 1.0, true), VideoSegment::new(1.0, 2.0, false)];
        let err = engine
            .process(&segments, &ProcessingOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::InvalidOptions(_)));

        let err = engine
            .process(
                &segments,
                &ProcessingOptions {
                    preserve_audio: false,
                    ..wav_options()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::InvalidOptions(_)));
    }

    #[test]
    fn test_split_is_frame_accurate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.wav");
        write_stepped_wav(&path, 3);

        let clip = PcmToolkit.open(&MediaSource::from_path(&path).unwrap()).unwrap();
        let (front, back) = clip.split(1.25).unwrap();

        assert_eq!(front.frames(), 10_000);
        assert_eq!(back.frames(), 14_000);
        assert_abs_diff_eq!(front.duration() + back.duration(), 3.0);

        let (all, none) = clip.split(10.0).unwrap();
        assert_eq!(all.frames(), clip.frames());
        assert_eq!(none.frames(), 0);
        assert!(clip.split(-1.0).is_err());
    }

    #[test]
    fn test_compose_pads_gaps_with_silence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("talk.wav");
        write_stepped_wav(&path, 2);

        let clip = PcmToolkit.open(&MediaSource::from_path(&path).unwrap()).unwrap();
        let (first, _) = clip.split(0.5).unwrap();
        let placed = vec![
            PlacedClip { clip: first.clone(), offset: 0.0 },
            PlacedClip { clip: first, offset: 1.0 },
        ];

        let bytes = PcmToolkit.compose(placed, &wav_options()).unwrap();
        let reader = WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.duration(), 12_000);
    }

    #[test]
    fn test_many_cuts_stay_on_frame_grid() {
        // 10 Hz makes every split round by a visible fraction of a frame
        let clip = PcmClip {
            spec: WavSpec {
                channels: 1,
                sample_rate: 10,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
            samples: Samples::Int((0..20).collect::<Vec<i32>>().into()),
            start_frame: 0,
            end_frame: 20,
        };
        let deletions: Vec<TimeRange> = [(0.14, 0.26), (0.54, 0.66), (0.94, 1.06), (1.34, 1.46)]
            .iter()
            .map(|&d| d.into())
            .collect();

        let pieces = cut_clips(clip, &deletions, DEFAULT_MIN_CLIP_DURATION, &ProgressReporter::default()).unwrap();
        let frames: Vec<(usize, usize)> = pieces.iter().map(|p| (p.start_frame, p.end_frame)).collect();

        // Each boundary is the nearest frame to its deletion edge
        assert_eq!(frames, vec![(0, 1), (3, 5), (7, 9), (11, 13), (15, 20)]);
    }
}
