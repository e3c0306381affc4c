// Silence-aware audio chunking
//
// Oversized recordings are cut into ordered, overlapping chunks so each
// piece can be transcribed independently. Cuts prefer the middle of a
// detected silence near the target boundary; the overlap gives the
// merger two readings of the boundary region to deduplicate.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Default overlap carried into each chunk after the first
pub const DEFAULT_OVERLAP_MS: i64 = 2_000;

/// A detected span of silence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilenceInterval {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl SilenceInterval {
    pub fn midpoint_ms(&self) -> i64 {
        (self.start_ms + self.end_ms) / 2
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// A planned chunk of the recording timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Silence detection and cut planning parameters
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Frames quieter than this (dBFS) count as silence
    pub silence_threshold_db: f64,
    /// Minimum silence length worth cutting in
    pub min_silence_ms: i64,
    /// How far around a target boundary to look for silence
    pub search_window_ms: i64,
    /// RMS analysis frame length
    pub frame_ms: i64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_threshold_db: -35.0,
            min_silence_ms: 800,
            search_window_ms: 20_000,
            frame_ms: 100,
        }
    }
}

/// Decoded mono audio ready for analysis
pub struct WavAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl WavAudio {
    pub fn duration_ms(&self) -> i64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.samples.len() as i64 * 1000) / self.sample_rate as i64
    }
}

/// Plan chunk spans for a recording of `total_duration_ms`.
///
/// A file within the limit is one whole-file chunk and needs no physical
/// split. The overlap is clamped below half the chunk stride so an
/// overlap window can never span more than two chunks.
pub fn plan_chunks(
    total_duration_ms: i64,
    max_chunk_duration_ms: i64,
    overlap_ms: i64,
    silences: &[SilenceInterval],
    config: &SegmenterConfig,
) -> Vec<ChunkSpan> {
    if total_duration_ms <= max_chunk_duration_ms {
        return vec![ChunkSpan {
            index: 0,
            start_ms: 0,
            end_ms: total_duration_ms,
        }];
    }

    let overlap = overlap_ms.clamp(0, max_chunk_duration_ms / 2);
    let cut_points = find_cut_points(
        total_duration_ms,
        max_chunk_duration_ms,
        overlap,
        silences,
        config,
    );

    let mut spans = Vec::with_capacity(cut_points.len());
    for (i, &start) in cut_points.iter().enumerate() {
        let end = if i + 1 < cut_points.len() {
            (cut_points[i + 1] + overlap).min(total_duration_ms)
        } else {
            // The final chunk always extends to the true end of the file
            total_duration_ms
        };
        spans.push(ChunkSpan {
            index: i as i64,
            start_ms: start,
            end_ms: end,
        });
    }
    spans
}

/// Walk forward in `max_chunk_duration_ms` steps and pick a cut for each
/// boundary: the midpoint of the silence closest to the target inside
/// the search window, or the boundary itself when no silence qualifies.
/// Every cut point after the first is pulled back by the overlap.
/// Deterministic for a given silence list.
pub fn find_cut_points(
    total_duration_ms: i64,
    max_chunk_duration_ms: i64,
    overlap_ms: i64,
    silences: &[SilenceInterval],
    config: &SegmenterConfig,
) -> Vec<i64> {
    let mut cut_points = vec![0];
    let mut current_pos = 0;

    while current_pos + max_chunk_duration_ms < total_duration_ms {
        let target = current_pos + max_chunk_duration_ms;
        let window_start = target - config.search_window_ms;
        let window_end = target + config.search_window_ms;

        let best = silences
            .iter()
            .filter(|s| {
                let mid = s.midpoint_ms();
                mid >= window_start && mid <= window_end
            })
            .min_by_key(|s| (s.midpoint_ms() - target).abs());

        match best {
            Some(silence) => {
                let cut_at = silence.midpoint_ms();
                cut_points.push((cut_at - overlap_ms).max(current_pos));
                current_pos = cut_at;
            }
            None => {
                cut_points.push(target - overlap_ms);
                current_pos = target;
            }
        }
    }

    cut_points
}

/// Detect silence intervals with windowed RMS loudness.
pub fn detect_silence(audio: &WavAudio, config: &SegmenterConfig) -> Vec<SilenceInterval> {
    let frame_len = ((audio.sample_rate as i64 * config.frame_ms) / 1000).max(1) as usize;
    let duration_ms = audio.duration_ms();

    let mut intervals = Vec::new();
    let mut run_start_frame: Option<usize> = None;

    let frame_count = audio.samples.len().div_ceil(frame_len);
    for frame_index in 0..frame_count {
        let start = frame_index * frame_len;
        let end = (start + frame_len).min(audio.samples.len());
        let frame = &audio.samples[start..end];

        let energy: f64 = frame.iter().map(|s| (*s as f64) * (*s as f64)).sum();
        let rms = (energy / frame.len() as f64).sqrt();
        let db = 20.0 * rms.max(1e-10).log10();

        if db < config.silence_threshold_db {
            if run_start_frame.is_none() {
                run_start_frame = Some(frame_index);
            }
        } else if let Some(start_frame) = run_start_frame.take() {
            push_interval(&mut intervals, start_frame, frame_index, config, duration_ms);
        }
    }

    if let Some(start_frame) = run_start_frame {
        push_interval(&mut intervals, start_frame, frame_count, config, duration_ms);
    }

    intervals
}

fn push_interval(
    intervals: &mut Vec<SilenceInterval>,
    start_frame: usize,
    end_frame: usize,
    config: &SegmenterConfig,
    duration_ms: i64,
) {
    let interval = SilenceInterval {
        start_ms: start_frame as i64 * config.frame_ms,
        end_ms: (end_frame as i64 * config.frame_ms).min(duration_ms),
    };
    if interval.duration_ms() >= config.min_silence_ms {
        intervals.push(interval);
    }
}

/// Decode a WAV file to mono f32
pub fn load_wav(path: &Path) -> Result<WavAudio> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to decode float WAV samples")?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("Failed to decode integer WAV samples")?
        }
    };

    let mut samples = Vec::with_capacity(interleaved.len() / channels);
    for frame in interleaved.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        samples.push(sum / channels as f32);
    }

    Ok(WavAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Duration of a WAV file without decoding its samples
pub fn wav_duration_ms(path: &Path) -> Result<i64> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open WAV file {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        anyhow::bail!("WAV file {} has zero sample rate", path.display());
    }
    Ok((reader.duration() as i64 * 1000) / spec.sample_rate as i64)
}

/// Write one chunk span as a mono 16-bit WAV file
pub fn write_wav_span(audio: &WavAudio, span: &ChunkSpan, out_path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let start = ((span.start_ms * audio.sample_rate as i64) / 1000).max(0) as usize;
    let end = (((span.end_ms * audio.sample_rate as i64) / 1000) as usize).min(audio.samples.len());

    let mut writer = hound::WavWriter::create(out_path, spec)
        .with_context(|| format!("Failed to create chunk file {}", out_path.display()))?;
    for sample in &audio.samples[start.min(end)..end] {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer.write_sample(value).context("Failed to write chunk sample")?;
    }
    writer.finalize().context("Failed to finalize chunk file")?;

    Ok(())
}

/// Split a WAV file into overlapping chunk files under `out_dir`.
///
/// When silence detection fails the file is treated as having no silence
/// at all, which degrades to hard cuts at fixed boundaries.
pub fn split_wav_file(
    path: &Path,
    out_dir: &Path,
    max_chunk_duration_ms: i64,
    overlap_ms: i64,
    config: &SegmenterConfig,
) -> Result<Vec<(ChunkSpan, PathBuf)>> {
    let audio = load_wav(path)?;
    let total_duration_ms = audio.duration_ms();

    let silences = match std::panic::catch_unwind(|| detect_silence(&audio, config)) {
        Ok(silences) => silences,
        Err(_) => {
            log::warn!(
                "Silence detection failed for {}; falling back to hard cuts",
                path.display()
            );
            Vec::new()
        }
    };

    let spans = plan_chunks(
        total_duration_ms,
        max_chunk_duration_ms,
        overlap_ms,
        &silences,
        config,
    );

    std::fs::create_dir_all(out_dir).context("Failed to create chunk output directory")?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("recording");

    let mut chunks = Vec::with_capacity(spans.len());
    for span in spans {
        let chunk_path = out_dir.join(format!("{}_chunk{:03}.wav", stem, span.index));
        write_wav_span(&audio, &span, &chunk_path)?;
        chunks.push((span, chunk_path));
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config() -> SegmenterConfig {
        SegmenterConfig::default()
    }

    #[test]
    fn test_short_file_is_single_chunk() {
        let spans = plan_chunks(600_000, 1_200_000, DEFAULT_OVERLAP_MS, &[], &config());
        assert_eq!(
            spans,
            vec![ChunkSpan {
                index: 0,
                start_ms: 0,
                end_ms: 600_000
            }]
        );
    }

    #[test]
    fn test_exact_limit_is_single_chunk() {
        let spans = plan_chunks(1_200_000, 1_200_000, DEFAULT_OVERLAP_MS, &[], &config());
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_no_silence_hard_cuts() {
        // 40 minutes, 20 minute chunks, no silence detected
        let spans = plan_chunks(2_400_000, 1_200_000, 2_000, &[], &config());
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0], ChunkSpan { index: 0, start_ms: 0, end_ms: 1_200_000 });
        // Second chunk starts at the hard boundary minus the overlap
        assert_eq!(spans[1], ChunkSpan { index: 1, start_ms: 1_198_000, end_ms: 2_400_000 });
    }

    #[test]
    fn test_cut_at_silence_midpoint() {
        // One silence interval near the 20 minute boundary
        let silences = vec![SilenceInterval {
            start_ms: 1_190_000,
            end_ms: 1_194_000,
        }];
        let spans = plan_chunks(2_400_000, 1_200_000, 2_000, &silences, &config());

        assert_eq!(spans.len(), 2);
        // Cut lands at the silence midpoint (1_192_000)
        assert_eq!(spans[0].end_ms, 1_192_000);
        assert_eq!(spans[1].start_ms, 1_190_000);
        assert_eq!(spans[1].end_ms, 2_400_000);
        // Chunks overlap by exactly the configured amount
        assert_eq!(spans[0].end_ms - spans[1].start_ms, 2_000);
    }

    #[test]
    fn test_silence_outside_window_ignored() {
        let silences = vec![SilenceInterval {
            start_ms: 100_000,
            end_ms: 104_000,
        }];
        let spans = plan_chunks(2_400_000, 1_200_000, 2_000, &silences, &config());
        assert_eq!(spans[1].start_ms, 1_198_000);
    }

    #[test]
    fn test_closest_silence_wins() {
        let silences = vec![
            SilenceInterval { start_ms: 1_185_000, end_ms: 1_187_000 },
            SilenceInterval { start_ms: 1_198_000, end_ms: 1_202_000 },
        ];
        let spans = plan_chunks(2_400_000, 1_200_000, 2_000, &silences, &config());
        // Midpoint 1_200_000 is closer to the target than 1_186_000
        assert_eq!(spans[0].end_ms, 1_200_000);
    }

    #[test]
    fn test_planning_is_deterministic() {
        let silences = vec![
            SilenceInterval { start_ms: 1_150_000, end_ms: 1_152_000 },
            SilenceInterval { start_ms: 1_210_000, end_ms: 1_212_000 },
        ];
        let a = plan_chunks(3_600_000, 1_200_000, 2_000, &silences, &config());
        let b = plan_chunks(3_600_000, 1_200_000, 2_000, &silences, &config());
        assert_eq!(a, b);
    }

    #[test]
    fn test_overlap_clamped_below_chunk_stride() {
        // Pathological overlap larger than the chunk length must not
        // produce spans that overlap more than two deep
        let spans = plan_chunks(30_000, 10_000, 50_000, &[], &config());
        for pair in spans.windows(2) {
            assert!(pair[1].start_ms >= pair[0].start_ms);
            assert!(pair[0].end_ms - pair[1].start_ms <= 5_000);
        }
    }

    #[test]
    fn test_detect_silence_finds_quiet_middle() {
        let sample_rate = 1_000u32;
        let mut samples = Vec::new();
        // 1s loud, 1s quiet, 1s loud
        samples.extend(std::iter::repeat(0.5f32).take(1_000));
        samples.extend(std::iter::repeat(0.0f32).take(1_000));
        samples.extend(std::iter::repeat(0.5f32).take(1_000));

        let audio = WavAudio { samples, sample_rate };
        let silences = detect_silence(&audio, &config());

        assert_eq!(silences.len(), 1);
        assert_eq!(silences[0].start_ms, 1_000);
        assert_eq!(silences[0].end_ms, 2_000);
    }

    #[test]
    fn test_detect_silence_ignores_short_gaps() {
        let sample_rate = 1_000u32;
        let mut samples = Vec::new();
        samples.extend(std::iter::repeat(0.5f32).take(1_000));
        // 300ms gap, below the 800ms minimum
        samples.extend(std::iter::repeat(0.0f32).take(300));
        samples.extend(std::iter::repeat(0.5f32).take(1_000));

        let audio = WavAudio { samples, sample_rate };
        assert!(detect_silence(&audio, &config()).is_empty());
    }

    #[test]
    fn test_split_wav_file_round_trip() {
        let dir = tempdir().unwrap();
        let wav_path = dir.path().join("meeting.wav");

        // 3 seconds at 8kHz: tone, silence, tone
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&wav_path, spec).unwrap();
        for i in 0..24_000usize {
            let in_silence = (9_600..16_800).contains(&i);
            let value = if in_silence {
                0i16
            } else {
                ((i as f32 * 0.3).sin() * 12_000.0) as i16
            };
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let chunks = split_wav_file(&wav_path, dir.path(), 1_500, 200, &config()).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0.start_ms, 0);
        assert_eq!(chunks[1].0.end_ms, 3_000);
        // Chunks overlap and the files really exist
        assert!(chunks[0].0.end_ms > chunks[1].0.start_ms);
        for (span, path) in &chunks {
            assert!(path.exists());
            let written = wav_duration_ms(path).unwrap();
            assert_eq!(written, span.end_ms - span.start_ms);
        }
    }
}
