//! Reference-audio canonicalization.
//!
//! Clone jobs feed arbitrary uploads through this pipeline: decode,
//! downmix, resample to 24 kHz, trim edge silence, clamp duration, and
//! write the canonical PCM file the engine will condition on.

use std::path::Path;

use async_trait::async_trait;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};
use cantus_core::ports::{AudioError, NormalizedReference, ReferenceAudioProcessor};
use cantus_core::validation::{MAX_REFERENCE_SECONDS, MIN_REFERENCE_SECONDS};

use super::decode::{decode_file, downmix_to_mono};
use super::pcm::write_pcm_atomic;

/// Edge-silence trim window (20 ms).
const TRIM_WINDOW_MS: u32 = 20;
/// Energy threshold below which a window counts as silence (−40 dBFS).
const SILENCE_THRESHOLD_DB: f32 = -40.0;

const RESAMPLE_CHUNK: usize = 1024;

/// Resample mono samples to the canonical 24 kHz.
pub fn resample_to_canonical(samples: &[f32], from_rate: u32) -> Result<Vec<f32>, AudioError> {
    if from_rate == CANONICAL_SAMPLE_RATE {
        return Ok(samples.to_vec());
    }
    let ratio = f64::from(CANONICAL_SAMPLE_RATE) / f64::from(from_rate);
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| AudioError::Resample(e.to_string()))?;

    let expected_len = (samples.len() as f64 * ratio).round() as usize;
    let mut out = Vec::with_capacity(expected_len);
    for chunk in samples.chunks(RESAMPLE_CHUNK) {
        let frames = if chunk.len() == RESAMPLE_CHUNK {
            resampler
                .process(&[chunk.to_vec()], None)
                .map_err(|e| AudioError::Resample(e.to_string()))?
        } else {
            resampler
                .process_partial(Some(&[chunk.to_vec()]), None)
                .map_err(|e| AudioError::Resample(e.to_string()))?
        };
        out.extend_from_slice(&frames[0]);
    }
    // Flush the resampler's tail.
    let tail = resampler
        .process_partial::<Vec<f32>>(None, None)
        .map_err(|e| AudioError::Resample(e.to_string()))?;
    out.extend_from_slice(&tail[0]);

    out.truncate(expected_len.max(1));
    Ok(out)
}

fn window_rms(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    (window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32).sqrt()
}

/// Trim leading and trailing silence using fixed-size energy windows.
///
/// All-silent input comes back empty; the caller turns that into a
/// too-short rejection.
#[must_use]
pub fn trim_silence(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let window = (sample_rate * TRIM_WINDOW_MS / 1000).max(1) as usize;
    let threshold = 10.0f32.powf(SILENCE_THRESHOLD_DB / 20.0);

    let first_loud = samples
        .chunks(window)
        .position(|w| window_rms(w) >= threshold);
    let Some(first_loud) = first_loud else {
        return Vec::new();
    };
    let last_loud = samples
        .chunks(window)
        .rposition(|w| window_rms(w) >= threshold)
        .unwrap_or(first_loud);

    let start = first_loud * window;
    let end = ((last_loud + 1) * window).min(samples.len());
    samples[start..end].to_vec()
}

/// Full upload-to-canonical pipeline, blocking. Async callers go through
/// [`AudioNormalizer`].
pub fn normalize_reference(src: &Path, dest: &Path) -> Result<NormalizedReference, AudioError> {
    let decoded = decode_file(src)?;
    let mono = downmix_to_mono(&decoded.interleaved, decoded.channels);
    let resampled = resample_to_canonical(&mono, decoded.sample_rate)?;
    let mut trimmed = trim_silence(&resampled, CANONICAL_SAMPLE_RATE);

    // The ceiling is a clamp: keep the first 300 s. Only the floor
    // rejects.
    let max_samples = (MAX_REFERENCE_SECONDS * f64::from(CANONICAL_SAMPLE_RATE)) as usize;
    if trimmed.len() > max_samples {
        trimmed.truncate(max_samples);
    }

    let pcm = PcmAudio::new(trimmed, CANONICAL_SAMPLE_RATE);
    let seconds = pcm.duration_seconds();
    if seconds < MIN_REFERENCE_SECONDS {
        return Err(AudioError::TooShort { seconds });
    }

    write_pcm_atomic(dest, &pcm)?;
    Ok(NormalizedReference {
        duration_seconds: seconds,
        sample_rate: CANONICAL_SAMPLE_RATE,
    })
}

/// [`ReferenceAudioProcessor`] implementation over the blocking pipeline.
#[derive(Default, Clone, Copy)]
pub struct AudioNormalizer;

impl AudioNormalizer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReferenceAudioProcessor for AudioNormalizer {
    async fn probe_duration(&self, path: &Path) -> Result<f64, AudioError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || decode_file(&path).map(|d| d.duration_seconds()))
            .await
            .map_err(|e| AudioError::Decode(format!("probe task failed: {e}")))?
    }

    async fn normalize(&self, src: &Path, dest: &Path) -> Result<NormalizedReference, AudioError> {
        let src = src.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || normalize_reference(&src, &dest))
            .await
            .map_err(|e| AudioError::Decode(format!("normalize task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::{read_pcm, wav_bytes};
    use tempfile::tempdir;

    fn tone(seconds: f64, rate: u32) -> Vec<f32> {
        let n = (seconds * f64::from(rate)) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (t * 220.0 * std::f32::consts::TAU).sin() * 0.4
            })
            .collect()
    }

    #[test]
    fn resampling_halves_sample_count_from_48k() {
        let input = tone(1.0, 48_000);
        let out = resample_to_canonical(&input, 48_000).unwrap();
        let expected = 24_000usize;
        let tolerance = expected / 100;
        assert!(
            out.len().abs_diff(expected) <= tolerance,
            "expected ~{expected} samples, got {}",
            out.len()
        );
    }

    #[test]
    fn canonical_rate_passes_through() {
        let input = tone(0.5, CANONICAL_SAMPLE_RATE);
        let out = resample_to_canonical(&input, CANONICAL_SAMPLE_RATE).unwrap();
        assert_eq!(out.len(), input.len());
    }

    #[test]
    fn trims_edge_silence_only() {
        let rate = CANONICAL_SAMPLE_RATE;
        let mut samples = vec![0.0f32; rate as usize / 2];
        samples.extend(tone(1.0, rate));
        samples.extend(vec![0.0f32; rate as usize / 2]);

        let trimmed = trim_silence(&samples, rate);
        let seconds = trimmed.len() as f64 / f64::from(rate);
        assert!((0.95..=1.05).contains(&seconds), "trimmed to {seconds}s");
    }

    #[test]
    fn all_silence_trims_to_empty() {
        let samples = vec![0.0f32; 24_000];
        assert!(trim_silence(&samples, CANONICAL_SAMPLE_RATE).is_empty());
    }

    #[tokio::test]
    async fn normalize_writes_canonical_reference() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("upload.wav");
        let dest = dir.path().join("voice.pcm24k");

        let pcm = PcmAudio::new(tone(5.0, CANONICAL_SAMPLE_RATE), CANONICAL_SAMPLE_RATE);
        std::fs::write(&src, wav_bytes(&pcm)).unwrap();

        let normalizer = AudioNormalizer::new();
        let info = normalizer.normalize(&src, &dest).await.unwrap();
        assert_eq!(info.sample_rate, CANONICAL_SAMPLE_RATE);
        assert!((info.duration_seconds - 5.0).abs() < 0.1);

        let written = read_pcm(&dest).unwrap();
        assert!((written.duration_seconds() - 5.0).abs() < 0.1);
    }

    #[tokio::test]
    async fn short_reference_is_rejected_after_trim() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("short.wav");
        let dest = dir.path().join("voice.pcm24k");

        // 2 s of tone padded with silence: still short of the 3 s floor
        // once trimmed.
        let rate = CANONICAL_SAMPLE_RATE;
        let mut samples = vec![0.0f32; rate as usize];
        samples.extend(tone(2.0, rate));
        samples.extend(vec![0.0f32; rate as usize]);
        let pcm = PcmAudio::new(samples, rate);
        std::fs::write(&src, wav_bytes(&pcm)).unwrap();

        let err = AudioNormalizer::new()
            .normalize(&src, &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::TooShort { .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn over_long_reference_is_truncated_not_rejected() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("long.wav");
        let dest = dir.path().join("voice.pcm24k");

        let pcm = PcmAudio::new(tone(301.0, CANONICAL_SAMPLE_RATE), CANONICAL_SAMPLE_RATE);
        std::fs::write(&src, wav_bytes(&pcm)).unwrap();

        let info = AudioNormalizer::new().normalize(&src, &dest).await.unwrap();
        assert!((info.duration_seconds - MAX_REFERENCE_SECONDS).abs() < 1e-6);

        let written = read_pcm(&dest).unwrap();
        assert_eq!(
            written.samples.len(),
            (MAX_REFERENCE_SECONDS * f64::from(CANONICAL_SAMPLE_RATE)) as usize
        );
    }

    #[tokio::test]
    async fn probe_reports_container_duration() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("probe.wav");
        let pcm = PcmAudio::new(tone(4.0, CANONICAL_SAMPLE_RATE), CANONICAL_SAMPLE_RATE);
        std::fs::write(&src, wav_bytes(&pcm)).unwrap();

        let seconds = AudioNormalizer::new().probe_duration(&src).await.unwrap();
        assert!((seconds - 4.0).abs() < 0.05);
    }
}
