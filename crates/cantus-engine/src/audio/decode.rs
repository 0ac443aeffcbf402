//! Container decoding for uploaded reference audio.
//!
//! Uploads arrive as wav/mp3/ogg/flac/m4a; rodio's symphonia decoders
//! turn them into interleaved f32 samples. Decoding is CPU-bound and
//! blocking; async callers wrap these in `spawn_blocking`.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::Source;

use cantus_core::ports::AudioError;

/// Decoded upload, still interleaved at its native rate.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub interleaved: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Duration in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        self.interleaved.len() as f64
            / f64::from(self.channels)
            / f64::from(self.sample_rate)
    }
}

/// Decode a whole container file.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, AudioError> {
    let file = File::open(path)?;
    let decoder = rodio::Decoder::new(BufReader::new(file))
        .map_err(|e| AudioError::Decode(e.to_string()))?;

    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::Decode(format!(
            "{}: reported {channels} channels at {sample_rate} Hz",
            path.display()
        )));
    }

    let interleaved: Vec<f32> = decoder.convert_samples::<f32>().collect();
    if interleaved.is_empty() {
        return Err(AudioError::Decode(format!(
            "{}: decoded zero samples",
            path.display()
        )));
    }

    Ok(DecodedAudio {
        interleaved,
        channels,
        sample_rate,
    })
}

/// Average interleaved channels down to mono.
#[must_use]
pub fn downmix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    let channels = usize::from(channels);
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::pcm::wav_bytes;
    use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};
    use tempfile::tempdir;

    #[test]
    fn wav_file_decodes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ref.wav");
        let pcm = PcmAudio::new(vec![0.25; 24_000], CANONICAL_SAMPLE_RATE);
        std::fs::write(&path, wav_bytes(&pcm)).unwrap();

        let decoded = decode_file(&path).unwrap();
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.sample_rate, CANONICAL_SAMPLE_RATE);
        assert!((decoded.duration_seconds() - 1.0).abs() < 0.01);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(matches!(decode_file(&path), Err(AudioError::Decode(_))));
    }

    #[test]
    fn stereo_downmix_averages_frames() {
        let interleaved = vec![1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        let mono = downmix_to_mono(&interleaved, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn mono_downmix_is_identity() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }
}
