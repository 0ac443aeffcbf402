//! Canonical audio buffer and container formats.

use serde::{Deserialize, Serialize};

/// The canonical sample rate produced by the engine and stored on disk.
pub const CANONICAL_SAMPLE_RATE: u32 = 24_000;

/// A finite, real-valued, single-channel PCM buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmAudio {
    /// Interleaving-free mono samples in `[-1.0, 1.0]`.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmAudio {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Container formats the download endpoint can serve.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Flac,
    M4a,
    Opus,
}

impl AudioFormat {
    /// Content type served on download.
    #[must_use]
    pub fn mime(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Ogg => "audio/ogg",
            Self::Flac => "audio/flac",
            Self::M4a => "audio/mp4",
            Self::Opus => "audio/opus",
        }
    }

    /// File extension used in `Content-Disposition`.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Flac => "flac",
            Self::M4a => "m4a",
            Self::Opus => "opus",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_at_canonical_rate() {
        let pcm = PcmAudio::new(vec![0.0; 48_000], CANONICAL_SAMPLE_RATE);
        assert!((pcm.duration_seconds() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn format_parses_case_insensitively() {
        assert_eq!("WAV".parse::<AudioFormat>().unwrap(), AudioFormat::Wav);
        assert_eq!("Opus".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert!("aiff".parse::<AudioFormat>().is_err());
    }
}
