//! Container transcoding for the download endpoint.
//!
//! WAV is framed natively; every other container shells out to `ffmpeg`,
//! which is treated as an external collaborator: probed once at startup,
//! and the formats it would handle are simply not offered when it is
//! absent.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use cantus_core::domain::{AudioFormat, PcmAudio};
use cantus_core::ports::{TranscodeError, Transcoder};

pub struct FfmpegTranscoder {
    ffmpeg: Option<PathBuf>,
}

impl FfmpegTranscoder {
    /// Probe the host for `ffmpeg`.
    #[must_use]
    pub fn detect() -> Self {
        let ffmpeg = which::which("ffmpeg").ok();
        match &ffmpeg {
            Some(path) => tracing::info!(path = %path.display(), "ffmpeg found, all formats offered"),
            None => tracing::warn!("ffmpeg not found, downloads limited to wav"),
        }
        Self { ffmpeg }
    }

    /// Explicit binary path, for tests and containers with fixed layouts.
    #[must_use]
    pub fn with_path(path: Option<PathBuf>) -> Self {
        Self { ffmpeg: path }
    }

    fn ffmpeg_args(format: AudioFormat, sample_rate: u32) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            // Input: raw f32le mono on stdin.
            "-f".to_string(),
            "f32le".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-i".to_string(),
            "pipe:0".to_string(),
        ];
        let (muxer, codec): (&str, Option<&str>) = match format {
            AudioFormat::Mp3 => ("mp3", None),
            AudioFormat::Ogg => ("ogg", Some("libvorbis")),
            AudioFormat::Flac => ("flac", None),
            // Raw m4a needs a streamable mp4 muxer when writing to a pipe.
            AudioFormat::M4a => ("mp4", Some("aac")),
            AudioFormat::Opus => ("opus", Some("libopus")),
            AudioFormat::Wav => ("wav", None),
        };
        if let Some(codec) = codec {
            args.push("-c:a".to_string());
            args.push(codec.to_string());
        }
        if format == AudioFormat::M4a {
            args.push("-movflags".to_string());
            args.push("frag_keyframe+empty_moov".to_string());
        }
        args.extend(["-f".to_string(), muxer.to_string(), "pipe:1".to_string()]);
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        pcm: &PcmAudio,
        format: AudioFormat,
    ) -> Result<Vec<u8>, TranscodeError> {
        if format == AudioFormat::Wav {
            return Ok(crate::audio::wav_bytes(pcm));
        }
        let Some(ffmpeg) = &self.ffmpeg else {
            return Err(TranscodeError::Unavailable(format));
        };

        let mut child = Command::new(ffmpeg)
            .args(Self::ffmpeg_args(format, pcm.sample_rate))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let mut input = Vec::with_capacity(pcm.samples.len() * 4);
        for sample in &pcm.samples {
            input.extend_from_slice(&sample.to_le_bytes());
        }

        // Feed stdin from its own task so a full stdout pipe cannot
        // deadlock against a blocked write.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| TranscodeError::Tool("ffmpeg stdin unavailable".to_string()))?;
        let writer = tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
            let _ = stdin.shutdown().await;
        });

        let output = child.wait_with_output().await?;
        let _ = writer.await;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TranscodeError::Tool(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if output.stdout.is_empty() {
            return Err(TranscodeError::Tool(
                "ffmpeg produced no output".to_string(),
            ));
        }
        Ok(output.stdout)
    }

    fn available_formats(&self) -> Vec<AudioFormat> {
        if self.ffmpeg.is_some() {
            vec![
                AudioFormat::Wav,
                AudioFormat::Mp3,
                AudioFormat::Ogg,
                AudioFormat::Flac,
                AudioFormat::M4a,
                AudioFormat::Opus,
            ]
        } else {
            vec![AudioFormat::Wav]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_core::domain::CANONICAL_SAMPLE_RATE;

    fn tone() -> PcmAudio {
        let samples = (0..24_000)
            .map(|i| {
                let t = i as f32 / CANONICAL_SAMPLE_RATE as f32;
                (t * 440.0 * std::f32::consts::TAU).sin() * 0.5
            })
            .collect();
        PcmAudio::new(samples, CANONICAL_SAMPLE_RATE)
    }

    #[tokio::test]
    async fn wav_needs_no_ffmpeg() {
        let transcoder = FfmpegTranscoder::with_path(None);
        let bytes = transcoder.transcode(&tone(), AudioFormat::Wav).await.unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
    }

    #[tokio::test]
    async fn other_formats_unavailable_without_ffmpeg() {
        let transcoder = FfmpegTranscoder::with_path(None);
        let err = transcoder
            .transcode(&tone(), AudioFormat::Mp3)
            .await
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Unavailable(AudioFormat::Mp3)));
        assert_eq!(transcoder.available_formats(), vec![AudioFormat::Wav]);
    }

    #[tokio::test]
    async fn mp3_via_ffmpeg_when_present() {
        let Ok(path) = which::which("ffmpeg") else {
            return;
        };
        let transcoder = FfmpegTranscoder::with_path(Some(path));
        let bytes = transcoder.transcode(&tone(), AudioFormat::Mp3).await.unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(transcoder.available_formats().len(), 6);
    }
}
