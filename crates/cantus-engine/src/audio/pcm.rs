//! Raw PCM artifact I/O and WAV framing.
//!
//! Artifacts and voice references are stored as headerless f32le mono at
//! the canonical rate (`*.pcm24k`). Writes are atomic: temp file in the
//! destination directory, fsync, rename, so a concurrent download never
//! observes a torn artifact.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};

/// Read a canonical `*.pcm24k` file.
pub fn read_pcm(path: &Path) -> std::io::Result<PcmAudio> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{} is not f32le-aligned ({} bytes)", path.display(), bytes.len()),
        ));
    }
    let samples = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(PcmAudio::new(samples, CANONICAL_SAMPLE_RATE))
}

/// Atomically write a canonical `*.pcm24k` file.
pub fn write_pcm_atomic(path: &Path, pcm: &PcmAudio) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Same directory, so the rename stays on one filesystem.
    let tmp = path.with_extension("pcm24k.tmp");
    {
        let mut file = File::create(&tmp)?;
        let mut bytes = Vec::with_capacity(pcm.samples.len() * 4);
        for sample in &pcm.samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Frame PCM as a 16-bit mono WAV byte stream.
#[must_use]
pub fn wav_bytes(pcm: &PcmAudio) -> Vec<u8> {
    let sample_rate = pcm.sample_rate;
    let data_len = (pcm.samples.len() * 2) as u32;
    let byte_rate = sample_rate * 2;

    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&1u16.to_le_bytes()); // mono
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // block align
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for sample in &pcm.samples {
        let clamped = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        out.extend_from_slice(&clamped.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn pcm_file_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.pcm24k");
        let pcm = PcmAudio::new(vec![0.0, 0.5, -0.5, 1.0], CANONICAL_SAMPLE_RATE);

        write_pcm_atomic(&path, &pcm).unwrap();
        let loaded = read_pcm(&path).unwrap();
        assert_eq!(loaded, pcm);

        // No temp file left behind.
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn wav_header_is_well_formed() {
        let pcm = PcmAudio::new(vec![0.0; 240], CANONICAL_SAMPLE_RATE);
        let wav = wav_bytes(&pcm);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 240 * 2);
        let rate = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
        assert_eq!(rate, CANONICAL_SAMPLE_RATE);
        let channels = u16::from_le_bytes([wav[22], wav[23]]);
        assert_eq!(channels, 1);
    }

    #[test]
    fn misaligned_pcm_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.pcm24k");
        std::fs::write(&path, [0u8; 7]).unwrap();
        let err = read_pcm(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
