//! Baked voice preset references.
//!
//! Preset jobs resolve to pre-installed reference files under
//! `{voice_dir}/presets/`. Deployments ship real recordings there;
//! [`install_presets`] fills any gaps with synthetic placeholder tones so
//! a fresh install can serve preset jobs end to end.

use std::io::Write;
use std::path::{Path, PathBuf};

use cantus_core::domain::{VoicePreset, CANONICAL_SAMPLE_RATE};
use strum::IntoEnumIterator;

const PLACEHOLDER_SECONDS: f64 = 5.0;

/// Canonical reference path for a preset.
#[must_use]
pub fn preset_reference_path(voice_dir: &Path, preset: VoicePreset) -> PathBuf {
    voice_dir
        .join("presets")
        .join(format!("{}.pcm24k", preset.file_stem()))
}

/// Per-preset placeholder timbre: distinct fundamental per voice so the
/// eight presets stay distinguishable even without shipped recordings.
fn preset_fundamental(preset: VoicePreset) -> f32 {
    match preset {
        VoicePreset::FemaleGeneric => 220.0,
        VoicePreset::MaleGeneric => 120.0,
        VoicePreset::FemaleYoung => 260.0,
        VoicePreset::MaleDeep => 90.0,
        VoicePreset::FemaleWarm => 200.0,
        VoicePreset::MaleWarm => 130.0,
        VoicePreset::FemaleSoft => 240.0,
        VoicePreset::MaleSoft => 140.0,
    }
}

fn placeholder_samples(preset: VoicePreset) -> Vec<f32> {
    let fundamental = preset_fundamental(preset);
    let n = (PLACEHOLDER_SECONDS * f64::from(CANONICAL_SAMPLE_RATE)) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / CANONICAL_SAMPLE_RATE as f32;
            let base = (t * fundamental * std::f32::consts::TAU).sin();
            let second = (t * fundamental * 2.0 * std::f32::consts::TAU).sin() * 0.3;
            (base + second) * 0.4
        })
        .collect()
}

/// Install placeholder references for any preset missing on disk.
///
/// Existing files (including shipped recordings) are left untouched.
pub fn install_presets(voice_dir: &Path) -> std::io::Result<()> {
    for preset in VoicePreset::iter() {
        let path = preset_reference_path(voice_dir, preset);
        if path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("pcm24k.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            let mut bytes = Vec::new();
            for sample in placeholder_samples(preset) {
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        tracing::debug!(preset = %preset, path = %path.display(), "installed placeholder preset");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn installs_all_eight_presets() {
        let dir = tempdir().unwrap();
        install_presets(dir.path()).unwrap();

        for preset in VoicePreset::iter() {
            let path = preset_reference_path(dir.path(), preset);
            assert!(path.exists(), "missing {}", path.display());
            let len = std::fs::metadata(&path).unwrap().len();
            // 5 s of f32le at 24 kHz.
            assert_eq!(len, (PLACEHOLDER_SECONDS * 24_000.0) as u64 * 4);
        }
    }

    #[test]
    fn existing_references_are_kept() {
        let dir = tempdir().unwrap();
        let path = preset_reference_path(dir.path(), VoicePreset::MaleDeep);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"shipped recording").unwrap();

        install_presets(dir.path()).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"shipped recording");
    }
}
