//! Spectral-gating noise reduction.
//!
//! Applied after synthesis for profiles with `denoise = true`. Classic
//! short-time spectral gate: estimate a per-bin noise floor from the
//! quietest frames, attenuate bins that do not rise above it, resynthesize
//! by overlap-add.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use cantus_core::domain::PcmAudio;

const FRAME_LEN: usize = 1024;
const HOP: usize = FRAME_LEN / 4;
/// Fraction of frames (by energy, quietest first) used for the noise
/// profile.
const NOISE_FRAME_FRACTION: f64 = 0.1;
/// Gate threshold relative to the noise floor.
const OVER_SUBTRACTION: f32 = 1.5;
/// Attenuation floor; gated bins keep this fraction of their magnitude
/// to avoid musical-noise artifacts.
const GAIN_FLOOR: f32 = 0.1;

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let phase = std::f32::consts::TAU * i as f32 / len as f32;
            0.5 * (1.0 - phase.cos())
        })
        .collect()
}

/// Gate `pcm` and return the cleaned buffer. Inputs shorter than one
/// analysis frame pass through unchanged.
#[must_use]
pub fn spectral_gate(pcm: &PcmAudio) -> PcmAudio {
    if pcm.samples.len() < FRAME_LEN {
        return pcm.clone();
    }

    let window = hann_window(FRAME_LEN);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(FRAME_LEN);
    let ifft = planner.plan_fft_inverse(FRAME_LEN);

    // STFT
    let frame_count = (pcm.samples.len() - FRAME_LEN) / HOP + 1;
    let mut spectra: Vec<Vec<Complex<f32>>> = Vec::with_capacity(frame_count);
    let mut frame_energy: Vec<(usize, f32)> = Vec::with_capacity(frame_count);
    for frame_idx in 0..frame_count {
        let start = frame_idx * HOP;
        let mut buf: Vec<Complex<f32>> = pcm.samples[start..start + FRAME_LEN]
            .iter()
            .zip(&window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        fft.process(&mut buf);
        let energy: f32 = buf.iter().map(|c| c.norm_sqr()).sum();
        frame_energy.push((frame_idx, energy));
        spectra.push(buf);
    }

    // Noise floor: per-bin mean magnitude over the quietest frames.
    frame_energy.sort_by(|a, b| a.1.total_cmp(&b.1));
    let noise_frames = ((frame_count as f64 * NOISE_FRAME_FRACTION).ceil() as usize).max(1);
    let mut noise_floor = vec![0.0f32; FRAME_LEN];
    for (frame_idx, _) in frame_energy.iter().take(noise_frames) {
        for (bin, value) in spectra[*frame_idx].iter().enumerate() {
            noise_floor[bin] += value.norm();
        }
    }
    for value in &mut noise_floor {
        *value /= noise_frames as f32;
    }

    // Gate and resynthesize.
    let mut out = vec![0.0f32; pcm.samples.len()];
    let mut weight = vec![0.0f32; pcm.samples.len()];
    let scale = 1.0 / FRAME_LEN as f32;
    for (frame_idx, spectrum) in spectra.iter_mut().enumerate() {
        for (bin, value) in spectrum.iter_mut().enumerate() {
            let magnitude = value.norm();
            let threshold = noise_floor[bin] * OVER_SUBTRACTION;
            let gain = if magnitude <= f32::EPSILON {
                GAIN_FLOOR
            } else {
                (((magnitude - threshold) / magnitude).max(GAIN_FLOOR)).min(1.0)
            };
            *value *= gain;
        }
        ifft.process(spectrum);

        let start = frame_idx * HOP;
        for (offset, value) in spectrum.iter().enumerate() {
            let w = window[offset];
            out[start + offset] += value.re * scale * w;
            weight[start + offset] += w * w;
        }
    }
    for (sample, w) in out.iter_mut().zip(&weight) {
        if *w > f32::EPSILON {
            *sample /= *w;
        }
    }

    PcmAudio::new(out, pcm.sample_rate)
}
