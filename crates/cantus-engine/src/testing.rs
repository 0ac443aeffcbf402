//! Scripted fake backend for tests.
//!
//! Kept behind the `test-utils` feature so the worker and HTTP crates
//! can drive full job lifecycles without a sidecar.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};
use cantus_core::ports::{SynthesisError, SynthesisTask};
use cantus_core::settings::Device;

use crate::backend::SynthesisBackend;

/// Fake [`SynthesisBackend`] with a scripted outcome queue.
///
/// With an empty script every call succeeds with a one-second tone, so
/// happy-path tests need no setup.
#[derive(Default)]
pub struct FakeBackend {
    script: Mutex<VecDeque<Result<PcmAudio, SynthesisError>>>,
    synthesize_calls: AtomicU32,
    load_calls: AtomicU32,
    fail_load_on: Mutex<Option<Device>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mono test tone at the canonical rate.
    #[must_use]
    pub fn sine(seconds: f64) -> PcmAudio {
        let n = (seconds * f64::from(CANONICAL_SAMPLE_RATE)) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f32 / CANONICAL_SAMPLE_RATE as f32;
                (t * 440.0 * std::f32::consts::TAU).sin() * 0.5
            })
            .collect();
        PcmAudio::new(samples, CANONICAL_SAMPLE_RATE)
    }

    pub fn push_ok(&self, pcm: PcmAudio) {
        self.script.lock().unwrap().push_back(Ok(pcm));
    }

    pub fn push_err(&self, err: SynthesisError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    /// Make `load` fail for one device (CPU-fallback tests).
    pub fn fail_load_on(&self, device: Device) {
        *self.fail_load_on.lock().unwrap() = Some(device);
    }

    /// Delay every synthesis call (deadline tests).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    #[must_use]
    pub fn synthesize_calls(&self) -> u32 {
        self.synthesize_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn load_calls(&self) -> u32 {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisBackend for FakeBackend {
    async fn load(&self, device: Device) -> Result<(), SynthesisError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_load_on.lock().unwrap() == Some(device) {
            return Err(SynthesisError::TransientBackend(format!(
                "no {device} device available"
            )));
        }
        Ok(())
    }

    async fn synthesize(&self, _task: &SynthesisTask) -> Result<PcmAudio, SynthesisError> {
        self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(Self::sine(1.0)),
        }
    }
}
