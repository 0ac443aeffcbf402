//! Synthesis engine for cantus.
//!
//! Implements the engine-side ports from `cantus-core`:
//!
//! - [`SynthesisFacade`] wraps the resident model behind serialized
//!   access, a deadline, retries and a circuit breaker.
//! - [`audio::AudioNormalizer`] canonicalizes uploaded reference audio.
//! - [`FfmpegTranscoder`] produces download containers.
//!
//! The model itself is a black box behind [`backend::SynthesisBackend`];
//! production talks to an inference sidecar over HTTP.

pub mod audio;
pub mod backend;
pub mod breaker;
pub mod denoise;
pub mod facade;
pub mod retry;
pub mod transcode;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use audio::AudioNormalizer;
pub use backend::{HttpSynthesisBackend, SynthesisBackend};
pub use breaker::{BreakerRegistry, CircuitBreaker};
pub use facade::SynthesisFacade;
pub use retry::RetryPolicy;
pub use transcode::FfmpegTranscoder;
