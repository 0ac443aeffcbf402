//! Synthesis backends.
//!
//! The facade drives a [`SynthesisBackend`]: the raw model call surface
//! with no retry, deadline or breaker around it. Production uses the
//! HTTP sidecar backend; tests use the scripted fake from
//! [`crate::testing`].

mod http;

pub use http::HttpSynthesisBackend;

use async_trait::async_trait;

use cantus_core::domain::PcmAudio;
use cantus_core::ports::{SynthesisError, SynthesisTask};
use cantus_core::settings::Device;

/// Raw access to the resident neural model.
///
/// Implementations report failures with the typed taxonomy so the facade
/// can decide retriability; they do not retry internally.
#[async_trait]
pub trait SynthesisBackend: Send + Sync {
    /// Load the model onto `device`. Called eagerly at startup; the
    /// first synthesis after a successful load must not pay load cost.
    async fn load(&self, device: Device) -> Result<(), SynthesisError>;

    /// One inference call. Not safe to invoke concurrently; the facade
    /// serializes.
    async fn synthesize(&self, task: &SynthesisTask) -> Result<PcmAudio, SynthesisError>;
}
