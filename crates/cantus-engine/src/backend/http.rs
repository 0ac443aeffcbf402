//! HTTP backend for the resident inference sidecar.
//!
//! The model lives in a separate long-running process that shares the
//! host filesystem; requests carry the reference-audio path rather than
//! the samples. The sidecar answers synthesis calls with raw f32le PCM
//! at 24 kHz and failures as JSON `{error, kind}` so they can be mapped
//! onto the taxonomy without string matching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};
use cantus_core::ports::{SynthesisError, SynthesisTask};
use cantus_core::settings::Device;

use super::SynthesisBackend;

#[derive(Debug, Serialize)]
struct LoadRequest {
    device: Device,
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    language: &'a str,
    reference_path: String,
    temperature: f64,
    top_p: f64,
    top_k: u32,
    repetition_penalty: f64,
    length_penalty: f64,
    speed: f64,
    enable_text_splitting: bool,
}

#[derive(Debug, Deserialize)]
struct SidecarError {
    error: String,
    #[serde(default)]
    kind: Option<String>,
}

pub struct HttpSynthesisBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSynthesisBackend {
    /// `base_url` without a trailing slash, e.g. `http://127.0.0.1:8201`.
    ///
    /// The client carries no request timeout; the facade owns the
    /// deadline.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn transport_error(e: reqwest::Error) -> SynthesisError {
        // Connection-level failures are retriable: the sidecar may be
        // restarting under us.
        if e.is_connect() || e.is_request() {
            SynthesisError::TransientBackend(e.to_string())
        } else {
            SynthesisError::Internal(e.to_string())
        }
    }

    async fn map_error_response(response: reqwest::Response) -> SynthesisError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if let Ok(err) = serde_json::from_str::<SidecarError>(&body) {
            return match err.kind.as_deref() {
                Some("out_of_memory") => SynthesisError::OutOfMemory(err.error),
                Some("transient_backend") => SynthesisError::TransientBackend(err.error),
                Some("invalid_input") => SynthesisError::InvalidInput(err.error),
                _ => SynthesisError::Internal(err.error),
            };
        }
        if status.as_u16() == 503 {
            return SynthesisError::TransientBackend(format!("sidecar unavailable: {body}"));
        }
        SynthesisError::Internal(format!("sidecar returned {status}: {body}"))
    }
}

#[async_trait]
impl SynthesisBackend for HttpSynthesisBackend {
    async fn load(&self, device: Device) -> Result<(), SynthesisError> {
        let response = self
            .client
            .post(format!("{}/v1/load", self.base_url))
            .json(&LoadRequest { device })
            .send()
            .await
            .map_err(Self::transport_error)?;

        if response.status().is_success() {
            tracing::info!(%device, "model loaded");
            Ok(())
        } else {
            Err(Self::map_error_response(response).await)
        }
    }

    async fn synthesize(&self, task: &SynthesisTask) -> Result<PcmAudio, SynthesisError> {
        let request = SynthesizeRequest {
            text: &task.text,
            language: &task.language,
            reference_path: task.reference_audio_path.to_string_lossy().into_owned(),
            temperature: task.params.temperature,
            top_p: task.params.top_p,
            top_k: task.params.top_k,
            repetition_penalty: task.params.repetition_penalty,
            length_penalty: task.params.length_penalty,
            speed: task.params.speed,
            enable_text_splitting: task.params.enable_text_splitting,
        };

        let response = self
            .client
            .post(format!("{}/v1/synthesize", self.base_url))
            .header("X-Request-ID", &task.request_id)
            .json(&request)
            .send()
            .await
            .map_err(Self::transport_error)?;

        if !response.status().is_success() {
            return Err(Self::map_error_response(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::TransientBackend(e.to_string()))?;
        if bytes.len() % 4 != 0 {
            return Err(SynthesisError::Internal(format!(
                "sidecar returned a truncated PCM stream ({} bytes)",
                bytes.len()
            )));
        }

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        if samples.is_empty() {
            return Err(SynthesisError::Internal(
                "sidecar returned an empty PCM stream".to_string(),
            ));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(SynthesisError::Internal(
                "sidecar returned non-finite samples".to_string(),
            ));
        }

        Ok(PcmAudio::new(samples, CANONICAL_SAMPLE_RATE))
    }
}
