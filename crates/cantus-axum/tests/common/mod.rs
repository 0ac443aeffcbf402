//! Shared harness for HTTP integration tests: full service wiring over
//! an on-disk test database, temp data dirs and the scripted fake
//! backend.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use cantus_axum::bootstrap::bootstrap_with_backend;
use cantus_axum::routes::create_router;
use cantus_axum::state::AppState;
use cantus_core::domain::{PcmAudio, CANONICAL_SAMPLE_RATE};
use cantus_core::settings::{Device, Settings};
use cantus_engine::audio::wav_bytes;
use cantus_engine::testing::FakeBackend;
use cantus_worker::WorkerPool;

pub struct TestApp {
    pub router: Router,
    pub ctx: AppState,
    pub backend: Arc<FakeBackend>,
    pub workers: WorkerPool,
    pub tmp: TempDir,
}

pub async fn spawn_app() -> TestApp {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().to_path_buf();
    let settings = Settings {
        device: Device::Cpu,
        max_concurrent_jobs: 2,
        artifact_dir: data_dir.join("artifacts"),
        voice_dir: data_dir.join("voice_profiles"),
        upload_dir: data_dir.join("uploads"),
        database_path: data_dir.join("test.db"),
        data_dir,
        ..Settings::default()
    };

    let backend = Arc::new(FakeBackend::new());
    let (ctx, workers) = bootstrap_with_backend(settings, backend.clone())
        .await
        .unwrap();
    let router = create_router(ctx.clone());

    TestApp {
        router,
        ctx,
        backend,
        workers,
        tmp,
    }
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_form(&self, path: &str, form: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(form.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, path: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("POST")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn patch_json(&self, path: &str, body: serde_json::Value) -> Response<Body> {
        self.request(
            Request::builder()
                .method("PATCH")
                .uri(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, path: &str) -> Response<Body> {
        self.request(
            Request::builder()
                .method("DELETE")
                .uri(path)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Poll `GET /jobs/{id}` until the job is terminal.
    pub async fn wait_for_job(&self, job_id: &str) -> serde_json::Value {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            let response = self.get(&format!("/jobs/{job_id}")).await;
            assert_eq!(response.status(), StatusCode::OK);
            let job = parse_json(response).await;
            let status = job["status"].as_str().unwrap().to_string();
            if status == "completed" || status == "failed" {
                return job;
            }
            assert!(
                std::time::Instant::now() < deadline,
                "job {job_id} did not settle in time (status: {status})"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn parse_json(response: Response<Body>) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("expected valid JSON body: {e}"))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

/// A mono test tone WAV of the given length.
pub fn tone_wav(seconds: f64) -> Vec<u8> {
    let n = (seconds * f64::from(CANONICAL_SAMPLE_RATE)) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f32 / CANONICAL_SAMPLE_RATE as f32;
            (t * 200.0 * std::f32::consts::TAU).sin() * 0.4
        })
        .collect();
    wav_bytes(&PcmAudio::new(samples, CANONICAL_SAMPLE_RATE))
}

pub const MULTIPART_BOUNDARY: &str = "cantus-test-boundary";

/// Hand-rolled multipart body for clone submissions.
pub fn clone_multipart(
    wav: &[u8],
    name: &str,
    language: &str,
    content_type: &str,
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"ref.wav\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(wav);
    body.extend_from_slice(b"\r\n");
    for (field, value) in [("name", name), ("language", language)] {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        body,
    )
}
