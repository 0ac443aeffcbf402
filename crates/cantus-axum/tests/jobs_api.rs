//! Integration tests for the `/jobs` and `/voices` endpoints: the full
//! request → queue → worker → artifact → download path with only the
//! neural backend faked.

mod common;

use axum::http::StatusCode;

use cantus_core::domain::{Job, JobMode, SynthesisCommand, VoicePreset};

use common::{body_bytes, clone_multipart, parse_json, spawn_app, tone_wav};

const VALID_FORM: &str =
    "mode=preset&text=Hello%2C%20world.&source_language=en&voice_preset=female_generic";

#[tokio::test]
async fn preset_synthesis_end_to_end() {
    let app = spawn_app().await;

    // Submit.
    let response = app.post_form("/jobs", VALID_FORM).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let header_request_id = response
        .headers()
        .get("x-request-id")
        .expect("X-Request-ID header")
        .to_str()
        .unwrap()
        .to_string();
    let job = parse_json(response).await;
    assert_eq!(job["status"], "queued");
    assert_eq!(job["request_id"], header_request_id.as_str());
    let id = job["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    // Poll to completion.
    let done = app.wait_for_job(&id).await;
    assert_eq!(done["status"], "completed");
    assert_eq!(done["progress"], 1.0);
    assert!(done["download_url"].as_str().is_some());

    // Download as WAV and check the container header.
    let response = app.get(&format!("/jobs/{id}/download?format=wav")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "audio/wav"
    );
    let disposition = response
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(&id));
    assert!(disposition.ends_with(".wav\""));
    let bytes = body_bytes(response).await;
    assert_eq!(&bytes[0..4], b"RIFF");
    let rate = u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]);
    assert_eq!(rate, 24_000);
    let channels = u16::from_le_bytes([bytes[22], bytes[23]]);
    assert_eq!(channels, 1);

    // Formats include wav regardless of host codecs.
    let response = app.get(&format!("/jobs/{id}/formats")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let formats = parse_json(response).await;
    assert!(formats["formats"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "wav"));

    // Delete is idempotent at the 404 level.
    assert_eq!(
        app.delete(&format!("/jobs/{id}")).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.get(&format!("/jobs/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.delete(&format!("/jobs/{id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn validation_errors_are_structured() {
    let app = spawn_app().await;

    // Unknown enum value: accepted set is listed.
    let response = app
        .post_form(
            "/jobs",
            "mode=psychic&text=hi&source_language=en&voice_preset=female_generic",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json(response).await;
    assert_eq!(body["error_kind"], "validation_error");
    assert!(body["request_id"].as_str().is_some());
    let accepted = body["details"][0]["accepted"].as_array().unwrap();
    assert!(accepted.iter().any(|v| v == "preset"));
    assert!(accepted.iter().any(|v| v == "voice_clone"));

    // Missing text.
    let response = app
        .post_form("/jobs", "mode=preset&source_language=en&voice_preset=male_deep")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Bad language shape.
    let response = app
        .post_form(
            "/jobs",
            "mode=preset&text=hi&source_language=english&voice_preset=male_deep",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // voice_clone without a profile id.
    let response = app
        .post_form("/jobs", "mode=voice_clone&text=hi&source_language=en")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown quality profile.
    let response = app
        .post_form(
            "/jobs",
            "mode=preset&text=hi&source_language=en&voice_preset=male_deep&quality_profile_id=nope",
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json(response).await;
    assert_eq!(body["details"][0]["field"], "quality_profile_id");
}

#[tokio::test]
async fn enum_coercion_is_case_insensitive() {
    let app = spawn_app().await;
    let response = app
        .post_form(
            "/jobs",
            "mode=PRESET&text=hi&source_language=EN&voice_preset=Female_Warm",
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job = parse_json(response).await;
    assert_eq!(job["voice_preset"], "female_warm");
    assert_eq!(job["source_language"], "en");
}

#[tokio::test]
async fn download_before_completion_is_a_conflict() {
    let app = spawn_app().await;

    // Insert a queued job directly; no broker message means no worker
    // will touch it.
    let job = Job::new_synthesis(
        SynthesisCommand {
            mode: JobMode::Preset,
            text: "pending".to_string(),
            source_language: "en".to_string(),
            target_language: "en".to_string(),
            voice_preset: Some(VoicePreset::MaleGeneric),
            voice_profile_id: None,
            quality_profile_id: None,
        },
        "req-pending".to_string(),
    );
    app.ctx.jobs.insert(&job).await.unwrap();

    let response = app.get(&format!("/jobs/{}/download", job.id)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_json(response).await;
    assert_eq!(body["error_kind"], "conflict");

    // Unknown formats are rejected before the status check matters.
    let response = app
        .get(&format!("/jobs/{}/download?format=aiff", job.id))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_paginates_and_validates_page_size() {
    let app = spawn_app().await;
    for i in 0..5 {
        let job = Job::new_synthesis(
            SynthesisCommand {
                mode: JobMode::Preset,
                text: format!("text {i}"),
                source_language: "en".to_string(),
                target_language: "en".to_string(),
                voice_preset: Some(VoicePreset::FemaleSoft),
                voice_profile_id: None,
                quality_profile_id: None,
            },
            format!("req-{i}"),
        );
        app.ctx.jobs.insert(&job).await.unwrap();
    }

    let response = app.get("/jobs?page=1&page_size=2").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = parse_json(response).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["total"], 5);

    let response = app.get("/jobs?page_size=101").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.get("/jobs?status=queued").await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = parse_json(response).await;
    assert_eq!(page["total"], 5);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = spawn_app().await;
    assert_eq!(
        app.get("/jobs/not-a-uuid").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.get("/jobs/00000000-0000-4000-8000-000000000000")
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn shutdown_refuses_new_jobs() {
    let app = spawn_app().await;
    app.ctx.begin_shutdown();

    let response = app.post_form("/jobs", VALID_FORM).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Reads still work while draining.
    let response = app.get("/jobs").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn clone_then_use_flow() {
    let app = spawn_app().await;

    // Clone submission.
    let (content_type, body) = clone_multipart(&tone_wav(10.0), "Alice", "en", "audio/wav");
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header("content-type", content_type)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = parse_json(response).await;
    let job_id = accepted["job_id"].as_str().unwrap().to_string();

    // Clone completion carries the new voice id, no artifact.
    let done = app.wait_for_job(&job_id).await;
    assert_eq!(done["status"], "completed");
    assert!(done["download_url"].as_str().is_none());
    let voice_id = done["voice_id"].as_str().unwrap().to_string();

    // The catalog shows it.
    let response = app.get("/voices").await;
    let voices = parse_json(response).await;
    assert!(voices
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["id"] == voice_id.as_str()));
    let response = app.get(&format!("/voices/{voice_id}")).await;
    let profile = parse_json(response).await;
    assert_eq!(profile["name"], "Alice");
    assert_eq!(profile["sample_rate"], 24_000);
    assert_eq!(profile["usage_count"], 0);

    // Synthesize with the cloned voice.
    let response = app
        .post_form(
            "/jobs",
            &format!(
                "mode=voice_clone&text=One%20more%20test.&source_language=en&voice_profile_id={voice_id}"
            ),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let job = parse_json(response).await;
    let done = app.wait_for_job(job["id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "completed");

    let response = app.get(&format!("/voices/{voice_id}")).await;
    let profile = parse_json(response).await;
    assert_eq!(profile["usage_count"], 1);

    // Cleanup path.
    assert_eq!(
        app.delete(&format!("/voices/{voice_id}")).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        app.get(&format!("/voices/{voice_id}")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn clone_upload_gates() {
    let app = spawn_app().await;

    // Wrong MIME.
    let (content_type, body) = clone_multipart(&tone_wav(10.0), "Alice", "en", "video/mp4");
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header("content-type", content_type)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Too short (2 s < 3 s floor), caught by the duration probe.
    let (content_type, body) = clone_multipart(&tone_wav(2.0), "Alice", "en", "audio/wav");
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header("content-type", content_type)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_json(response).await;
    assert_eq!(body["error_kind"], "validation_error");

    // Missing name field.
    let mut no_name = Vec::new();
    no_name.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"r.wav\"\r\n\
             Content-Type: audio/wav\r\n\r\n",
            b = common::MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    no_name.extend_from_slice(&tone_wav(5.0));
    no_name.extend_from_slice(format!("\r\n--{}--\r\n", common::MULTIPART_BOUNDARY).as_bytes());
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", common::MULTIPART_BOUNDARY),
                )
                .body(axum::body::Body::from(no_name))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn over_long_clone_upload_is_clamped_not_rejected() {
    let app = spawn_app().await;

    // 301 s of clean audio: past the 300 s ceiling, which truncates
    // rather than rejects.
    let (content_type, body) = clone_multipart(&tone_wav(301.0), "Marathon", "en", "audio/wav");
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header("content-type", content_type)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = parse_json(response).await;

    let done = app.wait_for_job(accepted["job_id"].as_str().unwrap()).await;
    assert_eq!(done["status"], "completed");
    let voice_id = done["voice_id"].as_str().unwrap().to_string();

    let profile = parse_json(app.get(&format!("/voices/{voice_id}")).await).await;
    assert_eq!(profile["duration_seconds"], 300.0);
}

#[tokio::test]
async fn voice_delete_conflicts_while_referenced() {
    let app = spawn_app().await;

    // Create a voice via the full clone flow.
    let (content_type, body) = clone_multipart(&tone_wav(10.0), "Pinned", "en", "audio/wav");
    let response = app
        .request(
            axum::http::Request::builder()
                .method("POST")
                .uri("/voices/clone")
                .header("content-type", content_type)
                .body(axum::body::Body::from(body))
                .unwrap(),
        )
        .await;
    let accepted = parse_json(response).await;
    let done = app.wait_for_job(accepted["job_id"].as_str().unwrap()).await;
    let voice_id = done["voice_id"].as_str().unwrap().to_string();

    // Pin it with a queued job inserted straight into the store.
    let job = Job::new_synthesis(
        SynthesisCommand {
            mode: JobMode::VoiceClone,
            text: "pinned".to_string(),
            source_language: "en".to_string(),
            target_language: "en".to_string(),
            voice_preset: None,
            voice_profile_id: Some(
                cantus_core::domain::VoiceProfileId::parse(&voice_id).unwrap(),
            ),
            quality_profile_id: None,
        },
        "req-pin".to_string(),
    );
    app.ctx.jobs.insert(&job).await.unwrap();

    let response = app.delete(&format!("/voices/{voice_id}")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_json(response).await;
    assert_eq!(body["error_kind"], "conflict");
}

#[tokio::test]
async fn health_reports_ready() {
    let app = spawn_app().await;
    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["engine"]["model_loaded"], true);
    assert_eq!(body["store"]["reachable"], true);
}
