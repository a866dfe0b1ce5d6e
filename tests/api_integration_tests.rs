//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycles against a file-backed cache and a
//! stand-in model server listening on a local port.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    routing::post,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tower::ServiceExt;
use voicecache::{
    api::create_router,
    boundary::HttpModelClient,
    cache::{codec, AudioClip, CacheStore, FileBackend, Session, Stage},
    pipeline::{PassthroughTransforms, Pipeline},
    workers::WorkerPools,
    AppState,
};

// == Helper Functions ==

/// Writes the requested output like a real model server would.
async fn fake_generate(State(store): State<CacheStore>, Json(body): Json<Value>) -> StatusCode {
    let session = match body["Session ID"].as_str() {
        Some(id) => Session::Id(id.to_string()),
        None => Session::Global,
    };
    let Some(output) = body["Output File"].as_str() else {
        return StatusCode::BAD_REQUEST;
    };
    let bytes = codec::encode(&AudioClip::mono(vec![0.5, -0.5, 0.25], 22050)).unwrap();
    match store
        .backend()
        .write_payload(Stage::Output, &session, output, bytes)
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn spawn_model_server(store: CacheStore) -> u16 {
    let app = Router::new()
        .route("/generate", post(fake_generate))
        .with_state(store);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

async fn create_test_app(root: &Path, session_isolation: bool) -> Router {
    let store = CacheStore::new(Arc::new(FileBackend::new(root)), 25);
    let port = spawn_model_server(store.clone()).await;
    let client = HttpModelClient::new(Some("127.0.0.1".into()), Duration::from_secs(10)).with_port(port);
    let pipeline = Pipeline::new(store, Arc::new(client), Arc::new(PassthroughTransforms));
    create_router(AppState::new(pipeline, WorkerPools::new(2, 1), session_isolation))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn wav_base64(samples: Vec<f32>) -> String {
    STANDARD.encode(codec::encode(&AudioClip::mono(samples, 16000)).unwrap())
}

async fn upload(app: &Router, session: &str, name: &str, samples: Vec<f32>) -> Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/sessions/{}/uploads", session),
            json!({"file_name": name, "audio": wav_base64(samples)}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    body_to_json(response.into_body()).await
}

fn generate_body(user_file: &str) -> Value {
    json!({
        "user_file": user_file,
        "preprocess": {"semitone_pitch": 2},
        "model": {"architecture": "so_vits_svc_4", "character": "Purple Smart"},
        "postprocess": {"output_speed": 1.0}
    })
}

// == Upload Endpoint Tests ==

#[tokio::test]
async fn test_upload_endpoint_success() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let json = upload(&app, "s1", "voice.wav", vec![0.1, 0.2]).await;
    assert_eq!(json["file_name"], "voice.wav");
    assert_eq!(json["cached"], false);
    assert_eq!(json["hash"].as_str().unwrap().len(), 20);

    let hash = json["hash"].as_str().unwrap();
    assert!(dir
        .path()
        .join(format!("sessions/s1/raw/{}.wav", hash))
        .exists());
    assert!(dir.path().join("sessions/s1/raw/metadata.json").exists());
}

#[tokio::test]
async fn test_upload_endpoint_dedupes_names_and_content() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let first = upload(&app, "s1", "voice.wav", vec![0.1]).await;
    let same = upload(&app, "s1", "voice.wav", vec![0.1]).await;
    let other = upload(&app, "s1", "voice.wav", vec![0.3]).await;

    assert_eq!(same["cached"], true);
    assert_eq!(same["hash"], first["hash"]);
    assert_eq!(other["file_name"], "voice (2).wav");

    let response = app.clone().oneshot(get("/sessions/s1/uploads")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    let files = json["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    // newest first
    assert_eq!(files[0]["file_name"], "voice (2).wav");
}

#[tokio::test]
async fn test_upload_endpoint_invalid_audio() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/sessions/s1/uploads",
            json!({"file_name": "x.wav", "audio": STANDARD.encode("not a wav file")}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "InvalidRequest");
}

#[tokio::test]
async fn test_upload_endpoint_invalid_session() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/sessions/bad.session/uploads",
            json!({"file_name": "x.wav", "audio": wav_base64(vec![0.1])}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "InvalidRequest");
}

// == Generate Endpoint Tests ==

#[tokio::test]
async fn test_generate_endpoint_full_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;
    upload(&app, "s1", "voice.wav", vec![0.1, 0.2, 0.3]).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/sessions/s1/generate", generate_body("voice.wav")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["stage"], "postprocessed");
    let audio_url = json["audio_url"].as_str().unwrap().to_string();

    let response = app.clone().oneshot(get(&audio_url)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/wav");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let clip = codec::decode(&bytes).unwrap();
    assert_eq!(clip.samples, vec![0.5, -0.5, 0.25]);

    let response = app.clone().oneshot(get("/sessions/s1/outputs")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    let outputs = json["outputs"].as_array().unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0]["metadata"]["Inputs"]["User File"], "voice.wav");
    let lineage = outputs[0]["lineage"].as_array().unwrap();
    let stages: Vec<&str> = lineage.iter().map(|e| e["stage"].as_str().unwrap()).collect();
    assert_eq!(stages, vec!["output", "preprocessed", "raw"]);
    assert_eq!(lineage[1]["record"]["Options"]["Semitone Pitch"], 2);
}

#[tokio::test]
async fn test_generate_endpoint_repeats_produce_new_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;
    upload(&app, "s1", "voice.wav", vec![0.1]).await;

    let mut hashes = Vec::new();
    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/sessions/s1/generate", generate_body("voice.wav")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        hashes.push(body_to_json(response.into_body()).await["hash"].clone());
    }
    assert_ne!(hashes[0], hashes[1]);

    let response = app.clone().oneshot(get("/stats")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    // second preprocessing step was answered from the cache
    assert_eq!(json["hits"], 1);
    assert_eq!(json["sessions"], 1);
}

#[tokio::test]
async fn test_generate_endpoint_unknown_file() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let response = app
        .oneshot(json_request("POST", "/sessions/s1/generate", generate_body("missing.wav")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_generate_endpoint_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/sessions/s1/generate",
            json!({"model": {"architecture": "rvc", "character": "X",
                "f0_extraction_method": "harvest", "index_ratio": 0.5,
                "voice_envelope_mix_ratio": 1.0,
                "voiceless_consonants_protection_ratio": 0.3},
                "user_text": "hi"}),
        ))
        .await
        .unwrap();

    // harvest without a filter radius
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// == Session Isolation Tests ==

#[tokio::test]
async fn test_sessions_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;
    upload(&app, "alice", "voice.wav", vec![0.1]).await;

    let response = app.clone().oneshot(get("/sessions/bob/uploads")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert!(json["files"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_isolation_off_uses_global_partition() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), false).await;
    let json = upload(&app, "alice", "voice.wav", vec![0.1]).await;

    let hash = json["hash"].as_str().unwrap();
    assert!(dir.path().join(format!("global/raw/{}.wav", hash)).exists());

    let response = app.clone().oneshot(get("/sessions/bob/uploads")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["files"].as_array().unwrap().len(), 1);
}

// == Purge Endpoint Tests ==

#[tokio::test]
async fn test_purge_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;
    let json = upload(&app, "s1", "voice.wav", vec![0.1]).await;
    let hash = json["hash"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/sessions/s1/cache/raw")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["stage"], "raw");

    let response = app
        .clone()
        .oneshot(get(&format!("/sessions/s1/audio/raw/{}", hash)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["error"], "NotFound");
}

// == Health Endpoint Tests ==

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(dir.path(), true).await;

    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "healthy");
}
