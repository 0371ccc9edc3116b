use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use base64::Engine;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

use fixpix_session_core::api::server::{build_router_with_state, AppState};
use fixpix_session_core::pipeline::transform::{
    AnalysisService, TransformError, TransformRequest, TransformResponse, TransformService,
};
use fixpix_session_core::pipeline::TransformStep;
use fixpix_session_core::session::insight::AnalysisReport;
use fixpix_session_core::session::SessionOptions;
use fixpix_session_core::storage::artifact::ImageArtifact;

#[derive(Default)]
struct SuffixTransforms {
    fail_on: Option<TransformStep>,
}

impl TransformService for SuffixTransforms {
    fn apply(&self, request: TransformRequest) -> BoxFuture<'_, Result<TransformResponse, TransformError>> {
        Box::pin(async move {
            if self.fail_on == Some(request.step) {
                return Err(TransformError::remote("http_500", "model crashed"));
            }
            let mut bytes = request.artifact.as_bytes().to_vec();
            bytes.push(b'+');
            bytes.extend_from_slice(request.step.as_str().as_bytes());
            Ok(TransformResponse {
                artifact: ImageArtifact::from_bytes(bytes).expect("artifact"),
            })
        })
    }
}

struct GrayscaleAnalysis;

impl AnalysisService for GrayscaleAnalysis {
    fn analyze(&self, _artifact: ImageArtifact) -> BoxFuture<'_, Result<AnalysisReport, TransformError>> {
        Box::pin(async move {
            Ok(serde_json::from_value(json!({ "isGrayscale": true, "facesDetected": 1 }))
                .expect("report json"))
        })
    }
}

fn test_app(transforms: SuffixTransforms) -> Router {
    let state = AppState::new(
        Arc::new(transforms),
        Arc::new(GrayscaleAnalysis),
        Url::parse("http://127.0.0.1:9").expect("media base"),
        SessionOptions::default(),
    );
    build_router_with_state(state)
}

fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn send_json(app: Router, method: Method, uri: &str, body: Value, expected_status: StatusCode) -> Value {
    let body = if body.is_null() {
        Body::empty()
    } else {
        Body::from(body.to_string())
    };
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .expect("request should build"),
        )
        .await
        .expect("request should succeed");
    assert_eq!(response.status(), expected_status);
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body should be readable");
    serde_json::from_slice(&bytes).expect("response should be valid JSON")
}

async fn create_session(app: &Router) -> String {
    let created = send_json(
        app.clone(),
        Method::POST,
        "/api/sessions",
        json!({ "source_base64": encode(b"pristine"), "project_id": "album-7" }),
        StatusCode::CREATED,
    )
    .await;
    assert_eq!(created["ok"], json!(true));
    created["data"]["id"]
        .as_str()
        .expect("session id should exist")
        .to_string()
}

#[tokio::test]
async fn health_and_catalog_are_served() {
    let app = test_app(SuffixTransforms::default());

    let (status, health) = {
        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("health response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice::<Value>(&bytes).expect("json"))
    };
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["service"], json!("fixpix-session-core"));
    assert_eq!(health["sessions"], json!(0));

    let catalog = send_json(app, Method::GET, "/api/commands", Value::Null, StatusCode::OK).await;
    assert_eq!(catalog["data"]["commands"].as_array().map(Vec::len), Some(13));
    assert_eq!(catalog["data"]["recipes"][0]["id"], json!("fix_all"));
}

#[tokio::test]
async fn created_session_starts_from_defaults() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let view = send_json(
        app,
        Method::GET,
        format!("/api/sessions/{id}").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    let data = &view["data"];
    assert_eq!(data["project_id"], json!("album-7"));
    assert_eq!(data["history_len"], json!(1));
    assert_eq!(data["can_undo"], json!(false));
    assert_eq!(data["settings"]["upscaleX"], json!(1.0));
    assert_eq!(data["mode"], json!("none"));
    assert_eq!(data["commit_state"], json!("idle"));
    assert_eq!(data["has_result"], json!(false));
}

#[tokio::test]
async fn create_without_source_is_rejected() {
    let app = test_app(SuffixTransforms::default());
    let response = send_json(app, Method::POST, "/api/sessions", json!({}), StatusCode::BAD_REQUEST).await;

    assert_eq!(response["ok"], json!(false));
    assert_eq!(response["error"]["kind"], json!("validation"));
    assert_eq!(response["error"]["code"], json!("missing_source"));
}

#[tokio::test]
async fn unknown_sessions_are_not_found() {
    let app = test_app(SuffixTransforms::default());

    let missing = send_json(
        app.clone(),
        Method::GET,
        "/api/sessions/00000000-0000-0000-0000-000000000000",
        Value::Null,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(missing["error"]["code"], json!("session_not_found"));

    let malformed = send_json(
        app,
        Method::POST,
        "/api/sessions/not-a-uuid/commit",
        Value::Null,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(malformed["error"]["code"], json!("session_not_found"));
}

#[tokio::test]
async fn queued_colorize_commit_publishes_result() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let toggled = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/queue/toggle").as_str(),
        json!({ "id": "colorize", "value": true }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(toggled["data"]["pending_count"], json!(1));
    assert_eq!(toggled["data"]["summary"], json!("Colorize Photo"));

    let committed = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/commit").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(committed["data"]["report"]["steps"], json!(["colorize"]));
    assert_eq!(committed["data"]["session"]["pending_count"], json!(0));
    assert_eq!(committed["data"]["session"]["settings"]["colorize"], json!(true));
    assert_eq!(committed["data"]["session"]["commit_state"], json!("succeeded"));

    let result = send_json(
        app,
        Method::GET,
        format!("/api/sessions/{id}/result").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(result["data"]["published"], json!(true));
    assert_eq!(result["data"]["image_base64"], json!(encode(b"pristine+colorize")));
}

#[tokio::test]
async fn failed_step_maps_to_provider_error_and_keeps_queue() {
    let app = test_app(SuffixTransforms {
        fail_on: Some(TransformStep::FaceRestore),
    });
    let id = create_session(&app).await;
    send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/recipes/fix_all").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;

    let failed = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/commit").as_str(),
        Value::Null,
        StatusCode::BAD_GATEWAY,
    )
    .await;
    assert_eq!(failed["error"]["kind"], json!("provider"));
    assert_eq!(failed["error"]["code"], json!("transform_step_failed"));
    assert_eq!(failed["error"]["details"]["step"], json!("face_restore"));
    assert_eq!(failed["error"]["details"]["code"], json!("http_500"));

    let view = send_json(
        app,
        Method::GET,
        format!("/api/sessions/{id}").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(view["data"]["pending_count"], json!(2));
    assert_eq!(view["data"]["commit_state"], json!("failed"));
    assert_eq!(view["data"]["has_result"], json!(false));
}

#[tokio::test]
async fn live_settings_walk_history() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let updated = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/settings").as_str(),
        json!({ "id": "brightness", "value": 1.4 }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(updated["data"]["history_len"], json!(2));
    assert_eq!(updated["data"]["settings"]["brightness"], json!(1.4));

    let undone = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/undo").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(undone["data"]["moved"], json!(true));
    assert_eq!(undone["data"]["session"]["settings"]["brightness"], json!(1.0));

    let undone_again = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/undo").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(undone_again["data"]["moved"], json!(false));

    let jumped = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/history/jump").as_str(),
        json!({ "index": 1 }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(jumped["data"]["settings"]["brightness"], json!(1.4));

    let out_of_range = send_json(
        app,
        Method::POST,
        format!("/api/sessions/{id}/history/jump").as_str(),
        json!({ "index": 9 }),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(out_of_range["error"]["code"], json!("history_index_out_of_range"));
}

#[tokio::test]
async fn registry_rejections_are_validation_errors() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let not_live = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/settings").as_str(),
        json!({ "id": "colorize", "value": true }),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(not_live["error"]["code"], json!("not_live"));

    let unknown = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/queue/toggle").as_str(),
        json!({ "id": "sharpen", "value": true }),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(unknown["error"]["code"], json!("unknown_command"));

    let bad_mode = send_json(
        app,
        Method::POST,
        format!("/api/sessions/{id}/mode").as_str(),
        json!({ "mode": "lasso" }),
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(bad_mode["error"]["code"], json!("unknown_mode"));
}

#[tokio::test]
async fn object_removal_needs_a_mask() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let masking = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/mode").as_str(),
        json!({ "mode": "masking" }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(masking["data"]["mode"], json!("masking"));

    send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/queue/toggle").as_str(),
        json!({ "id": "objectRemoval", "value": true }),
        StatusCode::OK,
    )
    .await;
    let rejected = send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/commit").as_str(),
        Value::Null,
        StatusCode::BAD_REQUEST,
    )
    .await;
    assert_eq!(rejected["error"]["code"], json!("missing_mask"));

    let masked = send_json(
        app.clone(),
        Method::PUT,
        format!("/api/sessions/{id}/mask").as_str(),
        json!({ "mask_base64": encode(b"mask") }),
        StatusCode::OK,
    )
    .await;
    assert_eq!(masked["data"]["has_mask"], json!(true));

    let committed = send_json(
        app,
        Method::POST,
        format!("/api/sessions/{id}/commit").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(committed["data"]["report"]["steps"], json!(["inpaint"]));
    assert_eq!(committed["data"]["session"]["has_mask"], json!(false));
}

#[tokio::test]
async fn analysis_recommendations_can_be_staged() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    send_json(
        app.clone(),
        Method::POST,
        format!("/api/sessions/{id}/analyze").as_str(),
        Value::Null,
        StatusCode::ACCEPTED,
    )
    .await;

    let mut analyzed = false;
    for _ in 0..50 {
        let view = send_json(
            app.clone(),
            Method::GET,
            format!("/api/sessions/{id}").as_str(),
            Value::Null,
            StatusCode::OK,
        )
        .await;
        if view["data"]["insights"]["analyzed"] == json!(true) {
            analyzed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(analyzed, "analysis should finish");

    let applied = send_json(
        app,
        Method::POST,
        format!("/api/sessions/{id}/insights/apply").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(applied["data"]["pending"]["colorize"], json!(true));
    assert_eq!(applied["data"]["pending"]["faceRestoration"], json!(true));
}

#[tokio::test]
async fn deleted_sessions_are_gone() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let deleted = send_json(
        app.clone(),
        Method::DELETE,
        format!("/api/sessions/{id}").as_str(),
        Value::Null,
        StatusCode::OK,
    )
    .await;
    assert_eq!(deleted["data"]["deleted"], json!(true));

    send_json(
        app,
        Method::GET,
        format!("/api/sessions/{id}").as_str(),
        Value::Null,
        StatusCode::NOT_FOUND,
    )
    .await;
}

#[tokio::test]
async fn session_events_stream_as_server_sent_events() {
    let app = test_app(SuffixTransforms::default());
    let id = create_session(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/sessions/{id}/events"))
                .body(Body::empty())
                .expect("request should build"),
        )
        .await
        .expect("events response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/event-stream")
    );
    let mut frames = response.into_body().into_data_stream();

    send_json(
        app,
        Method::POST,
        format!("/api/sessions/{id}/queue/toggle").as_str(),
        json!({ "id": "colorize", "value": true }),
        StatusCode::OK,
    )
    .await;

    let frame = tokio::time::timeout(Duration::from_secs(1), frames.next())
        .await
        .expect("event should arrive")
        .expect("stream should be open")
        .expect("frame should be readable");
    let text = String::from_utf8(frame.to_vec()).expect("utf8 frame");
    assert!(text.starts_with("data: "), "{text}");
    assert!(text.contains(r#""type":"queue_changed""#), "{text}");
    assert!(text.contains(id.as_str()), "{text}");
}

#[tokio::test]
async fn events_for_unknown_sessions_are_not_found() {
    let app = test_app(SuffixTransforms::default());
    let response = send_json(
        app,
        Method::GET,
        "/api/sessions/00000000-0000-0000-0000-000000000000/events",
        Value::Null,
        StatusCode::NOT_FOUND,
    )
    .await;
    assert_eq!(response["error"]["code"], json!("session_not_found"));
}
