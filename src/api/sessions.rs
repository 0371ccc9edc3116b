use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use crate::api::error::{ApiFailure, ErrorKind};
use crate::api::response::{respond, respond_result, ApiJson};
use crate::api::server::AppState;
use crate::session::error::ValidationError;
use crate::session::focus::FocusMode;
use crate::session::registry::CommandId;
use crate::session::settings::{SettingValue, SettingsPatch, SettingsUpdate};
use crate::session::{CommitReport, EditSession, SessionHandle, SessionView};
use crate::storage::artifact::ImageArtifact;
use crate::storage::{fetch_source_artifact, resolve_media_url, ProjectSource, SourceError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub source_base64: Option<String>,
    pub source_url: Option<String>,
    pub project_id: Option<String>,
}

/// Either a single live parameter (`id` + `value`) or a settings patch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsRequest {
    pub id: Option<String>,
    pub value: Option<SettingValue>,
    pub patch: Option<SettingsPatch>,
    #[serde(default)]
    pub replace: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleRequest {
    pub id: String,
    pub value: Option<SettingValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JumpRequest {
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskRequest {
    pub mask_base64: String,
}

#[derive(Debug, Clone, Serialize)]
struct CommitResponse {
    report: CommitReport,
    session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
struct MovedResponse {
    moved: bool,
    session: SessionView,
}

#[derive(Debug, Clone, Serialize)]
struct ResultResponse {
    published: bool,
    identity: String,
    mime: &'static str,
    image_base64: String,
}

fn session_not_found(raw_id: &str) -> ApiFailure {
    ApiFailure::new(
        StatusCode::NOT_FOUND,
        ErrorKind::Validation,
        "session_not_found",
        format!("Session '{}' not found", raw_id.trim()),
    )
}

async fn session_handle(state: &AppState, raw_id: &str) -> Result<SessionHandle, ApiFailure> {
    let id = Uuid::parse_str(raw_id.trim()).map_err(|_| session_not_found(raw_id))?;
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| session_not_found(raw_id))
}

/// Runs a synchronous session mutation under the session lock and returns
/// the refreshed view.
async fn with_session<F>(state: &AppState, raw_id: &str, mutate: F) -> Result<SessionView, ApiFailure>
where
    F: FnOnce(&mut EditSession) -> Result<(), ApiFailure>,
{
    let handle = session_handle(state, raw_id).await?;
    let mut session = handle.lock().await;
    mutate(&mut session)?;
    Ok(session.view())
}

fn parse_command(raw: &str) -> Result<CommandId, ApiFailure> {
    raw.parse::<CommandId>().map_err(ApiFailure::from)
}

async fn create_session(state: &AppState, req: CreateSessionRequest) -> Result<SessionView, ApiFailure> {
    let project_id = req.project_id.filter(|v| !v.trim().is_empty());
    let (artifact, source_url) = match (req.source_base64, req.source_url) {
        (Some(encoded), source_url) => (
            ImageArtifact::from_base64(encoded.as_str()).map_err(SourceError::from)?,
            source_url,
        ),
        (None, Some(source_url)) => {
            let resolved = resolve_media_url(&state.media_base, source_url.as_str())?;
            let artifact = fetch_source_artifact(&state.http, &resolved, state.fetch_timeout).await?;
            (artifact, Some(source_url))
        }
        (None, None) => {
            return Err(ApiFailure::bad_request(
                "missing_source",
                "Provide source_base64 or source_url",
            ))
        }
    };
    let source_ref = ProjectSource {
        project_id,
        source_url,
    };
    let session = EditSession::new(artifact, source_ref, state.session_options);
    let handle = state.sessions.insert(session).await;
    let view = handle.lock().await.view();
    Ok(view)
}

pub async fn create_session_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiJson<Value> {
    match create_session(&state, req).await {
        Ok(view) => respond(StatusCode::CREATED, view),
        Err(failure) => failure.into(),
    }
}

pub async fn get_session_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(with_session(&state, id.as_str(), |_| Ok(())).await)
}

pub async fn delete_session_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    let result = async {
        let handle = session_handle(&state, id.as_str()).await?;
        state.sessions.remove(handle.id()).await;
        Ok::<_, ApiFailure>(serde_json::json!({ "deleted": true, "id": handle.id() }))
    }
    .await;
    respond_result(result)
}

pub async fn update_settings_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SettingsRequest>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), move |session| {
            match (req.id, req.value, req.patch) {
                (Some(command), Some(value), _) => {
                    session.set_live(parse_command(command.as_str())?, value)?;
                }
                (Some(command), None, _) => {
                    return Err(ValidationError::InvalidValue {
                        id: command,
                        expected: String::from("a value"),
                    }
                    .into())
                }
                (None, _, Some(patch)) => {
                    let update = if req.replace {
                        SettingsUpdate::Replace(patch)
                    } else {
                        SettingsUpdate::Patch(patch)
                    };
                    session.update_settings(update);
                }
                (None, _, None) => {
                    return Err(ApiFailure::bad_request(
                        "missing_fields",
                        "Provide id and value, or patch",
                    ))
                }
            }
            Ok(())
        })
        .await,
    )
}

pub async fn toggle_queued_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ToggleRequest>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), move |session| {
            let command = parse_command(req.id.as_str())?;
            // A missing value counts as a removal.
            let value = req.value.unwrap_or(SettingValue::Flag(false));
            session.toggle_queued(command, value)?;
            Ok(())
        })
        .await,
    )
}

pub async fn clear_queue_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.clear_queue();
            Ok(())
        })
        .await,
    )
}

pub async fn apply_recipe_handler(
    State(state): State<AppState>,
    Path((id, recipe_id)): Path<(String, String)>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.apply_recipe(recipe_id.as_str())?;
            Ok(())
        })
        .await,
    )
}

async fn run_commit(state: &AppState, raw_id: &str, replay: bool) -> Result<CommitResponse, ApiFailure> {
    let handle = session_handle(state, raw_id).await?;
    let report = if replay {
        handle.replay(Arc::clone(&state.transforms)).await?
    } else {
        handle.commit(Arc::clone(&state.transforms)).await?
    };
    let session = handle.lock().await.view();
    Ok(CommitResponse { report, session })
}

pub async fn commit_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(run_commit(&state, id.as_str(), false).await)
}

pub async fn replay_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(run_commit(&state, id.as_str(), true).await)
}

pub async fn cancel_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    let result = async {
        let handle = session_handle(&state, id.as_str()).await?;
        let canceled = handle.cancel().await;
        Ok::<_, ApiFailure>(serde_json::json!({ "cancel_requested": canceled }))
    }
    .await;
    respond_result(result)
}

async fn move_history<F>(state: &AppState, raw_id: &str, step: F) -> Result<MovedResponse, ApiFailure>
where
    F: FnOnce(&mut EditSession) -> bool,
{
    let handle = session_handle(state, raw_id).await?;
    let mut session = handle.lock().await;
    let moved = step(&mut session);
    Ok(MovedResponse {
        moved,
        session: session.view(),
    })
}

pub async fn undo_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(move_history(&state, id.as_str(), EditSession::undo).await)
}

pub async fn redo_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(move_history(&state, id.as_str(), EditSession::redo).await)
}

pub async fn jump_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<JumpRequest>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.jump_to_index(req.index)?;
            Ok(())
        })
        .await,
    )
}

pub async fn enter_mode_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ModeRequest>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.enter_mode(FocusMode::parse(req.mode.as_str())?);
            Ok(())
        })
        .await,
    )
}

pub async fn exit_mode_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.exit_mode();
            Ok(())
        })
        .await,
    )
}

pub async fn set_mask_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<MaskRequest>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            let mask = ImageArtifact::from_base64(req.mask_base64.as_str())
                .map_err(|e| ApiFailure::bad_request("invalid_mask", e.to_string()))?;
            session.set_mask(mask);
            Ok(())
        })
        .await,
    )
}

pub async fn clear_mask_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.clear_mask();
            Ok(())
        })
        .await,
    )
}

/// Starts a background scan and answers immediately with `202`.
pub async fn analyze_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    let result = async {
        let handle = session_handle(&state, id.as_str()).await?;
        drop(handle.analyze(state.analysis.clone()).await);
        let view = handle.lock().await.view();
        Ok::<_, ApiFailure>(view)
    }
    .await;
    match result {
        Ok(view) => respond(StatusCode::ACCEPTED, view),
        Err(failure) => failure.into(),
    }
}

pub async fn apply_recommendations_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiJson<Value> {
    respond_result(
        with_session(&state, id.as_str(), |session| {
            session.apply_recommendations()?;
            Ok(())
        })
        .await,
    )
}

pub async fn get_result_handler(State(state): State<AppState>, Path(id): Path<String>) -> ApiJson<Value> {
    let result = async {
        let handle = session_handle(&state, id.as_str()).await?;
        let session = handle.lock().await;
        let artifact = session.current_artifact();
        Ok::<_, ApiFailure>(ResultResponse {
            published: session.published().is_some(),
            identity: artifact.identity().to_string(),
            mime: artifact.mime(),
            image_base64: artifact.to_base64(),
        })
    }
    .await;
    respond_result(result)
}

/// Streams the session's `{type, payload}` events as server-sent events
/// until the session is dropped.
pub async fn session_events_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiJson<Value>> {
    let handle = session_handle(&state, id.as_str())
        .await
        .map_err(ApiJson::<Value>::from)?;
    let receiver = handle.lock().await.subscribe();
    let session_id = handle.id();
    let stream = futures_util::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(envelope) => return Some((Event::default().json_data(&envelope), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%session_id, skipped, "event subscriber fell behind");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
