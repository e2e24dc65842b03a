use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::session::orchestrator::{Action, RenderOutcome};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub utterance: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub session_count: usize,
    pub llm_backend: String,
    pub table: String,
}

type ApiResult = Result<Json<RenderOutcome>, (StatusCode, String)>;

async fn run_action(state: &AppState, id: Uuid, action: Action) -> ApiResult {
    let mut session = state.sessions.lock(&id).await.ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            format!("Session '{}' not found", id),
        )
    })?;

    let outcome = state.orchestrator().render(&mut session, action).await;
    Ok(Json(outcome))
}

// Sessions

pub async fn create_session(State(state): State<Arc<AppState>>) -> ApiResult {
    let (id, _) = state.sessions.create().await;
    run_action(&state, id, Action::Refresh).await
}

pub async fn get_session(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    run_action(&state, id, Action::Refresh).await
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Session '{}' not found", id)))
    }
}

// Credentials

pub async fn set_api_key(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApiKeyRequest>,
) -> ApiResult {
    run_action(&state, id, Action::SetApiKey(payload.api_key)).await
}

pub async fn upload_service_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> ApiResult {
    let field = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart upload: {}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
    })?;

    let Some(field) = field else {
        return Err((StatusCode::BAD_REQUEST, "No file in upload".to_string()));
    };

    debug!("Received key file {:?}", field.file_name());
    let bytes = field.bytes().await.map_err(|e| {
        error!("Failed to read uploaded file: {}", e);
        (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
    })?;

    run_action(&state, id, Action::UploadServiceAccount(bytes.to_vec())).await
}

// Conversation

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MessageRequest>,
) -> ApiResult {
    info!(session = %id, "New utterance");
    run_action(&state, id, Action::Submit(payload.utterance)).await
}

pub async fn replay_history(
    State(state): State<Arc<AppState>>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> ApiResult {
    run_action(&state, id, Action::Replay(index)).await
}

pub async fn clear_history(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    run_action(&state, id, Action::Clear).await
}

// System status
pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        session_count: state.sessions.len().await,
        llm_backend: state.config.llm.backend.clone(),
        table: state.schema.name.clone(),
    })
}
