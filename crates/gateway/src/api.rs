use {
    agentgate_threads::{NewThread, ThreadRecord},
    agentgate_usage::UsageRecord,
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    serde::Deserialize,
    serde_json::{Map, Value, json},
    tracing::info,
};

use crate::{
    error::GatewayError,
    extract::{Authenticated, JsonBody},
    proxy::EventStream,
    server::AppState,
};

// ── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CreateThreadRequest {
    pub assistant_id: Option<String>,
    pub title: Option<String>,
    /// Extra upstream thread metadata.
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateThreadRequest {
    pub title: Option<String>,
}

// ── Auth ─────────────────────────────────────────────────────────────────────

pub async fn auth_check(Authenticated(principal): Authenticated) -> impl IntoResponse {
    Json(json!({
        "is_authenticated": true,
        "id": principal.id,
        "username": principal.username,
        "is_staff": principal.is_staff,
    }))
}

// ── Threads ──────────────────────────────────────────────────────────────────

pub async fn list_threads(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<ThreadRecord>>, GatewayError> {
    Ok(Json(state.gateway.threads.list(principal.id).await?))
}

/// Provision the upstream thread first; the record is only written once the
/// upstream identifier is known.
pub async fn create_thread(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    JsonBody(req): JsonBody<CreateThreadRequest>,
) -> Result<(StatusCode, Json<ThreadRecord>), GatewayError> {
    let gw = &state.gateway;
    let assistant_id = req
        .assistant_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| gw.default_assistant_id.clone());

    let thread_id = gw
        .upstream
        .create_thread(&assistant_id, req.metadata.as_ref())
        .await?;
    let record = gw
        .threads
        .create(NewThread {
            owner_id: principal.id,
            thread_id,
            assistant_id,
            title: req.title,
        })
        .await?;

    info!(
        principal_id = principal.id,
        thread_id = %record.thread_id,
        assistant_id = %record.assistant_id,
        "thread created"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update_thread(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
    JsonBody(req): JsonBody<UpdateThreadRequest>,
) -> Result<Json<ThreadRecord>, GatewayError> {
    let record = state
        .gateway
        .threads
        .set_title(principal.id, &thread_id, req.title)
        .await?;
    Ok(Json(record))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, GatewayError> {
    state
        .gateway
        .threads
        .delete(principal.id, &thread_id)
        .await?;
    info!(principal_id = principal.id, %thread_id, "thread deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Thread-scoped upstream calls ─────────────────────────────────────────────

pub async fn run_wait(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<Json<Value>, GatewayError> {
    let out = state
        .gateway
        .proxy
        .run_and_wait(&principal, &thread_id, &payload)
        .await?;
    Ok(Json(out))
}

pub async fn run_stream(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
    JsonBody(payload): JsonBody<Value>,
) -> Result<EventStream, GatewayError> {
    state
        .gateway
        .proxy
        .proxy_run(&principal, &thread_id, payload)
        .await
}

pub async fn history(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    Ok(Json(
        state.gateway.proxy.history(&principal, &thread_id).await?,
    ))
}

pub async fn get_state(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    Ok(Json(
        state.gateway.proxy.get_state(&principal, &thread_id).await?,
    ))
}

pub async fn patch_state(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    Path(thread_id): Path<String>,
    JsonBody(body): JsonBody<Value>,
) -> Result<Json<Value>, GatewayError> {
    Ok(Json(
        state
            .gateway
            .proxy
            .patch_state(&principal, &thread_id, &body)
            .await?,
    ))
}

// ── Usage ────────────────────────────────────────────────────────────────────

pub async fn list_usage(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Vec<UsageRecord>>, GatewayError> {
    let records = state
        .gateway
        .usage
        .list(principal.id)
        .await
        .map_err(GatewayError::Internal)?;
    Ok(Json(records))
}
