use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApiError;
use crate::events::EventKind;
use crate::middleware::{ApiResponse, ApiResult};
use crate::server::AppState;
use crate::types::ApiKeyIdentity;

type Body = Result<Json<Value>, JsonRejection>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub session_uuid: Uuid,
}

/// POST /session/start
pub async fn session_start(
    State(state): State<AppState>,
    Extension(identity): Extension<ApiKeyIdentity>,
    body: Body,
) -> ApiResult<Accepted> {
    ingest(&state, &identity, EventKind::SessionStart, body).map(ApiResponse::created)
}

/// POST /session/end
pub async fn session_end(
    State(state): State<AppState>,
    Extension(identity): Extension<ApiKeyIdentity>,
    body: Body,
) -> ApiResult<Accepted> {
    ingest(&state, &identity, EventKind::SessionEnd, body).map(ApiResponse::success)
}

/// POST /session/gamemode
pub async fn session_gamemode(
    State(state): State<AppState>,
    Extension(identity): Extension<ApiKeyIdentity>,
    body: Body,
) -> ApiResult<Accepted> {
    ingest(&state, &identity, EventKind::GamemodeSession, body).map(ApiResponse::created)
}

fn ingest(state: &AppState, identity: &ApiKeyIdentity, kind: EventKind, body: Body) -> Result<Accepted, ApiError> {
    let Json(raw) = body?;
    let record = state.normalizer.normalize_kind(kind, &raw, identity, Utc::now())?;
    let session_uuid = record.session_uuid();
    state.buffer.append(record)?;
    Ok(Accepted { session_uuid })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEventResult {
    pub index: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_uuid: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub accepted: usize,
    pub rejected: usize,
    pub results: Vec<BatchEventResult>,
}

/// POST /session/batch - `{"events": [...]}`, each entry carrying its own `type`
///
/// Entries are handled independently: valid ones are buffered even when
/// siblings fail, and each gets its own result in request order.
pub async fn session_batch(
    State(state): State<AppState>,
    Extension(identity): Extension<ApiKeyIdentity>,
    body: Body,
) -> ApiResult<BatchSummary> {
    let Json(raw) = body?;
    let events = raw
        .get("events")
        .and_then(Value::as_array)
        .ok_or_else(|| ApiError::invalid_batch("Body must contain an events array"))?;

    if events.is_empty() {
        return Err(ApiError::invalid_batch("Batch contains no events"));
    }
    if events.len() > state.max_batch_events {
        return Err(ApiError::BatchTooLarge {
            count: events.len(),
            max: state.max_batch_events,
        });
    }

    let received_at = Utc::now();
    let results: Vec<BatchEventResult> = events
        .iter()
        .enumerate()
        .map(|(index, event)| {
            let outcome = state
                .normalizer
                .normalize(event, &identity, received_at)
                .map_err(|e| e.code())
                .and_then(|record| {
                    let session_uuid = record.session_uuid();
                    state
                        .buffer
                        .append(record)
                        .map(|()| session_uuid)
                        .map_err(|e| ApiError::from(e).error_code())
                });

            match outcome {
                Ok(session_uuid) => BatchEventResult {
                    index,
                    success: true,
                    session_uuid: Some(session_uuid),
                    error: None,
                },
                Err(code) => BatchEventResult {
                    index,
                    success: false,
                    session_uuid: None,
                    error: Some(code),
                },
            }
        })
        .collect();

    let accepted = results.iter().filter(|r| r.success).count();
    tracing::debug!(
        "Batch from network {}: {} accepted, {} rejected",
        identity.network_id,
        accepted,
        results.len() - accepted
    );

    Ok(ApiResponse::success(BatchSummary {
        accepted,
        rejected: results.len() - accepted,
        results,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub key_id: Uuid,
    pub network_id: Uuid,
    pub gamemode_id: Option<Uuid>,
}

/// GET /session/auth - identity the presented key resolves to
pub async fn auth_info(Extension(identity): Extension<ApiKeyIdentity>) -> ApiResult<KeyInfo> {
    Ok(ApiResponse::success(KeyInfo {
        key_id: identity.key_id,
        network_id: identity.network_id,
        gamemode_id: identity.gamemode_id,
    }))
}
