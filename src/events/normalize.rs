use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

use super::records::{GameModeSessionRecord, NetworkSessionRecord, StoreTimestamp};
use super::{BedrockDevice, EventKind, Platform, Record};
use crate::types::ApiKeyIdentity;

const PLAYER_NAME_MAX: usize = 16;
const DOMAIN_MAX: usize = 255;
const SERVER_NAME_MAX: usize = 100;

/// Oldest client timestamp accepted, relative to receipt
const MAX_EVENT_AGE_DAYS: i64 = 30;
/// Tolerated game server clock drift ahead of ours
const MAX_CLOCK_SKEW_MINUTES: i64 = 60;

/// Structural problems with an inbound event
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Event must be a JSON object")]
    NotAnObject,

    #[error("Event type is missing")]
    MissingKind,

    #[error("Unknown event type: {0}")]
    UnknownKind(String),

    #[error("Malformed {kind} event: {message}")]
    Malformed { kind: EventKind, message: String },

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Event requires a gamemode-scoped API key")]
    GamemodeScopeRequired,
}

impl ValidationError {
    /// Short code reported per event in batch responses
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::UnknownKind(_) | ValidationError::MissingKind => "UNKNOWN_EVENT_TYPE",
            ValidationError::GamemodeScopeRequired => "GAMEMODE_SCOPE_REQUIRED",
            _ => "VALIDATION_ERROR",
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionStartPayload {
    session_uuid: Option<Uuid>,
    player_uuid: String,
    player_name: Option<String>,
    domain: String,
    ip_address: IpAddr,
    platform: Platform,
    bedrock_device: Option<BedrockDevice>,
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEndPayload {
    session_uuid: Uuid,
    player_uuid: String,
    domain: String,
    ip_address: IpAddr,
    platform: Platform,
    bedrock_device: Option<BedrockDevice>,
    start_time: i64,
    end_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GamemodeSessionPayload {
    session_uuid: Uuid,
    player_uuid: String,
    server_name: Option<String>,
    start_time: Option<i64>,
    end_time: Option<i64>,
}

/// Converts wire events into canonical records
///
/// Network and gamemode ids always come from the resolved key identity; any ids
/// present in the payload are ignored so a key scoped to one tenant can never
/// write into another.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize an event carrying its own `type` discriminator (batch entries)
    pub fn normalize(
        &self,
        raw: &Value,
        identity: &ApiKeyIdentity,
        received_at: DateTime<Utc>,
    ) -> Result<Record, ValidationError> {
        let object = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        let kind = match object.get("type") {
            None | Some(Value::Null) => return Err(ValidationError::MissingKind),
            Some(Value::String(s)) => {
                EventKind::parse(s).ok_or_else(|| ValidationError::UnknownKind(s.clone()))?
            }
            Some(other) => return Err(ValidationError::UnknownKind(other.to_string())),
        };

        self.normalize_kind(kind, raw, identity, received_at)
    }

    /// Normalize an event whose kind is already known from the route
    pub fn normalize_kind(
        &self,
        kind: EventKind,
        raw: &Value,
        identity: &ApiKeyIdentity,
        received_at: DateTime<Utc>,
    ) -> Result<Record, ValidationError> {
        if !raw.is_object() {
            return Err(ValidationError::NotAnObject);
        }

        match kind {
            EventKind::SessionStart => {
                let payload: SessionStartPayload = parse(kind, raw)?;
                session_start(payload, identity, received_at).map(Record::from)
            }
            EventKind::SessionEnd => {
                let payload: SessionEndPayload = parse(kind, raw)?;
                session_end(payload, identity, received_at).map(Record::from)
            }
            EventKind::GamemodeSession => {
                let payload: GamemodeSessionPayload = parse(kind, raw)?;
                gamemode_session(payload, identity, received_at).map(Record::from)
            }
        }
    }
}

fn parse<T: DeserializeOwned>(kind: EventKind, raw: &Value) -> Result<T, ValidationError> {
    T::deserialize(raw).map_err(|e| ValidationError::Malformed {
        kind,
        message: e.to_string(),
    })
}

fn session_start(
    payload: SessionStartPayload,
    identity: &ApiKeyIdentity,
    received_at: DateTime<Utc>,
) -> Result<NetworkSessionRecord, ValidationError> {
    if let Some(name) = payload.player_name.as_deref() {
        bounded("playerName", name, PLAYER_NAME_MAX)?;
    }
    bounded("domain", &payload.domain, DOMAIN_MAX)?;

    let start_time = match payload.timestamp {
        Some(millis) => timestamp("timestamp", millis, received_at)?,
        None => StoreTimestamp::new(received_at),
    };

    Ok(NetworkSessionRecord {
        network_id: identity.network_id,
        session_uuid: payload.session_uuid.unwrap_or_else(Uuid::new_v4),
        player_uuid: player_uuid(&payload.player_uuid)?,
        domain: payload.domain,
        ip_address: payload.ip_address.to_string(),
        platform: payload.platform,
        bedrock_device: device(payload.platform, payload.bedrock_device),
        start_time,
        end_time: None,
        last_heartbeat: start_time,
    })
}

fn session_end(
    payload: SessionEndPayload,
    identity: &ApiKeyIdentity,
    received_at: DateTime<Utc>,
) -> Result<NetworkSessionRecord, ValidationError> {
    bounded("domain", &payload.domain, DOMAIN_MAX)?;

    let start_time = timestamp("startTime", payload.start_time, received_at)?;
    let end_time = match payload.end_time {
        Some(millis) => timestamp("endTime", millis, received_at)?,
        None => StoreTimestamp::new(received_at),
    };
    if end_time < start_time {
        return Err(ValidationError::invalid("endTime", "precedes startTime"));
    }

    Ok(NetworkSessionRecord {
        network_id: identity.network_id,
        session_uuid: payload.session_uuid,
        player_uuid: player_uuid(&payload.player_uuid)?,
        domain: payload.domain,
        ip_address: payload.ip_address.to_string(),
        platform: payload.platform,
        bedrock_device: device(payload.platform, payload.bedrock_device),
        start_time,
        end_time: Some(end_time),
        last_heartbeat: end_time,
    })
}

fn gamemode_session(
    payload: GamemodeSessionPayload,
    identity: &ApiKeyIdentity,
    received_at: DateTime<Utc>,
) -> Result<GameModeSessionRecord, ValidationError> {
    let gamemode_id = identity.gamemode_id.ok_or(ValidationError::GamemodeScopeRequired)?;

    let server_name = match payload.server_name {
        Some(name) if name.chars().count() > SERVER_NAME_MAX => {
            return Err(ValidationError::invalid(
                "serverName",
                format!("longer than {} characters", SERVER_NAME_MAX),
            ));
        }
        Some(name) if name.trim().is_empty() => None,
        other => other,
    };

    let start_time = match payload.start_time {
        Some(millis) => timestamp("startTime", millis, received_at)?,
        None => StoreTimestamp::new(received_at),
    };
    let end_time = payload
        .end_time
        .map(|millis| timestamp("endTime", millis, received_at))
        .transpose()?;
    if end_time.is_some_and(|end| end < start_time) {
        return Err(ValidationError::invalid("endTime", "precedes startTime"));
    }

    Ok(GameModeSessionRecord {
        gamemode_id,
        session_uuid: payload.session_uuid,
        player_uuid: player_uuid(&payload.player_uuid)?,
        server_name,
        start_time,
        end_time,
    })
}

/// Accepts dashed or undashed Minecraft UUIDs and stores the undashed form
fn player_uuid(raw: &str) -> Result<String, ValidationError> {
    if raw.len() != 32 && raw.len() != 36 {
        return Err(ValidationError::invalid("playerUuid", "must be 32 or 36 characters"));
    }
    Uuid::parse_str(raw)
        .map(|uuid| uuid.simple().to_string())
        .map_err(|e| ValidationError::invalid("playerUuid", e.to_string()))
}

fn bounded(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(ValidationError::invalid(field, "must not be empty"));
    }
    if len > max {
        return Err(ValidationError::invalid(field, format!("longer than {} characters", max)));
    }
    Ok(())
}

/// Client epoch millis, bounded to a window around receipt
///
/// Keeps every row in the store's fixed-width `DateTime64(3)` form and keeps a
/// flushed batch within a handful of monthly partitions.
fn timestamp(field: &'static str, millis: i64, received_at: DateTime<Utc>) -> Result<StoreTimestamp, ValidationError> {
    let at = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| ValidationError::invalid(field, "out of range"))?;

    if at < received_at - chrono::Duration::days(MAX_EVENT_AGE_DAYS) {
        return Err(ValidationError::invalid(
            field,
            format!("more than {} days in the past", MAX_EVENT_AGE_DAYS),
        ));
    }
    if at > received_at + chrono::Duration::minutes(MAX_CLOCK_SKEW_MINUTES) {
        return Err(ValidationError::invalid(field, "in the future"));
    }
    Ok(StoreTimestamp::new(at))
}

// Device is only meaningful for Bedrock clients
fn device(platform: Platform, device: Option<BedrockDevice>) -> Option<BedrockDevice> {
    match platform {
        Platform::Bedrock => device,
        Platform::Java => None,
    }
}
