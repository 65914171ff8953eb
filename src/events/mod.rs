// Session lifecycle events: wire payloads in, canonical analytics records out

pub mod normalize;
pub mod records;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use normalize::{Normalizer, ValidationError};
pub use records::{GameModeSessionRecord, NetworkSessionRecord, StoreTimestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Java,
    Bedrock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BedrockDevice {
    Android,
    #[serde(rename = "iOS")]
    Ios,
    Windows,
    PlayStation,
    Xbox,
    Switch,
}

/// Event kinds accepted on the ingestion path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    SessionEnd,
    GamemodeSession,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "session_start",
            EventKind::SessionEnd => "session_end",
            EventKind::GamemodeSession => "gamemode_session",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "session_start" => Some(EventKind::SessionStart),
            "session_end" => Some(EventKind::SessionEnd),
            "gamemode_session" => Some(EventKind::GamemodeSession),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized record, routed to the buffer queue of its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Session(NetworkSessionRecord),
    GamemodeSession(GameModeSessionRecord),
}

impl Record {
    pub fn session_uuid(&self) -> uuid::Uuid {
        match self {
            Record::Session(record) => record.session_uuid,
            Record::GamemodeSession(record) => record.session_uuid,
        }
    }
}

impl From<NetworkSessionRecord> for Record {
    fn from(record: NetworkSessionRecord) -> Self {
        Record::Session(record)
    }
}

impl From<GameModeSessionRecord> for Record {
    fn from(record: GameModeSessionRecord) -> Self {
        Record::GamemodeSession(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_parse_is_exact() {
        assert_eq!(EventKind::parse("session_start"), Some(EventKind::SessionStart));
        assert_eq!(EventKind::parse("gamemode_session"), Some(EventKind::GamemodeSession));
        assert_eq!(EventKind::parse("SESSION_START"), None);
        assert_eq!(EventKind::parse("heartbeat"), None);
    }

    #[test]
    fn test_platform_and_device_wire_names() {
        assert_eq!(serde_json::to_value(Platform::Bedrock).unwrap(), json!("bedrock"));
        assert_eq!(serde_json::to_value(BedrockDevice::Ios).unwrap(), json!("iOS"));
        assert_eq!(
            serde_json::from_value::<BedrockDevice>(json!("PlayStation")).unwrap(),
            BedrockDevice::PlayStation
        );
    }
}
