use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use super::{BedrockDevice, Platform};

/// Textual form expected by `DateTime64(3)` columns: UTC, millisecond precision, no zone suffix
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Timestamp already encoded the way the analytics store parses it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreTimestamp(DateTime<Utc>);

impl StoreTimestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn from_millis(millis: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(Self)
    }

    pub fn encode(&self) -> String {
        self.0.format(STORE_TIMESTAMP_FORMAT).to_string()
    }
}

impl fmt::Display for StoreTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STORE_TIMESTAMP_FORMAT))
    }
}

impl Serialize for StoreTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StoreTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, STORE_TIMESTAMP_FORMAT)
            .map(|naive| Self(naive.and_utc()))
            .map_err(serde::de::Error::custom)
    }
}

/// One player's presence on a network; `end_time` is null while the session is open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSessionRecord {
    pub network_id: Uuid,
    pub session_uuid: Uuid,
    pub player_uuid: String,
    pub domain: String,
    pub ip_address: String,
    pub platform: Platform,
    pub bedrock_device: Option<BedrockDevice>,
    pub start_time: StoreTimestamp,
    pub end_time: Option<StoreTimestamp>,
    pub last_heartbeat: StoreTimestamp,
}

/// Participation in one gamemode instance, correlated to a network session by `session_uuid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameModeSessionRecord {
    pub gamemode_id: Uuid,
    pub session_uuid: Uuid,
    pub player_uuid: String,
    pub server_name: Option<String>,
    pub start_time: StoreTimestamp,
    pub end_time: Option<StoreTimestamp>,
}
