// Analytics table names and DDL
//
// ReplacingMergeTree collapses duplicate rows from at-least-once retries and
// lets a session_end row supersede its session_start row.

pub const NETWORK_SESSIONS_TABLE: &str = "network_sessions";
pub const GAMEMODE_SESSIONS_TABLE: &str = "gamemode_sessions";

pub const NETWORK_SESSIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS network_sessions (
  network_id UUID,
  session_uuid UUID,
  player_uuid String,
  domain String,
  ip_address String,
  platform Enum8('java' = 1, 'bedrock' = 2),
  bedrock_device LowCardinality(Nullable(String)),
  start_time DateTime64(3),
  end_time Nullable(DateTime64(3)),
  last_heartbeat DateTime64(3)
) ENGINE = ReplacingMergeTree(last_heartbeat)
PARTITION BY toYYYYMM(start_time)
ORDER BY (network_id, start_time, session_uuid)
"#;

pub const GAMEMODE_SESSIONS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS gamemode_sessions (
  gamemode_id UUID,
  session_uuid UUID,
  player_uuid String,
  server_name Nullable(String),
  start_time DateTime64(3),
  end_time Nullable(DateTime64(3))
) ENGINE = ReplacingMergeTree
PARTITION BY toYYYYMM(start_time)
ORDER BY (gamemode_id, start_time, session_uuid)
"#;

/// Statements run by `mctrack-ingest migrate`, in order
pub fn migrations() -> [(&'static str, &'static str); 2] {
    [
        (NETWORK_SESSIONS_TABLE, NETWORK_SESSIONS_DDL),
        (GAMEMODE_SESSIONS_TABLE, GAMEMODE_SESSIONS_DDL),
    ]
}
