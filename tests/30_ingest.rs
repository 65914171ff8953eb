mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::{session_start, TestApp, TestOptions, GAMEMODE_KEY, NETWORK_KEY};
use mctrack_ingest::analytics::{GAMEMODE_SESSIONS_TABLE, NETWORK_SESSIONS_TABLE};

#[tokio::test]
async fn session_start_is_accepted_into_memory() -> Result<()> {
    let app = TestApp::new();
    let session = Uuid::new_v4();
    let mut body = session_start(Uuid::new_v4());
    body["sessionUuid"] = json!(session);
    // Tenant ids in the payload are ignored
    body["networkId"] = json!(Uuid::new_v4());

    let res = app.post("/session/start", Some(NETWORK_KEY), &body).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    assert_eq!(res.body["success"], true);
    assert_eq!(res.body["data"]["sessionUuid"], json!(session));

    assert_eq!(app.buffer.stats().sessions, 1);
    assert_eq!(app.store.attempts(), 0);

    app.buffer.drain().await;
    let rows = app.store.rows(NETWORK_SESSIONS_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["network_id"], json!(app.network.network_id));
    assert_eq!(rows[0]["end_time"], json!(null));
    Ok(())
}

#[tokio::test]
async fn session_start_generates_missing_session_uuid() -> Result<()> {
    let app = TestApp::new();

    let res = app.post("/session/start", Some(NETWORK_KEY), &session_start(Uuid::new_v4())).await?;
    assert_eq!(res.status, StatusCode::CREATED);
    let generated = res.body["data"]["sessionUuid"].as_str().unwrap_or_default();
    assert!(Uuid::parse_str(generated).is_ok());
    Ok(())
}

#[tokio::test]
async fn session_end_writes_closed_row() -> Result<()> {
    let app = TestApp::new();
    let session = Uuid::new_v4();
    let end = chrono::Utc::now().timestamp_millis() / 1000 * 1000 - 60_000;
    let start = end - 600_000;

    let res = app
        .post(
            "/session/end",
            Some(NETWORK_KEY),
            &json!({
                "sessionUuid": session,
                "playerUuid": Uuid::new_v4().simple().to_string(),
                "domain": "play.example.net",
                "ipAddress": "2001:db8::1",
                "platform": "bedrock",
                "bedrockDevice": "Xbox",
                "startTime": start,
                "endTime": end
            }),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);

    app.buffer.drain().await;
    let rows = app.store.rows(NETWORK_SESSIONS_TABLE);
    assert_eq!(rows[0]["session_uuid"], json!(session));
    let expected_end = mctrack_ingest::events::StoreTimestamp::from_millis(end).map(|ts| ts.encode());
    assert_eq!(rows[0]["end_time"].as_str(), expected_end.as_deref());
    assert_eq!(rows[0]["last_heartbeat"], rows[0]["end_time"]);
    assert_eq!(rows[0]["bedrock_device"], "Xbox");
    Ok(())
}

#[tokio::test]
async fn invalid_events_are_rejected_and_not_buffered() -> Result<()> {
    let app = TestApp::new();

    let mut bad_uuid = session_start(Uuid::new_v4());
    bad_uuid["playerUuid"] = json!("steve");
    let res = app.post("/session/start", Some(NETWORK_KEY), &bad_uuid).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, json!({"success": false, "error": "VALIDATION_ERROR"}));

    let mut far_future = session_start(Uuid::new_v4());
    far_future["timestamp"] = json!(400_000_000_000_000i64);
    let res = app.post("/session/start", Some(NETWORK_KEY), &far_future).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "VALIDATION_ERROR");

    let res = app.post_raw("/session/start", NETWORK_KEY, "{\"playerUuid\": ").await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body["error"], "INVALID_JSON");

    assert!(app.buffer.is_empty());
    Ok(())
}

#[tokio::test]
async fn gamemode_sessions_require_a_gamemode_key() -> Result<()> {
    let app = TestApp::new();
    let body = json!({
        "sessionUuid": Uuid::new_v4(),
        "playerUuid": Uuid::new_v4().to_string(),
        "serverName": "bedwars-3"
    });

    let res = app.post("/session/gamemode", Some(NETWORK_KEY), &body).await?;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.post("/session/gamemode", Some(GAMEMODE_KEY), &body).await?;
    assert_eq!(res.status, StatusCode::CREATED);

    app.buffer.drain().await;
    let rows = app.store.rows(GAMEMODE_SESSIONS_TABLE);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["gamemode_id"], json!(app.gamemode.gamemode_id));
    assert_eq!(rows[0]["server_name"], "bedwars-3");
    Ok(())
}

#[tokio::test]
async fn full_buffer_sheds_load() -> Result<()> {
    let app = TestApp::with_options(TestOptions {
        max_batch_size: 2,
        max_buffered_records: 2,
        store: std::sync::Arc::new(common::RecordingStore::failing(usize::MAX)),
        ..TestOptions::default()
    });

    for _ in 0..2 {
        let res = app.post("/session/start", Some(NETWORK_KEY), &session_start(Uuid::new_v4())).await?;
        assert_eq!(res.status, StatusCode::CREATED);
    }

    let res = app.post("/session/start", Some(NETWORK_KEY), &session_start(Uuid::new_v4())).await?;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body["error"], "BUFFER_FULL");

    app.buffer.drain().await;
    assert_eq!(app.buffer.stats().sessions, 2);
    Ok(())
}
