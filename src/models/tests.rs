use serde_json::json;
use std::time::Duration;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 1000, "reconnect_delay_ms should default to 1000");
    assert_eq!(
        opts.max_reconnect_delay_ms, 30000,
        "max_reconnect_delay_ms should default to 30000"
    );
    assert!(
        opts.max_reconnect_attempts.is_none(),
        "max_reconnect_attempts should default to None (infinite)"
    );
    assert_eq!(opts.heartbeat_interval(), Some(Duration::from_secs(30)));
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(2000)
        .with_max_reconnect_delay_ms(60000)
        .with_max_reconnect_attempts(Some(5))
        .with_heartbeat_interval_ms(0);

    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 2000);
    assert_eq!(opts.max_reconnect_delay_ms, 60000);
    assert_eq!(opts.max_reconnect_attempts, Some(5));
    assert_eq!(opts.heartbeat_interval(), None);
}

#[test]
fn test_backoff_doubles_then_caps() {
    let opts = ConnectionOptions::default();
    let delays: Vec<u64> = (0..7).map(|n| opts.backoff_delay(n).as_millis() as u64).collect();
    assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
}

#[test]
fn test_backoff_does_not_overflow() {
    let opts = ConnectionOptions::default();
    assert_eq!(opts.backoff_delay(200), Duration::from_millis(30000));
}

#[test]
fn test_connection_options_deserialize_partial() {
    let opts: ConnectionOptions = serde_json::from_value(json!({
        "reconnect_delay_ms": 250
    }))
    .unwrap();
    assert_eq!(opts.reconnect_delay_ms, 250);
    assert_eq!(opts.max_reconnect_delay_ms, 30000);
    assert!(opts.auto_reconnect);
}

// ==================== Wire message Tests ====================

#[test]
fn test_heartbeat_wire_shape() {
    let msg = ClientMessage::heartbeat(1_700_000_000_123);
    let value = serde_json::to_value(&msg).unwrap();
    assert_eq!(
        value,
        json!({"type": "heartbeat", "data": {"client_time": 1_700_000_000_123i64}})
    );
}

#[test]
fn test_server_message_normalize_fills_defaults() {
    let msg = ServerMessage::parse(r#"{"type":"post_created","data":{"id":"p1"}}"#).unwrap();
    let env = msg.normalize(42);
    assert_eq!(env.message_type, "post_created");
    assert_eq!(env.data, json!({"id": "p1"}));
    assert_eq!(env.timestamp, 42);
    assert!(env.message_id.starts_with("msg_42_"));
    assert_eq!(env.classify(), MessageClass::UserFacing(NotificationKind::PostCreated));
}

#[test]
fn test_generated_message_ids_follow_clock_and_stay_unique() {
    let raw = r#"{"type":"custom","data":{}}"#;
    let first = ServerMessage::parse(raw).unwrap().normalize(1_700_000_000_000);
    let second = ServerMessage::parse(raw).unwrap().normalize(1_700_000_000_000);

    assert!(first.message_id.starts_with("msg_1700000000000_"));
    assert!(second.message_id.starts_with("msg_1700000000000_"));
    assert_ne!(first.message_id, second.message_id);
}

#[test]
fn test_server_message_keeps_server_fields() {
    let msg = ServerMessage::parse(
        r#"{"type":"notification","data":{},"message_id":"m-1","timestamp":1234,"target_users":["u1"]}"#,
    )
    .unwrap();
    let env = msg.normalize(0);
    assert_eq!(env.message_id, "m-1");
    assert_eq!(env.timestamp, 1234);
    assert_eq!(env.target_users, Some(vec!["u1".to_string()]));
}

#[test]
fn test_server_message_rejects_malformed() {
    assert!(ServerMessage::parse("not json").is_err());
    assert!(ServerMessage::parse(r#"{"data":{}}"#).is_err());
    assert!(ServerMessage::parse(r#"[1,2,3]"#).is_err());
}

#[test]
fn test_classification_tiers() {
    for kind in NotificationKind::ALL {
        let env = ServerMessage::parse(&format!(r#"{{"type":"{}"}}"#, kind.as_str()))
            .unwrap()
            .normalize(0);
        assert_eq!(env.classify(), MessageClass::UserFacing(kind));
    }
    for name in ["heartbeat", "auth_success", "user_joined", "user_left"] {
        let env = ServerMessage::parse(&format!(r#"{{"type":"{}"}}"#, name))
            .unwrap()
            .normalize(0);
        assert!(matches!(env.classify(), MessageClass::Protocol(_)), "{} should be protocol", name);
    }
    let env = ServerMessage::parse(r#"{"type":"vote_cast"}"#).unwrap().normalize(0);
    assert_eq!(env.classify(), MessageClass::Unknown);
}

// ==================== Auth payload Tests ====================

#[test]
fn test_auth_payload_flattened_tokens() {
    let payload: AuthPayload = serde_json::from_value(json!({
        "access_token": "a",
        "refresh_token": "r",
        "token_type": "bearer",
        "user": {
            "id": "u1",
            "email": "ada@example.org",
            "username": "ada",
            "display_name": "Ada",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }
    }))
    .unwrap();

    assert_eq!(payload.tokens, TokenPair::new("a", "r"));
    assert!(payload.user.is_active);
    assert_eq!(payload.user.role, None);
}

#[test]
fn test_api_response_into_data() {
    let ok: ApiResponse<u32> = serde_json::from_value(json!({"success": true, "data": 5})).unwrap();
    assert_eq!(ok.into_data(), Ok(5));

    let failed: ApiResponse<u32> =
        serde_json::from_value(json!({"success": false, "message": "Invalid credentials"})).unwrap();
    assert_eq!(failed.into_data(), Err("Invalid credentials".to_string()));
}

#[test]
fn test_token_pair_debug_redacts() {
    let pair = TokenPair::new("secret-access", "secret-refresh");
    let debug = format!("{:?}", pair);
    assert!(!debug.contains("secret-access"));
    assert!(!debug.contains("secret-refresh"));
}

#[test]
fn test_connection_status_serde() {
    assert_eq!(
        serde_json::to_value(ConnectionStatus::Reconnecting).unwrap(),
        json!("RECONNECTING")
    );
    assert_eq!(ConnectionStatus::default(), ConnectionStatus::Disconnected);
}
