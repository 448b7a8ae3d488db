#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the protocol types.
//!
//! Checks the JSON produced for client messages and parses fixtures shaped
//! like real server output.

use party_realtime_client::protocol::{
    ClientMessage, GameState, NewNotification, NotificationType, Room, ServerMessage,
};
use serde_json::json;

fn to_value<T: serde::Serialize>(val: &T) -> serde_json::Value {
    serde_json::to_value(val).expect("serialize")
}

// ════════════════════════════════════════════════════════════════════
// Client → server
// ════════════════════════════════════════════════════════════════════

#[test]
fn authenticate_uses_camel_case_fields() {
    let msg = ClientMessage::Authenticate {
        username: "alice".into(),
        player_id: Some("p-1".into()),
    };
    assert_eq!(
        to_value(&msg),
        json!({"type": "authenticate", "data": {"username": "alice", "playerId": "p-1"}})
    );
}

#[test]
fn authenticate_omits_missing_player_id() {
    let msg = ClientMessage::Authenticate {
        username: "alice".into(),
        player_id: None,
    };
    assert_eq!(
        to_value(&msg),
        json!({"type": "authenticate", "data": {"username": "alice"}})
    );
}

#[test]
fn room_commands() {
    assert_eq!(
        to_value(&ClientMessage::JoinRoom {
            room_code: "ABCD".into()
        }),
        json!({"type": "join_room", "data": {"roomCode": "ABCD"}})
    );
    assert_eq!(to_value(&ClientMessage::CreateRoom), json!({"type": "create_room"}));
    assert_eq!(to_value(&ClientMessage::LeaveRoom), json!({"type": "leave_room"}));
    assert_eq!(to_value(&ClientMessage::StartGame), json!({"type": "start_game"}));
}

#[test]
fn game_action_passes_payload_through() {
    let msg = ClientMessage::GameAction {
        action: json!({"kind": "vote", "target": 3}),
    };
    assert_eq!(
        to_value(&msg),
        json!({"type": "game_action", "data": {"action": {"kind": "vote", "target": 3}}})
    );
}

// ════════════════════════════════════════════════════════════════════
// Server → client fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn parses_authenticated() {
    let msg: ServerMessage = serde_json::from_str(
        r#"{"type":"authenticated","data":{"channelId":"xYz123","playerId":"p-42"}}"#,
    )
    .unwrap();
    assert_eq!(
        msg,
        ServerMessage::Authenticated {
            channel_id: "xYz123".into(),
            player_id: Some("p-42".into()),
        }
    );
}

#[test]
fn room_documents_stay_opaque() {
    let raw = r#"{
        "type": "room_joined",
        "data": {
            "room": {
                "code": "ABCD",
                "hostId": "p-1",
                "players": [{"id": "p-1", "name": "alice", "ready": true}],
                "settings": {"maxPlayers": 8, "rounds": 3}
            }
        }
    }"#;
    let ServerMessage::RoomJoined { room } = serde_json::from_str(raw).unwrap() else {
        panic!("expected room_joined");
    };
    assert_eq!(room.code(), Some("ABCD"));
    assert_eq!(room.field("settings").unwrap()["rounds"], 3);

    // Re-serializing keeps unknown fields intact.
    assert_eq!(to_value(&room)["players"][0]["ready"], true);
}

#[test]
fn parses_game_lifecycle() {
    let started: ServerMessage =
        serde_json::from_str(r#"{"type":"game_started","data":{"game":{"round":1}}}"#).unwrap();
    assert_eq!(
        started,
        ServerMessage::GameStarted {
            game: GameState(json!({"round": 1}))
        }
    );

    let left: ServerMessage = serde_json::from_str(r#"{"type":"room_left"}"#).unwrap();
    assert_eq!(left, ServerMessage::RoomLeft);
}

#[test]
fn parses_notification_push() {
    let raw = r#"{
        "type": "notification",
        "data": {
            "type": "game_invitation",
            "title": "Invite",
            "message": "bob invited you",
            "data": {"roomCode": "WXYZ"},
            "actionable": true
        }
    }"#;
    let msg: ServerMessage = serde_json::from_str(raw).unwrap();
    assert_eq!(
        msg,
        ServerMessage::Notification(
            NewNotification::new(NotificationType::GameInvitation, "Invite", "bob invited you")
                .with_data(json!({"roomCode": "WXYZ"}))
                .with_actionable(true)
        )
    );
}

#[test]
fn notification_types_use_snake_case() {
    let all = [
        (NotificationType::FriendRequest, "friend_request"),
        (NotificationType::FriendAccepted, "friend_accepted"),
        (NotificationType::GameInvitation, "game_invitation"),
        (NotificationType::Message, "message"),
        (NotificationType::Achievement, "achievement"),
        (NotificationType::LevelUp, "level_up"),
        (NotificationType::System, "system"),
    ];
    for (kind, wire) in all {
        assert_eq!(to_value(&kind), json!(wire));
    }
}

#[test]
fn unknown_message_type_is_rejected() {
    let result = serde_json::from_str::<ServerMessage>(r#"{"type":"teleport","data":{}}"#);
    assert!(result.is_err());
}

#[test]
fn error_code_is_optional() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"type":"error","data":{"message":"nope"}}"#).unwrap();
    assert_eq!(
        msg,
        ServerMessage::Error {
            message: "nope".into(),
            code: None,
        }
    );
    assert_eq!(msg.kind(), "error");
    assert_eq!(Room(json!({})).code(), None);
}
