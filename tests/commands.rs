mod common;

use common::*;
use meshchat::network::handshake::FriendOutcome;
use meshchat::node::{Command, CommandOutcome, NodeEvent};
use meshchat::storage::ChatStore;
use serde_json::json;

#[test]
fn commands_parse_from_json_lines() {
    let send = Command::from_json(r#"{"cmd":"SEND_MESSAGE","data":{"sessionId":"R1","content":"hi"}}"#)
        .unwrap();
    assert_eq!(
        send,
        Command::SendMessage {
            session_id: "R1".into(),
            content: "hi".into()
        }
    );

    let join = Command::from_json(
        r#"{"cmd":"JOIN_SESSION","data":{"ip":"10.0.0.2","port":5001,"sessionId":"AB12CD"}}"#,
    )
    .unwrap();
    assert_eq!(
        join,
        Command::JoinSession {
            ip: "10.0.0.2".into(),
            port: 5001,
            session_id: "AB12CD".into()
        }
    );

    assert_eq!(
        Command::from_json(r#"{"cmd":"LIST_SESSIONS"}"#).unwrap(),
        Command::ListSessions
    );
    assert_eq!(
        Command::from_json(r#"{"cmd":"RESET_DATA"}"#).unwrap(),
        Command::ResetData
    );
}

#[test]
fn bad_commands_do_not_parse() {
    assert!(Command::from_json(r#"{"cmd":"FLY"}"#).is_err());
    assert!(Command::from_json(r#"{"cmd":"SEND_MESSAGE","data":{"sessionId":"R1"}}"#).is_err());
    assert!(Command::from_json("not json").is_err());
}

#[test]
fn outcomes_serialize_for_the_ui() {
    let sent = serde_json::to_value(CommandOutcome::Sent {
        packet_id: "p1".into(),
    })
    .unwrap();
    assert_eq!(sent, json!({"result": "SENT", "data": {"packetId": "p1"}}));

    let friend = serde_json::to_value(CommandOutcome::Friend(FriendOutcome::Accepted {
        name: "bob".into(),
    }))
    .unwrap();
    assert_eq!(
        friend,
        json!({"result": "FRIEND", "data": {"status": "accepted", "name": "bob"}})
    );

    let rejected = serde_json::to_value(CommandOutcome::rejected("nope")).unwrap();
    assert_eq!(rejected["result"], "REJECTED");
    assert_eq!(rejected["data"]["reason"], "nope");
}

#[test]
fn events_serialize_with_camel_case_fields() {
    let event = NodeEvent::FriendRequestReceived {
        name: "alice".into(),
        ip: "10.0.0.1".into(),
        port: 5000,
    };
    let value: serde_json::Value = serde_json::from_str(&event.as_json()).unwrap();
    assert_eq!(value["event"], "FRIEND_REQUEST_RECEIVED");
    assert_eq!(value["data"]["port"], 5000);

    let hello: serde_json::Value = serde_json::from_str(
        &NodeEvent::PeerHello {
            sender_name: "bob".into(),
            sender_address: None,
        }
        .as_json(),
    )
    .unwrap();
    assert_eq!(hello["data"]["senderName"], "bob");
}

#[tokio::test]
async fn create_session_hands_out_short_ids() {
    let a = start_peer("alice").await;
    let id = a.create_session("  TeamChat ").await;
    assert_eq!(id.len(), 6);
    assert_eq!(
        a.store.load_session_name(&id).unwrap().as_deref(),
        Some("TeamChat")
    );

    let empty = a
        .node
        .execute(Command::CreateSession { name: "   ".into() })
        .await;
    assert!(empty.is_rejected());
}

#[tokio::test]
async fn blank_identifiers_are_rejected() {
    let a = start_peer("alice").await;
    let outcome = a
        .node
        .execute(Command::SendMessage {
            session_id: " ".into(),
            content: "hi".into(),
        })
        .await;
    assert!(outcome.is_rejected());

    let outcome = a
        .node
        .execute(Command::EditMessage {
            session_id: "R1".into(),
            target_id: "".into(),
            new_content: "x".into(),
        })
        .await;
    assert!(outcome.is_rejected());
    assert!(a.store.list_sessions().unwrap().is_empty());
}

#[tokio::test]
async fn send_stores_and_lists_messages() {
    let a = start_peer("alice").await;
    let room = a.create_session("Solo").await;
    let id = a.send(&room, "hello").await;

    match a
        .node
        .execute(Command::ListMessages {
            session_id: room.clone(),
        })
        .await
    {
        CommandOutcome::Messages { messages } => {
            assert_eq!(messages.len(), 1);
            assert_eq!(messages[0].id, id);
            assert_eq!(messages[0].group_name.as_deref(), Some("Solo"));
            assert_eq!(messages[0].sender_name, "alice");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }

    match a.node.execute(Command::ListSessions).await {
        CommandOutcome::Sessions { sessions } => {
            assert_eq!(sessions.len(), 1);
            assert_eq!(sessions[0].name, "Solo");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn reset_wipes_data_and_forgets_packet_ids() {
    let a = start_peer("alice").await;
    let room = a.create_session("Gone").await;
    a.send(&room, "soon forgotten").await;
    a.store.upsert_friend("bob", "10.0.0.2", 5001).unwrap();
    assert!(!a.node.engine().dedup().is_empty());

    assert_eq!(a.node.execute(Command::ResetData).await, CommandOutcome::Reset);
    assert!(a.store.list_sessions().unwrap().is_empty());
    assert!(a.store.list_messages(&room).unwrap().is_empty());
    assert!(a.store.list_friends().unwrap().is_empty());
    assert!(a.node.engine().dedup().is_empty());
}
