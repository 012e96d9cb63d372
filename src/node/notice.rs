// src/node/notice.rs
// Events raised toward the UI collaborator.

use serde::Serialize;

use crate::network::packet::{Packet, PacketType};
use crate::storage::{Friend, SessionRecord};

#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum NodeEvent {
    /// A packet was applied locally; `messages` is the session log after the apply.
    PacketApplied {
        session_id: String,
        packet_id: String,
        kind: PacketType,
        replayed: bool,
        messages: Vec<Packet>,
    },
    PeerHello {
        sender_name: String,
        sender_address: Option<String>,
    },
    FriendRequestReceived {
        name: String,
        ip: String,
        port: u16,
    },
    FriendAccepted {
        name: String,
        ip: String,
        port: u16,
    },
    FriendsUpdated {
        friends: Vec<Friend>,
    },
    SessionsUpdated {
        sessions: Vec<SessionRecord>,
    },
    /// User-visible failure or notice that is not tied to a command result.
    Alert {
        message: String,
    },
}

impl NodeEvent {
    pub fn alert<S: Into<String>>(message: S) -> Self {
        NodeEvent::Alert {
            message: message.into(),
        }
    }

    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }
}
