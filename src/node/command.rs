// src/node/command.rs
//
// Command surface offered to the UI collaborator. On the wire (stdin of the binary)
// a command looks like `{"cmd":"SEND_MESSAGE","data":{"sessionId":"R1","content":"hi"}}`.

use serde::{Deserialize, Serialize};

use crate::network::handshake::FriendOutcome;
use crate::network::packet::Packet;
use crate::network::topology::NeighborId;
use crate::storage::{Friend, SessionRecord};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(
    tag = "cmd",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    SendMessage {
        session_id: String,
        content: String,
    },
    EditMessage {
        session_id: String,
        target_id: String,
        new_content: String,
    },
    DeleteMessage {
        session_id: String,
        target_id: String,
    },
    CreateSession {
        name: String,
    },
    JoinSession {
        ip: String,
        port: u16,
        session_id: String,
    },
    InviteToSession {
        ip: String,
        port: u16,
        session_id: String,
    },
    RequestFriend {
        ip: String,
        port: u16,
    },
    RespondFriend {
        ip: String,
        port: u16,
        accepted: bool,
        name: String,
    },
    ListMessages {
        session_id: String,
    },
    ListSessions,
    ListFriends,
    /// Wipe all local data and forget processed packet ids.
    ResetData,
}

impl Command {
    pub fn from_json(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(
    tag = "result",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum CommandOutcome {
    /// A packet was originated and flooded.
    Sent { packet_id: String },
    SessionCreated { session_id: String },
    Joined { session_id: String, neighbor: NeighborId },
    Invited { session_id: String, neighbor: NeighborId },
    Friend(FriendOutcome),
    Messages { messages: Vec<Packet> },
    Sessions { sessions: Vec<SessionRecord> },
    Friends { friends: Vec<Friend> },
    Reset,
    /// User-visible failure (unreachable peer, duplicate friend name, bad input).
    Rejected { reason: String },
}

impl CommandOutcome {
    pub fn rejected<S: Into<String>>(reason: S) -> Self {
        CommandOutcome::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CommandOutcome::Rejected { .. })
    }
}
