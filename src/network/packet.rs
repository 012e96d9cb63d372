// src/network/packet.rs

use crate::error::PacketError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Neighbor greeting (wire token: "HELLO")
    #[serde(rename = "HELLO")]
    Hello,
    /// Room notice such as the canonical name announcement (wire token: "SYSTEM")
    #[serde(rename = "SYSTEM")]
    SystemNotice,
    #[serde(rename = "MESSAGE")]
    Message,
    #[serde(rename = "EDIT")]
    Edit,
    #[serde(rename = "DELETE")]
    Delete,
    /// Room membership bootstrap (wire token: "INVITE")
    #[serde(rename = "INVITE")]
    Invite,
    /// Liveness only (wire token: "PING")
    #[serde(rename = "PING")]
    Ping,
    #[serde(rename = "FRIEND_REQ")]
    FriendRequest,
    #[serde(rename = "FRIEND_RES")]
    FriendResponse,
}

impl PacketType {
    /// Flooded types travel the mesh; the rest are strictly point-to-point.
    pub fn is_flooded(self) -> bool {
        matches!(
            self,
            PacketType::Message
                | PacketType::Edit
                | PacketType::Delete
                | PacketType::SystemNotice
                | PacketType::Invite
        )
    }

    /// Types that are kept in a session's message log.
    pub fn is_stored(self) -> bool {
        matches!(
            self,
            PacketType::Message | PacketType::Invite | PacketType::SystemNotice
        )
    }
}

pub fn is_flooded(kind: PacketType) -> bool {
    kind.is_flooded()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: PacketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_address: Option<String>,
    #[serde(default)]
    pub content: String,
    /// Unix milliseconds at origination. Display only.
    #[serde(default)]
    pub timestamp: u64,
    /// History backfill copy: merged idempotently, never relayed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replay: bool,
}

impl Packet {
    /// New packet with a fresh id and the current timestamp.
    pub fn new(kind: PacketType, sender_name: &str, sender_address: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            target_id: None,
            session_id: None,
            group_name: None,
            sender_name: sender_name.to_string(),
            sender_address,
            content: String::new(),
            timestamp: now_millis(),
            replay: false,
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    pub fn with_target(mut self, target_id: &str) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_group_name(mut self, group_name: Option<String>) -> Self {
        self.group_name = group_name.filter(|g| !g.is_empty());
        self
    }

    pub fn with_content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = content.into();
        self
    }

    /// Copy flagged as history backfill. Id is preserved so the receiver can merge.
    pub fn as_replay(&self) -> Self {
        let mut copy = self.clone();
        copy.replay = true;
        copy
    }

    pub fn is_flooded(&self) -> bool {
        self.kind.is_flooded()
    }

    /// Session id, treating an empty string as absent.
    pub fn session(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn group(&self) -> Option<&str> {
        self.group_name.as_deref().filter(|g| !g.is_empty())
    }

    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        serde_json::to_vec(self).map_err(PacketError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.is_empty() {
            return Err(PacketError::EmptyFrame);
        }
        let packet: Packet = serde_json::from_slice(bytes)?;
        packet.validate()?;
        Ok(packet)
    }

    pub fn as_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    fn validate(&self) -> Result<(), PacketError> {
        if self.id.is_empty() {
            return Err(PacketError::MissingField("id"));
        }
        if self.kind.is_flooded() && self.session().is_none() {
            return Err(PacketError::MissingField("sessionId"));
        }
        if matches!(self.kind, PacketType::Edit | PacketType::Delete)
            && self.target_id.as_deref().map(str::is_empty).unwrap_or(true)
        {
            return Err(PacketError::MissingField("targetId"));
        }
        Ok(())
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Split a `host:port` sender address. `None` when it is not parseable.
pub fn split_address(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port = port.parse::<u16>().ok()?;
    Some((host.trim_start_matches('[').trim_end_matches(']').to_string(), port))
}

pub fn join_address(ip: &str, port: u16) -> String {
    if ip.contains(':') && !ip.starts_with('[') {
        format!("[{}]:{}", ip, port)
    } else {
        format!("{}:{}", ip, port)
    }
}
