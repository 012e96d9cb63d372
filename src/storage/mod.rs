//! Storage collaborator interface.
//!
//! The relay core calls these synchronously and treats every error as non-fatal:
//! a failed write is logged and flooding carries on.

pub mod memory;

pub use memory::MemoryStore;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::network::packet::Packet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub name: String,
    /// Unix milliseconds of the last packet touching this session
    pub last_active: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub name: String,
    pub ip: String,
    pub port: u16,
    /// Runtime only; filled in by the presence prober.
    #[serde(default)]
    pub is_online: bool,
}

impl Friend {
    pub fn new(name: &str, ip: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            ip: ip.to_string(),
            port,
            is_online: false,
        }
    }

    pub fn address(&self) -> String {
        crate::network::packet::join_address(&self.ip, self.port)
    }
}

/// What a store did with one applied packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyOutcome {
    Inserted,
    /// Same id already in the log.
    AlreadyPresent,
    Edited,
    Removed,
    /// Edit/Delete whose target is not (yet) stored.
    TargetMissing,
    /// Packet type that is never stored.
    Ignored,
}

pub trait ChatStore: Send + Sync {
    fn load_session_name(&self, session_id: &str) -> Result<Option<String>, StoreError>;

    /// Create the session or set its name; always refreshes `last_active`.
    fn upsert_session(&self, session_id: &str, name: &str) -> Result<(), StoreError>;

    /// Insert Message/Invite/SystemNotice idempotently by id, or apply an Edit/Delete to its target.
    fn append_or_mutate_message(
        &self,
        session_id: &str,
        packet: &Packet,
    ) -> Result<ApplyOutcome, StoreError>;

    fn list_messages(&self, session_id: &str) -> Result<Vec<Packet>, StoreError>;

    /// All sessions, most recently active first.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError>;

    fn list_friends(&self) -> Result<Vec<Friend>, StoreError>;

    /// False when another friend already has this name (case-insensitive).
    /// An existing entry for the same address is replaced.
    fn upsert_friend(&self, name: &str, ip: &str, port: u16) -> Result<bool, StoreError>;

    /// Full local data wipe.
    fn wipe(&self) -> Result<(), StoreError>;
}
