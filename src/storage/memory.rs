// src/storage/memory.rs
// In-process store used by the binary and by tests.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::constants::EDIT_MARKER;
use crate::error::StoreError;
use crate::network::packet::{now_millis, Packet, PacketType};
use crate::storage::{ApplyOutcome, ChatStore, Friend, SessionRecord};

#[derive(Default)]
struct State {
    sessions: HashMap<String, SessionRecord>,
    messages: HashMap<String, Vec<Packet>>,
    friends: Vec<Friend>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatStore for MemoryStore {
    fn load_session_name(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .sessions
            .get(session_id)
            .map(|s| s.name.clone()))
    }

    fn upsert_session(&self, session_id: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.inner.write();
        let now = now_millis();
        state
            .sessions
            .entry(session_id.to_string())
            .and_modify(|s| {
                s.name = name.to_string();
                s.last_active = now;
            })
            .or_insert_with(|| SessionRecord {
                session_id: session_id.to_string(),
                name: name.to_string(),
                last_active: now,
            });
        Ok(())
    }

    fn append_or_mutate_message(
        &self,
        session_id: &str,
        packet: &Packet,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut state = self.inner.write();
        let log = state.messages.entry(session_id.to_string()).or_default();
        let outcome = match packet.kind {
            kind if kind.is_stored() => {
                if log.iter().any(|m| m.id == packet.id) {
                    ApplyOutcome::AlreadyPresent
                } else {
                    let mut stored = packet.clone();
                    stored.replay = false;
                    log.push(stored);
                    ApplyOutcome::Inserted
                }
            }
            PacketType::Edit => {
                let target = packet.target_id.as_deref().unwrap_or_default();
                match log.iter_mut().find(|m| m.id == target) {
                    Some(m) => {
                        m.content = format!("{}{}", packet.content, EDIT_MARKER);
                        ApplyOutcome::Edited
                    }
                    None => ApplyOutcome::TargetMissing,
                }
            }
            PacketType::Delete => {
                let target = packet.target_id.as_deref().unwrap_or_default();
                match log.iter().position(|m| m.id == target) {
                    Some(idx) => {
                        log.remove(idx);
                        ApplyOutcome::Removed
                    }
                    None => ApplyOutcome::TargetMissing,
                }
            }
            _ => ApplyOutcome::Ignored,
        };
        Ok(outcome)
    }

    fn list_messages(&self, session_id: &str) -> Result<Vec<Packet>, StoreError> {
        Ok(self
            .inner
            .read()
            .messages
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let mut sessions: Vec<SessionRecord> =
            self.inner.read().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| {
            b.last_active
                .cmp(&a.last_active)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    fn list_friends(&self) -> Result<Vec<Friend>, StoreError> {
        Ok(self.inner.read().friends.clone())
    }

    fn upsert_friend(&self, name: &str, ip: &str, port: u16) -> Result<bool, StoreError> {
        let mut state = self.inner.write();
        let wanted = name.to_lowercase();
        if state.friends.iter().any(|f| f.name.to_lowercase() == wanted) {
            return Ok(false);
        }
        state.friends.retain(|f| !(f.ip == ip && f.port == port));
        state.friends.push(Friend::new(name, ip, port));
        Ok(true)
    }

    fn wipe(&self) -> Result<(), StoreError> {
        *self.inner.write() = State::default();
        Ok(())
    }
}
