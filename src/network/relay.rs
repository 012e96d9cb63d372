// src/network/relay.rs
//
// Per-packet control loop. Every inbound packet is handled on the receive task of the
// connection it arrived on; the dedup check-and-insert is the only gate against a packet
// circulating forever in a cyclic mesh.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;

use crate::config::Config;
use crate::constants::{REPLAY_SEND_PATIENCE_MS, SYSTEM_SENDER};
use crate::emit_session_event;
use crate::events::model::LogLevel;
use crate::network::connection::{Connection, Inbound};
use crate::network::dedup::DedupTracker;
use crate::network::events::{emit_network_event, emit_relay_event};
use crate::network::packet::{Packet, PacketType};
use crate::network::presence::PresenceBook;
use crate::network::topology::{Direction, NeighborId, NeighborLink, TopologyManager};
use crate::node::notice::NodeEvent;
use crate::session::{chat_with, is_real_name, merge_name};
use crate::storage::{ApplyOutcome, ChatStore, Friend};

/// Who we are on the wire.
#[derive(Debug, Clone)]
pub struct Identity {
    pub name: String,
    /// `host:port` other peers can dial us on
    pub address: String,
}

#[derive(Debug, Clone, Copy)]
pub struct RelaySettings {
    pub connect_timeout: Duration,
    pub max_frame: usize,
    pub replay_history: bool,
    pub auto_accept_friends: bool,
    /// Unanswered friend requests are forgotten after this long.
    pub friend_request_ttl: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            max_frame: config.max_frame_bytes(),
            replay_history: config.replay_history(),
            auto_accept_friends: config.auto_accept_friends(),
            friend_request_ttl: config.friend_request_ttl(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What the engine did with one inbound packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Ping, or a packet we had no use for.
    Discarded,
    /// Hello: neighbor labelled and announced.
    Announced,
    /// Friend request/response handed to the handshake layer.
    Handshake,
    /// Flooded packet already seen.
    Duplicate,
    /// First sighting: applied locally and queued for the listed neighbors.
    Applied {
        outcome: Option<ApplyOutcome>,
        relayed_to: Vec<NeighborId>,
    },
    /// History backfill merged without relaying.
    Replayed { outcome: Option<ApplyOutcome> },
}

#[derive(Clone)]
pub struct RelayEngine {
    pub(crate) identity: Arc<Identity>,
    pub(crate) settings: RelaySettings,
    pub(crate) topology: TopologyManager,
    pub(crate) dedup: DedupTracker,
    pub(crate) store: Arc<dyn ChatStore>,
    pub(crate) notices: Sender<NodeEvent>,
    /// Resolved addresses we sent a friend request to, with the time we asked.
    pub(crate) pending_friends: Arc<Mutex<HashMap<SocketAddr, Instant>>>,
    pub(crate) presence: PresenceBook,
    /// Held across load, merge and store of a session name.
    naming: Arc<Mutex<()>>,
}

impl RelayEngine {
    pub fn new(
        identity: Identity,
        settings: RelaySettings,
        topology: TopologyManager,
        dedup: DedupTracker,
        store: Arc<dyn ChatStore>,
        notices: Sender<NodeEvent>,
    ) -> Self {
        Self {
            identity: Arc::new(identity),
            settings,
            topology,
            dedup,
            store,
            notices,
            pending_friends: Arc::new(Mutex::new(HashMap::new())),
            presence: PresenceBook::default(),
            naming: Arc::new(Mutex::new(())),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    pub fn dedup(&self) -> &DedupTracker {
        &self.dedup
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub fn presence(&self) -> &PresenceBook {
        &self.presence
    }

    /// Stored friends with their last probed online state.
    pub fn friends(&self) -> Vec<Friend> {
        match self.store.list_friends() {
            Ok(friends) => self.presence.annotate(friends),
            Err(e) => {
                self.log_store_error("list_friends", "", &e.to_string());
                Vec::new()
            }
        }
    }

    /// Forget every processed id and pending request. Used by a full data wipe.
    pub fn reset(&self) {
        self.dedup.clear();
        self.pending_friends.lock().clear();
        self.presence.clear();
    }

    /// Fresh packet stamped with our name and address.
    pub fn packet(&self, kind: PacketType) -> Packet {
        Packet::new(kind, &self.identity.name, Some(self.identity.address.clone()))
    }

    /// Register `connection` as a mesh neighbor, greet it, and start its receive loop.
    pub async fn attach(&self, connection: Connection, direction: Direction) -> NeighborId {
        let link = self.topology.add_neighbor(connection, direction).await;
        let id = link.id;
        if let Err(e) = self.topology.send_to(id, self.packet(PacketType::Hello)).await {
            emit_network_event(
                "relay",
                LogLevel::Warn,
                "hello_failed",
                Some(link.addr.to_string()),
                Some(e.to_string()),
            );
        }
        let engine = self.clone();
        tokio::spawn(async move { engine.receive_loop(link).await });
        id
    }

    async fn receive_loop(self, link: NeighborLink) {
        let NeighborLink {
            id,
            addr,
            mut reader,
            mut shutdown,
        } = link;
        loop {
            let inbound = tokio::select! {
                r = reader.receive() => r,
                _ = &mut shutdown => break,
            };
            match inbound {
                Ok(Inbound::Packet(packet)) => {
                    self.handle_inbound(packet, id).await;
                }
                Ok(Inbound::Malformed(e)) => {
                    emit_network_event(
                        "relay",
                        LogLevel::Warn,
                        "malformed_frame",
                        Some(addr.to_string()),
                        Some(e.to_string()),
                    );
                }
                Ok(Inbound::Closed) => {
                    emit_network_event(
                        "relay",
                        LogLevel::Info,
                        "peer_closed",
                        Some(addr.to_string()),
                        None,
                    );
                    break;
                }
                Err(e) => {
                    emit_network_event(
                        "relay",
                        LogLevel::Warn,
                        "read_failed",
                        Some(addr.to_string()),
                        Some(e.to_string()),
                    );
                    break;
                }
            }
        }
        self.topology.remove_neighbor(id).await;
    }

    /// Run one inbound packet through the relay state machine.
    pub async fn handle_inbound(&self, packet: Packet, from: NeighborId) -> Disposition {
        match packet.kind {
            PacketType::Ping => Disposition::Discarded,
            PacketType::Hello => {
                self.on_hello(&packet, from).await;
                Disposition::Announced
            }
            PacketType::FriendRequest => {
                self.on_friend_request(&packet, from).await;
                Disposition::Handshake
            }
            PacketType::FriendResponse => {
                self.on_friend_response(&packet).await;
                Disposition::Handshake
            }
            _ if packet.replay => self.merge_replay(&packet, from).await,
            _ => self.flood(packet, Some(from)).await,
        }
    }

    /// Apply and flood a locally created packet. There is no sender to exclude.
    pub async fn originate(&self, packet: Packet) -> Disposition {
        self.flood(packet, None).await
    }

    async fn flood(&self, packet: Packet, from: Option<NeighborId>) -> Disposition {
        if !self.dedup.mark_and_check(&packet.id) {
            emit_relay_event(LogLevel::Debug, "duplicate", &packet, from, None);
            return Disposition::Duplicate;
        }
        let session_id = packet.session().unwrap_or_default().to_string();

        // Captured before this packet can rename the session.
        let known_name = match (packet.kind, from) {
            (PacketType::Invite, Some(_)) => self.real_session_name(&session_id),
            _ => None,
        };

        if let Some(from) = from {
            self.topology.record_subscription(from, &session_id).await;
        }
        let outcome = self.apply_local(&packet);
        self.update_session(&packet);
        self.notify_applied(&packet, false);

        let relayed_to = self.topology.broadcast(&packet, from).await;
        emit_relay_event(
            LogLevel::Debug,
            "relayed",
            &packet,
            from,
            Some(format!("fanout={} outcome={:?}", relayed_to.len(), outcome)),
        );

        if let (PacketType::Invite, Some(from)) = (packet.kind, from) {
            self.answer_invite(&packet, from, known_name).await;
        }

        Disposition::Applied {
            outcome,
            relayed_to,
        }
    }

    async fn merge_replay(&self, packet: &Packet, from: NeighborId) -> Disposition {
        let session_id = packet.session().unwrap_or_default();
        self.topology.record_subscription(from, session_id).await;
        let outcome = self.apply_local(packet);
        self.update_session(packet);
        if matches!(
            outcome,
            Some(ApplyOutcome::Inserted | ApplyOutcome::Edited | ApplyOutcome::Removed)
        ) {
            self.notify_applied(packet, true);
        }
        emit_relay_event(
            LogLevel::Debug,
            "replay_merged",
            packet,
            Some(from),
            Some(format!("outcome={:?}", outcome)),
        );
        Disposition::Replayed { outcome }
    }

    /// Greet a newly joined member: announce the room name (when we know a real one)
    /// and backfill history directly on the inviting connection.
    async fn answer_invite(&self, invite: &Packet, to: NeighborId, known_name: Option<String>) {
        let session_id = invite.session().unwrap_or_default();
        if let Some(name) = known_name {
            let notice = Packet::new(
                PacketType::SystemNotice,
                SYSTEM_SENDER,
                Some(self.identity.address.clone()),
            )
            .with_session(session_id)
            .with_group_name(Some(name.clone()))
            .with_content(format!("Joined room: {}", name));
            self.dedup.mark_and_check(&notice.id);
            if let Err(e) = self.topology.send_to_waiting(to, notice, replay_patience()).await {
                emit_relay_event(
                    LogLevel::Warn,
                    "invite_reply_failed",
                    invite,
                    Some(to),
                    Some(e.to_string()),
                );
                return;
            }
        }
        if self.settings.replay_history {
            self.replay_history(to, session_id, Some(&invite.id)).await;
        }
    }

    /// Send the stored Message/SystemNotice log for `session_id` to one neighbor, flagged as replay.
    /// Waits for queue space rather than dropping, so a long history arrives whole.
    pub async fn replay_history(
        &self,
        to: NeighborId,
        session_id: &str,
        skip_id: Option<&str>,
    ) -> usize {
        let history = match self.store.list_messages(session_id) {
            Ok(history) => history,
            Err(e) => {
                self.log_store_error("list_messages", session_id, &e.to_string());
                return 0;
            }
        };
        let mut sent = 0;
        for packet in history.iter().filter(|p| {
            matches!(p.kind, PacketType::Message | PacketType::SystemNotice)
                && Some(p.id.as_str()) != skip_id
        }) {
            match self
                .topology
                .send_to_waiting(to, packet.as_replay(), replay_patience())
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => {
                    emit_relay_event(
                        LogLevel::Warn,
                        "replay_stalled",
                        packet,
                        Some(to),
                        Some(format!("sent={} err={}", sent, e)),
                    );
                    break;
                }
            }
        }
        if sent > 0 {
            emit_session_event!(
                LogLevel::Info,
                "history_replayed",
                session_id,
                Some(format!("neighbor={} packets={}", to, sent))
            );
        }
        sent
    }

    async fn on_hello(&self, packet: &Packet, from: NeighborId) {
        self.topology.set_label(from, &packet.sender_name).await;
        self.notify(NodeEvent::PeerHello {
            sender_name: packet.sender_name.clone(),
            sender_address: packet.sender_address.clone(),
        });
    }

    fn apply_local(&self, packet: &Packet) -> Option<ApplyOutcome> {
        let session_id = packet.session()?;
        match self.store.append_or_mutate_message(session_id, packet) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                self.log_store_error("append_or_mutate_message", session_id, &e.to_string());
                None
            }
        }
    }

    /// Touch the session and apply the naming policy for whatever name the packet proposes.
    fn update_session(&self, packet: &Packet) {
        let Some(session_id) = packet.session() else {
            return;
        };
        let proposed = match packet.group() {
            Some(group) => Some(group.to_string()),
            None if packet.kind == PacketType::Invite => Some(chat_with(&packet.sender_name)),
            None => None,
        };
        let Some((existing, name)) = self.merge_session_name(session_id, proposed.as_deref()) else {
            return;
        };
        if existing.as_deref() != Some(name.as_str()) {
            emit_session_event!(
                LogLevel::Info,
                "session_named",
                session_id,
                Some(format!("{:?} -> {:?}", existing, name))
            );
            self.notify_sessions();
        }
    }

    /// Apply the naming policy to `proposed` and store the result. Concurrent receive
    /// tasks go through here one at a time, so a stale read can never write a
    /// placeholder over a name learned meanwhile. Returns the previous and new name.
    pub(crate) fn merge_session_name(
        &self,
        session_id: &str,
        proposed: Option<&str>,
    ) -> Option<(Option<String>, String)> {
        let _naming = self.naming.lock();
        let existing = match self.store.load_session_name(session_id) {
            Ok(existing) => existing,
            Err(e) => {
                self.log_store_error("load_session_name", session_id, &e.to_string());
                return None;
            }
        };
        let name = merge_name(existing.as_deref(), proposed);
        if let Err(e) = self.store.upsert_session(session_id, &name) {
            self.log_store_error("upsert_session", session_id, &e.to_string());
            return None;
        }
        Some((existing, name))
    }

    /// Current name for `session_id` if it is a real (non-placeholder) one.
    pub fn real_session_name(&self, session_id: &str) -> Option<String> {
        self.store
            .load_session_name(session_id)
            .ok()
            .flatten()
            .filter(|name| is_real_name(name))
    }

    pub(crate) fn notify(&self, event: NodeEvent) {
        if let Err(e) = self.notices.try_send(event) {
            emit_network_event("relay", LogLevel::Debug, "notice_dropped", None, Some(e.to_string()));
        }
    }

    fn notify_applied(&self, packet: &Packet, replayed: bool) {
        let Some(session_id) = packet.session() else {
            return;
        };
        let messages = self.store.list_messages(session_id).unwrap_or_else(|e| {
            self.log_store_error("list_messages", session_id, &e.to_string());
            Vec::new()
        });
        self.notify(NodeEvent::PacketApplied {
            session_id: session_id.to_string(),
            packet_id: packet.id.clone(),
            kind: packet.kind,
            replayed,
            messages,
        });
    }

    pub(crate) fn notify_sessions(&self) {
        match self.store.list_sessions() {
            Ok(sessions) => self.notify(NodeEvent::SessionsUpdated { sessions }),
            Err(e) => self.log_store_error("list_sessions", "", &e.to_string()),
        }
    }

    pub(crate) fn log_store_error(&self, op: &str, session_id: &str, err: &str) {
        emit_session_event!(
            LogLevel::Warn,
            "store_failed",
            session_id,
            Some(format!("op={} err={}", op, err))
        );
    }
}

fn replay_patience() -> Duration {
    Duration::from_millis(REPLAY_SEND_PATIENCE_MS)
}
