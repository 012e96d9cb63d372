// src/network/handshake.rs
//
// Short request/response exchanges on top of Connection: room join/invite and
// friend request/response.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::constants::{FRIEND_ACCEPT, FRIEND_DECLINE, FRIEND_REPLY_TIMEOUT_MS, NAME_JOINING};
use crate::emit_session_event;
use crate::error::LinkError;
use crate::events::model::LogLevel;
use crate::network::connection::{Connection, Inbound};
use crate::network::events::emit_network_event;
use crate::network::packet::{join_address, split_address, Packet, PacketType};
use crate::network::relay::RelayEngine;
use crate::network::topology::{Direction, NeighborId};
use crate::node::notice::NodeEvent;

/// Result of a friend exchange as seen by this peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FriendOutcome {
    Accepted { name: String },
    Declined,
    /// Another friend already uses this name.
    DuplicateName { name: String },
    /// Request delivered; the answer will arrive on a later connection.
    Pending,
    /// Response with no matching pending request, or unusable.
    Ignored,
}

impl RelayEngine {
    /// Join a room hosted (or known) by the peer at `ip:port`.
    ///
    /// Success only means the TCP connect succeeded. On failure no neighbor and no
    /// session is created.
    pub async fn join_session(
        &self,
        ip: &str,
        port: u16,
        session_id: &str,
    ) -> Result<NeighborId, LinkError> {
        self.connect_into_session(ip, port, session_id, true).await
    }

    /// Pull the peer at `ip:port` into one of our rooms. Same exchange as a join,
    /// seen from the other side.
    pub async fn invite_to_session(
        &self,
        ip: &str,
        port: u16,
        session_id: &str,
    ) -> Result<NeighborId, LinkError> {
        self.connect_into_session(ip, port, session_id, false).await
    }

    async fn connect_into_session(
        &self,
        ip: &str,
        port: u16,
        session_id: &str,
        joining: bool,
    ) -> Result<NeighborId, LinkError> {
        let address = join_address(ip, port);
        let connection = match Connection::connect(
            &address,
            self.settings.connect_timeout,
            self.settings.max_frame,
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                emit_network_event(
                    "handshake",
                    LogLevel::Warn,
                    "join_connect_failed",
                    Some(address),
                    Some(e.to_string()),
                );
                return Err(e);
            }
        };

        if joining {
            self.mark_joining(session_id);
        }

        let id = self.attach(connection, Direction::Outbound).await;
        let invite = self
            .packet(PacketType::Invite)
            .with_session(session_id)
            .with_group_name(self.real_session_name(session_id))
            .with_content("Joined");
        self.dedup.mark_and_check(&invite.id);
        self.topology.send_to(id, invite).await?;

        // Push our side of the room as well, so two partitions merge both ways.
        self.replay_history(id, session_id, None).await;

        let action = if joining { "join_sent" } else { "invite_sent" };
        emit_session_event!(
            LogLevel::Info,
            action,
            session_id,
            Some(format!("peer={} neighbor={}", address, id))
        );
        Ok(id)
    }

    fn mark_joining(&self, session_id: &str) {
        if self.merge_session_name(session_id, Some(NAME_JOINING)).is_some() {
            self.notify_sessions();
        }
    }

    /// Ask the peer at `ip:port` to become a friend.
    ///
    /// Waits briefly for an immediate answer on the same connection; otherwise the
    /// request stays pending until a FriendResponse arrives on a later connection.
    pub async fn request_friend(&self, ip: &str, port: u16) -> Result<FriendOutcome, LinkError> {
        let address = join_address(ip, port);
        let mut connection = Connection::connect(
            &address,
            self.settings.connect_timeout,
            self.settings.max_frame,
        )
        .await?;

        // Keyed by the resolved address, so any spelling of it in the answer matches.
        let peer = connection.peer_addr();
        self.remember_pending(peer);
        let request = self.packet(PacketType::FriendRequest);
        if let Err(e) = connection.send(&request).await {
            self.pending_friends.lock().remove(&peer);
            return Err(e);
        }
        emit_network_event(
            "handshake",
            LogLevel::Info,
            "friend_request_sent",
            Some(address.clone()),
            None,
        );

        let reply = tokio::time::timeout(Duration::from_millis(FRIEND_REPLY_TIMEOUT_MS), async {
            loop {
                match connection.receive().await {
                    Ok(Inbound::Packet(p)) if p.kind == PacketType::FriendResponse => {
                        return Some(p)
                    }
                    Ok(Inbound::Packet(_)) | Ok(Inbound::Malformed(_)) => continue,
                    Ok(Inbound::Closed) | Err(_) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten();
        connection.finish(self.settings.connect_timeout).await;

        match reply {
            // The answer came back on the connection we dialed, so the dialed address is the key.
            Some(reply) => Ok(self.settle_friend_response(&reply, &[peer], ip, port)),
            None => Ok(FriendOutcome::Pending),
        }
    }

    /// Answer a friend request raised earlier through `FriendRequestReceived`.
    pub async fn respond_friend(
        &self,
        ip: &str,
        port: u16,
        accepted: bool,
        name: &str,
    ) -> Result<FriendOutcome, LinkError> {
        let outcome = if accepted {
            match self.add_friend(name, ip, port) {
                FriendOutcome::Accepted { .. } => FriendOutcome::Accepted {
                    name: name.to_string(),
                },
                other => return Ok(other),
            }
        } else {
            FriendOutcome::Declined
        };

        let address = join_address(ip, port);
        let mut connection = Connection::connect(
            &address,
            self.settings.connect_timeout,
            self.settings.max_frame,
        )
        .await?;
        connection.send(&self.friend_response(accepted)).await?;
        connection.finish(self.settings.connect_timeout).await;
        emit_network_event(
            "handshake",
            LogLevel::Info,
            "friend_response_sent",
            Some(address),
            Some(format!("accepted={}", accepted)),
        );
        Ok(outcome)
    }

    pub(crate) async fn on_friend_request(&self, packet: &Packet, from: NeighborId) {
        let Some((ip, port)) = packet.sender_address.as_deref().and_then(split_address) else {
            emit_network_event(
                "handshake",
                LogLevel::Warn,
                "friend_request_unroutable",
                None,
                Some(format!("sender={}", packet.sender_name)),
            );
            return;
        };

        if !self.settings.auto_accept_friends {
            self.notify(NodeEvent::FriendRequestReceived {
                name: packet.sender_name.clone(),
                ip,
                port,
            });
            return;
        }

        let accepted = matches!(
            self.add_friend(&packet.sender_name, &ip, port),
            FriendOutcome::Accepted { .. }
        );
        if let Err(e) = self.topology.send_to(from, self.friend_response(accepted)).await {
            emit_network_event(
                "handshake",
                LogLevel::Warn,
                "friend_reply_failed",
                Some(join_address(&ip, port)),
                Some(e.to_string()),
            );
        }
    }

    pub(crate) async fn on_friend_response(&self, packet: &Packet) -> FriendOutcome {
        let Some((ip, port)) = packet.sender_address.as_deref().and_then(split_address) else {
            return FriendOutcome::Ignored;
        };
        let candidates: Vec<SocketAddr> = match tokio::net::lookup_host(join_address(&ip, port)).await {
            Ok(addrs) => addrs.collect(),
            Err(e) => {
                emit_network_event(
                    "handshake",
                    LogLevel::Debug,
                    "friend_response_unresolvable",
                    Some(join_address(&ip, port)),
                    Some(e.to_string()),
                );
                Vec::new()
            }
        };
        self.settle_friend_response(packet, &candidates, &ip, port)
    }

    fn remember_pending(&self, peer: SocketAddr) {
        let mut pending = self.pending_friends.lock();
        let ttl = self.settings.friend_request_ttl;
        pending.retain(|_, asked| asked.elapsed() < ttl);
        pending.insert(peer, Instant::now());
    }

    /// Consume the pending request matching any of `candidates`. Expired requests never match.
    fn take_pending(&self, candidates: &[SocketAddr]) -> bool {
        let mut pending = self.pending_friends.lock();
        let ttl = self.settings.friend_request_ttl;
        pending.retain(|_, asked| asked.elapsed() < ttl);
        candidates.iter().any(|addr| pending.remove(addr).is_some())
    }

    fn settle_friend_response(
        &self,
        packet: &Packet,
        candidates: &[SocketAddr],
        ip: &str,
        port: u16,
    ) -> FriendOutcome {
        if !self.take_pending(candidates) {
            emit_network_event(
                "handshake",
                LogLevel::Debug,
                "friend_response_unsolicited",
                Some(join_address(ip, port)),
                None,
            );
            return FriendOutcome::Ignored;
        }
        if packet.content != FRIEND_ACCEPT {
            emit_network_event(
                "handshake",
                LogLevel::Info,
                "friend_declined",
                Some(join_address(ip, port)),
                None,
            );
            return FriendOutcome::Declined;
        }
        self.add_friend(&packet.sender_name, ip, port)
    }

    fn add_friend(&self, name: &str, ip: &str, port: u16) -> FriendOutcome {
        match self.store.upsert_friend(name, ip, port) {
            Ok(true) => {
                self.notify(NodeEvent::FriendAccepted {
                    name: name.to_string(),
                    ip: ip.to_string(),
                    port,
                });
                self.notify_friends();
                FriendOutcome::Accepted {
                    name: name.to_string(),
                }
            }
            Ok(false) => {
                self.notify(NodeEvent::alert(format!(
                    "A friend named '{}' already exists",
                    name
                )));
                FriendOutcome::DuplicateName {
                    name: name.to_string(),
                }
            }
            Err(e) => {
                self.log_store_error("upsert_friend", "", &e.to_string());
                FriendOutcome::Ignored
            }
        }
    }

    fn friend_response(&self, accepted: bool) -> Packet {
        self.packet(PacketType::FriendResponse)
            .with_content(if accepted { FRIEND_ACCEPT } else { FRIEND_DECLINE })
    }

    pub(crate) fn notify_friends(&self) {
        let friends = self.friends();
        self.notify(NodeEvent::FriendsUpdated { friends });
    }
}
