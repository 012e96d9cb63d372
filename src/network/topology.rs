// src/network/topology.rs

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::{oneshot, Mutex};

use crate::error::LinkError;
use crate::events::model::LogLevel;
use crate::network::connection::{Connection, FrameReader, FrameWriter};
use crate::network::events::emit_network_event;
use crate::network::packet::{Packet, PacketType};

pub type NeighborId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

struct Neighbor {
    addr: SocketAddr,
    direction: Direction,
    sender: Sender<Packet>,
    subscriptions: HashSet<String>,
    label: Option<String>,
    // Dropping this ends the neighbor's receive loop.
    _shutdown: oneshot::Sender<()>,
}

/// Read-only view of one neighbor.
#[derive(Debug, Clone, Serialize)]
pub struct NeighborInfo {
    pub id: NeighborId,
    pub addr: SocketAddr,
    pub direction: Direction,
    pub label: Option<String>,
    pub subscriptions: Vec<String>,
}

/// Receive side handed back by [`TopologyManager::add_neighbor`].
pub struct NeighborLink {
    pub id: NeighborId,
    pub addr: SocketAddr,
    pub reader: FrameReader<OwnedReadHalf>,
    /// Resolves when the neighbor is removed from the topology.
    pub shutdown: oneshot::Receiver<()>,
}

/// Flood eligibility of `packet` for a neighbor with the given subscriptions.
///
/// Session-less packets always pass. A session packet passes when the neighbor has been
/// seen carrying that session, or when the neighbor has no subscriptions at all and the
/// packet is an Invite (membership bootstrap).
pub fn is_eligible(subscriptions: &HashSet<String>, packet: &Packet) -> bool {
    match packet.session() {
        None => true,
        Some(sid) => {
            subscriptions.contains(sid)
                || (subscriptions.is_empty() && packet.kind == PacketType::Invite)
        }
    }
}

/// Owns the live neighbor set. All mutations happen under one lock; broadcast
/// snapshots eligible senders under that lock and sends after releasing it.
#[derive(Clone)]
pub struct TopologyManager {
    neighbors: Arc<Mutex<HashMap<NeighborId, Neighbor>>>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Default for TopologyManager {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_OUTBOUND_QUEUE)
    }
}

impl TopologyManager {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            neighbors: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a connection with an empty subscription set and start its writer task.
    /// The caller drives the returned reader (the receive loop).
    pub async fn add_neighbor(&self, connection: Connection, direction: Direction) -> NeighborLink {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let addr = connection.peer_addr();
        let (reader, writer) = connection.into_split();
        let (tx, rx) = mpsc::channel::<Packet>(self.queue_capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.neighbors.lock().await.insert(
            id,
            Neighbor {
                addr,
                direction,
                sender: tx,
                subscriptions: HashSet::new(),
                label: None,
                _shutdown: shutdown_tx,
            },
        );
        self.spawn_writer(id, addr, writer, rx);
        emit_network_event(
            "topology",
            LogLevel::Info,
            "neighbor_added",
            Some(addr.to_string()),
            Some(format!("id={} direction={:?}", id, direction)),
        );
        NeighborLink {
            id,
            addr,
            reader,
            shutdown: shutdown_rx,
        }
    }

    fn spawn_writer(
        &self,
        id: NeighborId,
        addr: SocketAddr,
        mut writer: FrameWriter<OwnedWriteHalf>,
        mut rx: Receiver<Packet>,
    ) {
        let topology = self.clone();
        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                if let Err(e) = writer.send(&packet).await {
                    emit_network_event(
                        "topology",
                        LogLevel::Warn,
                        "write_failed",
                        Some(addr.to_string()),
                        Some(format!("id={} err={}", id, e)),
                    );
                    topology.remove_neighbor(id).await;
                    break;
                }
            }
            writer.shutdown().await;
        });
    }

    /// Deregister and close. Returns false if the neighbor was already gone.
    pub async fn remove_neighbor(&self, id: NeighborId) -> bool {
        let removed = self.neighbors.lock().await.remove(&id);
        match removed {
            Some(n) => {
                emit_network_event(
                    "topology",
                    LogLevel::Info,
                    "neighbor_removed",
                    Some(n.addr.to_string()),
                    Some(format!("id={} sessions={}", id, n.subscriptions.len())),
                );
                true
            }
            None => false,
        }
    }

    /// Add `session_id` to the neighbor's interest set. Returns true when newly added.
    pub async fn record_subscription(&self, id: NeighborId, session_id: &str) -> bool {
        if session_id.is_empty() {
            return false;
        }
        let mut neighbors = self.neighbors.lock().await;
        match neighbors.get_mut(&id) {
            Some(n) => n.subscriptions.insert(session_id.to_string()),
            None => false,
        }
    }

    pub async fn subscriptions(&self, id: NeighborId) -> Option<HashSet<String>> {
        self.neighbors
            .lock()
            .await
            .get(&id)
            .map(|n| n.subscriptions.clone())
    }

    pub async fn set_label(&self, id: NeighborId, label: &str) {
        if let Some(n) = self.neighbors.lock().await.get_mut(&id) {
            n.label = Some(label.to_string());
        }
    }

    pub async fn contains(&self, id: NeighborId) -> bool {
        self.neighbors.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.neighbors.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn list(&self) -> Vec<NeighborInfo> {
        let neighbors = self.neighbors.lock().await;
        let mut out: Vec<NeighborInfo> = neighbors
            .iter()
            .map(|(id, n)| {
                let mut subscriptions: Vec<String> = n.subscriptions.iter().cloned().collect();
                subscriptions.sort();
                NeighborInfo {
                    id: *id,
                    addr: n.addr,
                    direction: n.direction,
                    label: n.label.clone(),
                    subscriptions,
                }
            })
            .collect();
        out.sort_by_key(|n| n.id);
        out
    }

    async fn sender_for(&self, id: NeighborId, packet: &Packet) -> Result<Sender<Packet>, LinkError> {
        let mut neighbors = self.neighbors.lock().await;
        let n = neighbors.get_mut(&id).ok_or(LinkError::NeighborGone(id))?;
        if let Some(sid) = packet.session() {
            n.subscriptions.insert(sid.to_string());
        }
        Ok(n.sender.clone())
    }

    /// Queue `packet` for one neighbor. Records the packet's session as that neighbor's interest.
    pub async fn send_to(&self, id: NeighborId, packet: Packet) -> Result<(), LinkError> {
        let sender = self.sender_for(id, &packet).await?;
        match sender.try_send(packet) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(LinkError::QueueFull(id)),
            Err(TrySendError::Closed(_)) => {
                self.remove_neighbor(id).await;
                Err(LinkError::NeighborGone(id))
            }
        }
    }

    /// Like [`send_to`](Self::send_to), but waits up to `patience` for room in the
    /// neighbor's queue instead of failing at once. Only the calling task is held up.
    pub async fn send_to_waiting(
        &self,
        id: NeighborId,
        packet: Packet,
        patience: Duration,
    ) -> Result<(), LinkError> {
        let sender = self.sender_for(id, &packet).await?;
        match sender.send_timeout(packet, patience).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(LinkError::QueueFull(id)),
            Err(SendTimeoutError::Closed(_)) => {
                self.remove_neighbor(id).await;
                Err(LinkError::NeighborGone(id))
            }
        }
    }

    /// Queue `packet` for every eligible neighbor except `excluding`.
    /// Returns the neighbors it was queued for.
    pub async fn broadcast(&self, packet: &Packet, excluding: Option<NeighborId>) -> Vec<NeighborId> {
        let targets: Vec<(NeighborId, SocketAddr, Sender<Packet>)> = {
            let mut neighbors = self.neighbors.lock().await;
            neighbors
                .iter_mut()
                .filter(|(id, _)| Some(**id) != excluding)
                .filter(|(_, n)| is_eligible(&n.subscriptions, packet))
                .map(|(id, n)| {
                    if let Some(sid) = packet.session() {
                        n.subscriptions.insert(sid.to_string());
                    }
                    (*id, n.addr, n.sender.clone())
                })
                .collect()
        };

        let mut delivered = Vec::with_capacity(targets.len());
        let mut dead = Vec::new();
        for (id, addr, sender) in targets {
            match sender.try_send(packet.clone()) {
                Ok(()) => delivered.push(id),
                Err(TrySendError::Full(_)) => {
                    emit_network_event(
                        "topology",
                        LogLevel::Warn,
                        "neighbor_queue_full",
                        Some(addr.to_string()),
                        Some(format!("id={} packet={}", id, packet.id)),
                    );
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }
        for id in dead {
            self.remove_neighbor(id).await;
        }
        delivered.sort_unstable();
        delivered
    }
}
