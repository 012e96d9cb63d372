//! A running mesh peer: listener, relay engine and presence prober behind one
//! command surface.

pub mod command;
pub mod notice;

pub use command::{Command, CommandOutcome};
pub use notice::NodeEvent;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::emit_system_event;
use crate::error::LinkError;
use crate::events::model::LogLevel;
use crate::network::dedup::DedupTracker;
use crate::network::handshake::FriendOutcome;
use crate::network::listener::{bind_listener, start_listener};
use crate::network::packet::{join_address, Packet, PacketType};
use crate::network::presence::{PresenceProber, PresenceSettings};
use crate::network::relay::{Identity, RelayEngine, RelaySettings};
use crate::network::topology::{NeighborInfo, TopologyManager};
use crate::session::new_session_id;
use crate::storage::ChatStore;

pub struct ChatNode {
    engine: RelayEngine,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl ChatNode {
    /// Bind the listener and start background tasks. The receiver yields every
    /// UI-facing event the node raises.
    pub async fn start(
        config: Config,
        store: Arc<dyn ChatStore>,
    ) -> Result<(Self, mpsc::Receiver<NodeEvent>), LinkError> {
        let listener = bind_listener(config.port).await?;
        let local_addr = listener.local_addr()?;
        let host = config
            .advertise_host
            .clone()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| advertised_host(local_addr));
        let identity = Identity {
            name: config.username(),
            address: join_address(&host, local_addr.port()),
        };

        let (tx, rx) = mpsc::channel(config.events_capacity());
        let engine = RelayEngine::new(
            identity,
            RelaySettings::from_config(&config),
            TopologyManager::new(config.outbound_queue()),
            DedupTracker::new(config.dedup_capacity(), config.dedup_window()),
            store,
            tx,
        );

        let mut tasks = vec![start_listener(listener, engine.clone())];
        if config.presence_enabled() {
            let prober = PresenceProber::new(engine.clone(), PresenceSettings::from_config(&config));
            tasks.push(prober.spawn());
        }

        emit_system_event!(
            "node",
            LogLevel::Info,
            "node_started",
            Some(format!(
                "name={} address={} listen={}",
                engine.identity().name,
                engine.identity().address,
                local_addr
            ))
        );

        Ok((
            Self {
                engine,
                local_addr,
                tasks,
            },
            rx,
        ))
    }

    pub fn engine(&self) -> &RelayEngine {
        &self.engine
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// `host:port` this node advertises as `senderAddress`.
    pub fn address(&self) -> &str {
        &self.engine.identity().address
    }

    pub async fn neighbors(&self) -> Vec<NeighborInfo> {
        self.engine.topology().list().await
    }

    pub async fn execute(&self, command: Command) -> CommandOutcome {
        let engine = &self.engine;
        match command {
            Command::SendMessage {
                session_id,
                content,
            } => {
                if session_id.trim().is_empty() {
                    return CommandOutcome::rejected("session id is required");
                }
                let packet = engine
                    .packet(PacketType::Message)
                    .with_session(&session_id)
                    .with_group_name(engine.real_session_name(&session_id))
                    .with_content(content);
                self.originate(packet).await
            }
            Command::EditMessage {
                session_id,
                target_id,
                new_content,
            } => {
                if session_id.trim().is_empty() || target_id.trim().is_empty() {
                    return CommandOutcome::rejected("session id and target id are required");
                }
                let packet = engine
                    .packet(PacketType::Edit)
                    .with_session(&session_id)
                    .with_target(&target_id)
                    .with_content(new_content);
                self.originate(packet).await
            }
            Command::DeleteMessage {
                session_id,
                target_id,
            } => {
                if session_id.trim().is_empty() || target_id.trim().is_empty() {
                    return CommandOutcome::rejected("session id and target id are required");
                }
                let packet = engine
                    .packet(PacketType::Delete)
                    .with_session(&session_id)
                    .with_target(&target_id);
                self.originate(packet).await
            }
            Command::CreateSession { name } => {
                let name = name.trim();
                if name.is_empty() {
                    return CommandOutcome::rejected("room name is required");
                }
                let session_id = new_session_id();
                if let Err(e) = engine.store().upsert_session(&session_id, name) {
                    return CommandOutcome::rejected(e.to_string());
                }
                engine.notify_sessions();
                CommandOutcome::SessionCreated { session_id }
            }
            Command::JoinSession {
                ip,
                port,
                session_id,
            } => match engine.join_session(&ip, port, &session_id).await {
                Ok(neighbor) => CommandOutcome::Joined {
                    session_id,
                    neighbor,
                },
                Err(e) => unreachable_peer(&ip, port, e),
            },
            Command::InviteToSession {
                ip,
                port,
                session_id,
            } => match engine.invite_to_session(&ip, port, &session_id).await {
                Ok(neighbor) => CommandOutcome::Invited {
                    session_id,
                    neighbor,
                },
                Err(e) => unreachable_peer(&ip, port, e),
            },
            Command::RequestFriend { ip, port } => match engine.request_friend(&ip, port).await {
                Ok(outcome) => friend_outcome(outcome),
                Err(e) => unreachable_peer(&ip, port, e),
            },
            Command::RespondFriend {
                ip,
                port,
                accepted,
                name,
            } => match engine.respond_friend(&ip, port, accepted, &name).await {
                Ok(outcome) => friend_outcome(outcome),
                Err(e) => unreachable_peer(&ip, port, e),
            },
            Command::ListMessages { session_id } => match engine.store().list_messages(&session_id) {
                Ok(messages) => CommandOutcome::Messages { messages },
                Err(e) => CommandOutcome::rejected(e.to_string()),
            },
            Command::ListSessions => match engine.store().list_sessions() {
                Ok(sessions) => CommandOutcome::Sessions { sessions },
                Err(e) => CommandOutcome::rejected(e.to_string()),
            },
            Command::ListFriends => CommandOutcome::Friends {
                friends: engine.friends(),
            },
            Command::ResetData => {
                if let Err(e) = engine.store().wipe() {
                    return CommandOutcome::rejected(e.to_string());
                }
                engine.reset();
                emit_system_event!("node", LogLevel::Warn, "data_reset", None);
                engine.notify_sessions();
                engine.notify_friends();
                CommandOutcome::Reset
            }
        }
    }

    async fn originate(&self, packet: Packet) -> CommandOutcome {
        let packet_id = packet.id.clone();
        self.engine.originate(packet).await;
        CommandOutcome::Sent { packet_id }
    }

    /// Stop accepting and stop probing. Existing neighbor tasks wind down on socket close.
    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ChatNode {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn advertised_host(local_addr: SocketAddr) -> String {
    if local_addr.ip().is_unspecified() {
        "127.0.0.1".to_string()
    } else {
        local_addr.ip().to_string()
    }
}

fn unreachable_peer(ip: &str, port: u16, err: LinkError) -> CommandOutcome {
    CommandOutcome::rejected(format!("could not reach {}: {}", join_address(ip, port), err))
}

fn friend_outcome(outcome: FriendOutcome) -> CommandOutcome {
    match outcome {
        FriendOutcome::DuplicateName { name } => {
            CommandOutcome::rejected(format!("a friend named '{}' already exists", name))
        }
        other => CommandOutcome::Friend(other),
    }
}
