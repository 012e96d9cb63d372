// src/network/presence.rs
//
// Periodic reachability sweep over the friend list. Probe connections are never
// kept as neighbors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::Config;
use crate::constants::DEFAULT_MAX_FRAME_BYTES;
use crate::events::model::LogLevel;
use crate::network::connection::Connection;
use crate::network::events::emit_network_event;
use crate::network::packet::{Packet, PacketType};
use crate::network::relay::RelayEngine;
use crate::storage::Friend;

/// Runtime-only online flags keyed by `ip:port`.
#[derive(Clone, Default)]
pub struct PresenceBook {
    online: Arc<RwLock<HashMap<String, bool>>>,
}

impl PresenceBook {
    pub fn set(&self, address: &str, online: bool) {
        self.online.write().insert(address.to_string(), online);
    }

    pub fn is_online(&self, address: &str) -> bool {
        self.online.read().get(address).copied().unwrap_or(false)
    }

    /// Fill in `is_online` on freshly loaded friends.
    pub fn annotate(&self, mut friends: Vec<Friend>) -> Vec<Friend> {
        let online = self.online.read();
        for friend in friends.iter_mut() {
            friend.is_online = online.get(&friend.address()).copied().unwrap_or(false);
        }
        friends
    }

    pub fn clear(&self) {
        self.online.write().clear();
    }
}

/// Connect to `address` within `timeout`. On success optionally send one Ping, then close.
/// Any failure is reported as offline.
pub async fn probe(address: &str, timeout: Duration, ping: Option<Packet>) -> bool {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        _ => return false,
    };
    if let Some(ping) = ping {
        if let Ok(mut connection) = Connection::from_stream(stream, DEFAULT_MAX_FRAME_BYTES) {
            let failure = match tokio::time::timeout(timeout, connection.send(&ping)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("timed out".to_string()),
            };
            if let Some(reason) = failure {
                emit_network_event(
                    "presence",
                    LogLevel::Debug,
                    "ping_failed",
                    Some(address.to_string()),
                    Some(reason),
                );
            }
            connection.finish(timeout).await;
        }
    }
    true
}

#[derive(Debug, Clone, Copy)]
pub struct PresenceSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub send_ping: bool,
}

impl PresenceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.presence_interval(),
            probe_timeout: config.probe_timeout(),
            send_ping: config.probe_sends_ping(),
        }
    }
}

pub struct PresenceProber {
    engine: RelayEngine,
    settings: PresenceSettings,
}

impl PresenceProber {
    pub fn new(engine: RelayEngine, settings: PresenceSettings) -> Self {
        Self { engine, settings }
    }

    /// Probe every friend concurrently and record the results.
    /// Bounded by the probe timeout, not by the number of friends.
    pub async fn sweep(&self) -> Vec<Friend> {
        let friends = match self.engine.store.list_friends() {
            Ok(friends) => friends,
            Err(e) => {
                self.engine.log_store_error("list_friends", "", &e.to_string());
                return Vec::new();
            }
        };

        let mut probes = JoinSet::new();
        for friend in &friends {
            let address = friend.address();
            let timeout = self.settings.probe_timeout;
            let ping = self
                .settings
                .send_ping
                .then(|| self.engine.packet(PacketType::Ping));
            probes.spawn(async move {
                let online = probe(&address, timeout, ping).await;
                (address, online)
            });
        }

        let mut changed = false;
        while let Some(result) = probes.join_next().await {
            let Ok((address, online)) = result else {
                continue;
            };
            if self.engine.presence.is_online(&address) != online {
                changed = true;
                emit_network_event(
                    "presence",
                    LogLevel::Info,
                    if online { "friend_online" } else { "friend_offline" },
                    Some(address.clone()),
                    None,
                );
            }
            self.engine.presence.set(&address, online);
        }

        let friends = self.engine.presence.annotate(friends);
        if changed {
            self.engine.notify_friends();
        }
        friends
    }

    /// Run sweeps forever on the configured interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.settings.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
