#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshchat::config::{Config, FriendsConfig, PresenceConfig};
use meshchat::node::{ChatNode, Command, CommandOutcome, NodeEvent};
use meshchat::storage::MemoryStore;
use tokio::sync::mpsc::Receiver;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestPeer {
    pub node: ChatNode,
    pub events: Receiver<NodeEvent>,
    pub store: MemoryStore,
}

pub fn test_config(name: &str) -> Config {
    Config {
        port: 0,
        username: Some(name.to_string()),
        advertise_host: Some("127.0.0.1".to_string()),
        presence: Some(PresenceConfig {
            enabled: false,
            ..PresenceConfig::default()
        }),
        ..Config::default()
    }
}

pub async fn start_peer(name: &str) -> TestPeer {
    start_with(test_config(name)).await
}

pub async fn start_auto_accept_peer(name: &str) -> TestPeer {
    let mut config = test_config(name);
    config.friends = Some(FriendsConfig {
        auto_accept: Some(true),
        ..FriendsConfig::default()
    });
    start_with(config).await
}

pub async fn start_with(config: Config) -> TestPeer {
    let store = MemoryStore::new();
    let (node, events) = ChatNode::start(config, Arc::new(store.clone()))
        .await
        .expect("node starts");
    TestPeer {
        node,
        events,
        store,
    }
}

impl TestPeer {
    pub fn port(&self) -> u16 {
        self.node.port()
    }

    pub async fn create_session(&self, name: &str) -> String {
        match self
            .node
            .execute(Command::CreateSession {
                name: name.to_string(),
            })
            .await
        {
            CommandOutcome::SessionCreated { session_id } => session_id,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    pub async fn join(&self, host: &TestPeer, session_id: &str) -> CommandOutcome {
        self.node
            .execute(Command::JoinSession {
                ip: "127.0.0.1".to_string(),
                port: host.port(),
                session_id: session_id.to_string(),
            })
            .await
    }

    pub async fn send(&self, session_id: &str, content: &str) -> String {
        match self
            .node
            .execute(Command::SendMessage {
                session_id: session_id.to_string(),
                content: content.to_string(),
            })
            .await
        {
            CommandOutcome::Sent { packet_id } => packet_id,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    /// Everything currently queued on the event channel.
    pub fn drain_events(&mut self) -> Vec<NodeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Wait until a neighbor of this peer carries `session_id` in its subscriptions
    /// `count` times.
    pub async fn wait_subscribed(&self, session_id: &str, count: usize) -> bool {
        let topology = self.node.engine().topology().clone();
        let sid = session_id.to_string();
        eventually(|| {
            let topology = topology.clone();
            let sid = sid.clone();
            async move {
                topology
                    .list()
                    .await
                    .iter()
                    .filter(|n| n.subscriptions.contains(&sid))
                    .count()
                    >= count
            }
        })
        .await
    }
}

/// Poll a synchronous condition until it holds or [`WAIT`] passes.
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = Instant::now() + WAIT;
    loop {
        if check() {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Async flavour of [`wait_until`].
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + WAIT;
    loop {
        if check().await {
            return true;
        }
        if Instant::now() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn applied_count(events: &[NodeEvent], packet_id: &str) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, NodeEvent::PacketApplied { packet_id: p, .. } if p == packet_id))
        .count()
}
