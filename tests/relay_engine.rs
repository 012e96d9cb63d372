// Relay state machine exercised without sockets: the engine has no neighbors, so every
// broadcast fans out to nobody and only the local effects are observable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use meshchat::error::StoreError;
use meshchat::network::dedup::DedupTracker;
use meshchat::network::packet::{Packet, PacketType};
use meshchat::network::relay::{Disposition, Identity, RelayEngine, RelaySettings};
use meshchat::network::topology::{NeighborId, TopologyManager};
use meshchat::node::NodeEvent;
use meshchat::storage::{ApplyOutcome, ChatStore, Friend, MemoryStore, SessionRecord};
use tokio::sync::mpsc::{self, Receiver};

const FROM: NeighborId = 42;

fn engine_with(auto_accept: bool) -> (RelayEngine, MemoryStore, Receiver<NodeEvent>) {
    let store = MemoryStore::new();
    let (engine, rx) = engine_over(Arc::new(store.clone()), auto_accept);
    (engine, store, rx)
}

fn engine_over(store: Arc<dyn ChatStore>, auto_accept: bool) -> (RelayEngine, Receiver<NodeEvent>) {
    let (tx, rx) = mpsc::channel(256);
    let settings = RelaySettings {
        auto_accept_friends: auto_accept,
        ..RelaySettings::default()
    };
    let engine = RelayEngine::new(
        Identity {
            name: "me".to_string(),
            address: "127.0.0.1:1".to_string(),
        },
        settings,
        TopologyManager::new(16),
        DedupTracker::new(1024, Duration::from_secs(60)),
        store,
        tx,
    );
    (engine, rx)
}

fn engine() -> (RelayEngine, MemoryStore, Receiver<NodeEvent>) {
    engine_with(false)
}

fn from_bob(kind: PacketType) -> Packet {
    Packet::new(kind, "bob", Some("127.0.0.1:6000".to_string()))
}

fn drain(rx: &mut Receiver<NodeEvent>) -> Vec<NodeEvent> {
    let mut out = Vec::new();
    while let Ok(e) = rx.try_recv() {
        out.push(e);
    }
    out
}

fn applied(outcome: ApplyOutcome) -> Disposition {
    Disposition::Applied {
        outcome: Some(outcome),
        relayed_to: vec![],
    }
}

#[tokio::test]
async fn ping_leaves_no_trace() {
    let (engine, store, mut rx) = engine();
    let ping = from_bob(PacketType::Ping);
    assert_eq!(engine.handle_inbound(ping, FROM).await, Disposition::Discarded);
    assert!(engine.dedup().is_empty());
    assert!(store.list_sessions().unwrap().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn hello_is_announced_and_never_deduped() {
    let (engine, _store, mut rx) = engine();
    let hello = from_bob(PacketType::Hello);
    assert_eq!(
        engine.handle_inbound(hello.clone(), FROM).await,
        Disposition::Announced
    );
    assert_eq!(engine.handle_inbound(hello, FROM).await, Disposition::Announced);
    assert!(engine.dedup().is_empty());
    let hellos = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::PeerHello { sender_name, .. } if sender_name == "bob"))
        .count();
    assert_eq!(hellos, 2);
}

#[tokio::test]
async fn flooded_packet_is_applied_once() {
    let (engine, store, mut rx) = engine();
    let hi = from_bob(PacketType::Message)
        .with_session("R1")
        .with_content("hi");
    assert_eq!(
        engine.handle_inbound(hi.clone(), FROM).await,
        applied(ApplyOutcome::Inserted)
    );
    assert_eq!(engine.handle_inbound(hi.clone(), 7).await, Disposition::Duplicate);
    assert_eq!(store.list_messages("R1").unwrap().len(), 1);

    let events = drain(&mut rx);
    let applied_events = events
        .iter()
        .filter(|e| matches!(e, NodeEvent::PacketApplied { packet_id, .. } if *packet_id == hi.id))
        .count();
    assert_eq!(applied_events, 1);
}

#[tokio::test]
async fn session_is_created_on_first_reference() {
    let (engine, store, _rx) = engine();
    let hi = from_bob(PacketType::Message).with_session("R9");
    engine.handle_inbound(hi, FROM).await;
    assert_eq!(
        store.load_session_name("R9").unwrap().as_deref(),
        Some("Unknown")
    );
}

#[tokio::test]
async fn delete_before_message_is_a_no_op() {
    let (engine, store, _rx) = engine();
    let hi = from_bob(PacketType::Message).with_session("R1");
    let del = from_bob(PacketType::Delete)
        .with_session("R1")
        .with_target(&hi.id);

    assert_eq!(
        engine.handle_inbound(del, FROM).await,
        applied(ApplyOutcome::TargetMissing)
    );
    assert_eq!(
        engine.handle_inbound(hi, FROM).await,
        applied(ApplyOutcome::Inserted)
    );
    assert_eq!(store.list_messages("R1").unwrap().len(), 1);
}

#[tokio::test]
async fn edit_then_delete() {
    let (engine, store, _rx) = engine();
    let hi = from_bob(PacketType::Message)
        .with_session("R1")
        .with_content("hi");
    engine.handle_inbound(hi.clone(), FROM).await;

    let edit = from_bob(PacketType::Edit)
        .with_session("R1")
        .with_target(&hi.id)
        .with_content("hello");
    assert_eq!(
        engine.handle_inbound(edit, FROM).await,
        applied(ApplyOutcome::Edited)
    );
    assert_eq!(store.list_messages("R1").unwrap()[0].content, "hello (edited)");

    let del = from_bob(PacketType::Delete)
        .with_session("R1")
        .with_target(&hi.id);
    assert_eq!(
        engine.handle_inbound(del, FROM).await,
        applied(ApplyOutcome::Removed)
    );
    assert!(store.list_messages("R1").unwrap().is_empty());
}

#[tokio::test]
async fn replay_merges_without_consuming_dedup() {
    let (engine, store, mut rx) = engine();
    let old = from_bob(PacketType::Message)
        .with_session("R1")
        .with_content("from history");

    assert_eq!(
        engine.handle_inbound(old.as_replay(), FROM).await,
        Disposition::Replayed {
            outcome: Some(ApplyOutcome::Inserted)
        }
    );
    assert!(!engine.dedup().contains(&old.id));

    // the live copy still counts as first sighting and floods on
    assert_eq!(
        engine.handle_inbound(old.clone(), FROM).await,
        applied(ApplyOutcome::AlreadyPresent)
    );
    assert_eq!(
        engine.handle_inbound(old.as_replay(), FROM).await,
        Disposition::Replayed {
            outcome: Some(ApplyOutcome::AlreadyPresent)
        }
    );
    assert_eq!(store.list_messages("R1").unwrap().len(), 1);

    let replayed_events = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, NodeEvent::PacketApplied { replayed: true, .. }))
        .count();
    assert_eq!(replayed_events, 1);
}

#[tokio::test]
async fn invite_names_follow_placeholder_policy() {
    let (engine, store, _rx) = engine();
    let invite = from_bob(PacketType::Invite).with_session("R5");
    engine.handle_inbound(invite, FROM).await;
    assert_eq!(
        store.load_session_name("R5").unwrap().as_deref(),
        Some("Chat with bob")
    );

    let named = from_bob(PacketType::SystemNotice)
        .with_session("R5")
        .with_group_name(Some("TeamChat".to_string()));
    engine.handle_inbound(named, FROM).await;
    assert_eq!(
        store.load_session_name("R5").unwrap().as_deref(),
        Some("TeamChat")
    );

    let joining = from_bob(PacketType::Message)
        .with_session("R5")
        .with_group_name(Some("Joining...".to_string()));
    engine.handle_inbound(joining, FROM).await;
    let another_invite = Packet::new(PacketType::Invite, "carol", None).with_session("R5");
    engine.handle_inbound(another_invite, FROM).await;
    assert_eq!(
        store.load_session_name("R5").unwrap().as_deref(),
        Some("TeamChat")
    );
    assert_eq!(engine.real_session_name("R5").as_deref(), Some("TeamChat"));
}

#[tokio::test]
async fn originated_packets_are_not_reapplied_when_they_loop_back() {
    let (engine, store, _rx) = engine();
    let mine = engine
        .packet(PacketType::Message)
        .with_session("R1")
        .with_content("mine");
    assert_eq!(
        engine.originate(mine.clone()).await,
        applied(ApplyOutcome::Inserted)
    );
    assert_eq!(engine.handle_inbound(mine, FROM).await, Disposition::Duplicate);
    assert_eq!(store.list_messages("R1").unwrap().len(), 1);
}

#[tokio::test]
async fn friend_request_waits_for_the_operator() {
    let (engine, store, mut rx) = engine();
    let request = from_bob(PacketType::FriendRequest);
    assert_eq!(engine.handle_inbound(request, FROM).await, Disposition::Handshake);
    assert!(store.list_friends().unwrap().is_empty());
    let raised = drain(&mut rx).into_iter().any(|e| {
        matches!(e, NodeEvent::FriendRequestReceived { ref name, ref ip, port }
            if name == "bob" && ip == "127.0.0.1" && port == 6000)
    });
    assert!(raised);
}

#[tokio::test]
async fn friend_request_auto_accepted() {
    let (engine, store, _rx) = engine_with(true);
    let request = from_bob(PacketType::FriendRequest);
    engine.handle_inbound(request, FROM).await;
    let friends = store.list_friends().unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].name, "bob");
    assert_eq!(friends[0].port, 6000);
}

#[tokio::test]
async fn unsolicited_friend_response_is_ignored() {
    let (engine, store, _rx) = engine();
    let response = from_bob(PacketType::FriendResponse).with_content("YES");
    assert_eq!(
        engine.handle_inbound(response, FROM).await,
        Disposition::Handshake
    );
    assert!(store.list_friends().unwrap().is_empty());
    assert!(!engine.dedup().contains("anything"));
}

/// Store whose first session-name lookup is slow, widening the window between reading a
/// name and writing the merged one.
struct SlowFirstLookup {
    inner: MemoryStore,
    stalled: AtomicBool,
}

impl ChatStore for SlowFirstLookup {
    fn load_session_name(&self, session_id: &str) -> Result<Option<String>, StoreError> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(150));
        }
        self.inner.load_session_name(session_id)
    }

    fn upsert_session(&self, session_id: &str, name: &str) -> Result<(), StoreError> {
        self.inner.upsert_session(session_id, name)
    }

    fn append_or_mutate_message(
        &self,
        session_id: &str,
        packet: &Packet,
    ) -> Result<ApplyOutcome, StoreError> {
        self.inner.append_or_mutate_message(session_id, packet)
    }

    fn list_messages(&self, session_id: &str) -> Result<Vec<Packet>, StoreError> {
        self.inner.list_messages(session_id)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StoreError> {
        self.inner.list_sessions()
    }

    fn list_friends(&self) -> Result<Vec<Friend>, StoreError> {
        self.inner.list_friends()
    }

    fn upsert_friend(&self, name: &str, ip: &str, port: u16) -> Result<bool, StoreError> {
        self.inner.upsert_friend(name, ip, port)
    }

    fn wipe(&self) -> Result<(), StoreError> {
        self.inner.wipe()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_unnamed_packet_cannot_undo_a_learned_name() {
    let memory = MemoryStore::new();
    memory.upsert_session("R1", "Joining...").unwrap();
    let store = Arc::new(SlowFirstLookup {
        inner: memory.clone(),
        stalled: AtomicBool::new(false),
    });
    let (engine, _rx) = engine_over(store, false);

    // An Edit carries no group name; its naming step reads "Joining..." and stalls.
    let edit = from_bob(PacketType::Edit)
        .with_session("R1")
        .with_target("someone-else")
        .with_content("x");
    let first = engine.clone();
    let edit_task = tokio::spawn(async move { first.handle_inbound(edit, 1).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let named = Packet::new(PacketType::SystemNotice, "System", None)
        .with_session("R1")
        .with_group_name(Some("TeamChat".to_string()))
        .with_content("Joined room: TeamChat");
    engine.handle_inbound(named, 2).await;
    edit_task.await.unwrap();

    assert_eq!(
        memory.load_session_name("R1").unwrap().as_deref(),
        Some("TeamChat")
    );
}
