//! # MeshChat Core Library
//!
//! Decentralized chat overlay: peers connect to each other directly over TCP and flood
//! typed packets across the resulting mesh, so every peer subscribed to a room sees
//! each message, edit and delete exactly once, in its own arrival order.
//!
//! ## Design Principles
//! * Async-first: one receive task per connection, a queued writer per neighbor.
//! * Loop-free flooding over arbitrary (cyclic) graphs via a bounded dedup tracker.
//! * Room membership and naming converge from metadata carried in the packets.
//! * Storage and UI are collaborators behind a trait and an event channel.
//! * Event-driven instrumentation (JSON line log + console).
//!
//! ## Key Modules
//! * `network` – packet model, framing, topology, relay engine, handshakes, presence.
//! * `storage` – storage collaborator trait and the in-memory store.
//! * `session` – room naming policy.
//! * `node` – command surface and UI-facing events.
//! * `config` – runtime configuration.
//! * `events` – structured logging/events dispatcher.

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod network;
pub mod node;
pub mod prelude; // curated stable-intent re-exports
pub mod session;
pub mod storage;
