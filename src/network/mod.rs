pub mod connection;
pub mod dedup;
pub(crate) mod events;
pub mod handshake;
pub mod listener;
pub mod packet;
pub mod presence;
pub mod relay;
pub mod topology;

pub use connection::{Connection, Inbound};
pub use dedup::DedupTracker;
pub use handshake::FriendOutcome;
pub use listener::{bind_listener, start_listener};
pub use packet::{is_flooded, Packet, PacketType};
pub use presence::{PresenceBook, PresenceProber, PresenceSettings};
pub use relay::{Disposition, Identity, RelayEngine, RelaySettings};
pub use topology::{is_eligible, Direction, NeighborId, NeighborInfo, TopologyManager};
