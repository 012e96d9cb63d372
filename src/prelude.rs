//! MeshChat public prelude (curated stable-intent exports).
//! Import with: `use meshchat::prelude::*;`

pub use crate::config::Config;
pub use crate::network::packet::{Packet, PacketType};
pub use crate::network::relay::{Disposition, RelayEngine};
pub use crate::node::{ChatNode, Command, CommandOutcome, NodeEvent};
pub use crate::storage::{ChatStore, Friend, MemoryStore, SessionRecord};
