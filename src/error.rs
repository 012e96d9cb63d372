use thiserror::Error;

use crate::network::topology::NeighborId;

/// Failures turning bytes into a [`Packet`](crate::network::packet::Packet) or back.
#[derive(Error, Debug)]
pub enum PacketError {
    #[error("malformed packet: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("malformed packet: missing field `{0}`")]
    MissingField(&'static str),
    #[error("malformed packet: empty frame")]
    EmptyFrame,
    #[error("packet encode failed: {0}")]
    Encode(serde_json::Error),
}

/// Transient link errors. Always local to one connection.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("frame too large: {0} bytes (max: {1})")]
    FrameTooLarge(usize, usize),
    #[error("neighbor {0} is not connected")]
    NeighborGone(NeighborId),
    #[error("outbound queue full for neighbor {0}")]
    QueueFull(NeighborId),
    #[error("invalid peer address: {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Errors reported by a storage collaborator. Never fatal to relaying.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
