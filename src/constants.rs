//! Central place for application-wide constants and default values.

/// Default application name (shown in startup banner and logs)
pub const DEFAULT_APP_NAME: &str = "MeshChat";

/// Left padding used to align log lines with those that include emoji prefixes.
pub const ICON_PLACEHOLDER: &str = "   ";

/// Protocol version for compatibility checks (bump when wire format changes)
pub const PROTOCOL_VERSION: &str = "1";

/// Application / crate version (populated from Cargo.toml via env! macro)
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_USERNAME: &str = "anonymous";
pub const DEFAULT_STATE_DIR: &str = "data";

/// Outbound connect timeout for join/invite/friend handshakes.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1500;
/// Largest accepted frame body; anything above closes the connection.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;
/// Per-neighbor outbound queue depth (packets).
pub const DEFAULT_OUTBOUND_QUEUE: usize = 256;

pub const DEFAULT_PRESENCE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;

pub const DEFAULT_DEDUP_CAPACITY: usize = 65_536;
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 600;

pub const DEFAULT_EVENTS_CAPACITY: usize = 1024;

/// How long a friend requester waits for an auto-reply on the request connection.
pub const FRIEND_REPLY_TIMEOUT_MS: u64 = 2000;
/// How long an unanswered friend request stays pending.
pub const DEFAULT_FRIEND_REQUEST_TTL_MS: u64 = 10 * 60 * 1000;

/// How long history backfill waits for room in a neighbor's queue before giving up.
pub const REPLAY_SEND_PATIENCE_MS: u64 = 5000;

/// Session name placeholders that never overwrite a learned name.
pub const NAME_JOINING: &str = "Joining...";
pub const NAME_UNKNOWN: &str = "Unknown";
pub const NAME_NEW_CHAT: &str = "New Chat";
pub const NAME_CHAT_WITH_PREFIX: &str = "Chat with";

/// Marker appended to edited message content.
pub const EDIT_MARKER: &str = " (edited)";

/// Friend response tokens carried in `content`.
pub const FRIEND_ACCEPT: &str = "YES";
pub const FRIEND_DECLINE: &str = "NO";

/// Sender label used on room notices produced by this node.
pub const SYSTEM_SENDER: &str = "System";

/// Human friendly composite version string used in logs.
pub fn full_version() -> String {
    format!("v{} (protocol={})", APP_VERSION, PROTOCOL_VERSION)
}
