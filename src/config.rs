use crate::constants::*;
use crate::events::model::LogLevel;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP port the mesh listener binds to
    pub port: u16,
    /// Display name carried as `senderName` on every packet we originate
    pub username: Option<String>,
    /// Host part of our advertised `senderAddress`. Derived from the bound address when unset.
    pub advertise_host: Option<String>,
    /// Directory for per-profile runtime state (event log default location)
    pub state_dir: Option<String>,
    /// Capacity of the UI event channel
    pub events_capacity: Option<usize>,
    pub network: Option<NetworkConfig>,
    pub presence: Option<PresenceConfig>,
    pub dedup: Option<DedupConfig>,
    pub friends: Option<FriendsConfig>,
    /// Logging / events configuration
    pub logging: Option<LoggingConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            username: None,
            advertise_host: None,
            state_dir: Some(DEFAULT_STATE_DIR.to_string()),
            events_capacity: Some(DEFAULT_EVENTS_CAPACITY),
            network: Some(NetworkConfig::default()),
            presence: Some(PresenceConfig::default()),
            dedup: Some(DedupConfig::default()),
            friends: Some(FriendsConfig::default()),
            logging: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Timeout for outbound join / invite / friend connects
    pub connect_timeout_ms: Option<u64>,
    /// Largest frame body accepted from a neighbor
    pub max_frame_bytes: Option<usize>,
    /// Per-neighbor outbound queue depth
    pub outbound_queue: Option<usize>,
    /// Replay stored history to a peer that sends us an Invite
    pub replay_history: Option<bool>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            max_frame_bytes: Some(DEFAULT_MAX_FRAME_BYTES),
            outbound_queue: Some(DEFAULT_OUTBOUND_QUEUE),
            replay_history: Some(true),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    pub enabled: bool,
    pub interval_secs: Option<u64>,
    pub probe_timeout_ms: Option<u64>,
    /// Send one Ping on a successful probe connect
    pub send_ping: Option<bool>,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: Some(DEFAULT_PRESENCE_INTERVAL_SECS),
            probe_timeout_ms: Some(DEFAULT_PROBE_TIMEOUT_MS),
            send_ping: Some(true),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupConfig {
    /// Maximum number of remembered packet ids
    pub capacity: Option<usize>,
    /// Seconds a remembered id suppresses duplicates
    pub window_secs: Option<u64>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: Some(DEFAULT_DEDUP_CAPACITY),
            window_secs: Some(DEFAULT_DEDUP_WINDOW_SECS),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct FriendsConfig {
    /// Answer friend requests immediately on the request connection
    pub auto_accept: Option<bool>,
    /// Milliseconds an unanswered friend request stays pending
    pub request_ttl_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Path to JSON line event log (rotated). No file sink when unset.
    pub json_path: Option<String>,
    /// Max size in bytes before rotation (default 5MB)
    pub json_max_bytes: Option<usize>,
    /// Number of rotated files to retain (default 3, 0 disables rotation)
    pub json_rotate: Option<u32>,
    /// Disable console sink (default false)
    pub disable_console: Option<bool>,
    /// Minimum level printed by the console sink
    pub console_min_level: Option<LogLevel>,
}

impl Config {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    /// Per-profile state directory, mirroring one data folder per local identity.
    pub fn apply_profile(&mut self, profile: &str) {
        self.state_dir = Some(format!("{}_{}", DEFAULT_STATE_DIR, profile));
        if self.username.is_none() {
            self.username = Some(profile.to_string());
        }
    }

    pub fn username(&self) -> String {
        self.username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(
            self.network
                .as_ref()
                .and_then(|n| n.connect_timeout_ms)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        )
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.network
            .as_ref()
            .and_then(|n| n.max_frame_bytes)
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn outbound_queue(&self) -> usize {
        self.network
            .as_ref()
            .and_then(|n| n.outbound_queue)
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE)
            .max(1)
    }

    pub fn replay_history(&self) -> bool {
        self.network
            .as_ref()
            .and_then(|n| n.replay_history)
            .unwrap_or(true)
    }

    pub fn presence_enabled(&self) -> bool {
        self.presence.as_ref().map(|p| p.enabled).unwrap_or(true)
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(
            self.presence
                .as_ref()
                .and_then(|p| p.interval_secs)
                .unwrap_or(DEFAULT_PRESENCE_INTERVAL_SECS)
                .max(1),
        )
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(
            self.presence
                .as_ref()
                .and_then(|p| p.probe_timeout_ms)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
        )
    }

    pub fn probe_sends_ping(&self) -> bool {
        self.presence
            .as_ref()
            .and_then(|p| p.send_ping)
            .unwrap_or(true)
    }

    pub fn dedup_capacity(&self) -> usize {
        self.dedup
            .as_ref()
            .and_then(|d| d.capacity)
            .unwrap_or(DEFAULT_DEDUP_CAPACITY)
            .max(1)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(
            self.dedup
                .as_ref()
                .and_then(|d| d.window_secs)
                .unwrap_or(DEFAULT_DEDUP_WINDOW_SECS),
        )
    }

    pub fn auto_accept_friends(&self) -> bool {
        self.friends
            .as_ref()
            .and_then(|f| f.auto_accept)
            .unwrap_or(false)
    }

    pub fn friend_request_ttl(&self) -> Duration {
        Duration::from_millis(
            self.friends
                .as_ref()
                .and_then(|f| f.request_ttl_ms)
                .unwrap_or(DEFAULT_FRIEND_REQUEST_TTL_MS),
        )
    }

    pub fn events_capacity(&self) -> usize {
        self.events_capacity
            .unwrap_or(DEFAULT_EVENTS_CAPACITY)
            .max(1)
    }
}
