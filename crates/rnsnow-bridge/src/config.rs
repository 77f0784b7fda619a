//! Bridge configuration.
//!
//! Loaded from a JSON file in which every key is optional; missing keys take
//! the defaults below. The resulting value is handed to each component at
//! construction, never read from global state.

use std::path::Path;
use std::time::Duration;

use rnsnow_frame::{
    FragmentConfig, ReassemblyConfig, DEFAULT_FRAGMENT_MARGIN, DEFAULT_MAX_FRAGMENTS,
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_MAX_PENDING, DEFAULT_RADIO_MTU,
};
use rnsnow_transport::{PeerAddress, RadioProtocol, BROADCAST, MAX_CHANNEL, MIN_CHANNEL};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Longest stored description, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 255;

pub const DEFAULT_CHANNEL: u8 = 6;
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Minimum log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Channel scan tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan once before the pumps start.
    pub enabled: bool,
    /// Channels tried first, in order.
    pub preferred_channels: Vec<u8>,
    /// Highest channel tried.
    pub max_channel: u8,
    /// Probes sent per channel.
    pub attempts: u32,
    /// Listen window after each probe.
    pub listen_ms: u64,
    /// Pause between attempts.
    pub attempt_gap_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            preferred_channels: vec![1, 6, 11],
            max_channel: 13,
            attempts: 3,
            listen_ms: 500,
            attempt_gap_ms: 5,
        }
    }
}

impl ScanConfig {
    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_ms)
    }

    pub fn attempt_gap(&self) -> Duration {
        Duration::from_millis(self.attempt_gap_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.max_channel) {
            return Err(BridgeError::Config(format!(
                "scan.max_channel {} outside {MIN_CHANNEL}..={MAX_CHANNEL}",
                self.max_channel
            )));
        }
        if let Some(bad) = self
            .preferred_channels
            .iter()
            .find(|ch| !(MIN_CHANNEL..=self.max_channel).contains(ch))
        {
            return Err(BridgeError::Config(format!(
                "scan.preferred_channels entry {bad} outside {MIN_CHANNEL}..={}",
                self.max_channel
            )));
        }
        if self.attempts == 0 {
            return Err(BridgeError::Config("scan.attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything the bridge reads from device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub description: String,
    /// Operating channel, and the fallback when a scan finds nobody.
    pub channel: u8,
    /// Destination for data traffic; broadcast by default.
    pub mac: PeerAddress,
    pub protocol: RadioProtocol,
    pub baudrate: u32,
    pub loglevel: LogLevel,
    pub radio_mtu: usize,
    pub fragment_margin: usize,
    pub max_fragments: usize,
    pub max_frame_size: usize,
    pub inter_fragment_delay_ms: u64,
    pub idle_poll_ms: u64,
    pub recv_poll_ms: u64,
    pub reassembly_timeout_ms: u64,
    pub max_pending_reassemblies: usize,
    pub watchdog_timeout_ms: u64,
    pub ping_cooldown_ms: u64,
    pub scan: ScanConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            channel: DEFAULT_CHANNEL,
            mac: BROADCAST,
            protocol: RadioProtocol::Default,
            baudrate: DEFAULT_BAUDRATE,
            loglevel: LogLevel::Info,
            radio_mtu: DEFAULT_RADIO_MTU,
            fragment_margin: DEFAULT_FRAGMENT_MARGIN,
            max_fragments: DEFAULT_MAX_FRAGMENTS,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            inter_fragment_delay_ms: 5,
            idle_poll_ms: 10,
            recv_poll_ms: 1000,
            reassembly_timeout_ms: 5000,
            max_pending_reassemblies: DEFAULT_MAX_PENDING,
            watchdog_timeout_ms: 8000,
            ping_cooldown_ms: 1000,
            scan: ScanConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Parse, normalize and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(json)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. Keys absent from the file keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Clamp free-text fields to their stored limits.
    pub fn normalize(&mut self) {
        if let Some((idx, _)) = self.description.char_indices().nth(MAX_DESCRIPTION_LEN) {
            self.description.truncate(idx);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_CHANNEL..=MAX_CHANNEL).contains(&self.channel) {
            return Err(BridgeError::Config(format!(
                "channel {} outside {MIN_CHANNEL}..={MAX_CHANNEL}",
                self.channel
            )));
        }
        self.fragment_config()
            .validate()
            .map_err(|err| BridgeError::Config(err.to_string()))?;
        if self.max_frame_size == 0 {
            return Err(BridgeError::Config("max_frame_size must be non-zero".into()));
        }
        if self.inter_fragment_delay_ms == 0 {
            return Err(BridgeError::Config(
                "inter_fragment_delay_ms must be non-zero".into(),
            ));
        }
        if self.reassembly_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "reassembly_timeout_ms must be non-zero".into(),
            ));
        }
        if self.max_pending_reassemblies == 0 {
            return Err(BridgeError::Config(
                "max_pending_reassemblies must be non-zero".into(),
            ));
        }
        if self.recv_poll_ms == 0 || self.watchdog_timeout_ms <= self.recv_poll_ms {
            return Err(BridgeError::Config(format!(
                "watchdog_timeout_ms ({}) must exceed a non-zero recv_poll_ms ({})",
                self.watchdog_timeout_ms, self.recv_poll_ms
            )));
        }
        self.scan.validate()
    }

    pub fn fragment_config(&self) -> FragmentConfig {
        FragmentConfig {
            mtu: self.radio_mtu,
            margin: self.fragment_margin,
            max_fragments: self.max_fragments,
        }
    }

    pub fn reassembly_config(&self) -> ReassemblyConfig {
        ReassemblyConfig {
            max_fragments: self.max_fragments,
            max_pending: self.max_pending_reassemblies,
            timeout: Duration::from_millis(self.reassembly_timeout_ms),
        }
    }

    pub fn inter_fragment_delay(&self) -> Duration {
        Duration::from_millis(self.inter_fragment_delay_ms)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn recv_poll(&self) -> Duration {
        Duration::from_millis(self.recv_poll_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn ping_cooldown(&self) -> Duration {
        Duration::from_millis(self.ping_cooldown_ms)
    }
}
