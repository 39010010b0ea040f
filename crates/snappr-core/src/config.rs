//! Configuration system for snappr.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SNAPPR_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/snappr/config.toml
//!   3. ~/.config/snappr/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::time::TimeDelta;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub nic: NicConfig,
    pub fabric: FabricConfig,
    pub transport: TransportConfig,
    pub stats: StatsConfig,
    pub workload: WorkloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NicConfig {
    /// Maximum bytes per packet.
    pub packet_size: u32,
    /// Injection time per byte, in picoseconds.
    pub byte_delay_ps: u64,
    /// Ejection time per byte, in picoseconds. 0 = payloads complete on arrival.
    pub ejection_byte_delay_ps: u64,
    /// Number of output ports, each with its own queue and credit pool.
    pub num_ports: u16,
    /// Buffer credit per port, in bytes. 0 = unlimited.
    pub credits: u64,
    /// Return credit explicitly for every ejected packet.
    pub send_credits: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// One-way hop latency, in picoseconds.
    pub latency_ps: u64,
}

/// Which transport protocol endpoints speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Remote write with placement metadata, completed by the sent ack.
    #[default]
    DirectPut,
    /// Sender packs the data into the message up front.
    Eager,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub protocol: ProtocolKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Width of one activity calendar bucket, in picoseconds. 0 = totals only.
    pub epoch_ps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub endpoints: u32,
    /// Messages each endpoint sends to its right-hand neighbour.
    pub messages: u32,
    pub message_bytes: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NicConfig {
    fn default() -> Self {
        Self {
            packet_size: 1500,
            byte_delay_ps: 10, // 100 GB/s
            ejection_byte_delay_ps: 0,
            num_ports: 1,
            credits: 0,
            send_credits: false,
        }
    }
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            latency_ps: 100_000, // 100 ns
        }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            epoch_ps: 1_000_000, // 1 us
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            endpoints: 2,
            messages: 8,
            message_bytes: 65_536,
        }
    }
}

impl NicConfig {
    pub fn byte_delay(&self) -> TimeDelta {
        TimeDelta::from_ps(self.byte_delay_ps)
    }

    pub fn ejection_byte_delay(&self) -> TimeDelta {
        TimeDelta::from_ps(self.ejection_byte_delay_ps)
    }

    /// Credit capacity per port, `None` when unlimited.
    pub fn credit_capacity(&self) -> Option<u64> {
        (self.credits > 0).then_some(self.credits)
    }
}

impl FabricConfig {
    pub fn latency(&self) -> TimeDelta {
        TimeDelta::from_ps(self.latency_ps)
    }
}

impl StatsConfig {
    /// Calendar bucket width, `None` when the calendar is disabled.
    pub fn epoch(&self) -> Option<TimeDelta> {
        (self.epoch_ps > 0).then_some(TimeDelta::from_ps(self.epoch_ps))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("snappr")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl SimConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            SimConfig::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SNAPPR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Reject settings under which the model can never make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nic.packet_size == 0 {
            return Err(ConfigError::Invalid("nic.packet_size must be > 0".into()));
        }
        if self.nic.num_ports == 0 {
            return Err(ConfigError::Invalid("nic.num_ports must be > 0".into()));
        }
        if let Some(credits) = self.nic.credit_capacity() {
            if credits < self.nic.packet_size as u64 {
                return Err(ConfigError::Invalid(format!(
                    "nic.credits ({credits}) is smaller than one packet ({})",
                    self.nic.packet_size
                )));
            }
        }
        if self.workload.endpoints == 0 {
            return Err(ConfigError::Invalid("workload.endpoints must be > 0".into()));
        }
        if self.workload.message_bytes > u32::MAX as u64 {
            return Err(ConfigError::Invalid(format!(
                "workload.message_bytes ({}) exceeds one send's element count",
                self.workload.message_bytes
            )));
        }
        Ok(())
    }

    /// Apply SNAPPR_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("SNAPPR_NIC__PACKET_SIZE") {
            self.nic.packet_size = v;
        }
        if let Some(v) = env_parse("SNAPPR_NIC__BYTE_DELAY_PS") {
            self.nic.byte_delay_ps = v;
        }
        if let Some(v) = env_parse("SNAPPR_NIC__CREDITS") {
            self.nic.credits = v;
        }
        if let Ok(v) = std::env::var("SNAPPR_NIC__SEND_CREDITS") {
            self.nic.send_credits = v == "true" || v == "1";
        }
        if let Some(v) = env_parse("SNAPPR_FABRIC__LATENCY_PS") {
            self.fabric.latency_ps = v;
        }
        if let Ok(v) = std::env::var("SNAPPR_TRANSPORT__PROTOCOL") {
            match v.as_str() {
                "direct_put" => self.transport.protocol = ProtocolKind::DirectPut,
                "eager" => self.transport.protocol = ProtocolKind::Eager,
                other => tracing::warn!(value = other, "ignoring unknown SNAPPR_TRANSPORT__PROTOCOL"),
            }
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
