//! Configuration system for Nearguard.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $NEARGUARD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/nearguard/config.toml
//!   3. ~/.config/nearguard/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NearguardConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    pub session: SessionConfig,
    pub policy: PolicyConfig,
    pub learning: LearningConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Name shown to nearby peers.
    pub display_name: String,
    /// Where the endpoint id is kept. Generated on first run.
    pub endpoint_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Network interface name. Empty = auto-detect.
    pub interface: String,
    /// Service type advertised to and browsed from nearby peers.
    pub service_type: String,
    /// UDP port for presence announcements.
    pub announce_port: u16,
    /// Local HTTP control API port.
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Seconds an outbound invitation may stay unanswered.
    pub invite_timeout_secs: u64,
    pub send_mode: SendMode,
    pub busy_policy: BusyPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Directory holding the shared key/value policy store.
    pub store_dir: PathBuf,
    /// Domains blocked regardless of store contents.
    pub default_domains: Vec<String>,
    /// Verdict when the store cannot be read.
    pub fail_mode: FailMode,
    /// Flow sources that are never filtered (the host app itself).
    pub exempt_sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub enabled: bool,
    /// A chat message ending in one of these is treated as a domain.
    pub suffixes: Vec<String>,
}

/// Which peers an outbound message goes to. Fixed for the life of a
/// coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Only the active conversation target.
    #[default]
    Active,
    /// Every connected peer.
    Broadcast,
}

/// What happens to a second invitation while one is awaiting a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Decline the newcomer immediately.
    #[default]
    Reject,
    /// Decline the pending request and put the newcomer in its place.
    Replace,
}

/// Verdict used by the filter when the policy store is unreadable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

impl FromStr for SendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "broadcast" => Ok(Self::Broadcast),
            other => Err(ConfigError::InvalidValue("session.send_mode", other.to_string())),
        }
    }
}

impl FromStr for BusyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(Self::Reject),
            "replace" => Ok(Self::Replace),
            other => Err(ConfigError::InvalidValue("session.busy_policy", other.to_string())),
        }
    }
}

impl FromStr for FailMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(ConfigError::InvalidValue("policy.fail_mode", other.to_string())),
        }
    }
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            display_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "nearguard".to_string()),
            endpoint_path: config_dir().join("endpoint"),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            service_type: "nearby-devices".to_string(),
            announce_port: 9000,
            api_port: 9101,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            invite_timeout_secs: 60,
            send_mode: SendMode::Active,
            busy_policy: BusyPolicy::Reject,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            store_dir: data_dir().join("policy"),
            default_domains: vec!["youtube.com".to_string(), "www.youtube.com".to_string()],
            fail_mode: FailMode::Open,
            exempt_sources: vec!["nearguardd".to_string()],
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            suffixes: vec![".com".to_string()],
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("nearguard")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("nearguard")
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
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid value for {0}: {1:?}")]
    InvalidValue(&'static str, String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NearguardConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            NearguardConfig::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("NEARGUARD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NearguardConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject values the transport or the coordinator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_service_type(&self.network.service_type) {
            return Err(ConfigError::InvalidValue(
                "network.service_type",
                self.network.service_type.clone(),
            ));
        }
        if self.session.invite_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "session.invite_timeout_secs",
                "0".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply NEARGUARD_* env var overrides.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(v) = std::env::var("NEARGUARD_NETWORK__INTERFACE") {
            self.network.interface = v;
        }
        if let Ok(v) = std::env::var("NEARGUARD_NETWORK__API_PORT") {
            if let Ok(p) = v.parse() {
                self.network.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("NEARGUARD_SESSION__INVITE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse() {
                self.session.invite_timeout_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("NEARGUARD_SESSION__SEND_MODE") {
            self.session.send_mode = v.parse()?;
        }
        if let Ok(v) = std::env::var("NEARGUARD_POLICY__STORE_DIR") {
            self.policy.store_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("NEARGUARD_POLICY__FAIL_MODE") {
            self.policy.fail_mode = v.parse()?;
        }
        if let Ok(v) = std::env::var("NEARGUARD_LEARNING__ENABLED") {
            self.learning.enabled = v == "true" || v == "1";
        }
        Ok(())
    }
}

/// Service types are 1–15 characters of lowercase ASCII letters, digits
/// and hyphens, not starting or ending with a hyphen.
pub fn is_valid_service_type(s: &str) -> bool {
    (1..=15).contains(&s.len())
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
