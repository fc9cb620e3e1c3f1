// Copyright (c) 2026 SC3 Contributors
// SPDX-License-Identifier: AGPL-3.0

// Orchestrator Configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) holding the
// tunables of the coordination runtime:
// - protocol polling and claim timeouts
// - session capture, streaming and termination windows
// - lifecycle actor identity and state file location
//
// Values are handed to services through their constructors; nothing in the
// core reads configuration from ambient process state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "sc3.dev/v1";
pub const KIND: &str = "OrchestratorConfig";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sc3Config {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: Sc3ConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sc3ConfigSpec {
    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub sessions: SessionManagerConfig,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Store polling interval while waiting for a claim
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Default wait before a claim is declared stuck
    #[serde(default = "default_claim_timeout", with = "humantime_serde")]
    pub claim_timeout: Duration,

    /// Append-only JSONL event log
    #[serde(default = "default_event_log")]
    pub event_log: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManagerConfig {
    /// Scrollback lines returned by a capture
    #[serde(default = "default_capture_lines")]
    pub capture_lines: u32,

    #[serde(default = "default_stream_interval", with = "humantime_serde")]
    pub stream_interval: Duration,

    /// Largest output chunk published in one event
    #[serde(default = "default_stream_max_bytes")]
    pub stream_max_bytes: usize,

    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,

    #[serde(default = "default_forced_exit_window", with = "humantime_serde")]
    pub forced_exit_window: Duration,

    #[serde(default = "default_liveness_poll_interval", with = "humantime_serde")]
    pub liveness_poll_interval: Duration,

    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Actor recorded on every transition
    #[serde(default = "default_actor")]
    pub actor: String,

    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_claim_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_event_log() -> PathBuf {
    PathBuf::from(".sc3/events.jsonl")
}

fn default_capture_lines() -> u32 {
    10_000
}

fn default_stream_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_stream_max_bytes() -> usize {
    1024 * 1024
}

fn default_grace_period() -> Duration {
    Duration::from_secs(5)
}

fn default_forced_exit_window() -> Duration {
    Duration::from_secs(2)
}

fn default_liveness_poll_interval() -> Duration {
    Duration::from_millis(25)
}

fn default_tmux_binary() -> String {
    "tmux".to_string()
}

fn default_actor() -> String {
    "orchestrator".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(".sc3/state.json")
}

impl ProtocolConfig {
    /// Poll interval, with zero meaning the default.
    pub fn effective_poll_interval(&self) -> Duration {
        non_zero_or(self.poll_interval, default_poll_interval)
    }
}

impl SessionManagerConfig {
    /// Stream interval, with zero meaning the default.
    pub fn effective_stream_interval(&self) -> Duration {
        non_zero_or(self.stream_interval, default_stream_interval)
    }

    /// Liveness poll interval, with zero meaning the default.
    pub fn effective_liveness_poll_interval(&self) -> Duration {
        non_zero_or(self.liveness_poll_interval, default_liveness_poll_interval)
    }
}

fn non_zero_or(value: Duration, default: fn() -> Duration) -> Duration {
    if value.is_zero() {
        default()
    } else {
        value
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            claim_timeout: default_claim_timeout(),
            event_log: default_event_log(),
        }
    }
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            capture_lines: default_capture_lines(),
            stream_interval: default_stream_interval(),
            stream_max_bytes: default_stream_max_bytes(),
            grace_period: default_grace_period(),
            forced_exit_window: default_forced_exit_window(),
            liveness_poll_interval: default_liveness_poll_interval(),
            tmux_binary: default_tmux_binary(),
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            actor: default_actor(),
            state_file: default_state_file(),
        }
    }
}

impl Default for Sc3Config {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "sc3".to_string(),
                version: Some("1.0.0".to_string()),
            },
            spec: Sc3ConfigSpec::default(),
        }
    }
}

impl Sc3Config {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SC3_CONFIG_PATH environment variable
    /// 2. ./sc3-config.yaml (working directory)
    /// 3. ~/.sc3/config.yaml (user home)
    /// 4. /etc/sc3/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SC3_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sc3-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sc3").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/sc3/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::debug!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_millis("SC3_POLL_INTERVAL_MS") {
            tracing::info!("Environment override: SC3_POLL_INTERVAL_MS={}", ms);
            self.spec.protocol.poll_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env_millis("SC3_GRACE_PERIOD_MS") {
            tracing::info!("Environment override: SC3_GRACE_PERIOD_MS={}", ms);
            self.spec.sessions.grace_period = Duration::from_millis(ms);
        }
        if let Ok(bin) = std::env::var("SC3_TMUX_BIN") {
            if !bin.trim().is_empty() {
                tracing::info!("Environment override: SC3_TMUX_BIN={}", bin);
                self.spec.sessions.tmux_binary = bin;
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }
        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }
        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let protocol = &self.spec.protocol;
        if protocol.poll_interval.is_zero() {
            anyhow::bail!("spec.protocol.poll_interval must be greater than zero");
        }
        if protocol.claim_timeout.is_zero() {
            anyhow::bail!("spec.protocol.claim_timeout must be greater than zero");
        }

        let sessions = &self.spec.sessions;
        if sessions.capture_lines == 0 {
            anyhow::bail!("spec.sessions.capture_lines must be greater than zero");
        }
        if sessions.stream_interval.is_zero() || sessions.liveness_poll_interval.is_zero() {
            anyhow::bail!("spec.sessions intervals must be greater than zero");
        }
        if sessions.stream_max_bytes == 0 {
            anyhow::bail!("spec.sessions.stream_max_bytes must be greater than zero");
        }
        if sessions.tmux_binary.trim().is_empty() {
            anyhow::bail!("spec.sessions.tmux_binary cannot be empty");
        }

        if self.spec.lifecycle.actor.trim().is_empty() {
            anyhow::bail!("spec.lifecycle.actor cannot be empty");
        }
        Ok(())
    }
}

fn env_millis(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(ms),
        _ => {
            tracing::warn!("Invalid value for {}: '{}'. Expected positive milliseconds. Ignoring.", var, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Sc3Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.spec.protocol.poll_interval, Duration::from_millis(200));
        assert_eq!(config.spec.sessions.grace_period, Duration::from_secs(5));
        assert_eq!(config.spec.sessions.forced_exit_window, Duration::from_secs(2));
        assert_eq!(config.spec.sessions.stream_max_bytes, 1024 * 1024);
    }

    #[test]
    fn test_yaml_with_humantime_durations() {
        let yaml = r#"
apiVersion: sc3.dev/v1
kind: OrchestratorConfig
metadata:
  name: dev
spec:
  protocol:
    poll_interval: 50ms
    claim_timeout: 10m
  sessions:
    grace_period: 3s
    stream_max_bytes: 4096
"#;
        let config = Sc3Config::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.spec.protocol.poll_interval, Duration::from_millis(50));
        assert_eq!(config.spec.protocol.claim_timeout, Duration::from_secs(600));
        assert_eq!(config.spec.sessions.grace_period, Duration::from_secs(3));
        assert_eq!(config.spec.sessions.stream_max_bytes, 4096);
        assert_eq!(config.spec.sessions.capture_lines, 10_000);
        assert_eq!(config.spec.lifecycle.actor, "orchestrator");
    }

    #[test]
    fn test_zero_intervals_fall_back_to_defaults() {
        let protocol = ProtocolConfig {
            poll_interval: Duration::ZERO,
            ..ProtocolConfig::default()
        };
        assert_eq!(protocol.effective_poll_interval(), Duration::from_millis(200));

        let sessions = SessionManagerConfig {
            stream_interval: Duration::ZERO,
            liveness_poll_interval: Duration::ZERO,
            ..SessionManagerConfig::default()
        };
        assert_eq!(sessions.effective_stream_interval(), Duration::from_secs(1));
        assert_eq!(sessions.effective_liveness_poll_interval(), Duration::from_millis(25));

        let tuned = SessionManagerConfig {
            liveness_poll_interval: Duration::from_millis(5),
            ..SessionManagerConfig::default()
        };
        assert_eq!(tuned.effective_liveness_poll_interval(), Duration::from_millis(5));
    }

    #[test]
    fn test_validation() {
        let mut config = Sc3Config::default();
        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());

        let mut config = Sc3Config::default();
        config.spec.sessions.stream_max_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = Sc3Config::default();
        config.spec.protocol.poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sc3-config.yaml");
        let config = Sc3Config::default();
        config.to_yaml_file(&path).unwrap();

        let loaded = Sc3Config::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.sessions, config.spec.sessions);
    }
}
