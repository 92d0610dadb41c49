//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::devices::TargetMatcher;
use crate::service::ServiceSettings;
use crate::sources::PollerSettings;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Case-insensitive token identifying the target headset by name
    pub target_name: String,

    /// Vendor that, with a headphone-ish name, also identifies the headset
    pub target_vendor: String,

    pub headphone_token: String,

    /// Fallback poller period
    pub poll_interval: Duration,

    /// Poller heartbeat log every this many ticks
    pub poll_log_every: u64,

    /// Upper bound on a single OS mute query from the poller
    pub query_timeout: Duration,

    /// Poll even when the gesture callback is registered
    pub always_poll: bool,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME")?;
        Self::from_lookup(&home, |key| std::env::var(key).ok())
    }

    fn from_lookup(home: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("mic-mute");

        let socket_path = lookup("MIC_MUTE_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let millis = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .with_context(|| {
                        format!("{} must be a number of milliseconds, got {:?}", key, raw)
                    }),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let poll_interval = millis("MIC_MUTE_POLL_MS", 100)?;
        let query_timeout = millis("MIC_MUTE_QUERY_TIMEOUT_MS", 250)?;
        anyhow::ensure!(!poll_interval.is_zero(), "MIC_MUTE_POLL_MS must be greater than zero");

        let always_poll = lookup("MIC_MUTE_ALWAYS_POLL")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            socket_path,
            data_dir,
            target_name: lookup("MIC_MUTE_TARGET_NAME").unwrap_or_else(|| "AirPods".to_string()),
            target_vendor: lookup("MIC_MUTE_TARGET_VENDOR").unwrap_or_else(|| "Apple".to_string()),
            headphone_token: "headphone".to_string(),
            poll_interval,
            poll_log_every: 50,
            query_timeout,
            always_poll,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }

    /// Settings handed to the mute service
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            matcher: TargetMatcher::new(
                &self.target_name,
                &self.target_vendor,
                &self.headphone_token,
            ),
            poller: PollerSettings {
                period: self.poll_interval,
                log_every: self.poll_log_every,
                query_timeout: self.query_timeout,
            },
            always_poll: self.always_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup("/Users/test", |key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.socket_path.to_string_lossy().contains("mic-mute"));
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&[]).unwrap();
        assert_eq!(
            config.socket_path,
            PathBuf::from("/Users/test/.local/share/mic-mute/daemon.sock")
        );
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.poll_log_every, 50);
        assert_eq!(config.target_name, "AirPods");
        assert!(!config.always_poll);
    }

    #[test]
    fn test_env_overrides() {
        let config = load_with(&[
            ("MIC_MUTE_POLL_MS", "250"),
            ("MIC_MUTE_ALWAYS_POLL", "true"),
            ("MIC_MUTE_TARGET_NAME", "Beats"),
            ("MIC_MUTE_SOCKET", "/tmp/mute.sock"),
        ])
        .unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(config.always_poll);
        assert_eq!(config.target_name, "Beats");
        assert_eq!(config.socket_path, PathBuf::from("/tmp/mute.sock"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = load_with(&[("MIC_MUTE_POLL_MS", "fast")]).unwrap_err();
        assert!(err.to_string().contains("MIC_MUTE_POLL_MS"));
        assert!(load_with(&[("MIC_MUTE_POLL_MS", "0")]).is_err());
    }
}
