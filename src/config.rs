//! TOML configuration for both roles
//!
//! Every default reproduces the plain protocol behavior; each hardening
//! knob is opt-in.
//!
//! ```toml
//! [listener]
//! root = "/srv/drop"
//! max_put_size = 1073741824
//! confine_reads = true
//! reply_unknown = true
//! io_timeout_secs = 30
//! log_file = "/var/log/p2p.log"
//!
//! [initiator]
//! connect_timeout_secs = 5
//! io_timeout_secs = 30
//! progress = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::protocol::timeouts;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Directory uploads land in and relative GET paths resolve against
    pub root: PathBuf,
    /// Reject PUTs declaring more than this many bytes (None = trust the peer)
    pub max_put_size: Option<u64>,
    /// Sanitize GET names like PUT names instead of using them as literal paths
    pub confine_reads: bool,
    /// Answer unknown commands with `ERR unknown-command` instead of closing silently
    pub reply_unknown: bool,
    /// Per-call socket deadline (None = block indefinitely)
    pub io_timeout_secs: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig {
            root: PathBuf::from("."),
            max_put_size: None,
            confine_reads: false,
            reply_unknown: false,
            io_timeout_secs: None,
            log_file: None,
        }
    }
}

impl ListenerConfig {
    pub fn io_timeout(&self) -> Option<Duration> {
        timeouts::from_secs(self.io_timeout_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InitiatorConfig {
    pub connect_timeout_secs: Option<u64>,
    pub io_timeout_secs: Option<u64>,
    /// Draw a byte progress bar on stderr
    pub progress: bool,
}

impl InitiatorConfig {
    pub fn connect_timeout(&self) -> Option<Duration> {
        timeouts::from_secs(self.connect_timeout_secs)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        timeouts::from_secs(self.io_timeout_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub listener: ListenerConfig,
    pub initiator: InitiatorConfig,
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("p2pxfer");
        }
    }
    // Unix-like default
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("p2pxfer");
    }
    PathBuf::from(".p2pxfer")
}

fn default_config_path() -> PathBuf {
    config_dir().join("p2p.toml")
}

impl Config {
    pub fn from_toml(data: &str) -> Result<Self> {
        let cfg: Config = toml::from_str(data)?;
        Ok(cfg)
    }

    /// Load an explicit config file; a missing or malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&data).with_context(|| format!("parse config {}", path.display()))
    }

    /// Explicit path if given, else the per-user file if present, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load(p);
        }
        let p = default_config_path();
        if p.is_file() {
            Self::load(&p)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_preserve_plain_protocol() {
        let cfg = Config::default();
        assert_eq!(cfg.listener.root, PathBuf::from("."));
        assert_eq!(cfg.listener.max_put_size, None);
        assert!(!cfg.listener.confine_reads);
        assert!(!cfg.listener.reply_unknown);
        assert!(cfg.listener.io_timeout().is_none());
        assert!(cfg.initiator.connect_timeout().is_none());
        assert!(!cfg.initiator.progress);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
            [listener]
            root = "/srv/drop"
            max_put_size = 1024
            io_timeout_secs = 5

            [initiator]
            progress = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.listener.root, PathBuf::from("/srv/drop"));
        assert_eq!(cfg.listener.max_put_size, Some(1024));
        assert_eq!(cfg.listener.io_timeout(), Some(Duration::from_secs(5)));
        assert!(!cfg.listener.confine_reads);
        assert!(cfg.initiator.progress);
        assert!(cfg.initiator.io_timeout().is_none());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(Config::from_toml("").unwrap(), Config::default());
    }

    #[test]
    fn load_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load(&missing).is_err());
        assert!(Config::load_or_default(Some(&missing)).is_err());

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "[listener]\nroot = 5\n").unwrap();
        let err = Config::load(&bad).unwrap_err();
        assert!(format!("{:#}", err).contains("bad.toml"));
    }

    #[test]
    fn load_round_trips_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p2p.toml");
        let mut cfg = Config::default();
        cfg.listener.confine_reads = true;
        cfg.listener.reply_unknown = true;
        std::fs::write(&path, toml::to_string(&cfg).unwrap()).unwrap();
        assert_eq!(Config::load(&path).unwrap(), cfg);
    }
}
