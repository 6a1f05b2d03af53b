//! Daemon configuration
//!
//! A single JSON file under the user data directory. Read once at startup;
//! the control plane's `set_config` rewrites the file and swaps the
//! in-memory snapshot atomically.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const CONFIG_FILE: &str = "daemon.json";
pub const DB_FILE: &str = "drift.db";
pub const SOCKET_FILE: &str = "driftd.sock";

/// Remote service endpoint and credentials handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub endpoint: String,
    /// Bearer token for the storage API. A real deployment points this at a
    /// keychain entry; the daemon only sees the opaque string.
    #[serde(default)]
    pub api_key: String,
}

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub worker_threads: usize,
    pub debounce_secs: u64,
    pub op_timeout_secs: u64,
    pub max_attempts: i64,
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,
    pub drain_interval_secs: u64,
    /// Grace before a `processing` entry left by a crash is recovered.
    pub stale_grace_secs: u64,
    /// Terminal queue entries are kept this long for inspection.
    pub queue_retention_secs: u64,
    pub activity_retention_days: u64,
    /// Pool-wide transfer cap in bytes per second.
    pub bandwidth_cap: Option<u64>,
    pub remote: RemoteConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            worker_threads: crate::sync::DEFAULT_WORKER_COUNT,
            debounce_secs: crate::sync::DEFAULT_DEBOUNCE.as_secs(),
            op_timeout_secs: 30,
            max_attempts: crate::sync::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay_secs: 5,
            retry_max_delay_secs: 300,
            drain_interval_secs: 5,
            stale_grace_secs: 60,
            queue_retention_secs: 600,
            activity_retention_days: 30,
            bandwidth_cap: None,
            remote: RemoteConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `<data_dir>/daemon.json`; a missing file yields defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let config: Self = serde_json::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist to `<data_dir>/daemon.json`, creating the directory if needed.
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(Error::Config("worker_threads must be at least 1".into()));
        }
        if self.max_attempts < 1 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.retry_base_delay_secs == 0 {
            return Err(Error::Config(
                "retry_base_delay_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_secs(self.op_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_secs(self.retry_max_delay_secs)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_secs(self.drain_interval_secs)
    }

    pub fn stale_grace(&self) -> Duration {
        Duration::from_secs(self.stale_grace_secs)
    }

    pub fn queue_retention(&self) -> Duration {
        Duration::from_secs(self.queue_retention_secs)
    }

    pub fn activity_retention(&self) -> Duration {
        Duration::from_secs(self.activity_retention_days * 24 * 60 * 60)
    }
}

/// Default data directory: `<platform data dir>/drift`.
pub fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("drift"))
        .ok_or_else(|| Error::Config("cannot determine user data directory".into()))
}

/// Control socket path under a data directory.
pub fn socket_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SOCKET_FILE)
}

/// Database path under a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE)
}
