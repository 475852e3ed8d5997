// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Persistent client configuration.
//!
//! Stored as pretty JSON in `~/.droidget/config.json`. Every field has a
//! default so older files keep loading after new settings are added.
//! Writes go through a temp file and an atomic rename while an exclusive
//! lock is held on a sibling `.lock` file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::catalog::Blacklist;
use crate::download::SYNC_GROUP_ID;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound for `bundle_retention_secs` (one week).
pub const MAX_BUNDLE_RETENTION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Concurrent transfers allowed by the engine
    pub active_downloads: usize,
    /// Attempts per file before it is reported as failed
    pub auto_retry_max_attempts: u32,
    /// Re-queue network failures once connectivity returns
    pub retry_on_network_gain: bool,
    /// Minimum interval between progress events per file
    pub progress_interval_ms: u64,
    /// Verify downloaded files against the index hash
    pub hash_check: bool,
    /// Installs happen without user interaction (privileged installer)
    pub privileged_install: bool,
    /// Group id reserved for index refresh traffic
    pub sync_group_id: i32,
    /// How long a terminal notification's bundle is remembered
    pub bundle_retention_secs: u64,
    /// Where downloaded files land
    pub download_dir: PathBuf,
    /// Optional HTTP proxy (`http://host:port`)
    pub proxy: Option<String>,
    /// Verbose engine logging
    pub debug: bool,
    pub blacklist: Blacklist,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            active_downloads: 3,
            auto_retry_max_attempts: 3,
            retry_on_network_gain: true,
            progress_interval_ms: 3000,
            hash_check: true,
            privileged_install: false,
            sync_group_id: SYNC_GROUP_ID.raw(),
            bundle_retention_secs: 600,
            download_dir: default_download_dir(),
            proxy: None,
            debug: false,
            blacklist: Blacklist::new(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .map(|d| d.join("droidget"))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Default location of the config file.
pub fn config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".droidget").join("config.json"))
        .unwrap_or_else(|| PathBuf::from(".droidget/config.json"))
}

impl Config {
    /// Load from the default location, defaults if the file does not exist.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Atomically write the config to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }

        let _lock_guard = acquire_exclusive_lock(&path.with_extension("lock"), LOCK_TIMEOUT)?;

        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string_pretty(self)
            .with_context(|| "Failed to serialize config to JSON")?;
        {
            let mut temp_file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
            temp_file
                .write_all(content.as_bytes())
                .with_context(|| "Failed to write to temp file")?;
            temp_file.sync_all().with_context(|| "Failed to sync temp file to disk")?;
        }

        fs::rename(&temp_path, path).with_context(|| {
            format!("Failed to rename temp file to config file: {:?} -> {:?}", temp_path, path)
        })?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.active_downloads == 0 {
            bail!("active_downloads must be at least 1");
        }
        if self.auto_retry_max_attempts == 0 {
            bail!("auto_retry_max_attempts must be at least 1");
        }
        if self.bundle_retention_secs > MAX_BUNDLE_RETENTION_SECS {
            bail!(
                "bundle_retention_secs must be at most {} (one week), got {}",
                MAX_BUNDLE_RETENTION_SECS,
                self.bundle_retention_secs
            );
        }
        Ok(())
    }
}

fn acquire_exclusive_lock(path: &Path, timeout: Duration) -> Result<File> {
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file: {:?}", path))?;

    let start = Instant::now();
    loop {
        match lock_file.try_lock_exclusive() {
            Ok(()) => return Ok(lock_file),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if start.elapsed() >= timeout {
                    bail!(
                        "Timed out waiting for exclusive lock on {:?} after {:?}. \
                         Another instance may be writing the config.",
                        path,
                        timeout
                    );
                }
                thread::sleep(LOCK_RETRY_INTERVAL);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to acquire exclusive lock on {:?}", path));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sync_group_id, 1337);
        assert_eq!(config.auto_retry_max_attempts, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.privileged_install = true;
        config.blacklist.toggle("com.example.ads");
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert!(loaded.privileged_install);
        assert!(loaded.blacklist.contains("com.example.ads"));
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"active_downloads": 5}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.active_downloads, 5);
        assert!(config.retry_on_network_gain);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"active_downloads": 0}"#).unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("active_downloads"));
    }

    #[test]
    fn test_oversized_retention_rejected() {
        let config = Config {
            bundle_retention_secs: u64::MAX,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bundle_retention_secs"));

        let at_limit = Config {
            bundle_retention_secs: MAX_BUNDLE_RETENTION_SECS,
            ..Config::default()
        };
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_lock_times_out_while_held() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let lock_path = dir.path().join("config.lock");

        let _held = acquire_exclusive_lock(&lock_path, Duration::from_secs(1)).unwrap();
        let second = acquire_exclusive_lock(&lock_path, Duration::from_millis(100));
        assert!(second.unwrap_err().to_string().contains("Timed out"));
    }
}
