// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download types shared by the engine, the reconciler and the renderers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::group::GroupId;

/// Lifecycle state of one physical file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    /// Accepted by the engine, not yet scheduled
    Added,
    /// Waiting for a worker slot or for the network
    Queued,
    /// Bytes are flowing
    Downloading,
    /// Paused by the user
    Paused,
    /// Finished and verified
    Completed,
    /// Cancelled by the user
    Cancelled,
    /// Gave up after the retry ceiling
    Failed,
}

impl FileStatus {
    /// Returns true if no further transitions are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Completed | FileStatus::Cancelled | FileStatus::Failed)
    }

    /// Returns true if the transfer holds (or waits for) a worker slot.
    pub fn is_active(&self) -> bool {
        matches!(self, FileStatus::Added | FileStatus::Queued | FileStatus::Downloading)
    }

    /// Short label for lists and logs.
    pub fn label(&self) -> &'static str {
        match self {
            FileStatus::Added => "Added",
            FileStatus::Queued => "Queued",
            FileStatus::Downloading => "Downloading",
            FileStatus::Paused => "Paused",
            FileStatus::Completed => "Completed",
            FileStatus::Cancelled => "Cancelled",
            FileStatus::Failed => "Failed",
        }
    }
}

/// Keys of the metadata side-channel carried by every file request.
pub mod extra {
    pub const PACKAGE_NAME: &str = "PACKAGE_NAME";
    pub const DISPLAY_NAME: &str = "DISPLAY_NAME";
    pub const VERSION_NAME: &str = "VERSION_NAME";
    pub const VERSION_CODE: &str = "VERSION_CODE";
    pub const ICON_URL: &str = "ICON_URL";
    pub const APK_NAME: &str = "APK_NAME";
}

/// Opaque key/value extras attached to a file request.
///
/// This is the only way metadata travels from request creation to
/// notification rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Extras(BTreeMap<String, String>);

impl Extras {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

/// Why the engine gave up on a file.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadError {
    #[error("network connection lost")]
    Network,
    #[error("not enough free storage")]
    DiskFull,
    #[error("downloaded file does not match the index hash")]
    HashMismatch,
    #[error("server responded with HTTP {status}")]
    Http { status: u16 },
    #[error("{message}")]
    Unknown { message: String },
}

impl DownloadError {
    /// Transient errors are retried by the engine until the attempt ceiling.
    pub fn is_transient(&self) -> bool {
        match self {
            DownloadError::Network => true,
            DownloadError::Http { status } => *status >= 500,
            _ => false,
        }
    }

    /// Generic message safe to show to the user.
    pub fn user_message(&self) -> &'static str {
        match self {
            DownloadError::Network => "Download failed, check your connection",
            DownloadError::DiskFull => "Download failed, storage is full",
            _ => "Download failed",
        }
    }
}

/// One physical file transfer belonging to a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDownload {
    pub file_id: i32,
    pub group_id: GroupId,
    pub status: FileStatus,
    /// Bytes on disk so far, -1 if unknown
    pub bytes_downloaded: i64,
    /// Expected size, -1 if unknown
    pub bytes_total: i64,
    /// Estimated time remaining, -1 if unknown
    pub eta_millis: i64,
    /// Current throughput, 0 if unknown
    pub bytes_per_second: i64,
    /// Destination on disk
    pub file: PathBuf,
    pub extras: Extras,
    pub created: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<DownloadError>,
}

impl FileDownload {
    /// A freshly added transfer with unknown size.
    pub fn new(file_id: i32, group_id: GroupId, file: impl Into<PathBuf>, extras: Extras) -> Self {
        Self {
            file_id,
            group_id,
            status: FileStatus::Added,
            bytes_downloaded: 0,
            bytes_total: -1,
            eta_millis: -1,
            bytes_per_second: 0,
            file: file.into(),
            extras,
            created: Utc::now(),
            error: None,
        }
    }

    /// Package name this file belongs to, empty if the request carried none.
    pub fn tag(&self) -> &str {
        self.extras.get_or(extra::PACKAGE_NAME, "")
    }

    /// Progress in percent, or -1 when the total is unknown.
    pub fn progress_percent(&self) -> i32 {
        if self.status == FileStatus::Completed {
            return 100;
        }
        if self.bytes_total <= 0 || self.bytes_downloaded < 0 {
            return -1;
        }
        let percent = self.bytes_downloaded.saturating_mul(100) / self.bytes_total;
        percent.clamp(0, 100) as i32
    }
}

/// One lifecycle transition reported by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineEvent {
    pub group_id: GroupId,
    pub file: FileDownload,
    /// Aggregate progress of the whole group, -1 if indeterminate
    pub group_progress: i32,
}

/// Human-readable byte count ("12.3 MB").
pub fn human_bytes(bytes: i64) -> String {
    if bytes < 0 {
        return "--".to_string();
    }
    let b = bytes as f64;
    if b >= 1_073_741_824.0 {
        format!("{:.1} GB", b / 1_073_741_824.0)
    } else if b >= 1_048_576.0 {
        format!("{:.1} MB", b / 1_048_576.0)
    } else if b >= 1024.0 {
        format!("{:.1} KB", b / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Human-readable transfer speed ("1.5 MB/s").
pub fn human_speed(bytes_per_second: i64) -> String {
    format!("{}/s", human_bytes(bytes_per_second.max(0)))
}

/// Human-readable remaining time, None when unknown.
pub fn eta_string(eta_millis: i64) -> Option<String> {
    if eta_millis < 0 {
        return None;
    }
    let secs = eta_millis / 1000;
    Some(if secs >= 3600 {
        format!("{}h {}m left", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s left", secs / 60, secs % 60)
    } else {
        format!("{}s left", secs)
    })
}
