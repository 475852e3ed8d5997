// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Platform-neutral notification payload.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::download::{string_hash, FileStatus, GroupId};

/// Identifies an on-screen notification. Posting twice with the same key
/// replaces the first one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub tag: String,
    pub id: i32,
}

impl NotificationKey {
    pub fn for_package(package_name: &str) -> Self {
        Self {
            tag: package_name.to_string(),
            id: string_hash(package_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmallIcon {
    Download,
    DownloadDone,
    Paused,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tint {
    Accent,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "percent", rename_all = "snake_case")]
pub enum ProgressBar {
    Hidden,
    Indeterminate,
    Determinate(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Progress,
    Error,
    Status,
}

/// Button on a notification. User actions carry only the group id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NotificationAction {
    Pause { group_id: GroupId },
    Resume { group_id: GroupId },
    Cancel { group_id: GroupId },
    Install { package_name: String, file: PathBuf },
}

impl NotificationAction {
    pub fn label(&self) -> &'static str {
        match self {
            NotificationAction::Pause { .. } => "Pause",
            NotificationAction::Resume { .. } => "Resume",
            NotificationAction::Cancel { .. } => "Cancel",
            NotificationAction::Install { .. } => "Install",
        }
    }
}

/// Where tapping the notification leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum TapTarget {
    Downloads,
    AppDetails { package_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub key: NotificationKey,
    pub group_id: GroupId,
    /// Status the payload was built from
    pub status: FileStatus,
    pub title: String,
    pub text: String,
    pub big_text: String,
    pub small_icon: SmallIcon,
    pub tint: Tint,
    pub progress: ProgressBar,
    pub actions: Vec<NotificationAction>,
    pub category: Category,
    pub tap_target: TapTarget,
    /// Dismiss on tap
    pub auto_cancel: bool,
    pub when: DateTime<Utc>,
}

impl Notification {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn action_labels(&self) -> Vec<&'static str> {
        self.actions.iter().map(NotificationAction::label).collect()
    }
}
