// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Per-group aggregate state owned by the reconciler.

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;

use super::group::GroupId;
use super::types::{extra, FileDownload, FileStatus};
use crate::notify::Notification;

/// Everything the reconciler remembers about one app download.
///
/// Metadata is captured from the extras of the first file seen for the group
/// and reused for every later file.
#[derive(Debug, Clone)]
pub struct DownloadBundle {
    pub group_id: GroupId,
    pub package_name: String,
    pub display_name: String,
    pub version_name: String,
    pub version_code: String,
    pub icon_url: String,
    pub apk_name: String,
    pub created: DateTime<Utc>,
    /// Last payload handed to the renderer
    pub last_posted: Option<Notification>,
    /// When a terminal payload was first displayed
    pub terminal_at: Option<DateTime<Utc>>,
    /// Icon fetch already started
    pub icon_requested: bool,
}

impl DownloadBundle {
    pub fn from_download(group_id: GroupId, download: &FileDownload) -> Self {
        let extras = &download.extras;
        let package_name = extras.get_or(extra::PACKAGE_NAME, "").to_string();
        let display_name = match extras.get(extra::DISPLAY_NAME) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => package_name.clone(),
        };
        Self {
            group_id,
            display_name,
            version_name: extras.get_or(extra::VERSION_NAME, "").to_string(),
            version_code: extras.get_or(extra::VERSION_CODE, "").to_string(),
            icon_url: extras.get_or(extra::ICON_URL, "").to_string(),
            apk_name: extras.get_or(extra::APK_NAME, "").to_string(),
            package_name,
            created: download.created,
            last_posted: None,
            terminal_at: None,
            icon_requested: false,
        }
    }

    /// Status of the last payload posted for this bundle.
    pub fn last_status(&self) -> Option<FileStatus> {
        self.last_posted.as_ref().map(|n| n.status)
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal_at.is_some()
    }

    /// Record a posted payload, stamping the first terminal display.
    pub fn record_post(&mut self, notification: Notification, now: DateTime<Utc>) {
        if notification.is_terminal() {
            self.terminal_at.get_or_insert(now);
        } else {
            self.terminal_at = None;
        }
        self.last_posted = Some(notification);
    }
}

/// Bundles keyed by group id, in first-seen order.
#[derive(Debug, Default)]
pub struct BundleMap {
    bundles: IndexMap<GroupId, DownloadBundle>,
}

impl BundleMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing bundle for the group, or a new one built from `download`.
    /// The flag is true when the bundle was just created.
    pub fn get_or_create(
        &mut self,
        group_id: GroupId,
        download: &FileDownload,
    ) -> (&mut DownloadBundle, bool) {
        let created = !self.bundles.contains_key(&group_id);
        let bundle = self
            .bundles
            .entry(group_id)
            .or_insert_with(|| DownloadBundle::from_download(group_id, download));
        (bundle, created)
    }

    pub fn get(&self, group_id: GroupId) -> Option<&DownloadBundle> {
        self.bundles.get(&group_id)
    }

    pub fn remove(&mut self, group_id: GroupId) -> Option<DownloadBundle> {
        self.bundles.shift_remove(&group_id)
    }

    /// Drop bundles whose terminal state has been on screen longer than
    /// `retention`. Returns the evicted group ids. A window reaching past
    /// the earliest representable time evicts nothing.
    pub fn evict_expired(&mut self, now: DateTime<Utc>, retention: Duration) -> Vec<GroupId> {
        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Vec::new();
        };
        let expired: Vec<GroupId> = self
            .bundles
            .values()
            .filter(|b| b.terminal_at.is_some_and(|t| t <= cutoff))
            .map(|b| b.group_id)
            .collect();
        for group_id in &expired {
            self.bundles.shift_remove(group_id);
        }
        expired
    }

    pub fn iter(&self) -> impl Iterator<Item = &DownloadBundle> {
        self.bundles.values()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// Counts of (active, paused, terminal) bundles.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let mut active = 0;
        let mut paused = 0;
        let mut terminal = 0;
        for bundle in self.bundles.values() {
            match bundle.last_status() {
                Some(FileStatus::Paused) => paused += 1,
                Some(status) if status.is_terminal() => terminal += 1,
                _ => active += 1,
            }
        }
        (active, paused, terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::types::Extras;

    fn download(package: &str) -> FileDownload {
        let extras = Extras::new()
            .with(extra::PACKAGE_NAME, package)
            .with(extra::DISPLAY_NAME, "Example")
            .with(extra::VERSION_NAME, "1.0")
            .with(extra::VERSION_CODE, "10");
        FileDownload::new(1, GroupId::for_package(package), "/tmp/x.apk", extras)
    }

    #[test]
    fn test_bundle_from_extras() {
        let d = download("a.b");
        let bundle = DownloadBundle::from_download(d.group_id, &d);
        assert_eq!(bundle.package_name, "a.b");
        assert_eq!(bundle.display_name, "Example");
        assert_eq!(bundle.version_code, "10");
        assert_eq!(bundle.icon_url, "");
    }

    #[test]
    fn test_display_name_falls_back_to_package() {
        let extras = Extras::new().with(extra::PACKAGE_NAME, "a.b");
        let d = FileDownload::new(1, GroupId::for_package("a.b"), "/x", extras);
        assert_eq!(DownloadBundle::from_download(d.group_id, &d).display_name, "a.b");
    }

    #[test]
    fn test_get_or_create_once_per_group() {
        let mut map = BundleMap::new();
        let d = download("a.b");

        let (_, created) = map.get_or_create(d.group_id, &d);
        assert!(created);

        let mut other = d.clone();
        other.extras.insert(extra::DISPLAY_NAME, "Changed");
        let (bundle, created) = map.get_or_create(d.group_id, &other);
        assert!(!created);
        assert_eq!(bundle.display_name, "Example");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_evict_expired_only_terminal() {
        let mut map = BundleMap::new();
        let done = download("done.app");
        let running = download("running.app");
        let now = Utc::now();

        map.get_or_create(done.group_id, &done).0.terminal_at = Some(now - Duration::seconds(700));
        map.get_or_create(running.group_id, &running);

        let evicted = map.evict_expired(now, Duration::seconds(600));
        assert_eq!(evicted, vec![done.group_id]);
        assert!(map.get(running.group_id).is_some());
    }

    #[test]
    fn test_unbounded_retention_evicts_nothing() {
        let mut map = BundleMap::new();
        let done = download("done.app");
        let now = Utc::now();
        map.get_or_create(done.group_id, &done).0.terminal_at = Some(now - Duration::days(30));

        assert!(map.evict_expired(now, Duration::MAX).is_empty());
        assert_eq!(map.len(), 1);
    }
}
