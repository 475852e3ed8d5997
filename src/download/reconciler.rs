// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Collapses per-file engine events into one notification per app download.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::bundle::{BundleMap, DownloadBundle};
use super::group::{GroupId, GroupRegistry};
use super::types::{extra, EngineEvent, FileStatus};
use crate::config::Config;
use crate::notify::{
    present, spawn_icon_patch, IconFetcher, Notification, NotificationKey, NotificationRenderer,
    PresentOptions,
};

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    /// Index refresh traffic, never shown
    pub sync_group_id: GroupId,
    pub present: PresentOptions,
    /// How long a terminal bundle survives without being dismissed
    pub retention: Duration,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ReconcilerSettings {
    pub fn from_config(config: &Config) -> Self {
        // Unvalidated configs can carry any u64; saturate instead of panicking
        let secs = i64::try_from(config.bundle_retention_secs).unwrap_or(i64::MAX);
        Self {
            sync_group_id: GroupId::new(config.sync_group_id),
            present: PresentOptions {
                privileged_install: config.privileged_install,
            },
            retention: Duration::try_seconds(secs).unwrap_or(Duration::MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    SyncTraffic,
    /// One file of a multi-file group finished before the rest
    PartialCompletion,
}

/// What the reconciler did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    /// Same payload as already on screen
    Unchanged,
    Posted(Notification),
}

pub struct Reconciler {
    settings: ReconcilerSettings,
    bundles: BundleMap,
    registry: GroupRegistry,
    renderer: Arc<dyn NotificationRenderer>,
    icons: Option<Arc<dyn IconFetcher>>,
}

impl Reconciler {
    pub fn new(settings: ReconcilerSettings, renderer: Arc<dyn NotificationRenderer>) -> Self {
        Self {
            settings,
            bundles: BundleMap::new(),
            registry: GroupRegistry::new(),
            renderer,
            icons: None,
        }
    }

    /// Fetch large icons for new bundles with this fetcher.
    pub fn with_icon_fetcher(mut self, fetcher: Arc<dyn IconFetcher>) -> Self {
        self.icons = Some(fetcher);
        self
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    pub fn handle_event(&mut self, event: &EngineEvent) -> Outcome {
        self.handle_event_at(event, Utc::now())
    }

    pub fn handle_event_at(&mut self, event: &EngineEvent, now: DateTime<Utc>) -> Outcome {
        let group_id = event.group_id;
        let status = event.file.status;

        if group_id == self.settings.sync_group_id {
            tracing::debug!(file_id = event.file.file_id, "ignoring index sync event");
            return Outcome::Ignored(IgnoreReason::SyncTraffic);
        }
        if status == FileStatus::Completed && event.group_progress < 100 {
            tracing::debug!(
                %group_id,
                file_id = event.file.file_id,
                progress = event.group_progress,
                "part finished, group still running"
            );
            return Outcome::Ignored(IgnoreReason::PartialCompletion);
        }

        let package_name = event.file.extras.get_or(extra::PACKAGE_NAME, "");
        // A colliding package is merged into the bundle already holding the id
        self.registry.bind(group_id, package_name);

        let (bundle, created) = self.bundles.get_or_create(group_id, &event.file);
        if !created && bundle.is_terminal() && !status.is_terminal() {
            // A finished download of this group was started again
            *bundle = DownloadBundle::from_download(group_id, &event.file);
        }

        let Some(notification) = present(bundle, event, self.settings.present) else {
            return Outcome::Ignored(IgnoreReason::PartialCompletion);
        };

        let already_completed = status == FileStatus::Completed
            && bundle.last_status() == Some(FileStatus::Completed);
        if already_completed || bundle.last_posted.as_ref() == Some(&notification) {
            return Outcome::Unchanged;
        }

        self.renderer.post(&notification);
        if notification.is_terminal() {
            tracing::info!(
                %group_id,
                package = %bundle.package_name,
                status = status.label(),
                "download finished"
            );
        }

        if !bundle.icon_requested && !bundle.icon_url.is_empty() {
            if let Some(fetcher) = &self.icons {
                spawn_icon_patch(
                    Arc::clone(fetcher),
                    Arc::clone(&self.renderer),
                    notification.key.clone(),
                    bundle.icon_url.clone(),
                );
            }
            bundle.icon_requested = true;
        }

        bundle.record_post(notification.clone(), now);
        Outcome::Posted(notification)
    }

    /// The user dismissed the group's notification. Only terminal
    /// notifications can be dismissed; returns whether the bundle was evicted.
    pub fn dismiss(&mut self, group_id: GroupId) -> bool {
        let terminal = self.bundles.get(group_id).is_some_and(DownloadBundle::is_terminal);
        if !terminal {
            return false;
        }
        if let Some(bundle) = self.bundles.remove(group_id) {
            self.registry.release(group_id);
            self.renderer.cancel(&NotificationKey::for_package(&bundle.package_name));
        }
        true
    }

    /// Forget terminal bundles older than the retention window.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<GroupId> {
        let evicted = self.bundles.evict_expired(now, self.settings.retention);
        for group_id in &evicted {
            self.registry.release(*group_id);
        }
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted expired bundles");
        }
        evicted
    }

    pub fn notification(&self, group_id: GroupId) -> Option<&Notification> {
        self.bundles.get(group_id).and_then(|b| b.last_posted.as_ref())
    }

    /// Last posted payload of every live bundle.
    pub fn notifications(&self) -> Vec<Notification> {
        self.bundles.iter().filter_map(|b| b.last_posted.clone()).collect()
    }

    pub fn bundles(&self) -> &BundleMap {
        &self.bundles
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::types::{Extras, FileDownload};
    use crate::download::SYNC_GROUP_ID;
    use crate::notify::{MemoryRenderer, ProgressBar};

    fn reconciler() -> (Reconciler, Arc<MemoryRenderer>) {
        let renderer = Arc::new(MemoryRenderer::new());
        let r = Reconciler::new(ReconcilerSettings::default(), renderer.clone());
        (r, renderer)
    }

    fn event(package: &str, file_id: i32, status: FileStatus, progress: i32) -> EngineEvent {
        let group_id = GroupId::for_package(package);
        let extras = Extras::new()
            .with(extra::PACKAGE_NAME, package)
            .with(extra::DISPLAY_NAME, package.to_uppercase());
        let mut file = FileDownload::new(file_id, group_id, format!("/dl/{}", file_id), extras);
        file.status = status;
        EngineEvent { group_id, file, group_progress: progress }
    }

    #[test]
    fn test_sync_group_ignored() {
        let (mut r, renderer) = reconciler();
        let mut ev = event("index", 1, FileStatus::Downloading, 10);
        ev.group_id = SYNC_GROUP_ID;
        assert_eq!(r.handle_event(&ev), Outcome::Ignored(IgnoreReason::SyncTraffic));
        assert_eq!(renderer.post_count(), 0);
        assert!(r.bundles().is_empty());
    }

    #[test]
    fn test_partial_completion_ignored() {
        let (mut r, renderer) = reconciler();
        r.handle_event(&event("a.b", 1, FileStatus::Downloading, 40));
        let outcome = r.handle_event(&event("a.b", 1, FileStatus::Completed, 60));
        assert_eq!(outcome, Outcome::Ignored(IgnoreReason::PartialCompletion));
        assert_eq!(renderer.post_count(), 1);
    }

    #[test]
    fn test_redelivery_is_unchanged() {
        let (mut r, renderer) = reconciler();
        let ev = event("a.b", 1, FileStatus::Downloading, 40);
        assert!(matches!(r.handle_event(&ev), Outcome::Posted(_)));
        assert_eq!(r.handle_event(&ev), Outcome::Unchanged);
        assert_eq!(renderer.post_count(), 1);
    }

    #[test]
    fn test_completed_posted_once() {
        let (mut r, renderer) = reconciler();
        assert!(matches!(
            r.handle_event(&event("a.b", 1, FileStatus::Completed, 100)),
            Outcome::Posted(_)
        ));
        // A different file of the same group re-reporting completion
        assert_eq!(
            r.handle_event(&event("a.b", 2, FileStatus::Completed, 100)),
            Outcome::Unchanged
        );
        assert_eq!(renderer.post_count(), 1);
    }

    #[test]
    fn test_metadata_from_first_file() {
        let (mut r, _) = reconciler();
        r.handle_event(&event("a.b", 1, FileStatus::Queued, -1));
        let mut later = event("a.b", 2, FileStatus::Downloading, 20);
        later.file.extras.insert(extra::DISPLAY_NAME, "Other");
        let Outcome::Posted(n) = r.handle_event(&later) else {
            panic!("expected a post");
        };
        assert_eq!(n.title, "A.B");
        assert_eq!(n.progress, ProgressBar::Determinate(20));
    }

    #[test]
    fn test_dismiss_only_terminal() {
        let (mut r, renderer) = reconciler();
        let group = GroupId::for_package("a.b");
        r.handle_event(&event("a.b", 1, FileStatus::Downloading, 40));
        assert!(!r.dismiss(group));

        r.handle_event(&event("a.b", 1, FileStatus::Failed, 40));
        assert!(r.dismiss(group));
        assert!(r.bundles().is_empty());
        assert!(r.registry().is_empty());
        assert!(renderer.current().is_empty());
        assert!(!r.dismiss(group));
    }

    #[test]
    fn test_sweep_evicts_after_retention() {
        let (mut r, _) = reconciler();
        let now = Utc::now();
        r.handle_event_at(&event("a.b", 1, FileStatus::Cancelled, 0), now);
        r.handle_event_at(&event("c.d", 2, FileStatus::Downloading, 5), now);

        assert!(r.sweep(now + Duration::seconds(599)).is_empty());
        let evicted = r.sweep(now + Duration::seconds(600));
        assert_eq!(evicted, vec![GroupId::for_package("a.b")]);
        assert_eq!(r.bundles().len(), 1);
    }

    #[test]
    fn test_huge_retention_never_evicts() {
        for secs in [u64::MAX, 9_000_000_000_000] {
            let config = Config { bundle_retention_secs: secs, ..Config::default() };
            let renderer = Arc::new(MemoryRenderer::new());
            let mut r = Reconciler::new(ReconcilerSettings::from_config(&config), renderer);
            let now = Utc::now();
            r.handle_event_at(&event("a.b", 1, FileStatus::Failed, 0), now);

            assert!(r.sweep(now + Duration::days(365)).is_empty());
            assert_eq!(r.bundles().len(), 1);
        }
    }

    #[test]
    fn test_restart_after_terminal_resets_bundle() {
        let (mut r, _) = reconciler();
        let group = GroupId::for_package("a.b");
        r.handle_event(&event("a.b", 1, FileStatus::Cancelled, 0));
        assert!(r.bundles().get(group).is_some_and(DownloadBundle::is_terminal));

        r.handle_event(&event("a.b", 3, FileStatus::Queued, -1));
        assert!(!r.bundles().get(group).is_some_and(DownloadBundle::is_terminal));
        assert_eq!(r.notification(group).map(|n| n.status), Some(FileStatus::Queued));
    }

    #[test]
    fn test_collision_merges_into_one_bundle() {
        let (mut r, renderer) = reconciler();
        assert_eq!(GroupId::for_package("Aa"), GroupId::for_package("BB"));

        r.handle_event(&event("Aa", 1, FileStatus::Downloading, 10));
        r.handle_event(&event("BB", 2, FileStatus::Downloading, 20));

        assert_eq!(r.bundles().len(), 1);
        assert_eq!(r.registry().package_for(GroupId::for_package("BB")), Some("Aa"));
        let current = renderer.current();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].title, "AA");
    }

    /// Blocks each fetch until the test opens the gate once.
    struct GatedFetcher {
        gate: std::sync::Mutex<std::sync::mpsc::Receiver<()>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl GatedFetcher {
        fn new() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
            let (open, gate) = std::sync::mpsc::channel();
            let fetcher = Arc::new(Self {
                gate: std::sync::Mutex::new(gate),
                calls: std::sync::atomic::AtomicUsize::new(0),
            });
            (fetcher, open)
        }

        fn calls(&self) -> usize {
            self.calls.load(std::sync::atomic::Ordering::SeqCst)
        }
    }

    impl IconFetcher for GatedFetcher {
        fn fetch(&self, _url: &str) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.gate.lock().unwrap().recv()?;
            Ok(vec![1, 2, 3])
        }
    }

    /// Memory renderer that reports every icon attach attempt.
    struct IconWatcher {
        inner: MemoryRenderer,
        attempts: tokio::sync::mpsc::UnboundedSender<NotificationKey>,
    }

    impl NotificationRenderer for IconWatcher {
        fn post(&self, notification: &Notification) {
            self.inner.post(notification);
        }

        fn set_large_icon(&self, key: &NotificationKey, icon: &[u8]) {
            self.inner.set_large_icon(key, icon);
            let _ = self.attempts.send(key.clone());
        }

        fn cancel(&self, key: &NotificationKey) {
            self.inner.cancel(key);
        }
    }

    fn icon_event(package: &str, status: FileStatus) -> EngineEvent {
        let mut ev = event(package, 1, status, 30);
        ev.file.extras.insert(extra::ICON_URL, "https://repo.example.org/icon.png");
        ev
    }

    fn icon_reconciler(
        fetcher: Arc<GatedFetcher>,
    ) -> (
        Reconciler,
        Arc<IconWatcher>,
        tokio::sync::mpsc::UnboundedReceiver<NotificationKey>,
    ) {
        let (attempts, attempted) = tokio::sync::mpsc::unbounded_channel();
        let renderer = Arc::new(IconWatcher { inner: MemoryRenderer::new(), attempts });
        let r = Reconciler::new(ReconcilerSettings::default(), renderer.clone())
            .with_icon_fetcher(fetcher);
        (r, renderer, attempted)
    }

    #[tokio::test]
    async fn test_icon_patched_once_onto_posted_key() {
        let (fetcher, open) = GatedFetcher::new();
        let (mut r, renderer, mut attempted) = icon_reconciler(fetcher.clone());
        let key = NotificationKey::for_package("a.b");

        assert!(matches!(
            r.handle_event(&icon_event("a.b", FileStatus::Downloading)),
            Outcome::Posted(_)
        ));
        // Posting does not wait for the icon
        assert!(renderer.inner.icon(&key).is_none());

        open.send(()).unwrap();
        let attached = tokio::time::timeout(std::time::Duration::from_secs(5), attempted.recv())
            .await
            .unwrap();
        assert_eq!(attached, Some(key.clone()));
        assert_eq!(renderer.inner.icon(&key), Some(vec![1, 2, 3]));

        assert!(matches!(
            r.handle_event(&icon_event("a.b", FileStatus::Paused)),
            Outcome::Posted(_)
        ));
        assert_eq!(renderer.inner.post_count(), 2);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(renderer.inner.icon(&key), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_icon_arriving_after_dismiss_is_dropped() {
        let (fetcher, open) = GatedFetcher::new();
        let (mut r, renderer, mut attempted) = icon_reconciler(fetcher.clone());
        let group = GroupId::for_package("c.d");
        let key = NotificationKey::for_package("c.d");

        r.handle_event(&icon_event("c.d", FileStatus::Failed));
        assert!(r.dismiss(group));

        open.send(()).unwrap();
        let attempt = tokio::time::timeout(std::time::Duration::from_secs(5), attempted.recv())
            .await
            .unwrap();
        assert_eq!(attempt, Some(key.clone()));
        assert!(renderer.inner.icon(&key).is_none());
        assert!(renderer.inner.current().is_empty());
        assert_eq!(fetcher.calls(), 1);
    }
}
