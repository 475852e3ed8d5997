// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download engine boundary.
//!
//! The engine executes file requests on its own workers and reports every
//! lifecycle transition as an [`EngineEvent`]. Exactly one engine is built at
//! startup from an [`EngineConfig`] and handed to whoever needs it as an
//! [`EngineHandle`].
//!
//! [`MemoryEngine`] keeps all transfer state in memory and is driven by
//! explicit progress/finish/fail calls. It implements the scheduling, group
//! aggregation and retry rules of the engine and backs the replay command
//! and the tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::group::GroupId;
use super::request::FileRequest;
use super::types::{DownloadError, EngineEvent, FileDownload, FileStatus};
use crate::config::Config;
use crate::locks::resilient_lock;

/// User action routed to the engine by group id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DownloadCommand {
    Pause { group_id: GroupId },
    Resume { group_id: GroupId },
    Cancel { group_id: GroupId },
}

impl DownloadCommand {
    pub fn group_id(&self) -> GroupId {
        match self {
            DownloadCommand::Pause { group_id }
            | DownloadCommand::Resume { group_id }
            | DownloadCommand::Cancel { group_id } => *group_id,
        }
    }
}

/// Engine settings, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub concurrency_limit: usize,
    pub auto_retry_max_attempts: u32,
    pub retry_on_network_gain: bool,
    pub progress_interval: Duration,
    pub hash_check: bool,
    pub namespace: String,
    pub proxy: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency_limit: config.active_downloads.max(1),
            auto_retry_max_attempts: config.auto_retry_max_attempts.max(1),
            retry_on_network_gain: config.retry_on_network_gain,
            progress_interval: Duration::from_millis(config.progress_interval_ms),
            hash_check: config.hash_check,
            namespace: "droidget".to_string(),
            proxy: config.proxy.clone(),
        }
    }
}

/// The download engine as seen by the rest of the client.
///
/// Group operations are idempotent: they return false and emit nothing when
/// no file of the group is in a state the operation applies to.
pub trait DownloadEngine: Send + Sync {
    /// Accept requests; returns the assigned file ids.
    fn enqueue(&self, requests: Vec<FileRequest>) -> Result<Vec<i32>>;

    fn pause_group(&self, group_id: GroupId) -> bool;

    fn resume_group(&self, group_id: GroupId) -> bool;

    fn cancel_group(&self, group_id: GroupId) -> bool;

    /// Forget every file of the group without emitting events.
    fn delete_group(&self, group_id: GroupId) -> bool;

    fn group_downloads(&self, group_id: GroupId) -> Vec<FileDownload>;

    fn apply(&self, command: DownloadCommand) -> bool {
        match command {
            DownloadCommand::Pause { group_id } => self.pause_group(group_id),
            DownloadCommand::Resume { group_id } => self.resume_group(group_id),
            DownloadCommand::Cancel { group_id } => self.cancel_group(group_id),
        }
    }
}

/// Shared handle to the single engine instance.
pub type EngineHandle = Arc<dyn DownloadEngine>;

/// Aggregate progress of a group in percent, -1 if indeterminate.
///
/// Only reaches 100 when every file is completed.
pub fn group_progress(files: &[FileDownload]) -> i32 {
    if files.is_empty() {
        return -1;
    }
    if files.iter().all(|f| f.status == FileStatus::Completed) {
        return 100;
    }
    let mut done: i64 = 0;
    let mut total: i64 = 0;
    for file in files {
        if file.bytes_total <= 0 {
            return -1;
        }
        total = total.saturating_add(file.bytes_total);
        done = done.saturating_add(if file.status == FileStatus::Completed {
            file.bytes_total
        } else {
            file.bytes_downloaded.clamp(0, file.bytes_total)
        });
    }
    ((done.saturating_mul(100) / total) as i32).min(99)
}

#[derive(Debug)]
struct Entry {
    download: FileDownload,
    expected_hash: String,
    attempts: u32,
    waiting_network: bool,
    last_progress: Option<Instant>,
}

#[derive(Debug, Default)]
struct EngineState {
    entries: IndexMap<i32, Entry>,
    next_id: i32,
}

impl EngineState {
    fn group(&self, group_id: GroupId) -> Vec<FileDownload> {
        self.entries
            .values()
            .filter(|e| e.download.group_id == group_id)
            .map(|e| e.download.clone())
            .collect()
    }

    fn entry_mut(&mut self, file_id: i32) -> Result<&mut Entry> {
        match self.entries.get_mut(&file_id) {
            Some(entry) => Ok(entry),
            None => bail!("Unknown download id {}", file_id),
        }
    }
}

/// In-memory engine.
pub struct MemoryEngine {
    config: EngineConfig,
    state: Mutex<EngineState>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl MemoryEngine {
    /// Build the engine and the receiving end of its event stream.
    pub fn new(config: EngineConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Self {
            config,
            state: Mutex::new(EngineState { entries: IndexMap::new(), next_id: 1 }),
            events,
        });
        (engine, events_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn emit(&self, state: &EngineState, file_id: i32) {
        let Some(entry) = state.entries.get(&file_id) else {
            return;
        };
        let group_id = entry.download.group_id;
        let event = EngineEvent {
            group_id,
            file: entry.download.clone(),
            group_progress: group_progress(&state.group(group_id)),
        };
        if self.events.send(event).is_err() {
            tracing::debug!(file_id, "event receiver dropped");
        }
    }

    fn set_status(&self, state: &mut EngineState, file_id: i32, status: FileStatus) {
        if let Some(entry) = state.entries.get_mut(&file_id) {
            entry.download.status = status;
            if status != FileStatus::Downloading {
                entry.download.bytes_per_second = 0;
                entry.download.eta_millis = -1;
            }
        }
        self.emit(state, file_id);
    }

    /// Promote queued files while worker slots are free.
    fn schedule(&self, state: &mut EngineState) {
        let running = state
            .entries
            .values()
            .filter(|e| e.download.status == FileStatus::Downloading)
            .count();
        let free = self.config.concurrency_limit.saturating_sub(running);
        let next: Vec<i32> = state
            .entries
            .values()
            .filter(|e| e.download.status == FileStatus::Queued && !e.waiting_network)
            .take(free)
            .map(|e| e.download.file_id)
            .collect();
        for file_id in next {
            self.set_status(state, file_id, FileStatus::Downloading);
        }
    }

    fn group_transition(
        &self,
        group_id: GroupId,
        applies: impl Fn(FileStatus) -> bool,
        to: FileStatus,
    ) -> bool {
        let mut state = resilient_lock(&self.state);
        let ids: Vec<i32> = state
            .entries
            .values()
            .filter(|e| e.download.group_id == group_id && applies(e.download.status))
            .map(|e| e.download.file_id)
            .collect();
        for file_id in &ids {
            if let Some(entry) = state.entries.get_mut(file_id) {
                entry.waiting_network = false;
            }
            self.set_status(&mut state, *file_id, to);
        }
        if !ids.is_empty() {
            self.schedule(&mut state);
        }
        !ids.is_empty()
    }

    /// Record bytes received by a running transfer.
    pub fn report_progress(
        &self,
        file_id: i32,
        bytes_downloaded: i64,
        bytes_total: i64,
        bytes_per_second: i64,
    ) -> Result<()> {
        let mut state = resilient_lock(&self.state);
        let interval = self.config.progress_interval;
        let entry = state.entry_mut(file_id)?;
        if entry.download.status != FileStatus::Downloading {
            bail!("Download {} is {}, not downloading", file_id, entry.download.status.label());
        }

        let d = &mut entry.download;
        d.bytes_downloaded = bytes_downloaded.max(0);
        d.bytes_total = if bytes_total > 0 { bytes_total } else { -1 };
        d.bytes_per_second = bytes_per_second.max(0);
        d.eta_millis = if d.bytes_per_second > 0 && d.bytes_total > 0 {
            (d.bytes_total - d.bytes_downloaded).max(0) * 1000 / d.bytes_per_second
        } else {
            -1
        };

        let now = Instant::now();
        let due = entry.last_progress.map_or(true, |last| now.duration_since(last) >= interval);
        if due {
            entry.last_progress = Some(now);
            self.emit(&state, file_id);
        }
        Ok(())
    }

    /// Finish a running transfer, verifying its hash when enabled.
    pub fn finish(&self, file_id: i32, actual_hash: Option<&str>) -> Result<()> {
        {
            let mut state = resilient_lock(&self.state);
            let hash_check = self.config.hash_check;
            let entry = state.entry_mut(file_id)?;
            if entry.download.status != FileStatus::Downloading {
                bail!("Download {} is {}, not downloading", file_id, entry.download.status.label());
            }
            let mismatch = hash_check
                && !entry.expected_hash.is_empty()
                && actual_hash.is_some_and(|h| !h.eq_ignore_ascii_case(&entry.expected_hash));
            if !mismatch {
                if entry.download.bytes_total > 0 {
                    entry.download.bytes_downloaded = entry.download.bytes_total;
                }
                self.set_status(&mut state, file_id, FileStatus::Completed);
                self.schedule(&mut state);
                return Ok(());
            }
        }
        self.fail(file_id, DownloadError::HashMismatch)
    }

    /// Report a transfer error. Transient errors are retried until the
    /// attempt ceiling; network losses wait for connectivity when enabled.
    pub fn fail(&self, file_id: i32, error: DownloadError) -> Result<()> {
        let mut state = resilient_lock(&self.state);
        let max_attempts = self.config.auto_retry_max_attempts;
        let wait_for_network = self.config.retry_on_network_gain;

        let entry = state.entry_mut(file_id)?;
        if !matches!(entry.download.status, FileStatus::Downloading | FileStatus::Queued) {
            bail!("Download {} is {}, cannot fail", file_id, entry.download.status.label());
        }
        entry.attempts += 1;

        let status = if error.is_transient() && entry.attempts < max_attempts {
            entry.waiting_network = wait_for_network && error == DownloadError::Network;
            tracing::debug!(file_id, attempt = entry.attempts, %error, "retrying download");
            FileStatus::Queued
        } else {
            tracing::info!(file_id, attempts = entry.attempts, %error, "download failed");
            entry.download.error = Some(error);
            FileStatus::Failed
        };
        self.set_status(&mut state, file_id, status);
        self.schedule(&mut state);
        Ok(())
    }

    /// Connectivity came back; returns how many transfers were re-queued.
    pub fn network_restored(&self) -> usize {
        let mut state = resilient_lock(&self.state);
        let mut count = 0;
        for entry in state.entries.values_mut() {
            if entry.waiting_network {
                entry.waiting_network = false;
                count += 1;
            }
        }
        self.schedule(&mut state);
        count
    }

    /// File ids of a group in enqueue order.
    pub fn file_ids(&self, group_id: GroupId) -> Vec<i32> {
        resilient_lock(&self.state)
            .entries
            .values()
            .filter(|e| e.download.group_id == group_id)
            .map(|e| e.download.file_id)
            .collect()
    }

    /// Every known transfer in enqueue order.
    pub fn downloads(&self) -> Vec<FileDownload> {
        resilient_lock(&self.state)
            .entries
            .values()
            .map(|e| e.download.clone())
            .collect()
    }
}

impl DownloadEngine for MemoryEngine {
    fn enqueue(&self, requests: Vec<FileRequest>) -> Result<Vec<i32>> {
        let mut state = resilient_lock(&self.state);

        for request in &requests {
            let busy = state
                .entries
                .values()
                .any(|e| e.download.file == request.file && !e.download.status.is_terminal());
            if busy {
                bail!("{:?} is already being downloaded", request.file);
            }
        }

        // A new download of a group replaces its finished attempt
        let groups: Vec<GroupId> = requests.iter().map(|r| r.group_id).collect();
        state.entries.retain(|_, e| {
            !(groups.contains(&e.download.group_id) && e.download.status.is_terminal())
        });

        let mut ids = Vec::with_capacity(requests.len());
        for request in requests {
            let file_id = state.next_id;
            state.next_id += 1;
            let mut download =
                FileDownload::new(file_id, request.group_id, request.file, request.extras);
            download.status = FileStatus::Queued;
            state.entries.insert(
                file_id,
                Entry {
                    download,
                    expected_hash: request.hash,
                    attempts: 0,
                    waiting_network: false,
                    last_progress: None,
                },
            );
            ids.push(file_id);
        }
        for file_id in &ids {
            self.emit(&state, *file_id);
        }
        self.schedule(&mut state);
        Ok(ids)
    }

    fn pause_group(&self, group_id: GroupId) -> bool {
        self.group_transition(
            group_id,
            |s| matches!(s, FileStatus::Added | FileStatus::Queued | FileStatus::Downloading),
            FileStatus::Paused,
        )
    }

    fn resume_group(&self, group_id: GroupId) -> bool {
        self.group_transition(group_id, |s| s == FileStatus::Paused, FileStatus::Queued)
    }

    fn cancel_group(&self, group_id: GroupId) -> bool {
        self.group_transition(group_id, |s| !s.is_terminal(), FileStatus::Cancelled)
    }

    fn delete_group(&self, group_id: GroupId) -> bool {
        let mut state = resilient_lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|_, e| e.download.group_id != group_id);
        let removed = state.entries.len() != before;
        if removed {
            self.schedule(&mut state);
        }
        removed
    }

    fn group_downloads(&self, group_id: GroupId) -> Vec<FileDownload> {
        resilient_lock(&self.state).group(group_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::types::{extra, Extras};

    fn config() -> EngineConfig {
        EngineConfig {
            concurrency_limit: 1,
            progress_interval: Duration::ZERO,
            ..EngineConfig::default()
        }
    }

    fn request(package: &str, name: &str) -> FileRequest {
        FileRequest {
            url: format!("https://repo.example.org/{}", name),
            file: format!("/dl/{}/{}", package, name).into(),
            group_id: GroupId::for_package(package),
            tag: package.to_string(),
            hash: String::new(),
            extras: Extras::new().with(extra::PACKAGE_NAME, package),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses(events: &[EngineEvent]) -> Vec<(i32, FileStatus)> {
        events.iter().map(|e| (e.file.file_id, e.file.status)).collect()
    }

    #[test]
    fn test_group_progress_rules() {
        let mut a = FileDownload::new(1, GroupId::new(1), "/a", Extras::new());
        let mut b = FileDownload::new(2, GroupId::new(1), "/b", Extras::new());
        a.bytes_total = 100;
        b.bytes_total = 300;
        a.status = FileStatus::Completed;
        b.bytes_downloaded = 100;
        assert_eq!(group_progress(&[a.clone(), b.clone()]), 50);

        b.bytes_downloaded = 300;
        assert_eq!(group_progress(&[a.clone(), b.clone()]), 99);

        b.status = FileStatus::Completed;
        assert_eq!(group_progress(&[a.clone(), b.clone()]), 100);

        b.status = FileStatus::Downloading;
        b.bytes_total = -1;
        assert_eq!(group_progress(&[a, b]), -1);
        assert_eq!(group_progress(&[]), -1);
    }

    #[test]
    fn test_concurrency_limit() {
        let (engine, mut rx) = MemoryEngine::new(config());
        let ids = engine
            .enqueue(vec![request("a.b", "a.apk"), request("a.b", "main.obb")])
            .unwrap();

        assert_eq!(
            statuses(&drain(&mut rx)),
            vec![
                (ids[0], FileStatus::Queued),
                (ids[1], FileStatus::Queued),
                (ids[0], FileStatus::Downloading),
            ]
        );

        engine.finish(ids[0], None).unwrap();
        let events = drain(&mut rx);
        assert_eq!(
            statuses(&events),
            vec![(ids[0], FileStatus::Completed), (ids[1], FileStatus::Downloading)]
        );
        // First part done, second unknown size: aggregate stays below 100
        assert!(events[0].group_progress < 100);
    }

    #[test]
    fn test_completion_reaches_100_only_when_all_done() {
        let (engine, mut rx) = MemoryEngine::new(EngineConfig { concurrency_limit: 2, ..config() });
        let ids = engine
            .enqueue(vec![request("a.b", "a.apk"), request("a.b", "main.obb")])
            .unwrap();
        engine.report_progress(ids[0], 50, 100, 10).unwrap();
        engine.report_progress(ids[1], 0, 100, 10).unwrap();
        engine.finish(ids[0], None).unwrap();
        engine.finish(ids[1], None).unwrap();

        let completed: Vec<i32> = drain(&mut rx)
            .into_iter()
            .filter(|e| e.file.status == FileStatus::Completed)
            .map(|e| e.group_progress)
            .collect();
        assert_eq!(completed, vec![50, 100]);
    }

    #[test]
    fn test_retry_ceiling() {
        let (engine, mut rx) = MemoryEngine::new(EngineConfig {
            auto_retry_max_attempts: 3,
            retry_on_network_gain: false,
            ..config()
        });
        let id = engine.enqueue(vec![request("a.b", "a.apk")]).unwrap()[0];
        drain(&mut rx);

        engine.fail(id, DownloadError::Network).unwrap();
        engine.fail(id, DownloadError::Network).unwrap();
        assert_eq!(engine.downloads()[0].status, FileStatus::Downloading);

        engine.fail(id, DownloadError::Network).unwrap();
        let d = &engine.downloads()[0];
        assert_eq!(d.status, FileStatus::Failed);
        assert_eq!(d.error, Some(DownloadError::Network));
    }

    #[test]
    fn test_permanent_error_fails_immediately() {
        let (engine, _rx) = MemoryEngine::new(config());
        let id = engine.enqueue(vec![request("a.b", "a.apk")]).unwrap()[0];
        engine.fail(id, DownloadError::DiskFull).unwrap();
        assert_eq!(engine.downloads()[0].status, FileStatus::Failed);
    }

    #[test]
    fn test_network_loss_waits_for_connectivity() {
        let (engine, _rx) = MemoryEngine::new(config());
        let id = engine.enqueue(vec![request("a.b", "a.apk")]).unwrap()[0];

        engine.fail(id, DownloadError::Network).unwrap();
        assert_eq!(engine.downloads()[0].status, FileStatus::Queued);

        assert_eq!(engine.network_restored(), 1);
        assert_eq!(engine.downloads()[0].status, FileStatus::Downloading);
    }

    #[test]
    fn test_hash_mismatch_fails() {
        let (engine, _rx) = MemoryEngine::new(config());
        let mut r = request("a.b", "a.apk");
        r.hash = "ABCD".to_string();
        let id = engine.enqueue(vec![r]).unwrap()[0];

        engine.finish(id, Some("ffff")).unwrap();
        let d = &engine.downloads()[0];
        assert_eq!(d.status, FileStatus::Failed);
        assert_eq!(d.error, Some(DownloadError::HashMismatch));
    }

    #[test]
    fn test_hash_match_is_case_insensitive() {
        let (engine, _rx) = MemoryEngine::new(config());
        let mut r = request("a.b", "a.apk");
        r.hash = "ABCD".to_string();
        let id = engine.enqueue(vec![r]).unwrap()[0];

        engine.finish(id, Some("abcd")).unwrap();
        assert_eq!(engine.downloads()[0].status, FileStatus::Completed);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (engine, mut rx) = MemoryEngine::new(config());
        let group = GroupId::for_package("a.b");
        engine.enqueue(vec![request("a.b", "a.apk")]).unwrap();
        drain(&mut rx);

        assert!(engine.cancel_group(group));
        assert_eq!(drain(&mut rx).len(), 1);

        assert!(!engine.cancel_group(group));
        assert!(drain(&mut rx).is_empty());

        assert!(!engine.apply(DownloadCommand::Cancel { group_id: GroupId::new(42) }));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_pause_frees_slot_and_resume_requeues() {
        let (engine, mut rx) = MemoryEngine::new(config());
        let a = engine.enqueue(vec![request("a.b", "a.apk")]).unwrap()[0];
        let c = engine.enqueue(vec![request("c.d", "c.apk")]).unwrap()[0];
        drain(&mut rx);

        assert!(engine.pause_group(GroupId::for_package("a.b")));
        assert_eq!(
            statuses(&drain(&mut rx)),
            vec![(a, FileStatus::Paused), (c, FileStatus::Downloading)]
        );

        assert!(engine.resume_group(GroupId::for_package("a.b")));
        assert_eq!(statuses(&drain(&mut rx)), vec![(a, FileStatus::Queued)]);
    }

    #[test]
    fn test_duplicate_enqueue_rejected() {
        let (engine, _rx) = MemoryEngine::new(config());
        engine.enqueue(vec![request("a.b", "a.apk")]).unwrap();
        assert!(engine.enqueue(vec![request("a.b", "a.apk")]).is_err());
    }

    #[test]
    fn test_reenqueue_replaces_finished_attempt() {
        let (engine, _rx) = MemoryEngine::new(config());
        let group = GroupId::for_package("a.b");
        engine.enqueue(vec![request("a.b", "a.apk")]).unwrap();
        engine.cancel_group(group);

        engine.enqueue(vec![request("a.b", "a.apk")]).unwrap();
        assert_eq!(engine.file_ids(group).len(), 1);
        assert!(engine.delete_group(group));
        assert!(engine.group_downloads(group).is_empty());
    }
}
