// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Reconciler service loop.
//!
//! One tokio task owns the [`Reconciler`]. Engine events and user messages
//! arrive over channels and are applied in arrival order, so the bundle map
//! has a single writer. The latest payload per group is published to a
//! shared snapshot that readers can inspect without talking to the task.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use indexmap::IndexMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{DownloadCommand, EngineHandle};
use super::group::GroupId;
use super::reconciler::Reconciler;
use super::types::EngineEvent;
use crate::locks::{resilient_read, resilient_write};
use crate::notify::Notification;

/// Messages accepted by the service loop.
#[derive(Debug)]
pub enum ReconcilerMessage {
    /// User action, forwarded to the engine
    Command(DownloadCommand),
    /// The user swiped a notification away
    Dismissed(GroupId),
    /// Reply once every event received so far has been applied
    Flush(oneshot::Sender<()>),
    Shutdown,
}

type Snapshots = Arc<RwLock<IndexMap<GroupId, Notification>>>;

/// Client side of a running service loop.
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<ReconcilerMessage>,
    snapshots: Snapshots,
    task: JoinHandle<Reconciler>,
}

/// Start the loop on the current runtime.
pub fn spawn(
    reconciler: Reconciler,
    engine: EngineHandle,
    events: mpsc::UnboundedReceiver<EngineEvent>,
    sweep_every: Duration,
) -> ReconcilerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let snapshots: Snapshots = Arc::new(RwLock::new(IndexMap::new()));
    let task = tokio::spawn(service_loop(
        reconciler,
        engine,
        events,
        rx,
        Arc::clone(&snapshots),
        sweep_every,
    ));
    ReconcilerHandle { tx, snapshots, task }
}

fn publish(reconciler: &Reconciler, snapshots: &Snapshots, group_id: GroupId) {
    let mut snapshots = resilient_write(snapshots);
    match reconciler.notification(group_id) {
        Some(n) => {
            snapshots.insert(group_id, n.clone());
        }
        None => {
            snapshots.shift_remove(&group_id);
        }
    }
}

fn apply_event(reconciler: &mut Reconciler, snapshots: &Snapshots, event: &EngineEvent) {
    reconciler.handle_event(event);
    publish(reconciler, snapshots, event.group_id);
}

async fn service_loop(
    mut reconciler: Reconciler,
    engine: EngineHandle,
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    mut messages: mpsc::UnboundedReceiver<ReconcilerMessage>,
    snapshots: Snapshots,
    sweep_every: Duration,
) -> Reconciler {
    let mut sweep = tokio::time::interval(sweep_every.max(Duration::from_millis(1)));
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            event = events.recv(), if events_open => match event {
                Some(event) => apply_event(&mut reconciler, &snapshots, &event),
                None => {
                    tracing::debug!("engine event stream closed");
                    events_open = false;
                }
            },

            message = messages.recv() => match message {
                Some(ReconcilerMessage::Command(command)) => {
                    if !engine.apply(command) {
                        tracing::debug!(?command, "command had no effect");
                    }
                }
                Some(ReconcilerMessage::Dismissed(group_id)) => {
                    if reconciler.dismiss(group_id) {
                        publish(&reconciler, &snapshots, group_id);
                    }
                }
                Some(ReconcilerMessage::Flush(reply)) => {
                    while let Ok(event) = events.try_recv() {
                        apply_event(&mut reconciler, &snapshots, &event);
                    }
                    let _ = reply.send(());
                }
                Some(ReconcilerMessage::Shutdown) | None => break,
            },

            _ = sweep.tick() => {
                for group_id in reconciler.sweep(Utc::now()) {
                    resilient_write(&snapshots).shift_remove(&group_id);
                }
            }
        }
    }

    tracing::debug!(bundles = reconciler.bundles().len(), "reconciler stopped");
    reconciler
}

impl ReconcilerHandle {
    fn send(&self, message: ReconcilerMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow!("Reconciler service is not running"))
    }

    pub fn command(&self, command: DownloadCommand) -> Result<()> {
        self.send(ReconcilerMessage::Command(command))
    }

    pub fn pause(&self, group_id: GroupId) -> Result<()> {
        self.command(DownloadCommand::Pause { group_id })
    }

    pub fn resume(&self, group_id: GroupId) -> Result<()> {
        self.command(DownloadCommand::Resume { group_id })
    }

    pub fn cancel(&self, group_id: GroupId) -> Result<()> {
        self.command(DownloadCommand::Cancel { group_id })
    }

    pub fn dismiss(&self, group_id: GroupId) -> Result<()> {
        self.send(ReconcilerMessage::Dismissed(group_id))
    }

    /// Wait until everything sent before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (reply, done) = oneshot::channel();
        self.send(ReconcilerMessage::Flush(reply))?;
        done.await
            .map_err(|_| anyhow!("Reconciler service stopped before flushing"))
    }

    /// Latest payload shown for the group.
    pub fn notification(&self, group_id: GroupId) -> Option<Notification> {
        resilient_read(&self.snapshots).get(&group_id).cloned()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        resilient_read(&self.snapshots).values().cloned().collect()
    }

    /// Stop the loop and take back the reconciler.
    pub async fn shutdown(self) -> Result<Reconciler> {
        // The loop may already be gone; joining reports that
        let _ = self.tx.send(ReconcilerMessage::Shutdown);
        self.task
            .await
            .map_err(|e| anyhow!("Reconciler task failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::engine::{DownloadEngine, EngineConfig, MemoryEngine};
    use crate::download::reconciler::ReconcilerSettings;
    use crate::download::request::FileRequest;
    use crate::download::types::{extra, Extras, FileStatus};
    use crate::notify::MemoryRenderer;

    fn request(package: &str) -> FileRequest {
        FileRequest {
            url: format!("https://repo.example.org/{}.apk", package),
            file: format!("/dl/{}.apk", package).into(),
            group_id: GroupId::for_package(package),
            tag: package.to_string(),
            hash: String::new(),
            extras: Extras::new().with(extra::PACKAGE_NAME, package),
        }
    }

    #[tokio::test]
    async fn test_commands_reach_engine() {
        let (engine, events) = MemoryEngine::new(EngineConfig::default());
        let renderer = Arc::new(MemoryRenderer::new());
        let reconciler = Reconciler::new(ReconcilerSettings::default(), renderer.clone());
        let handle = spawn(reconciler, engine.clone(), events, Duration::from_secs(60));

        let group = GroupId::for_package("a.b");
        engine.enqueue(vec![request("a.b")]).unwrap();
        handle.flush().await.unwrap();
        assert_eq!(
            handle.notification(group).map(|n| n.status),
            Some(FileStatus::Downloading)
        );

        handle.cancel(group).unwrap();
        handle.flush().await.unwrap();
        assert_eq!(
            handle.notification(group).map(|n| n.status),
            Some(FileStatus::Cancelled)
        );

        handle.dismiss(group).unwrap();
        handle.flush().await.unwrap();
        assert!(handle.notification(group).is_none());

        let reconciler = handle.shutdown().await.unwrap();
        assert!(reconciler.bundles().is_empty());
    }

    #[tokio::test]
    async fn test_handle_errors_after_shutdown() {
        let (engine, events) = MemoryEngine::new(EngineConfig::default());
        let reconciler =
            Reconciler::new(ReconcilerSettings::default(), Arc::new(MemoryRenderer::new()));
        let handle = spawn(reconciler, engine, events, Duration::from_secs(60));
        let tx = handle.tx.clone();
        handle.shutdown().await.unwrap();
        assert!(tx.send(ReconcilerMessage::Shutdown).is_err());
    }
}
