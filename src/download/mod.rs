// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Grouped app downloads and their notification state.
//!
//! An app download is a group of files (the APK plus optional OBB parts)
//! sharing one [`GroupId`]. The engine reports each file separately; the
//! reconciler folds those reports into one notification per app.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │ RequestBuilder  │────▶│ DownloadEngine  │
//! │ (App + Package) │     │ (EngineHandle)  │
//! └─────────────────┘     └────────┬────────┘
//!          ▲                       │ EngineEvent (mpsc)
//!          │ DownloadCommand       ▼
//! ┌────────┴────────┐     ┌─────────────────┐
//! │ ReconcilerHandle│────▶│ Reconciler task │
//! │                 │     │ (BundleMap)     │
//! └─────────────────┘     └────────┬────────┘
//!                                  ▼
//!                         ┌─────────────────┐
//!                         │ Notification    │
//!                         │ Renderer        │
//!                         └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use droidget::download::{service, EngineConfig, MemoryEngine, Reconciler, ReconcilerSettings};
//! use droidget::notify::ConsoleRenderer;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (engine, events) = MemoryEngine::new(EngineConfig::default());
//! let reconciler = Reconciler::new(ReconcilerSettings::default(), Arc::new(ConsoleRenderer));
//! let handle = service::spawn(reconciler, engine, events, Duration::from_secs(60));
//!
//! // Wait for everything queued so far to be rendered
//! handle.flush().await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod engine;
pub mod group;
pub mod reconciler;
pub mod request;
pub mod service;
pub mod types;

// Re-export commonly used items
pub use bundle::{BundleMap, DownloadBundle};
pub use engine::{
    group_progress, DownloadCommand, DownloadEngine, EngineConfig, EngineHandle, MemoryEngine,
};
pub use group::{string_hash, Binding, GroupId, GroupRegistry, SYNC_GROUP_ID};
pub use reconciler::{IgnoreReason, Outcome, Reconciler, ReconcilerSettings};
pub use request::{FileRequest, RequestBuilder};
pub use service::{ReconcilerHandle, ReconcilerMessage};
pub use types::{
    eta_string, extra, human_bytes, human_speed, DownloadError, EngineEvent, Extras,
    FileDownload, FileStatus,
};
