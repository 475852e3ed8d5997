// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! droidget - F-Droid style package client library
//!
//! Downloads an app as a group of files (APK plus OBB parts) and keeps one
//! notification per app in sync with the engine's per-file reports.
//!
//! # Core Modules
//!
//! - [`download`] - Group identity, engine boundary, reconciler and its service loop
//! - [`notify`] - Notification payloads, presentation rules and renderers
//! - [`catalog`] - Repository index model, version badges, details helpers, blacklist
//! - [`config`] - Persistent configuration
//! - [`replay`] - Scripted download sessions against the in-memory engine
//! - [`cert`] - Signing certificate fingerprints
//! - [`filepicker`] - Extension filter for local file selection
//! - [`error`] - Consistent error formatting utilities

pub mod catalog;
pub mod cert;
pub mod colors;
pub mod config;
pub mod download;
pub mod error;
pub mod filepicker;
pub mod locks;
pub mod notify;
pub mod replay;

// Re-export commonly used types from download
pub use download::{
    DownloadCommand, DownloadEngine, EngineConfig, EngineHandle, FileStatus, GroupId,
    MemoryEngine, Reconciler, ReconcilerHandle, ReconcilerSettings, SYNC_GROUP_ID,
};

pub use catalog::{App, Package, Repo, RepoIndex};
pub use config::Config;
pub use notify::{Notification, NotificationRenderer};

// Re-export error utilities
pub use error::{format_error, format_simple_error, ErrorBuilder, ISSUES_URL};
