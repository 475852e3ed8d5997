// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Notification rendering.
//!
//! The reconciler decides *what* a download group looks like; this module
//! holds the payload it produces, the status-to-presentation mapping and
//! the renderers that put payloads on screen.

pub mod icon;
pub mod payload;
pub mod present;
pub mod renderer;
pub mod row;

pub use icon::{spawn_icon_patch, HttpIconFetcher, IconFetcher};
pub use payload::{
    Category, Notification, NotificationAction, NotificationKey, ProgressBar, SmallIcon,
    TapTarget, Tint,
};
pub use present::{present, PresentOptions};
pub use renderer::{ConsoleRenderer, MemoryRenderer, NotificationRenderer};
pub use row::DownloadRow;
