// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Notification renderers.

use std::sync::Mutex;

use colored::Colorize;
use indexmap::IndexMap;

use super::payload::{Notification, NotificationKey, ProgressBar, Tint};
use crate::locks::resilient_lock;

/// Displays reconciled download state.
///
/// Renderers only read the payloads they are handed. Posting with a key
/// that is already on screen replaces that notification.
pub trait NotificationRenderer: Send + Sync {
    fn post(&self, notification: &Notification);

    /// Attach a large icon to an already posted notification.
    ///
    /// `Notification` carries no icon and the reconciler requests one only
    /// once per bundle, so the renderer must keep the icon for `key` and
    /// reapply it on later posts with the same key until `cancel`. Icons
    /// for keys not on screen are dropped.
    fn set_large_icon(&self, key: &NotificationKey, icon: &[u8]);

    /// Remove a notification from the screen.
    fn cancel(&self, key: &NotificationKey);
}

/// Prints each posted notification as one line on stdout.
#[derive(Debug, Default)]
pub struct ConsoleRenderer;

impl ConsoleRenderer {
    pub fn format_line(notification: &Notification) -> String {
        let progress = match notification.progress {
            ProgressBar::Hidden => String::new(),
            ProgressBar::Indeterminate => " [....]".to_string(),
            ProgressBar::Determinate(p) => format!(" [{:>3}%]", p),
        };
        let actions = notification.action_labels();
        let actions = if actions.is_empty() {
            String::new()
        } else {
            format!(" ({})", actions.join(" | "))
        };
        format!(
            "{}{}: {}{}",
            notification.title, progress, notification.big_text, actions
        )
    }
}

impl NotificationRenderer for ConsoleRenderer {
    fn post(&self, notification: &Notification) {
        let line = Self::format_line(notification);
        match notification.tint {
            Tint::Error => println!("{} {}", "[X]".red(), line.red()),
            Tint::Accent if notification.is_terminal() => println!("{} {}", "[OK]".green(), line),
            Tint::Accent => println!("{} {}", "[..]".cyan(), line),
        }
    }

    fn set_large_icon(&self, key: &NotificationKey, icon: &[u8]) {
        tracing::debug!(tag = %key.tag, bytes = icon.len(), "large icon attached");
    }

    fn cancel(&self, key: &NotificationKey) {
        println!("{} {} dismissed", "[-]".dimmed(), key.tag);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    history: Vec<Notification>,
    current: IndexMap<NotificationKey, Notification>,
    icons: IndexMap<NotificationKey, Vec<u8>>,
}

/// Keeps everything it is asked to render. Backs the JSON replay output and
/// the tests.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    state: Mutex<MemoryState>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every payload posted, oldest first.
    pub fn history(&self) -> Vec<Notification> {
        resilient_lock(&self.state).history.clone()
    }

    /// Notifications currently on screen.
    pub fn current(&self) -> Vec<Notification> {
        resilient_lock(&self.state).current.values().cloned().collect()
    }

    pub fn get(&self, key: &NotificationKey) -> Option<Notification> {
        resilient_lock(&self.state).current.get(key).cloned()
    }

    pub fn icon(&self, key: &NotificationKey) -> Option<Vec<u8>> {
        resilient_lock(&self.state).icons.get(key).cloned()
    }

    pub fn post_count(&self) -> usize {
        resilient_lock(&self.state).history.len()
    }
}

impl NotificationRenderer for MemoryRenderer {
    fn post(&self, notification: &Notification) {
        let mut state = resilient_lock(&self.state);
        state.history.push(notification.clone());
        state.current.insert(notification.key.clone(), notification.clone());
    }

    fn set_large_icon(&self, key: &NotificationKey, icon: &[u8]) {
        let mut state = resilient_lock(&self.state);
        // The notification may be gone by the time the icon arrives
        if state.current.contains_key(key) {
            state.icons.insert(key.clone(), icon.to_vec());
        }
    }

    fn cancel(&self, key: &NotificationKey) {
        let mut state = resilient_lock(&self.state);
        state.current.shift_remove(key);
        state.icons.shift_remove(key);
    }
}
