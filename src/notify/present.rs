// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Maps a bundle plus its latest engine event to a notification payload.

use std::path::PathBuf;

use crate::download::{eta_string, human_speed, DownloadBundle, EngineEvent, FileStatus};

use super::payload::{
    Category, Notification, NotificationAction, NotificationKey, ProgressBar, SmallIcon,
    TapTarget, Tint,
};

pub const TEXT_QUEUED: &str = "Queued";
pub const TEXT_WAITING: &str = "Waiting to download";
pub const TEXT_DOWNLOADING: &str = "Downloading";
pub const TEXT_PAUSED: &str = "Download paused";
pub const TEXT_CANCELLED: &str = "Download cancelled";
pub const TEXT_FAILED: &str = "Download failed";
pub const TEXT_COMPLETED: &str = "Download completed";
pub const TEXT_INSTALLING: &str = "Installing";
pub const TEXT_TAP_INSTALL: &str = "Ready to install";

const SEPARATOR: &str = " \u{2022} ";

/// Settings that change how a completed download is presented.
#[derive(Debug, Clone, Copy, Default)]
pub struct PresentOptions {
    /// A privileged installer picks the file up on its own
    pub privileged_install: bool,
}

/// Build the payload for `event`, or None when the event must stay
/// invisible (a part of a multi-file group finishing early).
pub fn present(
    bundle: &DownloadBundle,
    event: &EngineEvent,
    options: PresentOptions,
) -> Option<Notification> {
    let group_id = event.group_id;
    let status = event.file.status;

    let mut n = Notification {
        key: NotificationKey::for_package(&bundle.package_name),
        group_id,
        status,
        title: bundle.display_name.clone(),
        text: String::new(),
        big_text: String::new(),
        small_icon: SmallIcon::Download,
        tint: Tint::Accent,
        progress: ProgressBar::Hidden,
        actions: Vec::new(),
        category: Category::Status,
        tap_target: TapTarget::Downloads,
        auto_cancel: false,
        when: bundle.created,
    };

    match status {
        FileStatus::Added | FileStatus::Queued => {
            n.text = TEXT_QUEUED.to_string();
            n.big_text = TEXT_WAITING.to_string();
            n.progress = ProgressBar::Indeterminate;
        }
        FileStatus::Downloading => {
            n.text = TEXT_DOWNLOADING.to_string();
            n.category = Category::Progress;
            n.progress = if event.group_progress < 0 {
                ProgressBar::Indeterminate
            } else {
                ProgressBar::Determinate(event.group_progress.clamp(0, 100) as u8)
            };

            let mut parts = vec![TEXT_DOWNLOADING.to_string()];
            if let ProgressBar::Determinate(p) = n.progress {
                parts.push(format!("{}%", p));
            }
            if event.file.bytes_per_second > 0 {
                parts.push(human_speed(event.file.bytes_per_second));
            }
            if let Some(eta) = eta_string(event.file.eta_millis) {
                parts.push(eta);
            }
            n.big_text = parts.join(SEPARATOR);

            n.actions = vec![
                NotificationAction::Pause { group_id },
                NotificationAction::Cancel { group_id },
            ];
        }
        FileStatus::Paused => {
            n.text = TEXT_PAUSED.to_string();
            n.big_text = TEXT_PAUSED.to_string();
            n.small_icon = SmallIcon::Paused;
            n.actions = vec![NotificationAction::Resume { group_id }];
        }
        FileStatus::Cancelled => {
            n.text = TEXT_CANCELLED.to_string();
            n.big_text = TEXT_CANCELLED.to_string();
            n.small_icon = SmallIcon::Cancelled;
            n.tint = Tint::Error;
            n.category = Category::Error;
            n.auto_cancel = true;
        }
        FileStatus::Failed => {
            n.text = TEXT_FAILED.to_string();
            n.big_text = event
                .file
                .error
                .as_ref()
                .map(|e| e.user_message())
                .unwrap_or(TEXT_FAILED)
                .to_string();
            n.small_icon = SmallIcon::Failed;
            n.tint = Tint::Error;
            n.category = Category::Error;
        }
        FileStatus::Completed => {
            if event.group_progress < 100 {
                return None;
            }
            n.text = TEXT_COMPLETED.to_string();
            n.small_icon = SmallIcon::DownloadDone;
            n.auto_cancel = true;
            n.tap_target = TapTarget::AppDetails {
                package_name: bundle.package_name.clone(),
            };
            if options.privileged_install {
                n.big_text = TEXT_INSTALLING.to_string();
            } else {
                n.big_text = TEXT_TAP_INSTALL.to_string();
                n.actions = vec![NotificationAction::Install {
                    package_name: bundle.package_name.clone(),
                    file: install_file(bundle, event),
                }];
            }
        }
    }

    Some(n)
}

/// The group's APK, which sits next to every other file of the group.
/// Falls back to the file that finished last when the APK name is unknown.
fn install_file(bundle: &DownloadBundle, event: &EngineEvent) -> PathBuf {
    if bundle.apk_name.is_empty() {
        event.file.file.clone()
    } else {
        event.file.file.with_file_name(&bundle.apk_name)
    }
}
