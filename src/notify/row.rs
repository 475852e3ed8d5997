// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Rows of the downloads list screen.

use serde::Serialize;

use crate::download::{eta_string, extra, human_bytes, human_speed, FileDownload, FileStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRow {
    pub title: String,
    pub state: FileStatus,
    /// Display label of `state`
    pub status: String,
    pub path: String,
    pub size: String,
    /// Never negative
    pub progress: u8,
    pub eta: String,
    pub speed: String,
}

impl DownloadRow {
    pub fn from_download(download: &FileDownload) -> Self {
        let progress = download.progress_percent().clamp(0, 100) as u8;
        let terminal = download.status.is_terminal();

        let eta = match eta_string(download.eta_millis) {
            Some(eta) if !terminal => eta,
            _ => String::new(),
        };
        let speed = if terminal || download.bytes_per_second <= 0 {
            String::new()
        } else {
            human_speed(download.bytes_per_second)
        };

        Self {
            title: download.extras.get_or(extra::DISPLAY_NAME, "Unknown").to_string(),
            state: download.status,
            status: download.status.label().to_string(),
            path: download.file.display().to_string(),
            size: format!(
                "{}/{}",
                human_bytes(download.bytes_downloaded),
                human_bytes(download.bytes_total)
            ),
            progress,
            eta,
            speed,
        }
    }
}
