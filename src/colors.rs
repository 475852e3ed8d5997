// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! ANSI styling for CLI tables and headers.
//!
//! Color usage conventions:
//! - RED = failed or cancelled downloads, errors
//! - GREEN = completed downloads, confirmations
//! - YELLOW = paused downloads, warnings
//! - CYAN = running downloads, headers

use crate::download::FileStatus;

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const BRIGHT_CYAN: &str = "\x1b[96m";

const HORIZONTAL: char = '─';

/// Color for a download status label.
pub fn status_color(status: FileStatus) -> &'static str {
    match status {
        FileStatus::Completed => GREEN,
        FileStatus::Failed | FileStatus::Cancelled => RED,
        FileStatus::Paused => YELLOW,
        FileStatus::Added | FileStatus::Queued | FileStatus::Downloading => CYAN,
    }
}

/// Render a separator line
pub fn separator(width: usize) -> String {
    format!("{}{}{}", DIM, HORIZONTAL.to_string().repeat(width), RESET)
}

/// Block progress bar, `percent` clamped to 100.
pub fn progress_bar(percent: u8, width: usize) -> String {
    let percent = usize::from(percent.min(100));
    let filled = percent * width / 100;
    let empty = width.saturating_sub(filled);
    let color = if percent == 100 { GREEN } else { CYAN };

    format!("{}{}{}{} {:>3}%", color, "█".repeat(filled), "░".repeat(empty), RESET, percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_widths() {
        let bar = progress_bar(50, 10);
        assert_eq!(bar.matches('█').count(), 5);
        assert_eq!(bar.matches('░').count(), 5);
        assert!(bar.ends_with(" 50%"));

        let full = progress_bar(250, 4);
        assert_eq!(full.matches('█').count(), 4);
        assert!(full.starts_with(GREEN));
    }

    #[test]
    fn test_status_colors() {
        assert_eq!(status_color(FileStatus::Completed), GREEN);
        assert_eq!(status_color(FileStatus::Failed), RED);
        assert_eq!(status_color(FileStatus::Paused), YELLOW);
    }

    #[test]
    fn test_separator() {
        assert_eq!(separator(3), format!("{}───{}", DIM, RESET));
    }
}
