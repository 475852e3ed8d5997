// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Consistent error formatting for the droidget CLI.
//!
//! Errors shown to the user carry a title, the likely causes, concrete fixes
//! and a link for help.

use std::fmt;
use std::path::Path;

/// Issue tracker for support.
pub const ISSUES_URL: &str = "https://github.com/droidget/droidget/issues";

/// Formats an error message with title, causes, fixes, and help link.
///
/// # Example
///
/// ```
/// use droidget::error::format_error;
///
/// let error = format_error(
///     "Failed to load replay script",
///     &["File does not exist", "File is not valid JSON"],
///     &["Check the path", "Validate with: jq . script.json"],
/// );
/// assert!(error.contains("Possible causes:"));
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(&format!("Need help? {}", ISSUES_URL));
    output
}

/// Title plus help link, nothing else.
pub fn format_simple_error(title: &str) -> String {
    format!("[✗] {}\n\nNeed help? {}", title, ISSUES_URL)
}

/// Builder for constructing formatted error messages.
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(&self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(String::as_str).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(String::as_str).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build())
    }
}

/// The config file could not be read or failed validation.
pub fn config_error(path: &Path, err: &anyhow::Error) -> String {
    ErrorBuilder::new(format!("Invalid configuration at {}", path.display()))
        .cause(format!("{:#}", err))
        .fix("Inspect the current values: droidget config show")
        .fix(format!("Delete {} to start from defaults", path.display()))
        .build()
}

/// A replay script could not be loaded or executed.
pub fn replay_error(path: &Path, err: &anyhow::Error) -> String {
    ErrorBuilder::new(format!("Replay of {} failed", path.display()))
        .cause(format!("{:#}", err))
        .cause("Steps reference an app or file index that was never enqueued")
        .fix("Enqueue an app before sending progress for it")
        .fix("Run with --verbose to see each applied step")
        .build()
}
