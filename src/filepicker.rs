// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! File picker configuration and extension filtering.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROOT: &str = "/mnt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    #[default]
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    #[default]
    File,
    Dir,
    FileAndDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogConfig {
    pub selection_mode: SelectionMode,
    pub selection_type: SelectionType,
    pub root: PathBuf,
    /// Accepted suffixes, e.g. `apk`. Empty accepts every file.
    pub extensions: Vec<String>,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            selection_mode: SelectionMode::default(),
            selection_type: SelectionType::default(),
            root: PathBuf::from(DEFAULT_ROOT),
            extensions: Vec::new(),
        }
    }
}

impl DialogConfig {
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

pub struct ExtensionFilter {
    selection_type: SelectionType,
    suffixes: Vec<String>,
}

impl ExtensionFilter {
    pub fn new(config: &DialogConfig) -> Self {
        Self {
            selection_type: config.selection_type,
            suffixes: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Directories are always listed so they can be browsed.
    pub fn accept(&self, path: &Path) -> bool {
        if path.is_dir() && fs::read_dir(path).is_ok() {
            return true;
        }
        if self.selection_type == SelectionType::Dir {
            return false;
        }
        self.accepts_name(path)
    }

    fn accepts_name(&self, path: &Path) -> bool {
        if self.suffixes.is_empty() {
            return true;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    /// Accepted entries of `dir`, sorted by path.
    pub fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries =
            fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))?;
        let mut accepted = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if self.accept(&path) {
                accepted.push(path);
            }
        }
        accepted.sort();
        Ok(accepted)
    }
}
