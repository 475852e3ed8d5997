// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Packages the user never wants to download or update.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Blacklist(BTreeSet<String>);

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, package_name: &str) -> bool {
        self.0.contains(package_name)
    }

    /// Flip membership, returns true if the package is now blacklisted.
    pub fn toggle(&mut self, package_name: &str) -> bool {
        if self.0.remove(package_name) {
            false
        } else {
            self.0.insert(package_name.to_string());
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
