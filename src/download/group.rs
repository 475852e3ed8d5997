// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Download group identity.
//!
//! A group is every file transfer belonging to one app installation. Its id
//! is the 32-bit string hash of the package name, computed exactly like
//! `java.lang.String#hashCode` so that ids agree with the ones already stored
//! by existing clients. The hash is not collision-proof; [`GroupRegistry`]
//! notices when two packages land on the same id.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Group id reserved for repository index refreshes.
pub const SYNC_GROUP_ID: GroupId = GroupId(1337);

/// Routing key shared by requests, engine events, notifications and
/// user actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(i32);

impl GroupId {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Derive the group id for a package.
    pub fn for_package(package_name: &str) -> Self {
        Self(string_hash(package_name))
    }

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `s[0]*31^(n-1) + ... + s[n-1]` over UTF-16 code units, wrapping.
pub fn string_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
}

/// Result of binding a package to its group id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// First time this id is seen
    New,
    /// Same package seen again
    Known,
    /// The id already belongs to a different package
    Collision { existing: String },
}

/// Package name <-> group id bookkeeping owned by the reconciler.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    by_id: HashMap<GroupId, String>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `package_name` routes through `group_id`.
    ///
    /// A collision keeps the first binding; events for both packages keep
    /// flowing through the same id.
    pub fn bind(&mut self, group_id: GroupId, package_name: &str) -> Binding {
        match self.by_id.get(&group_id) {
            None => {
                self.by_id.insert(group_id, package_name.to_string());
                Binding::New
            }
            Some(existing) if existing == package_name => Binding::Known,
            Some(existing) => {
                tracing::warn!(
                    %group_id,
                    existing = %existing,
                    incoming = %package_name,
                    "group id collision; downloads will be merged"
                );
                Binding::Collision { existing: existing.clone() }
            }
        }
    }

    /// Package currently bound to `group_id`.
    pub fn package_for(&self, group_id: GroupId) -> Option<&str> {
        self.by_id.get(&group_id).map(String::as_str)
    }

    pub fn release(&mut self, group_id: GroupId) {
        self.by_id.remove(&group_id);
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
