// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Catalog model for F-Droid style repository indices.
//!
//! Apps and packages deserialize straight from the index JSON (camelCase
//! keys). Only the fields the download and badge logic read are modelled.

pub mod badges;
pub mod blacklist;
pub mod details;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

pub use badges::{
    is_installed, is_suggested, version_line, version_summary, InstalledPackages,
    InstalledVersion, PackageBadges, PackageRow,
};
pub use blacklist::Blacklist;
pub use details::{readable_permission_label, AppLink, LinkKind, PermissionGroup};

/// An application as listed by a repository index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct App {
    pub package_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub author_name: String,
    /// Icon file name relative to the repo's icon directory
    #[serde(default)]
    pub icon: Option<String>,
    /// Name of the repository this entry came from (set by the client)
    #[serde(default)]
    pub repo_name: String,
    /// Base address of that repository (set by the client)
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub suggested_version_name: Option<String>,
    /// Indices store this as a string; numbers are accepted too
    #[serde(default, deserialize_with = "de_opt_version_code")]
    pub suggested_version_code: Option<i64>,
    #[serde(default)]
    pub source_code: String,
    #[serde(default)]
    pub web_site: String,
    #[serde(default)]
    pub donate: String,
    /// Package picked for the details screen
    #[serde(default)]
    pub pkg: Option<Package>,
}

impl App {
    /// Name to show, falling back to the package name.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.package_name
        } else {
            &self.name
        }
    }

    /// Absolute icon url, None when the index lists no icon.
    pub fn icon_url(&self) -> Option<String> {
        self.icon
            .as_deref()
            .filter(|icon| !icon.is_empty())
            .map(|icon| format!("{}/icons-640/{}", self.repo_url.trim_end_matches('/'), icon))
    }
}

/// One downloadable version of an app.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    #[serde(default)]
    pub version_name: String,
    pub version_code: i64,
    pub apk_name: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub hash_type: String,
    /// Size in bytes
    #[serde(default)]
    pub size: i64,
    /// Epoch millis when the repo added this package
    #[serde(default)]
    pub added: i64,
    /// ABIs, empty for universal packages
    #[serde(default)]
    pub nativecode: Vec<String>,
    #[serde(default)]
    pub obb_main_file: Option<String>,
    #[serde(default)]
    pub obb_patch_file: Option<String>,
    #[serde(default, rename = "uses-permission", deserialize_with = "de_permissions")]
    pub uses_permission: Vec<String>,
}

impl Package {
    /// True when the package only runs on the listed ABIs.
    pub fn is_arch_specific(&self) -> bool {
        !self.nativecode.is_empty()
    }
}

/// A configured package repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repo {
    pub name: String,
    pub address: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Expected SHA-256 fingerprint of the signing certificate
    #[serde(default)]
    pub fingerprint: String,
}

fn default_true() -> bool {
    true
}

/// The set of repositories the client pulls indices from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoIndex {
    pub repos: Vec<Repo>,
}

impl RepoIndex {
    /// Load the repository list from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read repo list: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse repo list: {:?}", path))
    }

    /// Repositories currently enabled, in configured order.
    pub fn enabled(&self) -> impl Iterator<Item = &Repo> {
        self.repos.iter().filter(|r| r.enabled)
    }

    pub fn find(&self, name: &str) -> Option<&Repo> {
        self.repos.iter().find(|r| r.name == name)
    }
}

fn de_opt_version_code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64(),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// `uses-permission` entries are `[name, maxSdk]` pairs.
fn de_permissions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(entries
        .into_iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(name) => Some(name),
            serde_json::Value::Array(parts) => parts
                .into_iter()
                .next()
                .and_then(|p| p.as_str().map(str::to_string)),
            _ => None,
        })
        .collect())
}
