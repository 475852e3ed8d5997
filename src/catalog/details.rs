// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! App details helpers: permission labels and outbound links.

use std::collections::BTreeMap;

use super::App;

const PERMISSION_PREFIXES: &[&str] = &["android"];
const PERMISSION_SUFFIX: &str = ".permission.";

/// Turn a permission name like `android.permission.READ_CONTACTS` into
/// `Read contacts`. Permissions declared by the app itself
/// (`<package>.permission.X`) are shortened the same way.
pub fn readable_permission_label(label: &str, package_name: &str) -> String {
    if label.is_empty() {
        return String::new();
    }
    let prefixes = PERMISSION_PREFIXES.iter().copied().chain(std::iter::once(package_name));
    for prefix in prefixes {
        let full = format!("{}{}", prefix, PERMISSION_SUFFIX);
        if let Some(rest) = label.strip_prefix(&full) {
            return capitalize(&rest.replace('_', " ").to_lowercase());
        }
    }
    capitalize(label)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Permissions of one group, sorted by readable label.
#[derive(Debug, Clone, Default)]
pub struct PermissionGroup {
    pub name: String,
    permissions: BTreeMap<String, String>,
}

impl PermissionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), permissions: BTreeMap::new() }
    }

    /// Add a permission; a later description for the same label wins.
    pub fn add(&mut self, permission: &str, package_name: &str, description: Option<&str>) {
        self.permissions.insert(
            readable_permission_label(permission, package_name),
            description.unwrap_or_default().to_string(),
        );
    }

    /// `(label, description)` pairs in label order.
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.permissions.iter().map(|(l, d)| (l.as_str(), d.as_str()))
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Permissions,
    Source,
    Website,
    Donation,
    Settings,
}

/// One link on the details screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLink {
    pub kind: LinkKind,
    /// Target url; empty for in-app targets
    pub target: String,
    pub visible: bool,
}

impl AppLink {
    /// Links in display order. Empty urls hide their link; the settings
    /// link needs the app to be installed.
    pub fn for_app(app: &App, installed: bool) -> Vec<AppLink> {
        let url_link = |kind, url: &str| AppLink {
            kind,
            target: url.to_string(),
            visible: !url.trim().is_empty(),
        };
        vec![
            AppLink { kind: LinkKind::Permissions, target: String::new(), visible: true },
            url_link(LinkKind::Source, &app.source_code),
            url_link(LinkKind::Website, &app.web_site),
            url_link(LinkKind::Donation, &app.donate),
            AppLink {
                kind: LinkKind::Settings,
                target: format!("package:{}", app.package_name),
                visible: installed,
            },
        ]
    }
}
