// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Suggested/installed badges and version text for package rows.

use chrono::{TimeZone, Utc};

use super::{App, Package};
use crate::download::human_bytes;

/// Version of a package as installed on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledVersion {
    pub version_name: String,
    pub version_code: i64,
}

/// Query for what is installed on the device.
pub trait InstalledPackages {
    /// Installed version of `package_name`, None if not installed.
    fn installed_version(&self, package_name: &str) -> Option<InstalledVersion>;
}

impl<F> InstalledPackages for F
where
    F: Fn(&str) -> Option<InstalledVersion>,
{
    fn installed_version(&self, package_name: &str) -> Option<InstalledVersion> {
        self(package_name)
    }
}

/// True when the catalog recommends exactly this version.
///
/// Missing suggestion data means the suggestion does not apply.
pub fn is_suggested(pkg: &Package, app: &App) -> bool {
    match (&app.suggested_version_name, app.suggested_version_code) {
        (Some(name), Some(code)) => *name == pkg.version_name && code == pkg.version_code,
        _ => false,
    }
}

/// True when the device runs exactly this version of the app.
pub fn is_installed(pkg: &Package, app: &App, installed: &dyn InstalledPackages) -> bool {
    installed
        .installed_version(&app.package_name)
        .map(|v| v.version_code == pkg.version_code && v.version_name == pkg.version_name)
        .unwrap_or(false)
}

/// `name.code` as shown on package rows.
pub fn version_line(version_name: &str, version_code: i64) -> String {
    format!("{}.{}", version_name, version_code)
}

/// Version text for the details screen.
///
/// Not installed: the candidate version. Installed and older than the
/// candidate: `current >> update`. Otherwise: the installed version.
pub fn version_summary(app: &App, installed: &dyn InstalledPackages) -> Option<String> {
    let pkg = app.pkg.as_ref()?;
    let update = version_line(&pkg.version_name, pkg.version_code);
    Some(match installed.installed_version(&app.package_name) {
        None => update,
        Some(current) => {
            let current_line = version_line(&current.version_name, current.version_code);
            if pkg.version_code > current.version_code {
                format!("{} >> {}", current_line, update)
            } else {
                current_line
            }
        }
    })
}

/// The two independent badges of a package row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackageBadges {
    pub suggested: bool,
    pub installed: bool,
}

impl PackageBadges {
    pub fn resolve(pkg: &Package, app: &App, installed: &dyn InstalledPackages) -> Self {
        Self {
            suggested: is_suggested(pkg, app),
            installed: is_installed(pkg, app, installed),
        }
    }
}

/// Text lines of one row in a package version list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub version: String,
    pub details: String,
    pub added: String,
    pub badges: PackageBadges,
}

impl PackageRow {
    pub fn new(pkg: &Package, app: &App, installed: &dyn InstalledPackages) -> Self {
        let arch = pkg
            .nativecode
            .first()
            .map(String::as_str)
            .unwrap_or("Universal");
        let added = Utc
            .timestamp_millis_opt(pkg.added)
            .single()
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        Self {
            version: version_line(&pkg.version_name, pkg.version_code),
            details: format!("{} \u{2022} {} \u{2022} {}", arch, app.repo_name, human_bytes(pkg.size)),
            added,
            badges: PackageBadges::resolve(pkg, app, installed),
        }
    }
}
