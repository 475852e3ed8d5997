// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Builds engine requests for one app download.
//!
//! Every file of an app (the APK plus optional OBB expansion files) gets its
//! own request under the same group id, tagged with the package name and
//! carrying the metadata extras the reconciler renders from.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::group::GroupId;
use super::types::{extra, Extras};
use crate::catalog::{App, Blacklist, Package};

/// One file the engine should fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRequest {
    pub url: String,
    pub file: PathBuf,
    pub group_id: GroupId,
    /// Package name
    pub tag: String,
    /// Expected hash of the file, empty when the index has none
    pub hash: String,
    pub extras: Extras,
}

pub struct RequestBuilder<'a> {
    download_dir: &'a Path,
    blacklist: Option<&'a Blacklist>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(download_dir: &'a Path) -> Self {
        Self { download_dir, blacklist: None }
    }

    /// Refuse packages on this blacklist.
    pub fn with_blacklist(mut self, blacklist: &'a Blacklist) -> Self {
        self.blacklist = Some(blacklist);
        self
    }

    /// Requests for every file of `pkg`, APK first.
    pub fn build(&self, app: &App, pkg: &Package) -> Result<Vec<FileRequest>> {
        if app.package_name.is_empty() {
            bail!("Cannot download an app without a package name");
        }
        if self.blacklist.is_some_and(|b| b.contains(&app.package_name)) {
            bail!("{} is blacklisted", app.package_name);
        }
        if app.repo_url.is_empty() {
            bail!("{} has no repository address", app.package_name);
        }

        let group_id = GroupId::for_package(&app.package_name);
        let extras = Extras::new()
            .with(extra::PACKAGE_NAME, app.package_name.as_str())
            .with(extra::DISPLAY_NAME, app.display_name())
            .with(extra::VERSION_NAME, pkg.version_name.as_str())
            .with(extra::VERSION_CODE, pkg.version_code.to_string())
            .with(extra::ICON_URL, app.icon_url().unwrap_or_default())
            .with(extra::APK_NAME, pkg.apk_name.as_str());

        let mut files = vec![(pkg.apk_name.as_str(), pkg.hash.as_str())];
        files.extend(pkg.obb_main_file.as_deref().map(|f| (f, "")));
        files.extend(pkg.obb_patch_file.as_deref().map(|f| (f, "")));

        let base = app.repo_url.trim_end_matches('/');
        Ok(files
            .into_iter()
            .filter(|(name, _)| !name.is_empty())
            .map(|(name, hash)| FileRequest {
                url: format!("{}/{}", base, name),
                file: self.download_dir.join(&app.package_name).join(name),
                group_id,
                tag: app.package_name.clone(),
                hash: hash.to_string(),
                extras: extras.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App {
            package_name: "org.example.game".to_string(),
            name: "Game".to_string(),
            icon: Some("game.png".to_string()),
            repo_url: "https://repo.example.org/fdroid/repo/".to_string(),
            ..App::default()
        }
    }

    fn pkg() -> Package {
        Package {
            version_name: "2.1".to_string(),
            version_code: 21,
            apk_name: "org.example.game_21.apk".to_string(),
            hash: "abc123".to_string(),
            ..Package::default()
        }
    }

    #[test]
    fn test_single_apk_request() {
        let dir = PathBuf::from("/downloads");
        let requests = RequestBuilder::new(&dir).build(&app(), &pkg()).unwrap();

        assert_eq!(requests.len(), 1);
        let r = &requests[0];
        assert_eq!(r.url, "https://repo.example.org/fdroid/repo/org.example.game_21.apk");
        assert_eq!(r.file, PathBuf::from("/downloads/org.example.game/org.example.game_21.apk"));
        assert_eq!(r.group_id, GroupId::for_package("org.example.game"));
        assert_eq!(r.extras.get(extra::VERSION_CODE), Some("21"));
        assert_eq!(
            r.extras.get(extra::ICON_URL),
            Some("https://repo.example.org/fdroid/repo/icons-640/game.png")
        );
    }

    #[test]
    fn test_obb_files_share_group() {
        let mut p = pkg();
        p.obb_main_file = Some("main.21.org.example.game.obb".to_string());
        p.obb_patch_file = Some("patch.21.org.example.game.obb".to_string());

        let dir = PathBuf::from("/downloads");
        let requests = RequestBuilder::new(&dir).build(&app(), &p).unwrap();

        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.group_id == requests[0].group_id));
        assert!(requests.iter().all(|r| r.tag == "org.example.game"));
        assert_eq!(requests[1].hash, "");
    }

    #[test]
    fn test_blacklisted_package_refused() {
        let mut blacklist = Blacklist::new();
        blacklist.toggle("org.example.game");

        let dir = PathBuf::from("/downloads");
        let err = RequestBuilder::new(&dir)
            .with_blacklist(&blacklist)
            .build(&app(), &pkg())
            .unwrap_err();
        assert!(err.to_string().contains("blacklisted"));
    }
}
