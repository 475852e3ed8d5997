// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Scripted download sessions.
//!
//! A script lists the apps it works with and a sequence of steps: engine
//! reports (progress, finish, fail) and user actions (pause, resume, cancel,
//! dismiss). Steps run against the in-memory engine and the reconciler
//! service, one at a time, so the rendered notifications are deterministic.
//!
//! ```json
//! {
//!   "apps": [{ "app": { "packageName": "org.example", "repoUrl": "https://f-droid.org/repo" },
//!              "package": { "versionCode": 3, "apkName": "org.example_3.apk" } }],
//!   "steps": [
//!     { "step": "enqueue", "package": "org.example" },
//!     { "step": "progress", "package": "org.example", "file": 0, "downloaded": 512, "total": 1024 },
//!     { "step": "finish", "package": "org.example", "file": 0 }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::{App, Package};
use crate::config::Config;
use crate::download::{
    service, DownloadEngine, DownloadError, EngineConfig, GroupId, MemoryEngine, Reconciler,
    ReconcilerSettings, RequestBuilder,
};
use crate::notify::{DownloadRow, IconFetcher, Notification, NotificationRenderer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptApp {
    pub app: App,
    pub package: Package,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
    Enqueue {
        package: String,
    },
    /// `file` indexes the group's files in enqueue order (APK first)
    Progress {
        package: String,
        #[serde(default)]
        file: usize,
        downloaded: i64,
        #[serde(default = "unknown_total")]
        total: i64,
        #[serde(default)]
        bps: i64,
    },
    Finish {
        package: String,
        #[serde(default)]
        file: usize,
        #[serde(default)]
        hash: Option<String>,
    },
    Fail {
        package: String,
        #[serde(default)]
        file: usize,
        error: DownloadError,
    },
    NetworkRestored,
    Pause {
        package: String,
    },
    Resume {
        package: String,
    },
    Cancel {
        package: String,
    },
    Dismiss {
        package: String,
    },
}

fn unknown_total() -> i64 {
    -1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Script {
    /// Overrides the configured download directory
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    #[serde(default)]
    pub apps: Vec<ScriptApp>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse script: {}", path.display()))
    }

    fn app(&self, package: &str) -> Result<&ScriptApp> {
        self.apps
            .iter()
            .find(|a| a.app.package_name == package)
            .ok_or_else(|| anyhow!("Script has no app named {}", package))
    }
}

/// State left on screen after a replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub steps: usize,
    pub notifications: Vec<Notification>,
    pub rows: Vec<DownloadRow>,
}

/// Run `script` to completion.
pub async fn run_script(
    script: &Script,
    config: &Config,
    renderer: Arc<dyn NotificationRenderer>,
    icons: Option<Arc<dyn IconFetcher>>,
) -> Result<ReplayReport> {
    // Steps run back to back; throttling would swallow them
    let engine_config = EngineConfig {
        progress_interval: Duration::ZERO,
        ..EngineConfig::from_config(config)
    };
    let (engine, events) = MemoryEngine::new(engine_config);

    let mut reconciler = Reconciler::new(ReconcilerSettings::from_config(config), renderer);
    if let Some(icons) = icons {
        reconciler = reconciler.with_icon_fetcher(icons);
    }
    let handle = service::spawn(reconciler, engine.clone(), events, Duration::from_secs(60));

    let download_dir = script.download_dir.as_deref().unwrap_or(config.download_dir.as_path());
    let builder = RequestBuilder::new(download_dir).with_blacklist(&config.blacklist);

    let file_id = |package: &str, index: usize| -> Result<i32> {
        engine
            .file_ids(GroupId::for_package(package))
            .get(index)
            .copied()
            .ok_or_else(|| anyhow!("{} has no file #{}", package, index))
    };

    for (n, step) in script.steps.iter().enumerate() {
        tracing::debug!(step = n, ?step, "applying step");
        let applied = match step {
            Step::Enqueue { package } => {
                let entry = script.app(package)?;
                let requests = builder.build(&entry.app, &entry.package)?;
                engine.enqueue(requests).map(|_| ())
            }
            Step::Progress { package, file, downloaded, total, bps } => {
                engine.report_progress(file_id(package, *file)?, *downloaded, *total, *bps)
            }
            Step::Finish { package, file, hash } => {
                engine.finish(file_id(package, *file)?, hash.as_deref())
            }
            Step::Fail { package, file, error } => {
                engine.fail(file_id(package, *file)?, error.clone())
            }
            Step::NetworkRestored => {
                engine.network_restored();
                Ok(())
            }
            Step::Pause { package } => handle.pause(GroupId::for_package(package)),
            Step::Resume { package } => handle.resume(GroupId::for_package(package)),
            Step::Cancel { package } => handle.cancel(GroupId::for_package(package)),
            Step::Dismiss { package } => handle.dismiss(GroupId::for_package(package)),
        };
        applied.with_context(|| format!("Step {} failed", n + 1))?;
        handle.flush().await?;
    }

    let report = ReplayReport {
        steps: script.steps.len(),
        notifications: handle.notifications(),
        rows: engine.downloads().iter().map(DownloadRow::from_download).collect(),
    };
    handle.shutdown().await?;
    Ok(report)
}
