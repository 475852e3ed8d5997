// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Asynchronous large-icon patching.
//!
//! The notification is posted first; the icon is fetched on the blocking
//! pool and attached whenever it arrives. Nothing waits for it and a failed
//! fetch only costs the icon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::payload::NotificationKey;
use super::renderer::NotificationRenderer;

/// Fetches icon bytes for a url.
pub trait IconFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher.
pub struct HttpIconFetcher {
    client: reqwest::blocking::Client,
}

impl HttpIconFetcher {
    pub fn new(proxy: Option<&str>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(15));
        if let Some(proxy) = proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy: {}", proxy))?,
            );
        }
        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
        })
    }
}

impl IconFetcher for HttpIconFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Failed to fetch icon: {}", url))?;
        if !response.status().is_success() {
            bail!("Icon request returned HTTP {}", response.status());
        }
        let bytes = response.bytes().context("Failed to read icon body")?;
        Ok(bytes.to_vec())
    }
}

/// Fire-and-forget icon fetch that patches the notification under `key`.
///
/// Does nothing outside a tokio runtime.
pub fn spawn_icon_patch(
    fetcher: Arc<dyn IconFetcher>,
    renderer: Arc<dyn NotificationRenderer>,
    key: NotificationKey,
    url: String,
) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(%url, "no runtime, skipping icon fetch");
        return;
    };
    runtime.spawn_blocking(move || match fetcher.fetch(&url) {
        Ok(icon) => renderer.set_large_icon(&key, &icon),
        Err(e) => tracing::warn!(tag = %key.tag, "icon fetch failed: {:#}", e),
    });
}
