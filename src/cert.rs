// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Signing certificate helpers.

use std::path::Path;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};

const FDROID: &str = "FDROID";
const GUARDIAN: &str = "GUARDIANPROJECT.INFO";

/// SHA-256 of a DER-encoded certificate as upper-case hex.
pub fn fingerprint(der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(der))
}

/// Lower-case SHA-256 fingerprint, empty when there is no certificate.
pub fn sha256_fingerprint(der: Option<&[u8]>) -> String {
    match der {
        Some(der) if !der.is_empty() => fingerprint(der).to_lowercase(),
        _ => String::new(),
    }
}

/// Whether the signer's subject DN names F-Droid or the Guardian Project.
pub fn is_fdroid_signer(subject_dn: Option<&str>) -> bool {
    subject_dn.is_some_and(|dn| {
        let dn = dn.to_uppercase();
        dn.contains(FDROID) || dn.contains(GUARDIAN)
    })
}

/// Read a DER certificate from disk and fingerprint it.
pub fn fingerprint_file(path: &Path) -> Result<String> {
    let der = std::fs::read(path)
        .with_context(|| format!("Failed to read certificate: {}", path.display()))?;
    if der.is_empty() {
        bail!("Certificate file is empty: {}", path.display());
    }
    Ok(fingerprint(&der))
}
