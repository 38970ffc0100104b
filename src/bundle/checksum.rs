//! Icon-set checksum.
//!
//! SHA-256 over one line per built output,
//! `type_id \t kind \t resolution \t hash \t len \n`, sorted by type id, then
//! resolution, then kind. Any change to any image changes the digest; an
//! unchanged set gives the same digest on every machine.

use super::BundleError;
use crate::cache::BuildManifest;
use sha2::{Digest, Sha256};
use std::path::Path;

pub fn manifest_checksum(manifest: &BuildManifest) -> String {
    let mut rows: Vec<_> = manifest
        .entries
        .iter()
        .flat_map(|e| {
            e.resolutions
                .iter()
                .map(move |(res, out)| (e.type_id, *res, e.kind, out))
        })
        .collect();
    rows.sort_by_key(|(type_id, res, kind, _)| (*type_id, *res, *kind));

    let mut hasher = Sha256::new();
    for (type_id, res, kind, out) in rows {
        hasher.update(format!("{type_id}\t{kind}\t{res}\t{}\t{}\n", out.hash, out.len));
    }
    format!("{:x}", hasher.finalize())
}

/// Write the digest (plus newline) to `out` and return it.
pub fn write_checksum(manifest: &BuildManifest, out: &Path) -> Result<String, BundleError> {
    let digest = manifest_checksum(manifest);
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(BundleError::io(parent))?;
    }
    std::fs::write(out, format!("{digest}\n")).map_err(BundleError::io(out))?;
    Ok(digest)
}
