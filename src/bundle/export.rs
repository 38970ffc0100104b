//! Image export collection: fixed, human-readable names for static hosting.
//!
//! | Kind | Name |
//! |---|---|
//! | icon, bp, reaction, relic | `{type_id}_64.png` |
//! | bpc | `{type_id}_bpc_64.png` |
//! | render | `{type_id}_512.jpg` |

use super::{ArchiveWriter, BundleError, read_verified};
use crate::cache::{BlobStore, BuildManifest};
use crate::classify::{IconKind, Resolution};
use std::collections::BTreeSet;
use std::path::Path;

pub fn export_name(type_id: u32, kind: IconKind, resolution: Resolution) -> String {
    let ext = resolution.format().extension();
    match kind {
        IconKind::BlueprintCopy => format!("{type_id}_bpc_{resolution}.{ext}"),
        _ => format!("{type_id}_{resolution}.{ext}"),
    }
}

/// Write the collection to `out`. Returns the number of files.
///
/// Should two entries map to the same name, the first in manifest order
/// wins and the other is logged.
pub fn write_export_collection(
    manifest: &BuildManifest,
    blobs: &BlobStore,
    out: &Path,
) -> Result<usize, BundleError> {
    let mut archive = ArchiveWriter::create(out)?;
    let mut used = BTreeSet::new();
    for entry in &manifest.entries {
        for (res, record) in &entry.resolutions {
            let name = export_name(entry.type_id, entry.kind, *res);
            if !used.insert(name.clone()) {
                tracing::warn!(type_id = entry.type_id, kind = %entry.kind, %name, "export name collision, skipping");
                continue;
            }
            let bytes = read_verified(blobs, entry.type_id, *res, record)?;
            archive.append(&name, &bytes)?;
        }
    }
    let count = archive.finish()?;
    tracing::info!(files = count, path = %out.display(), "wrote export collection");
    Ok(count)
}
