//! Web directory: a tree a static file server can expose as-is.
//!
//! ```text
//! web/
//! ├── index.json                # {"items": [587, ...], "files": {"587_icon_64.png": "<hash>", ...}}
//! ├── 587.json                  # {"icon": {"64": "587_icon_64.png"}, "render": {"512": "587_render_512.jpg"}}
//! ├── 587_icon_64.png
//! └── 587_render_512.jpg
//! ```
//!
//! Images are materialized by a [`FilePlacer`], so the caller decides between
//! copies and links into the blob store. The previous `index.json` drives the
//! incremental part: a file whose content key has not changed and that still
//! exists is left alone, and files or item documents the new manifest no
//! longer produces are removed.

use super::{BundleError, FilePlacer, read_verified};
use crate::cache::{BlobStore, BuildManifest};
use crate::classify::{IconKind, Resolution};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

pub const INDEX_FILENAME: &str = "index.json";

type ItemFiles = BTreeMap<IconKind, BTreeMap<Resolution, String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebIndex {
    pub items: Vec<u32>,
    /// file name → content hash
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebDirSummary {
    pub placed: usize,
    pub unchanged: usize,
    pub removed: usize,
}

pub fn web_file_name(type_id: u32, kind: IconKind, resolution: Resolution) -> String {
    format!(
        "{type_id}_{kind}_{resolution}.{}",
        resolution.format().extension()
    )
}

struct Pending {
    name: String,
    src: PathBuf,
}

/// Bring `out_dir` in line with `manifest`.
///
/// Every image is verified against the blob store before anything in
/// `out_dir` is touched. With `force`, every image is placed again.
pub fn write_web_dir(
    manifest: &BuildManifest,
    blobs: &BlobStore,
    out_dir: &Path,
    placer: &dyn FilePlacer,
    force: bool,
) -> Result<WebDirSummary, BundleError> {
    let previous = load_index(out_dir);

    let mut index = WebIndex::default();
    let mut items: BTreeMap<u32, ItemFiles> = BTreeMap::new();
    let mut pending = Vec::new();
    let mut summary = WebDirSummary::default();

    for entry in &manifest.entries {
        for (res, record) in &entry.resolutions {
            read_verified(blobs, entry.type_id, *res, record)?;
            let name = web_file_name(entry.type_id, entry.kind, *res);
            items
                .entry(entry.type_id)
                .or_default()
                .entry(entry.kind)
                .or_default()
                .insert(*res, name.clone());

            let fresh = previous.files.get(&name) == Some(&record.hash)
                && out_dir.join(&name).exists();
            if fresh && !force {
                summary.unchanged += 1;
            } else {
                pending.push(Pending {
                    src: blobs.path(&record.hash, res.format()),
                    name: name.clone(),
                });
            }
            index.files.insert(name, record.hash.clone());
        }
    }
    index.items = items.keys().copied().collect();

    std::fs::create_dir_all(out_dir).map_err(BundleError::io(out_dir))?;

    pending
        .par_iter()
        .try_for_each(|p| placer.place(&p.src, &out_dir.join(&p.name)))?;
    summary.placed = pending.len();

    for (type_id, files) in &items {
        write_if_changed(
            &out_dir.join(format!("{type_id}.json")),
            &serde_json::to_vec_pretty(files)?,
        )?;
    }

    let current_items: BTreeSet<u32> = index.items.iter().copied().collect();
    let stale_files = previous
        .files
        .keys()
        .filter(|name| !index.files.contains_key(*name))
        .cloned();
    let stale_items = previous
        .items
        .iter()
        .filter(|id| !current_items.contains(id))
        .map(|id| format!("{id}.json"));
    for name in stale_files.chain(stale_items) {
        if remove_if_present(&out_dir.join(&name))? {
            summary.removed += 1;
        }
    }

    let index_path = out_dir.join(INDEX_FILENAME);
    let tmp = out_dir.join(format!("{INDEX_FILENAME}.tmp"));
    std::fs::write(&tmp, serde_json::to_vec_pretty(&index)?).map_err(BundleError::io(&tmp))?;
    std::fs::rename(&tmp, &index_path).map_err(BundleError::io(&index_path))?;

    tracing::info!(
        placed = summary.placed,
        unchanged = summary.unchanged,
        removed = summary.removed,
        path = %out_dir.display(),
        "wrote web directory"
    );
    Ok(summary)
}

/// A missing or unreadable index means nothing is known to be in place.
fn load_index(out_dir: &Path) -> WebIndex {
    let path = out_dir.join(INDEX_FILENAME);
    match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable web index");
            WebIndex::default()
        }),
        Err(_) => WebIndex::default(),
    }
}

fn write_if_changed(path: &Path, bytes: &[u8]) -> Result<(), BundleError> {
    if std::fs::read(path).is_ok_and(|existing| existing == bytes) {
        return Ok(());
    }
    std::fs::write(path, bytes).map_err(BundleError::io(path))
}

fn remove_if_present(path: &Path) -> Result<bool, BundleError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(BundleError::io(path)(e)),
    }
}
