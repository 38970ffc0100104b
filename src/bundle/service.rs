//! Service bundle: every distinct built image named by its content hash, plus
//! an index a serving layer uses to map items onto those files.
//!
//! ```text
//! icons.tar
//! ├── 0b1c…e4.png
//! ├── 9f33…01.jpg
//! └── service_metadata.json   # {"587": {"icon": {"64": "0b1c…e4.png"}, "render": {"512": "9f33…01.jpg"}}}
//! ```
//!
//! Items with identical output share one file.

use super::{ArchiveWriter, BundleError, read_verified};
use crate::cache::{BlobStore, BuildManifest};
use crate::classify::{IconKind, Resolution};
use std::collections::BTreeMap;
use std::path::Path;

pub const METADATA_FILENAME: &str = "service_metadata.json";

pub type ServiceMetadata = BTreeMap<u32, BTreeMap<IconKind, BTreeMap<Resolution, String>>>;

/// Write the bundle to `out`. Returns the number of distinct image files.
pub fn write_service_bundle(
    manifest: &BuildManifest,
    blobs: &BlobStore,
    out: &Path,
) -> Result<usize, BundleError> {
    let mut metadata = ServiceMetadata::new();
    // file name → (owner type id, resolution, record) of the first reference
    let mut files = BTreeMap::new();

    for entry in &manifest.entries {
        for (res, record) in &entry.resolutions {
            let name = format!("{}.{}", record.hash, res.format().extension());
            metadata
                .entry(entry.type_id)
                .or_default()
                .entry(entry.kind)
                .or_default()
                .insert(*res, name.clone());
            files.entry(name).or_insert((entry.type_id, *res, record));
        }
    }

    let mut archive = ArchiveWriter::create(out)?;
    for (name, (type_id, res, record)) in &files {
        let bytes = read_verified(blobs, *type_id, *res, record)?;
        archive.append(name, &bytes)?;
    }
    archive.append(METADATA_FILENAME, &serde_json::to_vec_pretty(&metadata)?)?;
    archive.finish()?;

    tracing::info!(files = files.len(), path = %out.display(), "wrote service bundle");
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::tests::sample_manifest;
    use crate::classify::OutputFormat;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_archive(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = tar::Archive::new(std::fs::File::open(path).unwrap());
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().to_string();
                let mut buf = Vec::new();
                e.read_to_end(&mut buf).unwrap();
                (name, buf)
            })
            .collect()
    }

    #[test]
    fn bundle_contains_hash_named_files_and_index() {
        let tmp = TempDir::new().unwrap();
        let manifest = sample_manifest(tmp.path());
        let out = tmp.path().join("service.tar");
        let count = write_service_bundle(&manifest, &BlobStore::new(tmp.path()), &out).unwrap();
        assert_eq!(count, 3);

        let files = read_archive(&out);
        assert_eq!(files.len(), 4);
        let metadata: serde_json::Value =
            serde_json::from_slice(&files[METADATA_FILENAME]).unwrap();
        let render = metadata["587"]["render"]["512"].as_str().unwrap();
        assert!(render.ends_with(".jpg"));
        assert_eq!(files[render], b"render-587");
    }

    #[test]
    fn identical_outputs_are_stored_once() {
        let tmp = TempDir::new().unwrap();
        let cache = crate::cache::CacheManager::open(tmp.path(), false).unwrap();
        let fp = |s: &str| serde_json::from_value(serde_json::json!(s)).unwrap();
        for id in [1, 2] {
            cache
                .record(
                    id,
                    IconKind::Icon,
                    fp("f"),
                    &BTreeMap::from([(Resolution::Icon64, b"same".to_vec())]),
                )
                .unwrap();
        }
        let manifest = cache.finalize(&[1, 2].into()).unwrap();
        let out = tmp.path().join("s.tar");
        assert_eq!(
            write_service_bundle(&manifest, &BlobStore::new(tmp.path()), &out).unwrap(),
            1
        );
    }

    #[test]
    fn missing_blob_fails_the_whole_bundle() {
        let tmp = TempDir::new().unwrap();
        let manifest = sample_manifest(tmp.path());
        let blobs = BlobStore::new(tmp.path());
        let hash = &manifest.entries[0].resolutions[&Resolution::Icon64].hash;
        std::fs::remove_file(blobs.path(hash, OutputFormat::Png)).unwrap();

        let out = tmp.path().join("service.tar");
        let err = write_service_bundle(&manifest, &blobs, &out).unwrap_err();
        assert!(matches!(err, BundleError::MissingBlob { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn tampered_blob_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let manifest = sample_manifest(tmp.path());
        let blobs = BlobStore::new(tmp.path());
        let hash = &manifest.entries[0].resolutions[&Resolution::Icon64].hash;
        std::fs::write(blobs.path(hash, OutputFormat::Png), b"icon-588").unwrap();

        let err = write_service_bundle(&manifest, &blobs, &tmp.path().join("s.tar")).unwrap_err();
        assert!(matches!(err, BundleError::BlobMismatch { type_id: 587, .. }));
    }
}
