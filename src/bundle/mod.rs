//! Bundle assemblers.
//!
//! Every assembler reads only the [`BuildManifest`](crate::cache::BuildManifest)
//! and the blob store. None of them re-classify or re-read item metadata.
//!
//! | Assembler | Output |
//! |---|---|
//! | [`service`] | tar: `<hash>.<ext>` per distinct image + `service_metadata.json` |
//! | [`export`] | tar: human-readable names (`587_64.png`, `587_512.jpg`, …) |
//! | [`web`] | directory: per-item JSON, placed images, `index.json` |
//! | [`checksum`] | one SHA-256 hex digest over the manifest |
//! | [`dump`] | raw or decoded source assets, bypassing the manifest |
//!
//! A bundle is all or nothing: if any image a manifest entry names is missing
//! or does not match its recorded hash, the assembler fails instead of
//! silently leaving the item out. Archives are written to `<out>.partial` and
//! renamed only after the last entry is flushed.

mod archive;
pub mod dump;
pub mod checksum;
pub mod export;
pub mod place;
pub mod service;
pub mod web;

pub use archive::ArchiveWriter;
pub use dump::{AuxScope, AuxSummary, dump_assets};
pub use checksum::{manifest_checksum, write_checksum};
pub use export::{export_name, write_export_collection};
pub use place::{FilePlacer, LinkMode, PlacementError};
pub use service::write_service_bundle;
pub use web::{WebDirSummary, write_web_dir};

use crate::assets::AssetError;
use crate::cache::{BlobStore, OutputRecord, hash_bytes};
use crate::classify::Resolution;
use crate::error::ErrorKind;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("type {type_id}: built image {hash} is missing from the blob store")]
    MissingBlob { type_id: u32, hash: String },
    #[error("type {type_id}: built image {hash} does not match its recorded hash")]
    BlobMismatch { type_id: u32, hash: String },
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Placement(#[from] PlacementError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

impl BundleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingBlob { .. } | Self::BlobMismatch { .. } => ErrorKind::MissingAsset,
            Self::Asset(e) => e.kind(),
            Self::Io { .. } | Self::Json(_) | Self::Placement(_) => ErrorKind::PlacementFailure,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Read a built image and check it against its manifest record.
pub(crate) fn read_verified(
    blobs: &BlobStore,
    type_id: u32,
    resolution: Resolution,
    record: &OutputRecord,
) -> Result<Vec<u8>, BundleError> {
    let path = blobs.path(&record.hash, resolution.format());
    let bytes = std::fs::read(&path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => BundleError::MissingBlob {
            type_id,
            hash: record.hash.clone(),
        },
        _ => BundleError::Io { path, source },
    })?;
    if bytes.len() as u64 != record.len || hash_bytes(&bytes) != record.hash {
        return Err(BundleError::BlobMismatch {
            type_id,
            hash: record.hash.clone(),
        });
    }
    Ok(bytes)
}
