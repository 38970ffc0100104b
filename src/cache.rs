//! Content-addressed build cache for incremental icon runs.
//!
//! Decoding, compositing and re-encoding ~40k icons is the expensive part of a
//! run. This module decides, per `(type_id, kind)`, whether the previous output
//! can be reused, stores built bytes in a blob store keyed by their hash, and
//! persists the [`BuildManifest`] that every bundle assembler reads.
//!
//! # Fingerprints
//!
//! A recipe fingerprint is SHA-256 over:
//!
//! 1. the icon kind discriminant,
//! 2. per layer: the source asset's content hash, its blend mode and placement,
//! 3. the sorted target resolutions,
//! 4. the compositor's encoding parameters.
//!
//! Source assets are hashed by content, not name or timestamp, so a re-fetch
//! that returns identical bytes keeps the cache warm while any upstream pixel
//! change invalidates every recipe that references the asset.
//!
//! # Storage
//!
//! ```text
//! <icon_dir>/
//! ├── manifest.json            # BuildManifest (version, signature, integrity, entries)
//! └── blobs/
//!     └── 3f/3f9a…c2.png       # built output, named by its SHA-256
//! ```
//!
//! The manifest is written to `manifest.json.tmp` and renamed into place, so
//! an aborted run never leaves a half-written manifest behind. Once it is in
//! place, blobs the new manifest no longer names are deleted. A manifest that
//! fails to parse, carries another version, or whose integrity hash does not
//! match its entries is treated as absent and the run rebuilds everything.
//!
//! # Concurrency
//!
//! [`CacheManager`] is shared across the worker pool. All entry state sits
//! behind one mutex (single writer); blob writes happen outside it and are
//! idempotent because blobs are content-addressed.

use crate::assets::{AssetCache, AssetError};
use crate::classify::{CompositionRecipe, IconKind, OutputFormat, Resolution};
use crate::error::ErrorKind;
use crate::imaging::BuiltOutputs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

/// Name of the manifest file within the icon directory.
const MANIFEST_FILENAME: &str = "manifest.json";

const BLOB_DIR: &str = "blobs";

/// Version of the manifest format. Bump this to invalidate every existing
/// cache when the format or fingerprint computation changes.
pub const MANIFEST_VERSION: u32 = 1;

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("manifest corrupt: {0}")]
    ManifestCorrupt(String),
    #[error("failed to write manifest {path}: {source}")]
    ManifestWriteFailure { path: PathBuf, source: io::Error },
}

impl CacheError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ManifestCorrupt(_) => ErrorKind::ManifestCorrupt,
            Self::Io { .. } | Self::Json(_) | Self::ManifestWriteFailure { .. } => {
                ErrorKind::ManifestWriteFailure
            }
        }
    }
}

/// SHA-256 of a byte slice, returned as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Content hash of a recipe and every source asset it references.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a recipe. Fetches (but never decodes) every referenced asset.
///
/// `encoding` describes the compositor's output parameters (see
/// [`Compositor::encoding_params`](crate::imaging::Compositor::encoding_params));
/// changing it rebuilds everything.
pub fn recipe_fingerprint(
    recipe: &CompositionRecipe,
    assets: &AssetCache,
    encoding: &str,
) -> Result<Fingerprint, AssetError> {
    let mut hasher = Sha256::new();
    hasher.update(b"recipe\0");
    hasher.update([recipe.kind.discriminant()]);
    hasher.update((recipe.layers.len() as u32).to_le_bytes());
    for layer in &recipe.layers {
        let content = assets.content_hash(&layer.source)?;
        hasher.update(content.as_bytes());
        hasher.update([layer.blend.discriminant()]);
        hasher.update(layer.placement.x.to_le_bytes());
        hasher.update(layer.placement.y.to_le_bytes());
        hasher.update(layer.placement.size.to_le_bytes());
    }

    let mut resolutions = recipe.resolutions.clone();
    resolutions.sort();
    resolutions.dedup();
    for res in resolutions {
        hasher.update(res.pixels().to_le_bytes());
    }

    hasher.update(b"encoding\0");
    hasher.update(encoding.as_bytes());
    Ok(Fingerprint(format!("{:x}", hasher.finalize())))
}

/// Aggregate signature over a set of `(type_id, kind, fingerprint)` keys.
/// Input order does not matter.
pub fn aggregate_signature<'a>(
    keys: impl IntoIterator<Item = (u32, IconKind, &'a Fingerprint)>,
) -> String {
    let mut keys: Vec<_> = keys.into_iter().collect();
    keys.sort();
    let mut hasher = Sha256::new();
    hasher.update(b"signature\0");
    for (type_id, kind, fingerprint) in keys {
        hasher.update(type_id.to_le_bytes());
        hasher.update([kind.discriminant()]);
        hasher.update(fingerprint.as_str().as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

/// One built output: content hash and byte length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub hash: String,
    pub len: u64,
}

/// Cached build result for one `(type_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub type_id: u32,
    pub kind: IconKind,
    pub recipe_fingerprint: Fingerprint,
    pub resolutions: BTreeMap<Resolution, OutputRecord>,
}

/// Persisted result of a run. Entries are sorted by `(type_id, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub version: u32,
    /// [`aggregate_signature`] over every entry.
    pub signature: String,
    /// Hash over the full entry list, checked on load.
    pub integrity: String,
    pub entries: Vec<CacheEntry>,
}

impl BuildManifest {
    pub fn from_entries(mut entries: Vec<CacheEntry>) -> Self {
        entries.sort_by_key(|e| (e.type_id, e.kind));
        let signature = aggregate_signature(
            entries
                .iter()
                .map(|e| (e.type_id, e.kind, &e.recipe_fingerprint)),
        );
        let integrity = integrity_hash(&entries);
        Self {
            version: MANIFEST_VERSION,
            signature,
            integrity,
            entries,
        }
    }

    pub fn empty() -> Self {
        Self::from_entries(Vec::new())
    }

    pub fn path(icon_dir: &Path) -> PathBuf {
        icon_dir.join(MANIFEST_FILENAME)
    }

    /// Load from the icon directory. `Ok(None)` when no manifest exists yet.
    pub fn load(icon_dir: &Path) -> Result<Option<Self>, CacheError> {
        let path = Self::path(icon_dir);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        let stored: Self = serde_json::from_str(&content)
            .map_err(|e| CacheError::ManifestCorrupt(format!("{}: {e}", path.display())))?;
        if stored.version != MANIFEST_VERSION {
            return Err(CacheError::ManifestCorrupt(format!(
                "version {} (expected {MANIFEST_VERSION})",
                stored.version
            )));
        }

        let rebuilt = Self::from_entries(stored.entries.clone());
        if rebuilt.integrity != stored.integrity || rebuilt.signature != stored.signature {
            return Err(CacheError::ManifestCorrupt(
                "integrity hash does not match entries".to_string(),
            ));
        }
        Ok(Some(rebuilt))
    }

    /// Write atomically: temp file, then rename. On failure the previous
    /// manifest is left untouched.
    pub fn persist(&self, icon_dir: &Path) -> Result<(), CacheError> {
        let path = Self::path(icon_dir);
        let tmp = icon_dir.join(format!("{MANIFEST_FILENAME}.tmp"));
        let json = serde_json::to_string_pretty(self)?;

        std::fs::create_dir_all(icon_dir)
            .and_then(|()| std::fs::write(&tmp, json))
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|source| CacheError::ManifestWriteFailure { path, source })
    }

    pub fn entry(&self, type_id: u32, kind: IconKind) -> Option<&CacheEntry> {
        self.entries
            .binary_search_by_key(&(type_id, kind), |e| (e.type_id, e.kind))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Entries of one item, in kind order.
    pub fn entries_for(&self, type_id: u32) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter().filter(move |e| e.type_id == type_id)
    }

    pub fn type_ids(&self) -> BTreeSet<u32> {
        self.entries.iter().map(|e| e.type_id).collect()
    }
}

fn integrity_hash(entries: &[CacheEntry]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"integrity\0");
    for entry in entries {
        hasher.update(entry.type_id.to_le_bytes());
        hasher.update([entry.kind.discriminant()]);
        hasher.update(entry.recipe_fingerprint.as_str().as_bytes());
        hasher.update(b"\0");
        for (res, output) in &entry.resolutions {
            hasher.update(res.pixels().to_le_bytes());
            hasher.update(output.hash.as_bytes());
            hasher.update(b"\0");
            hasher.update(output.len.to_le_bytes());
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Built outputs on disk, named by content hash.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(icon_dir: &Path) -> Self {
        Self {
            root: icon_dir.join(BLOB_DIR),
        }
    }

    pub fn path(&self, hash: &str, format: OutputFormat) -> PathBuf {
        let shard = hash.get(..2).unwrap_or("00");
        self.root
            .join(shard)
            .join(format!("{hash}.{}", format.extension()))
    }

    pub fn contains(&self, hash: &str, format: OutputFormat) -> bool {
        self.path(hash, format).is_file()
    }

    /// Store `bytes` unless a blob with the same hash already exists.
    pub fn write(&self, bytes: &[u8], format: OutputFormat) -> Result<OutputRecord, CacheError> {
        let hash = hash_bytes(bytes);
        let path = self.path(&hash, format);
        if !path.is_file() {
            let io_err = |source| CacheError::Io {
                path: path.clone(),
                source,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
            let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
            let tmp = path.with_extension(format!("{}.{seq}.tmp", format.extension()));
            std::fs::write(&tmp, bytes).map_err(io_err)?;
            std::fs::rename(&tmp, &path).map_err(io_err)?;
        }
        Ok(OutputRecord {
            hash,
            len: bytes.len() as u64,
        })
    }

    /// Delete every blob `manifest` does not name, plus temp files left by
    /// interrupted writes and shard directories that end up empty. Returns
    /// the number of files removed.
    ///
    /// Only call this once no write is in flight.
    pub fn prune(&self, manifest: &BuildManifest) -> Result<usize, CacheError> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let keep: BTreeSet<PathBuf> = manifest
            .entries
            .iter()
            .flat_map(|e| e.resolutions.iter())
            .map(|(res, out)| self.path(&out.hash, res.format()))
            .collect();

        let mut removed = 0;
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| CacheError::Io {
                path: self.root.clone(),
                source: e.into(),
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() || keep.contains(path) {
                continue;
            }
            std::fs::remove_file(path).map_err(|source| CacheError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            removed += 1;
        }
        for shard in std::fs::read_dir(&self.root)
            .map_err(|source| CacheError::Io {
                path: self.root.clone(),
                source,
            })?
            .flatten()
        {
            // Non-empty shards stay.
            let _ = std::fs::remove_dir(shard.path());
        }
        Ok(removed)
    }
}

#[derive(Debug, Default)]
struct CacheState {
    entries: BTreeMap<(u32, IconKind), CacheEntry>,
    touched: BTreeSet<(u32, IconKind)>,
}

/// Run-scoped owner of the manifest and blob store.
///
/// One manager per run; nothing here is process-global, so several builds
/// (different icon directories) can run in one process.
pub struct CacheManager {
    icon_dir: PathBuf,
    blobs: BlobStore,
    force_rebuild: bool,
    previous: Option<BuildManifest>,
    state: Mutex<CacheState>,
}

impl CacheManager {
    /// Open the cache in `icon_dir`. A corrupt manifest is logged and
    /// treated as absent.
    pub fn open(icon_dir: &Path, force_rebuild: bool) -> Result<Self, CacheError> {
        let previous = match BuildManifest::load(icon_dir) {
            Ok(manifest) => manifest,
            Err(CacheError::ManifestCorrupt(reason)) => {
                tracing::warn!(%reason, "ignoring corrupt manifest, rebuilding all items");
                None
            }
            Err(e) => return Err(e),
        };

        let entries = previous
            .iter()
            .flat_map(|m| m.entries.iter())
            .map(|e| ((e.type_id, e.kind), e.clone()))
            .collect();

        Ok(Self {
            icon_dir: icon_dir.to_path_buf(),
            blobs: BlobStore::new(icon_dir),
            force_rebuild,
            previous,
            state: Mutex::new(CacheState {
                entries,
                touched: BTreeSet::new(),
            }),
        })
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Manifest of the previous successful run, if one was loaded.
    pub fn previous(&self) -> Option<&BuildManifest> {
        self.previous.as_ref()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `(type_id, kind)` must be (re)built. True when forced, when
    /// there is no entry, when the fingerprint differs, or when any blob the
    /// entry names has gone missing.
    pub fn needs_build(&self, type_id: u32, kind: IconKind, fingerprint: &Fingerprint) -> bool {
        let mut state = self.lock();
        state.touched.insert((type_id, kind));
        if self.force_rebuild {
            return true;
        }
        match state.entries.get(&(type_id, kind)) {
            None => true,
            Some(entry) => {
                entry.recipe_fingerprint != *fingerprint
                    || entry
                        .resolutions
                        .iter()
                        .any(|(res, out)| !self.blobs.contains(&out.hash, res.format()))
            }
        }
    }

    /// Store built outputs and write/overwrite the entry.
    pub fn record(
        &self,
        type_id: u32,
        kind: IconKind,
        fingerprint: Fingerprint,
        outputs: &BuiltOutputs,
    ) -> Result<CacheEntry, CacheError> {
        let resolutions = outputs
            .iter()
            .map(|(res, bytes)| Ok((*res, self.blobs.write(bytes, res.format())?)))
            .collect::<Result<BTreeMap<_, _>, CacheError>>()?;

        let entry = CacheEntry {
            type_id,
            kind,
            recipe_fingerprint: fingerprint,
            resolutions,
        };
        let mut state = self.lock();
        state.touched.insert((type_id, kind));
        state.entries.insert((type_id, kind), entry.clone());
        Ok(entry)
    }

    /// Drop every entry of a failed item so it is excluded from this run's
    /// manifest and retried next run.
    pub fn discard(&self, type_id: u32) {
        let mut state = self.lock();
        state.entries.retain(|(id, _), _| *id != type_id);
        state.touched.retain(|(id, _)| *id != type_id);
    }

    /// Signature the manifest would carry if `candidates` all turned out
    /// fresh: the candidates plus the previous entries of observed items that
    /// are not being processed this run.
    pub fn projected_signature(
        &self,
        candidates: &[(u32, IconKind, Fingerprint)],
        observed: &BTreeSet<u32>,
    ) -> String {
        let candidate_ids: BTreeSet<u32> = candidates.iter().map(|(id, _, _)| *id).collect();
        let retained = self
            .previous
            .iter()
            .flat_map(|m| m.entries.iter())
            .filter(|e| observed.contains(&e.type_id) && !candidate_ids.contains(&e.type_id))
            .map(|e| (e.type_id, e.kind, &e.recipe_fingerprint));
        aggregate_signature(
            candidates
                .iter()
                .map(|(id, kind, fp)| (*id, *kind, fp))
                .chain(retained),
        )
    }

    /// Prune and persist. Entries survive when their type id was observed
    /// and, if the item was processed this run, their kind was produced
    /// again.
    pub fn finalize(&self, observed: &BTreeSet<u32>) -> Result<BuildManifest, CacheError> {
        let manifest = {
            let state = self.lock();
            let processed: BTreeSet<u32> = state.touched.iter().map(|(id, _)| *id).collect();
            let entries = state
                .entries
                .iter()
                .filter(|((id, kind), _)| {
                    observed.contains(id)
                        && (!processed.contains(id) || state.touched.contains(&(*id, *kind)))
                })
                .map(|(_, entry)| entry.clone())
                .collect();
            BuildManifest::from_entries(entries)
        };
        manifest.persist(&self.icon_dir)?;
        match self.blobs.prune(&manifest) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "pruned unreferenced blobs"),
            Err(e) => tracing::warn!(error = %e, "failed to prune blob store"),
        }
        Ok(manifest)
    }
}

/// Summary of cache performance for a build run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u32,
    pub misses: u32,
    pub failures: u32,
}

impl CacheStats {
    pub fn hit(&mut self) {
        self.hits += 1;
    }

    pub fn miss(&mut self) {
        self.misses += 1;
    }

    pub fn fail(&mut self) {
        self.failures += 1;
    }

    pub fn total(&self) -> u32 {
        self.hits + self.misses + self.failures
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures > 0 {
            write!(
                f,
                "{} cached, {} built, {} failed ({} total)",
                self.hits,
                self.misses,
                self.failures,
                self.total()
            )
        } else if self.hits > 0 {
            write!(
                f,
                "{} cached, {} built ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} built", self.misses)
        }
    }
}
