//! Source asset references, fetching, and the shared in-run asset cache.
//!
//! Raw bytes always arrive through an [`AssetFetcher`]. Whether that is a
//! local mirror directory, an in-memory map, or a CDN client with its own
//! retry policy is invisible to the rest of the pipeline.
//!
//! ## On-disk layout
//!
//! Every [`AssetRef`] maps to exactly one relative path, and back:
//!
//! ```text
//! assets/
//! ├── icons/21.png                      # AssetRef::Icon(21)
//! ├── graphics/46_64.png                # AssetRef::Graphic { 46, Icon64 }
//! ├── graphics/46_512.jpg               # AssetRef::Graphic { 46, Render512 }
//! ├── skins/1337.png                    # AssetRef::Skin(1337)
//! └── res/ui/texture/icons/bpo.png      # AssetRef::Resource("res:/ui/texture/icons/bpo.png")
//! ```
//!
//! ## De-duplication
//!
//! [`AssetCache`] keeps one slot per asset. The first caller performs the
//! fetch; concurrent callers for the same asset block on that slot and share
//! the result, so an asset referenced by ten thousand recipes is fetched and
//! hashed once. Decoding is lazy and equally shared: fingerprinting only needs
//! the content hash, so a fully fresh run never decodes a single image.

use crate::cache::hash_bytes;
use crate::error::ErrorKind;
use image::RgbaImage;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use thiserror::Error;
use walkdir::WalkDir;

const RESOURCE_PREFIX: &str = "res:/";

/// Which pre-rendered graphic of a 3D model an asset points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GraphicVariant {
    Icon64,
    Render512,
}

/// A reference to one source raster asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetRef {
    /// Icon file by icon id.
    Icon(u32),
    /// Pre-rendered graphic of a render model.
    Graphic {
        graphic_id: u32,
        variant: GraphicVariant,
    },
    /// SKIN material swatch.
    Skin(u32),
    /// Fixed UI texture (backgrounds, overlays, badges), as a `res:/` path.
    Resource(String),
}

impl AssetRef {
    pub fn resource(path: &str) -> Self {
        Self::Resource(path.to_string())
    }

    /// Path of this asset relative to an asset mirror root.
    pub fn relative_path(&self) -> PathBuf {
        match self {
            Self::Icon(id) => PathBuf::from(format!("icons/{id}.png")),
            Self::Graphic {
                graphic_id,
                variant: GraphicVariant::Icon64,
            } => PathBuf::from(format!("graphics/{graphic_id}_64.png")),
            Self::Graphic {
                graphic_id,
                variant: GraphicVariant::Render512,
            } => PathBuf::from(format!("graphics/{graphic_id}_512.jpg")),
            Self::Skin(id) => PathBuf::from(format!("skins/{id}.png")),
            Self::Resource(path) => {
                let rest = path.strip_prefix(RESOURCE_PREFIX).unwrap_or(path);
                Path::new("res").join(rest)
            }
        }
    }

    /// Inverse of [`relative_path`](Self::relative_path). Unknown layouts
    /// return `None`.
    pub fn from_relative_path(rel: &Path) -> Option<Self> {
        let parts: Vec<&str> = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        match parts.as_slice() {
            ["icons", file] => file.strip_suffix(".png")?.parse().ok().map(Self::Icon),
            ["skins", file] => file.strip_suffix(".png")?.parse().ok().map(Self::Skin),
            ["graphics", file] => {
                if let Some(stem) = file.strip_suffix("_64.png") {
                    stem.parse().ok().map(|graphic_id| Self::Graphic {
                        graphic_id,
                        variant: GraphicVariant::Icon64,
                    })
                } else {
                    let stem = file.strip_suffix("_512.jpg")?;
                    stem.parse().ok().map(|graphic_id| Self::Graphic {
                        graphic_id,
                        variant: GraphicVariant::Render512,
                    })
                }
            }
            ["res", rest @ ..] if !rest.is_empty() => {
                Some(Self::Resource(format!("{RESOURCE_PREFIX}{}", rest.join("/"))))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Icon(id) => write!(f, "icon:{id}"),
            Self::Graphic {
                graphic_id,
                variant: GraphicVariant::Icon64,
            } => write!(f, "graphic:{graphic_id}/64"),
            Self::Graphic {
                graphic_id,
                variant: GraphicVariant::Render512,
            } => write!(f, "graphic:{graphic_id}/512"),
            Self::Skin(id) => write!(f, "skin:{id}"),
            Self::Resource(path) => f.write_str(path),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    #[error("missing asset {0}")]
    Missing(AssetRef),
    #[error("failed to fetch {asset}: {reason}")]
    Fetch { asset: AssetRef, reason: String },
    #[error("failed to decode {asset}: {reason}")]
    Decode { asset: AssetRef, reason: String },
}

impl AssetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Missing(_) | Self::Fetch { .. } => ErrorKind::MissingAsset,
            Self::Decode { .. } => ErrorKind::AssetDecodeFailure,
        }
    }
}

/// Supplies raw source bytes.
///
/// Implementations may do network I/O and retry internally; callers only see
/// the final bytes or an [`AssetError`].
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetError>;

    /// Every asset this source knows about, sorted. Used by the auxiliary
    /// dumps only.
    fn inventory(&self) -> Result<Vec<AssetRef>, AssetError>;
}

/// Fetcher backed by a local mirror directory (see the module docs for the
/// layout).
#[derive(Debug, Clone)]
pub struct DirAssetFetcher {
    root: PathBuf,
}

impl DirAssetFetcher {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl AssetFetcher for DirAssetFetcher {
    fn fetch(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetError> {
        let path = self.root.join(asset.relative_path());
        std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::Missing(asset.clone()),
            _ => AssetError::Fetch {
                asset: asset.clone(),
                reason: format!("{}: {e}", path.display()),
            },
        })
    }

    fn inventory(&self) -> Result<Vec<AssetRef>, AssetError> {
        let mut assets = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| AssetError::Fetch {
                asset: AssetRef::Resource(self.root.display().to_string()),
                reason: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            match AssetRef::from_relative_path(rel) {
                Some(asset) => assets.push(asset),
                None => tracing::debug!(path = %rel.display(), "ignoring unrecognised asset file"),
            }
        }
        assets.sort();
        Ok(assets)
    }
}

/// Fetcher holding every asset in memory. Counts fetches so callers can
/// observe de-duplication.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    assets: BTreeMap<AssetRef, Vec<u8>>,
    fetches: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetRef, bytes: Vec<u8>) {
        self.assets.insert(asset, bytes);
    }

    pub fn remove(&mut self, asset: &AssetRef) {
        self.assets.remove(asset);
    }

    /// Number of `fetch` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, asset: &AssetRef) -> Result<Vec<u8>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.assets
            .get(asset)
            .cloned()
            .ok_or_else(|| AssetError::Missing(asset.clone()))
    }

    fn inventory(&self) -> Result<Vec<AssetRef>, AssetError> {
        Ok(self.assets.keys().cloned().collect())
    }
}

/// One fetched source asset: raw bytes, their content hash, and a lazily
/// decoded RGBA raster.
pub struct SourceAsset {
    asset: AssetRef,
    bytes: Vec<u8>,
    hash: String,
    decoded: OnceLock<Result<Arc<RgbaImage>, AssetError>>,
}

impl SourceAsset {
    fn new(asset: AssetRef, bytes: Vec<u8>) -> Self {
        let hash = hash_bytes(&bytes);
        Self {
            asset,
            bytes,
            hash,
            decoded: OnceLock::new(),
        }
    }

    /// SHA-256 of the raw bytes, hex encoded.
    pub fn content_hash(&self) -> &str {
        &self.hash
    }

    /// Decode to RGBA8. Decoding happens at most once per asset per run.
    pub fn decode(&self) -> Result<Arc<RgbaImage>, AssetError> {
        self.decoded
            .get_or_init(|| {
                image::load_from_memory(&self.bytes)
                    .map(|img| Arc::new(img.to_rgba8()))
                    .map_err(|e| AssetError::Decode {
                        asset: self.asset.clone(),
                        reason: e.to_string(),
                    })
            })
            .clone()
    }
}

type Slot = Arc<OnceLock<Result<Arc<SourceAsset>, AssetError>>>;

/// Run-scoped cache in front of an [`AssetFetcher`].
///
/// Failures are cached too: a missing asset is reported once per run, not
/// re-fetched by every recipe that references it.
pub struct AssetCache {
    fetcher: Arc<dyn AssetFetcher>,
    slots: Mutex<HashMap<AssetRef, Slot>>,
}

impl AssetCache {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, asset: &AssetRef) -> Result<Arc<SourceAsset>, AssetError> {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(asset.clone()).or_default())
        };
        slot.get_or_init(|| {
            self.fetcher
                .fetch(asset)
                .map(|bytes| Arc::new(SourceAsset::new(asset.clone(), bytes)))
        })
        .clone()
    }

    pub fn content_hash(&self, asset: &AssetRef) -> Result<String, AssetError> {
        self.get(asset).map(|a| a.content_hash().to_string())
    }

    pub fn decode(&self, asset: &AssetRef) -> Result<Arc<RgbaImage>, AssetError> {
        self.get(asset)?.decode()
    }
}
