//! Auxiliary dumps of source assets.
//!
//! These bypass classification, composition and the manifest entirely; they
//! exist to audit what the asset mirror actually holds.

use super::BundleError;
use crate::assets::{AssetFetcher, AssetRef};
use image::ImageFormat;
use rayon::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxScope {
    /// Raw icon files as `{icon_id}.{ext}`, bytes untouched.
    Icons,
    /// Every asset in the inventory, decoded and re-encoded as PNG under its
    /// mirror-relative path.
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Dump assets to `out_dir`. Assets that cannot be fetched or decoded are
/// logged and counted as skipped; only write errors fail the dump.
pub fn dump_assets(
    fetcher: &dyn AssetFetcher,
    scope: AuxScope,
    out_dir: &Path,
) -> Result<AuxSummary, BundleError> {
    let mut inventory = fetcher.inventory()?;
    if scope == AuxScope::Icons {
        inventory.retain(|a| matches!(a, AssetRef::Icon(_)));
    }
    std::fs::create_dir_all(out_dir).map_err(BundleError::io(out_dir))?;

    let written = inventory
        .par_iter()
        .map(|asset| {
            let Some((dest, bytes)) = prepare(fetcher, asset, scope, out_dir) else {
                return Ok(false);
            };
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(BundleError::io(parent))?;
            }
            std::fs::write(&dest, bytes).map_err(BundleError::io(&dest))?;
            Ok(true)
        })
        .collect::<Result<Vec<bool>, BundleError>>()?;

    let summary = AuxSummary {
        written: written.iter().filter(|w| **w).count(),
        skipped: written.iter().filter(|w| !**w).count(),
    };
    tracing::info!(
        written = summary.written,
        skipped = summary.skipped,
        path = %out_dir.display(),
        "dumped assets"
    );
    Ok(summary)
}

/// Destination and bytes for one asset, or `None` when it has to be skipped.
fn prepare(
    fetcher: &dyn AssetFetcher,
    asset: &AssetRef,
    scope: AuxScope,
    out_dir: &Path,
) -> Option<(PathBuf, Vec<u8>)> {
    let bytes = fetcher
        .fetch(asset)
        .inspect_err(|e| tracing::warn!(%asset, error = %e, "skipping unfetchable asset"))
        .ok()?;

    match (scope, asset) {
        (AuxScope::Icons, AssetRef::Icon(id)) => {
            let ext = image::guess_format(&bytes)
                .ok()
                .and_then(|f| f.extensions_str().first().copied())
                .unwrap_or("bin");
            Some((out_dir.join(format!("{id}.{ext}")), bytes))
        }
        _ => {
            let mut png = Vec::new();
            image::load_from_memory(&bytes)
                .and_then(|img| img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png))
                .inspect_err(|e| tracing::warn!(%asset, error = %e, "skipping undecodable asset"))
                .ok()?;
            Some((out_dir.join(asset.relative_path()).with_extension("png"), png))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{GraphicVariant, MemoryFetcher};
    use crate::test_helpers::{gradient_jpeg, solid_png};
    use tempfile::TempDir;

    fn fetcher() -> MemoryFetcher {
        let mut f = MemoryFetcher::new();
        f.insert(AssetRef::Icon(7), solid_png(16, [1, 2, 3, 255]));
        f.insert(AssetRef::Icon(8), gradient_jpeg(16, 1));
        f.insert(AssetRef::Icon(9), b"not an image".to_vec());
        f.insert(
            AssetRef::Graphic {
                graphic_id: 11,
                variant: GraphicVariant::Render512,
            },
            gradient_jpeg(32, 2),
        );
        f.insert(
            AssetRef::resource("res:/ui/texture/icons/bpo.png"),
            solid_png(8, [9, 9, 9, 255]),
        );
        f
    }

    #[test]
    fn icons_scope_copies_raw_bytes_with_sniffed_extension() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher();
        let summary = dump_assets(&f, AuxScope::Icons, tmp.path()).unwrap();
        assert_eq!(summary, AuxSummary { written: 3, skipped: 0 });

        assert_eq!(
            std::fs::read(tmp.path().join("7.png")).unwrap(),
            solid_png(16, [1, 2, 3, 255])
        );
        assert!(tmp.path().join("8.jpg").exists());
        assert!(tmp.path().join("9.bin").exists());
        assert!(!tmp.path().join("graphics").exists());
    }

    #[test]
    fn all_scope_decodes_everything_to_png() {
        let tmp = TempDir::new().unwrap();
        let f = fetcher();
        let summary = dump_assets(&f, AuxScope::All, tmp.path()).unwrap();
        assert_eq!(summary, AuxSummary { written: 4, skipped: 1 });

        let render = tmp.path().join("graphics/11_512.png");
        let img = image::open(&render).unwrap();
        assert_eq!(img.width(), 32);
        assert!(tmp.path().join("res/ui/texture/icons/bpo.png").exists());
        assert!(tmp.path().join("icons/8.png").exists());
        assert!(!tmp.path().join("icons/9.png").exists());
    }
}
