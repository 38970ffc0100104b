//! Compositor trait and shared types.
//!
//! The [`Compositor`] trait is the seam between the pipeline (which decides
//! *whether* to build) and pixel work (which decides *how*). The production
//! implementation is [`RasterCompositor`](super::raster_backend::RasterCompositor);
//! tests swap in a recording mock to count composition calls.

use crate::assets::{AssetCache, AssetError};
use crate::classify::{CompositionRecipe, Resolution};
use crate::error::ErrorKind;
use std::collections::BTreeMap;
use thiserror::Error;

/// Encoded image bytes per target resolution.
pub type BuiltOutputs = BTreeMap<Resolution, Vec<u8>>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("failed to encode {resolution}px output: {reason}")]
    Encode {
        resolution: Resolution,
        reason: String,
    },
}

impl ComposeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Asset(e) => e.kind(),
            Self::Encode { .. } => ErrorKind::AssetDecodeFailure,
        }
    }
}

/// Executes a recipe. Pure: never writes to storage and never decides
/// whether it should run.
pub trait Compositor: Sync {
    /// Produce one encoded image per resolution in the recipe.
    fn compose(
        &self,
        recipe: &CompositionRecipe,
        assets: &AssetCache,
    ) -> Result<BuiltOutputs, ComposeError>;

    /// Stable description of every encoder setting that affects output
    /// bytes. Folded into recipe fingerprints.
    fn encoding_params(&self) -> String;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::classify::IconKind;
    use std::sync::Mutex;

    /// Mock compositor that records recipes without rasterizing.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// Every layer is still fetched through the asset cache, so missing
    /// assets fail exactly as they would in production. Output bytes are
    /// derived from the layers' content hashes.
    #[derive(Default)]
    pub struct MockCompositor {
        pub calls: Mutex<Vec<RecordedCompose>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedCompose {
        pub kind: IconKind,
        pub layers: Vec<String>,
    }

    impl MockCompositor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn get_calls(&self) -> Vec<RecordedCompose> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Compositor for MockCompositor {
        fn compose(
            &self,
            recipe: &CompositionRecipe,
            assets: &AssetCache,
        ) -> Result<BuiltOutputs, ComposeError> {
            self.calls.lock().unwrap().push(RecordedCompose {
                kind: recipe.kind,
                layers: recipe.assets().map(|a| a.to_string()).collect(),
            });

            let mut body = recipe.kind.to_string();
            for asset in recipe.assets() {
                body.push(':');
                body.push_str(&assets.content_hash(asset)?);
            }
            Ok(recipe
                .resolutions
                .iter()
                .map(|res| (*res, format!("{res}|{body}").into_bytes()))
                .collect())
        }

        fn encoding_params(&self) -> String {
            "mock".to_string()
        }
    }

    #[test]
    fn mock_records_recipe_layers() {
        use crate::classify::{ClassifyOptions, classify};
        use crate::test_helpers::{ItemBuilder, catalog_fetcher};
        use std::sync::Arc;

        let item = ItemBuilder::new(1).icon(5).build();
        let assets = AssetCache::new(Arc::new(catalog_fetcher(std::slice::from_ref(&item))));
        let recipe = classify(&item, &ClassifyOptions::default()).unwrap().primary;

        let compositor = MockCompositor::new();
        let out = compositor.compose(&recipe, &assets).unwrap();

        assert_eq!(out.len(), 1);
        assert!(out.contains_key(&Resolution::Icon64));
        assert_eq!(
            compositor.get_calls(),
            vec![RecordedCompose {
                kind: IconKind::Icon,
                layers: vec!["icon:5".to_string()],
            }]
        );
    }

    #[test]
    fn compose_error_kind_follows_asset_error() {
        let err = ComposeError::from(AssetError::Missing(crate::assets::AssetRef::Icon(1)));
        assert_eq!(err.kind(), ErrorKind::MissingAsset);
    }
}
