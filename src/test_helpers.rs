//! Shared test utilities: metadata builders and synthetic source assets.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let item = ItemBuilder::new(47107).icon(21).meta_group(2).blueprint().build();
//! let fetcher = catalog_fetcher(&[item.clone()]);
//! ```

use crate::assets::{AssetRef, GraphicVariant, MemoryFetcher};
use crate::classify::{
    BPC_BACKGROUND, BPC_OVERLAY, BPO_BACKGROUND, BPO_OVERLAY, REACTION_BACKGROUNDS,
    REACTION_DEFAULT_BACKGROUND, RELIC_BACKGROUND, RELIC_OVERLAY, TECH_BADGES,
};
use crate::metadata::ItemMetadata;
use image::{ImageEncoder, RgbImage, RgbaImage};

// =========================================================================
// Metadata
// =========================================================================

/// Fluent builder for [`ItemMetadata`]. Defaults to a plain module in
/// category 6, group 25.
pub struct ItemBuilder(ItemMetadata);

impl ItemBuilder {
    pub fn new(type_id: u32) -> Self {
        Self(ItemMetadata::new(type_id, 6, 25))
    }

    pub fn category(mut self, category_id: u32) -> Self {
        self.0.category_id = category_id;
        self
    }

    pub fn group(mut self, group_id: u32) -> Self {
        self.0.group_id = group_id;
        self
    }

    pub fn meta_group(mut self, meta_group_id: u32) -> Self {
        self.0.meta_group_id = Some(meta_group_id);
        self
    }

    pub fn icon(mut self, icon_id: u32) -> Self {
        self.0.icon_id = Some(icon_id);
        self
    }

    pub fn graphic(mut self, graphic_id: u32) -> Self {
        self.0.graphic_id = Some(graphic_id);
        self
    }

    pub fn render_model(mut self) -> Self {
        self.0.has_render_model = true;
        self
    }

    pub fn skin_material(mut self, material_id: u32) -> Self {
        self.0.is_skin_material = true;
        self.0.skin_material_id = Some(material_id);
        self
    }

    pub fn blueprint(mut self) -> Self {
        self.0.is_blueprint = true;
        self
    }

    pub fn blueprint_copy(mut self) -> Self {
        self.0.is_blueprint_copy = true;
        self
    }

    pub fn reaction(mut self, race_id: Option<u32>) -> Self {
        self.0.is_reaction = true;
        self.0.race_id = race_id;
        self
    }

    pub fn build(self) -> ItemMetadata {
        self.0
    }
}

// =========================================================================
// Synthetic rasters
// =========================================================================

/// Encode a square, single-colour RGBA PNG.
pub fn solid_png(size: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(size, size, image::Rgba(rgba));
    let mut out = Vec::new();
    image::codecs::png::PngEncoder::new(&mut out)
        .write_image(img.as_raw(), size, size, image::ExtendedColorType::Rgba8)
        .unwrap();
    out
}

/// Encode a square gradient RGB JPEG.
pub fn gradient_jpeg(size: u32, seed: u8) -> Vec<u8> {
    let img = RgbImage::from_fn(size, size, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, seed])
    });
    let mut out = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut out)
        .write_image(img.as_raw(), size, size, image::ExtendedColorType::Rgb8)
        .unwrap();
    out
}

fn id_colour(id: u32) -> [u8; 4] {
    [(id % 251) as u8, (id / 251 % 251) as u8, 200, 255]
}

// =========================================================================
// Asset stores
// =========================================================================

/// Every fixed UI texture classification can reference.
pub fn standard_fetcher() -> MemoryFetcher {
    let mut fetcher = MemoryFetcher::new();
    for path in [
        BPO_BACKGROUND,
        BPC_BACKGROUND,
        RELIC_BACKGROUND,
        REACTION_DEFAULT_BACKGROUND,
    ] {
        fetcher.insert(AssetRef::resource(path), solid_png(64, [20, 30, 40, 255]));
    }
    for path in [BPO_OVERLAY, BPC_OVERLAY, RELIC_OVERLAY] {
        fetcher.insert(AssetRef::resource(path), solid_png(64, [30, 30, 30, 96]));
    }
    for (race, path) in REACTION_BACKGROUNDS {
        fetcher.insert(AssetRef::resource(path), solid_png(64, [race as u8 * 20, 0, 60, 255]));
    }
    for (meta, path) in TECH_BADGES {
        fetcher.insert(AssetRef::resource(path), solid_png(16, [255, meta as u8, 0, 255]));
    }
    fetcher
}

/// [`standard_fetcher`] plus every item-specific asset the given items
/// reference, each with a distinct colour.
pub fn catalog_fetcher(items: &[ItemMetadata]) -> MemoryFetcher {
    let mut fetcher = standard_fetcher();
    for item in items {
        if let Some(icon_id) = item.icon_id {
            fetcher.insert(AssetRef::Icon(icon_id), solid_png(128, id_colour(icon_id)));
        }
        if let Some(graphic_id) = item.graphic_id {
            fetcher.insert(
                AssetRef::Graphic {
                    graphic_id,
                    variant: GraphicVariant::Icon64,
                },
                solid_png(64, id_colour(graphic_id)),
            );
            fetcher.insert(
                AssetRef::Graphic {
                    graphic_id,
                    variant: GraphicVariant::Render512,
                },
                gradient_jpeg(512, (graphic_id % 256) as u8),
            );
        }
        if let Some(material) = item.skin_material_id {
            fetcher.insert(AssetRef::Skin(material), solid_png(64, id_colour(material)));
        }
    }
    fetcher
}
