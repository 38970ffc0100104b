//! Pure Rust compositor built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG) | `image::load_from_memory` (via [`AssetCache`]) |
//! | Resample | `image::imageops::resize` with `Lanczos3` |
//! | Blend | integer over / additive ([`operations`](super::operations)) |
//! | Encode → PNG | `PngEncoder` (default compression, adaptive filter) |
//! | Encode → JPEG | `JpegEncoder` at the configured render quality |

use super::backend::{BuiltOutputs, ComposeError, Compositor};
use super::calculations::scale_placement;
use super::operations::{blend_layer, fit_layer};
use super::params::EncodeParams;
use crate::assets::AssetCache;
use crate::classify::{CompositionRecipe, OutputFormat, Resolution};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbaImage};

/// Production [`Compositor`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterCompositor {
    params: EncodeParams,
}

impl RasterCompositor {
    pub fn new(params: EncodeParams) -> Self {
        Self { params }
    }

    /// Rasterize every layer, bottom first, onto a transparent canvas.
    pub fn rasterize(
        &self,
        recipe: &CompositionRecipe,
        assets: &AssetCache,
        resolution: Resolution,
    ) -> Result<RgbaImage, ComposeError> {
        let px = resolution.pixels();
        let mut canvas = RgbaImage::new(px, px);
        for layer in &recipe.layers {
            let source = assets.decode(&layer.source)?;
            let (x, y, size) = scale_placement(layer.placement, px);
            let fitted = fit_layer(&source, size);
            blend_layer(&mut canvas, &fitted, x, y, layer.blend);
        }
        Ok(canvas)
    }

    fn encode(&self, canvas: RgbaImage, resolution: Resolution) -> Result<Vec<u8>, ComposeError> {
        let (w, h) = canvas.dimensions();
        let mut out = Vec::new();
        let result = match resolution.format() {
            OutputFormat::Png => PngEncoder::new_with_quality(
                &mut out,
                CompressionType::Default,
                PngFilter::Adaptive,
            )
            .write_image(canvas.as_raw(), w, h, ExtendedColorType::Rgba8),
            OutputFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(canvas).to_rgb8();
                let quality = self.params.render_quality.value() as u8;
                JpegEncoder::new_with_quality(&mut out, quality).write_image(
                    rgb.as_raw(),
                    w,
                    h,
                    ExtendedColorType::Rgb8,
                )
            }
        };
        result.map_err(|e| ComposeError::Encode {
            resolution,
            reason: e.to_string(),
        })?;
        Ok(out)
    }
}

impl Compositor for RasterCompositor {
    fn compose(
        &self,
        recipe: &CompositionRecipe,
        assets: &AssetCache,
    ) -> Result<BuiltOutputs, ComposeError> {
        let mut outputs = BuiltOutputs::new();
        for &resolution in &recipe.resolutions {
            let canvas = self.rasterize(recipe, assets, resolution)?;
            outputs.insert(resolution, self.encode(canvas, resolution)?);
        }
        Ok(outputs)
    }

    fn encoding_params(&self) -> String {
        self.params.signature()
    }
}
