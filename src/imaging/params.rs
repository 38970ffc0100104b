//! Encoder and resampling parameters.
//!
//! Everything here is part of the determinism contract: two runs with the
//! same [`EncodeParams`] on the same source bytes must produce byte-identical
//! outputs on every platform.

use image::imageops::FilterType;

/// Resampling filter for every layer whose native size differs from its
/// placement. Fixed; changing it changes every output.
pub const RESAMPLING: FilterType = FilterType::Lanczos3;

/// Stable name of a resampling filter, as it appears in signatures.
pub fn filter_name(filter: FilterType) -> &'static str {
    match filter {
        FilterType::Nearest => "nearest",
        FilterType::Triangle => "triangle",
        FilterType::CatmullRom => "catmullrom",
        FilterType::Gaussian => "gaussian",
        FilterType::Lanczos3 => "lanczos3",
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(95)
    }
}

/// Output encoder settings.
///
/// Icon-scale outputs are always PNG (default compression, adaptive
/// filtering); render-scale outputs are JPEG at `render_quality`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeParams {
    pub render_quality: Quality,
}

impl EncodeParams {
    /// Stable text form, folded into recipe fingerprints.
    pub fn signature(&self) -> String {
        format!(
            "png:default:adaptive;jpeg:q{};resample:{}",
            self.render_quality.value(),
            filter_name(RESAMPLING)
        )
    }
}
