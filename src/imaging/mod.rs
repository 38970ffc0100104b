//! Image composition: pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::load_from_memory` (PNG, JPEG) |
//! | **Resample** | `imageops::resize`, Lanczos3 |
//! | **Blend** | integer source-over and additive |
//! | **Encode** | PNG for icon scale, JPEG for render scale |
//!
//! The module is split into:
//! - **Calculations**: placement math on the design grid (unit testable)
//! - **Parameters**: encoder settings and the fixed resampling filter
//! - **Operations**: per-pixel blending
//! - **Backend**: [`Compositor`] trait + [`RasterCompositor`]

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod raster_backend;

pub use backend::{BuiltOutputs, ComposeError, Compositor};
pub use calculations::scale_placement;
pub use params::{EncodeParams, Quality, RESAMPLING};
pub use raster_backend::RasterCompositor;
