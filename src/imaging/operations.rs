//! Pixel blending.
//!
//! All arithmetic is integer-only on 8-bit straight (non-premultiplied)
//! RGBA, so every platform produces the same bytes.
//!
//! | Mode | RGB | Alpha |
//! |---|---|---|
//! | [`Over`](BlendMode::Over) | Porter-Duff source-over | `sa + da·(1 − sa)` |
//! | [`Additive`](BlendMode::Additive) | `dc + sc·sa`, saturating | as over |

use super::params::RESAMPLING;
use crate::classify::BlendMode;
use image::{Rgba, RgbaImage};
use std::borrow::Cow;

/// Alpha of `src` over `dst`, scaled by 255 (range `0..=65025`).
fn over_alpha_255(sa: u32, da: u32) -> u32 {
    sa * 255 + da * (255 - sa)
}

fn out_alpha(oa255: u32) -> u8 {
    ((oa255 + 127) / 255) as u8
}

/// Source-over for one pixel.
pub fn over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let (sa, da) = (u32::from(src[3]), u32::from(dst[3]));
    let oa255 = over_alpha_255(sa, da);
    if oa255 == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |i: usize| {
        let num = u32::from(src[i]) * sa * 255 + u32::from(dst[i]) * da * (255 - sa);
        ((num + oa255 / 2) / oa255) as u8
    };
    Rgba([channel(0), channel(1), channel(2), out_alpha(oa255)])
}

/// Additive blend for one pixel: layer colour weighted by its alpha is added
/// to the canvas colour.
pub fn additive(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let (sa, da) = (u32::from(src[3]), u32::from(dst[3]));
    let channel = |i: usize| {
        let add = (u32::from(src[i]) * sa + 127) / 255;
        (u32::from(dst[i]) + add).min(255) as u8
    };
    Rgba([
        channel(0),
        channel(1),
        channel(2),
        out_alpha(over_alpha_255(sa, da)),
    ])
}

/// Resample `layer` to `size`×`size` unless it already is.
pub fn fit_layer(layer: &RgbaImage, size: u32) -> Cow<'_, RgbaImage> {
    if layer.dimensions() == (size, size) {
        Cow::Borrowed(layer)
    } else {
        Cow::Owned(image::imageops::resize(layer, size, size, RESAMPLING))
    }
}

/// Blend `layer` onto `canvas` with its top-left corner at `(x, y)`.
/// Pixels falling outside the canvas are clipped.
pub fn blend_layer(canvas: &mut RgbaImage, layer: &RgbaImage, x: u32, y: u32, mode: BlendMode) {
    let op = match mode {
        BlendMode::Over => over,
        BlendMode::Additive => additive,
    };
    let (cw, ch) = canvas.dimensions();
    for (lx, ly, px) in layer.enumerate_pixels() {
        let (cx, cy) = (x + lx, y + ly);
        if cx >= cw || cy >= ch {
            continue;
        }
        let dst = canvas.get_pixel_mut(cx, cy);
        *dst = op(*dst, *px);
    }
}
