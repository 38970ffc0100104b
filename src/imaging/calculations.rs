//! Pure placement math.
//!
//! Layer placements live on the 64×64 design grid; these functions map them
//! onto a concrete canvas. Integer-only so results never depend on float
//! rounding behaviour.

use crate::classify::{DESIGN_GRID, Placement};

/// Pixel rectangle `(x, y, size)` of a placement on a `canvas_px` canvas.
///
/// # Examples
/// ```
/// # use icon_builder::classify::Placement;
/// # use icon_builder::imaging::scale_placement;
/// assert_eq!(scale_placement(Placement::FULL, 512), (0, 0, 512));
/// assert_eq!(scale_placement(Placement::BADGE, 512), (0, 0, 128));
/// ```
pub fn scale_placement(placement: Placement, canvas_px: u32) -> (u32, u32, u32) {
    let scale = |v: u32| v * canvas_px / DESIGN_GRID;
    (
        scale(placement.x),
        scale(placement.y),
        scale(placement.size).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_placement_covers_canvas() {
        assert_eq!(scale_placement(Placement::FULL, 64), (0, 0, 64));
        assert_eq!(scale_placement(Placement::FULL, 512), (0, 0, 512));
    }

    #[test]
    fn badge_is_a_quarter_of_the_canvas() {
        assert_eq!(scale_placement(Placement::BADGE, 64), (0, 0, 16));
        assert_eq!(scale_placement(Placement::BADGE, 512), (0, 0, 128));
    }

    #[test]
    fn offsets_scale_with_canvas() {
        let p = Placement {
            x: 8,
            y: 16,
            size: 32,
        };
        assert_eq!(scale_placement(p, 128), (16, 32, 64));
    }

    #[test]
    fn tiny_canvas_never_yields_zero_size() {
        assert_eq!(scale_placement(Placement::BADGE, 2), (0, 0, 1));
    }
}
