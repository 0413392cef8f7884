//! Image stages: load and crop, normalize, binarize, and audit rendering.

pub mod binarize;
pub mod loader;
pub mod normalize;
pub mod preview;

pub use binarize::threshold_inverted;
pub use loader::{crop_to_region, RawImage, ScoreboardRegion};
pub use normalize::normalize;
pub use preview::render_grid_overlay;

use serde::Serialize;

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}
