//! Audit rendering: draws the segmentation grid over the processed surface
//! so an operator can check that cells line up with the scoreboard fields.

use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

use crate::grid::Cell;

pub const COLOR_CELL: Rgba<u8> = Rgba([0, 200, 0, 255]); // Green
pub const COLOR_INKED_CELL: Rgba<u8> = Rgba([255, 128, 0, 255]); // Orange

/// Renders the processed surface with each cell outlined.
///
/// Cells containing ink are outlined in orange, empty cells in green.
pub fn render_grid_overlay<'a>(
    processed: &GrayImage,
    cells: impl IntoIterator<Item = &'a Cell>,
    thickness: u32,
) -> RgbaImage {
    let mut img = DynamicImage::ImageLuma8(processed.clone()).into_rgba8();

    for cell in cells {
        let color = if super::binarize::has_ink(&cell.image) {
            COLOR_INKED_CELL
        } else {
            COLOR_CELL
        };
        let b = cell.bounds;
        draw_rect(&mut img, b.x, b.y, b.width, b.height, color, thickness);
    }

    img
}

/// Draws a rectangle border on an image, clipped to the image bounds.
pub fn draw_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>, thickness: u32) {
    if w == 0 || h == 0 {
        return;
    }
    let (img_w, img_h) = img.dimensions();
    let mut plot = |px: u32, py: u32| {
        if px < img_w && py < img_h {
            img.put_pixel(px, py, color);
        }
    };

    for t in 0..thickness.min(w).min(h) {
        for dx in 0..w {
            plot(x + dx, y + t);
            plot(x + dx, y + h - 1 - t);
        }
        for dy in 0..h {
            plot(x + t, y + dy);
            plot(x + w - 1 - t, y + dy);
        }
    }
}
