use image::GrayImage;

pub const INK: u8 = 0;
pub const PAPER: u8 = 255;

/// Inverted binary threshold.
///
/// Pixels brighter than `threshold` become black (ink), everything else
/// becomes white (paper). Bright scoreboard text on a dark panel ends up as
/// dark strokes on a white page, which is what Tesseract expects.
pub fn threshold_inverted(img: GrayImage, threshold: u8) -> GrayImage {
    let mut img = img;
    for pixel in img.pixels_mut() {
        pixel[0] = if pixel[0] > threshold { INK } else { PAPER };
    }
    img
}

/// True if any pixel in the image is ink.
pub fn has_ink(img: &GrayImage) -> bool {
    img.pixels().any(|p| p[0] == INK)
}
