use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbaImage};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};

use crate::error::{PipelineError, Stage};

/// Upscale, grayscale, then open (erode + dilate) with a square kernel.
///
/// Each step consumes the previous buffer. The upscale gives the recognizer
/// enough glyph resolution; the opening removes speckle without thickening
/// strokes.
pub fn normalize(img: RgbaImage, upscale_factor: u32, kernel: u32) -> Result<GrayImage, PipelineError> {
    let upscaled = upscale(img, upscale_factor)?;
    let gray = to_grayscale(upscaled);
    Ok(open(gray, kernel))
}

/// Isotropic Lanczos3 upscale by an integer factor.
pub fn upscale(img: RgbaImage, factor: u32) -> Result<RgbaImage, PipelineError> {
    if factor <= 1 {
        return Ok(img);
    }

    let (w, h) = img.dimensions();
    let (Some(new_w), Some(new_h)) = (w.checked_mul(factor), h.checked_mul(factor)) else {
        return Err(PipelineError::Geometry {
            stage: Stage::Normalize,
            width: w as i64 * factor as i64,
            height: h as i64 * factor as i64,
        });
    };

    Ok(imageops::resize(&img, new_w, new_h, FilterType::Lanczos3))
}

pub fn to_grayscale(img: RgbaImage) -> GrayImage {
    DynamicImage::ImageRgba8(img).into_luma8()
}

/// Grayscale opening: one erosion then one dilation with a `kernel x kernel`
/// all-ones structuring element. Even sizes round up to the next odd size.
pub fn open(img: GrayImage, kernel: u32) -> GrayImage {
    let radius = (kernel / 2).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return img;
    }

    let mask = Mask::square(radius);
    let eroded = grayscale_erode(&img, &mask);
    grayscale_dilate(&eroded, &mask)
}
