//! Screenshot loading and scoreboard cropping.
//!
//! The scoreboard window is derived from reference offsets measured at a fixed
//! design width, scaled by `natural_width / reference_width` on both axes.

use image::{ImageFormat, ImageReader, Rgba, RgbaImage};
use serde::Serialize;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::PixelRect;
use crate::config::ScoreboardLayout;
use crate::error::{PipelineError, Stage};

/// Fill for target pixels that have no source content.
const UNDRAWN: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// An uploaded screenshot. Immutable; cheap to clone.
#[derive(Clone, Debug)]
pub struct RawImage {
    bytes: Arc<[u8]>,
    width: u32,
    height: u32,
}

impl RawImage {
    /// Wraps encoded bytes, reading the natural size from the image header.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, PipelineError> {
        let bytes = bytes.into();
        let (width, height) = ImageReader::new(Cursor::new(&bytes[..]))
            .with_guessed_format()
            .map_err(decode_error)?
            .into_dimensions()
            .map_err(decode_error)?;
        Self::with_dimensions(bytes, width, height)
    }

    /// Wraps encoded bytes with caller-supplied natural dimensions.
    pub fn with_dimensions(
        bytes: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Geometry {
                stage: Stage::Load,
                width: width as i64,
                height: height as i64,
            });
        }
        Ok(Self { bytes: bytes.into(), width, height })
    }

    /// Reads a screenshot from disk.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::ImageDecode {
            stage: Stage::Load,
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_bytes(bytes)
    }

    /// Encodes an in-memory image as PNG.
    pub fn from_rgba(img: &RgbaImage) -> Result<Self, PipelineError> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).map_err(decode_error)?;
        Self::with_dimensions(buf.into_inner(), img.width(), img.height())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Content digest, used to derive run identifiers.
    pub fn digest(&self) -> String {
        blake3::hash(&self.bytes).to_hex()[..16].to_string()
    }

    /// Decodes the full screenshot to RGBA.
    pub fn decode(&self) -> Result<RgbaImage, PipelineError> {
        let img = image::load_from_memory(&self.bytes).map_err(decode_error)?;
        Ok(img.to_rgba8())
    }
}

fn decode_error(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::ImageDecode { stage: Stage::Load, reason: e.to_string() }
}

/// The scoreboard window in source-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScoreboardRegion {
    /// `natural_width / reference_width`
    pub scale: f64,
    /// Source x drawn at target column 0 (`reference_x * scale`)
    pub x: f64,
    /// Source y drawn at target row 0 (`reference_y * scale`)
    pub y: f64,
    /// Target surface width (`natural_width * width_ratio`)
    pub width: u32,
    /// Target surface height (`natural_height * height_ratio`)
    pub height: u32,
}

impl ScoreboardRegion {
    /// Computes the scoreboard window for a screenshot of the given size.
    pub fn from_dimensions(
        natural_width: u32,
        natural_height: u32,
        layout: &ScoreboardLayout,
    ) -> Result<Self, PipelineError> {
        layout
            .validate()
            .map_err(|source| PipelineError::InvalidLayout { stage: Stage::Crop, source })?;

        let scale = natural_width as f64 / layout.reference_width;
        let width = (natural_width as f64 * layout.width_ratio).floor() as i64;
        let height = (natural_height as f64 * layout.height_ratio).floor() as i64;

        if width <= 0 || height <= 0 {
            return Err(PipelineError::Geometry { stage: Stage::Crop, width, height });
        }

        let region = Self {
            scale,
            x: layout.reference_x * scale,
            y: layout.reference_y * scale,
            width: width as u32,
            height: height as u32,
        };

        match region.source_window(natural_width, natural_height) {
            Some(_) => Ok(region),
            None => Err(PipelineError::Geometry { stage: Stage::Crop, width: 0, height: 0 }),
        }
    }

    /// Drawing offset of the source onto the target surface: `(-x, -y)`.
    pub fn offset(&self) -> (i64, i64) {
        (-(self.x.round() as i64), -(self.y.round() as i64))
    }

    /// The part of the source that actually lands on the target surface,
    /// clipped to `[0, w) x [0, h)`. `None` if nothing overlaps.
    pub fn source_window(&self, natural_width: u32, natural_height: u32) -> Option<PixelRect> {
        let (ox, oy) = self.offset();
        let (x0, y0) = (-ox, -oy);
        let x1 = (x0 + self.width as i64).min(natural_width as i64);
        let y1 = (y0 + self.height as i64).min(natural_height as i64);
        let x0 = x0.max(0);
        let y0 = y0.max(0);

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// Draws the screenshot onto a `region.width x region.height` surface at the
/// region's offset. Surface pixels with no source content stay black.
pub fn crop_to_region(img: &RgbaImage, region: &ScoreboardRegion) -> Result<RgbaImage, PipelineError> {
    let (w, h) = img.dimensions();
    let window = region.source_window(w, h).ok_or(PipelineError::Geometry {
        stage: Stage::Crop,
        width: 0,
        height: 0,
    })?;

    let (ox, oy) = region.offset();
    let mut surface = RgbaImage::from_pixel(region.width, region.height, UNDRAWN);
    let visible = image::imageops::crop_imm(img, window.x, window.y, window.width, window.height).to_image();
    image::imageops::replace(&mut surface, &visible, window.x as i64 + ox, window.y as i64 + oy);

    debug!(
        "Cropped scoreboard {}x{} from source window {:?} (scale {:.3})",
        region.width, region.height, window, region.scale
    );

    Ok(surface)
}
