//! Deterministic engines and synthetic scoreboards for tests.

use image::{GrayImage, Rgba, RgbaImage};

use crate::error::{EngineInitError, RecognitionError};
use crate::imaging::binarize::INK;
use crate::ocr::{Recognition, RecognitionEngine};

/// Engine backed by a closure.
pub struct FnEngine<F> {
    recognize: F,
    prepare_error: Option<EngineInitError>,
}

impl<F> FnEngine<F>
where
    F: Fn(&GrayImage) -> Result<Recognition, RecognitionError> + Send + Sync,
{
    pub fn new(recognize: F) -> Self {
        Self { recognize, prepare_error: None }
    }

    pub fn failing_prepare(mut self, error: EngineInitError) -> Self {
        self.prepare_error = Some(error);
        self
    }
}

impl<F> RecognitionEngine for FnEngine<F>
where
    F: Fn(&GrayImage) -> Result<Recognition, RecognitionError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn-engine"
    }

    fn prepare(&self) -> Result<(), EngineInitError> {
        match &self.prepare_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn recognize(&self, cell: &GrayImage) -> Result<Recognition, RecognitionError> {
        (self.recognize)(cell)
    }
}

/// Writes a stand-in `tesseract` script that answers `--version` and
/// `--list-langs` with `languages`, and fails any recognition because no
/// language can be loaded.
#[cfg(unix)]
pub fn fake_tesseract(dir: &std::path::Path, languages: &[&str]) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let listing: String = languages.iter().map(|l| format!("echo {}\n", l)).collect();
    let script = format!(
        "#!/bin/sh\n\
         for arg in \"$@\"; do\n\
         case \"$arg\" in\n\
         --version) echo \"tesseract 5.3.0\"; exit 0 ;;\n\
         --list-langs) echo \"List of available languages in \\\"/fake/\\\" ({}):\"\n{}exit 0 ;;\n\
         esac\n\
         done\n\
         echo \"Failed loading language\" >&2\n\
         exit 1\n",
        languages.len(),
        listing
    );

    let path = dir.join("tesseract");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    // A concurrent fork can briefly hold the write handle open (ETXTBSY)
    for _ in 0..50 {
        match std::process::Command::new(&path).arg("--version").output() {
            Err(e) if e.raw_os_error() == Some(26) => std::thread::sleep(std::time::Duration::from_millis(10)),
            _ => break,
        }
    }
    path
}

/// 3x5 bitmap digits. Every glyph has ink in its first and last column and in
/// its top and bottom row, so its bounding box is always the full 3x5 cell.
const FONT: [(char, [&str; 5]); 10] = [
    ('0', ["###", "#.#", "#.#", "#.#", "###"]),
    ('1', ["##.", ".#.", ".#.", ".#.", "###"]),
    ('2', ["###", "..#", "###", "#..", "###"]),
    ('3', ["###", "..#", "###", "..#", "###"]),
    ('4', ["#.#", "#.#", "###", "..#", "..#"]),
    ('5', ["###", "#..", "###", "..#", "###"]),
    ('6', ["###", "#..", "###", "#.#", "###"]),
    ('7', ["###", "..#", "..#", "..#", "..#"]),
    ('8', ["###", "#.#", "###", "#.#", "###"]),
    ('9', ["###", "#.#", "###", "..#", "###"]),
];

fn glyph(c: char) -> Option<&'static [&'static str; 5]> {
    FONT.iter().find(|(ch, _)| *ch == c).map(|(_, rows)| rows)
}

/// Width in pixels of `text` drawn at `pixel` size.
pub fn text_width(text: &str, pixel: u32) -> u32 {
    let n = text.chars().count() as u32;
    if n == 0 { 0 } else { n * 3 * pixel + (n - 1) * pixel }
}

/// Draws digits with their top-left corner at `(x, y)`; each font pixel is a
/// `pixel x pixel` square.
pub fn draw_digits(img: &mut RgbaImage, x: u32, y: u32, text: &str, pixel: u32, color: Rgba<u8>) {
    let mut cursor = x;
    for c in text.chars() {
        let Some(rows) = glyph(c) else {
            cursor += 4 * pixel;
            continue;
        };
        for (gy, row) in rows.iter().enumerate() {
            for (gx, bit) in row.chars().enumerate() {
                if bit != '#' {
                    continue;
                }
                let px0 = cursor + gx as u32 * pixel;
                let py0 = y + gy as u32 * pixel;
                for py in py0..py0 + pixel {
                    for px in px0..px0 + pixel {
                        if px < img.width() && py < img.height() {
                            img.put_pixel(px, py, color);
                        }
                    }
                }
            }
        }
        cursor += 4 * pixel;
    }
}

/// Reads digits drawn with [`draw_digits`] back out of a binarized cell.
///
/// Glyphs are separated by ink-free columns; each glyph's bounding box is
/// sampled on a 3x5 grid and matched against the font.
pub struct GlyphReader;

impl RecognitionEngine for GlyphReader {
    fn name(&self) -> &str {
        "glyph-reader"
    }

    fn recognize(&self, cell: &GrayImage) -> Result<Recognition, RecognitionError> {
        Ok(Recognition::new(read_glyphs(cell)))
    }
}

pub fn read_glyphs(cell: &GrayImage) -> String {
    let (w, h) = cell.dimensions();
    let is_ink = |x: u32, y: u32| cell.get_pixel(x, y)[0] == INK;
    let column_inked: Vec<bool> = (0..w).map(|x| (0..h).any(|y| is_ink(x, y))).collect();

    let mut text = String::new();
    let mut x = 0;
    while x < w {
        if !column_inked[x as usize] {
            x += 1;
            continue;
        }
        let x0 = x;
        while x < w && column_inked[x as usize] {
            x += 1;
        }
        let x1 = x;

        let rows_inked: Vec<u32> = (0..h).filter(|&y| (x0..x1).any(|gx| is_ink(gx, y))).collect();
        let (Some(&y0), Some(&y_last)) = (rows_inked.first(), rows_inked.last()) else {
            continue;
        };
        let y1 = y_last + 1;

        let mut bitmap = [[false; 3]; 5];
        for (gy, bits) in bitmap.iter_mut().enumerate() {
            for (gx, bit) in bits.iter_mut().enumerate() {
                let sx = x0 + (2 * gx as u32 + 1) * (x1 - x0) / 6;
                let sy = y0 + (2 * gy as u32 + 1) * (y1 - y0) / 10;
                *bit = is_ink(sx, sy);
            }
        }

        let decoded = FONT
            .iter()
            .find(|(_, rows)| {
                rows.iter()
                    .zip(bitmap.iter())
                    .all(|(row, bits)| row.chars().zip(bits.iter()).all(|(c, &b)| (c == '#') == b))
            })
            .map(|(ch, _)| *ch)
            .unwrap_or('?');
        text.push(decoded);
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::threshold_inverted;
    use image::DynamicImage;

    #[test]
    fn test_glyph_reader_reads_drawn_digits() {
        let mut img = RgbaImage::from_pixel(120, 40, Rgba([30, 30, 30, 255]));
        draw_digits(&mut img, 5, 5, "0123456789", 2, Rgba([230, 230, 230, 255]));
        let gray = DynamicImage::ImageRgba8(img).into_luma8();
        let binary = threshold_inverted(gray, 127);

        assert_eq!(read_glyphs(&binary), "0123456789");
    }

    #[test]
    fn test_blank_cell_reads_empty() {
        let blank = GrayImage::from_pixel(30, 30, image::Luma([255]));
        assert_eq!(read_glyphs(&blank), "");
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("", 4), 0);
        assert_eq!(text_width("7", 4), 12);
        assert_eq!(text_width("137", 4), 44);
    }
}
