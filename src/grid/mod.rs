//! Proportional grid segmentation of the processed scoreboard.
//!
//! Rows are equal slices of the surface height (one per roster slot).
//! Columns are weighted slices of the surface width, cut left to right.

use image::GrayImage;
use tracing::{debug, warn};

use crate::config::validate_weights;
use crate::error::{PipelineError, Stage};
use crate::imaging::PixelRect;

/// One segmented cell: a single field of a single player row.
#[derive(Clone, Debug)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    /// Position on the processed surface
    pub bounds: PixelRect,
    pub image: GrayImage,
}

/// Row-major grid of cells.
#[derive(Clone, Debug)]
pub struct Grid {
    rows: Vec<Vec<Cell>>,
    columns: usize,
}

impl Grid {
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flatten()
    }

    pub fn into_cells(self) -> impl Iterator<Item = Cell> {
        self.rows.into_iter().flatten()
    }
}

/// Cuts `surface` into `rows` rows and one column per weight.
///
/// `row_height = height / rows` (integer). A row whose bottom edge would pass
/// the surface is dropped. The first column whose right edge would pass it
/// ends the row, so a cell's `col` is always its field index. Nothing is
/// padded or rescaled. Column widths are `floor(weight * width)` and the
/// rounding remainder is discarded.
pub fn segment(surface: &GrayImage, rows: u32, weights: &[f64]) -> Result<Grid, PipelineError> {
    validate_weights(weights)
        .map_err(|source| PipelineError::InvalidLayout { stage: Stage::Segment, source })?;

    let (width, height) = surface.dimensions();
    if rows == 0 || height < rows {
        return Err(PipelineError::Geometry {
            stage: Stage::Segment,
            width: width as i64,
            height: height as i64,
        });
    }

    let row_height = height / rows;
    let col_widths: Vec<u32> = weights
        .iter()
        .map(|w| (w * width as f64).floor() as u32)
        .collect();

    let mut grid_rows = Vec::with_capacity(rows as usize);
    let mut columns = 0;

    for i in 0..rows {
        let y = i * row_height;
        if y + row_height > height {
            warn!("Row {} at y={} overflows surface height {}, dropping it", i, y, height);
            continue;
        }

        let mut cells = Vec::with_capacity(col_widths.len());
        let mut x = 0u32;
        for (col, &col_width) in col_widths.iter().enumerate() {
            if x + col_width > width {
                warn!(
                    "Column {} at x={} overflows surface width {}, dropping it and {} columns after it",
                    col,
                    x,
                    width,
                    col_widths.len() - col - 1
                );
                break;
            }

            let bounds = PixelRect { x, y, width: col_width, height: row_height };
            let image = image::imageops::crop_imm(surface, x, y, col_width, row_height).to_image();
            cells.push(Cell { row: grid_rows.len(), col, bounds, image });
            x += col_width;
        }

        columns = cells.len();
        grid_rows.push(cells);
    }

    debug!(
        "Segmented {}x{} surface into {} rows x {} columns (row height {})",
        width,
        height,
        grid_rows.len(),
        columns,
        row_height
    );

    Ok(Grid { rows: grid_rows, columns })
}
