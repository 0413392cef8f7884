//! End-to-end scoreboard read: decode, crop, normalize, binarize, segment,
//! recognize, materialize.
//!
//! The image stages are synchronous and run on the blocking pool. Each read
//! starts a new run in the shared registry, which supersedes any read still in
//! flight.

use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::grid::{segment, Grid};
use crate::imaging::{crop_to_region, normalize, render_grid_overlay, threshold_inverted, RawImage, ScoreboardRegion};
use crate::ocr::{recognize_grid, CellFailure, ProgressTracker, RecognitionEngine, RecognizedCell, RunId, RunRegistry};
use crate::paths::{ensure_run_directories, get_cells_dir};
use crate::stats::{materialize, StatRecord};

/// Outline thickness used for the saved grid overlay.
const OVERLAY_THICKNESS: u32 = 2;

/// Output of the image stages, ready for recognition.
#[derive(Clone, Debug)]
pub struct ProcessedScoreboard {
    pub region: ScoreboardRegion,
    /// Binarized surface the grid was cut from
    pub processed: GrayImage,
    pub grid: Grid,
}

/// Runs every stage up to and including segmentation.
pub fn prepare_scoreboard(raw: &RawImage, config: &PipelineConfig) -> Result<ProcessedScoreboard, PipelineError> {
    let (natural_width, natural_height) = raw.dimensions();
    let source = raw.decode()?;

    let region = ScoreboardRegion::from_dimensions(natural_width, natural_height, &config.layout)?;
    let cropped = crop_to_region(&source, &region)?;

    let normalized = normalize(cropped, config.upscale_factor, config.opening_kernel)?;
    let processed = threshold_inverted(normalized, config.threshold);
    debug!(
        "Processed surface {}x{} (upscale x{}, kernel {}, threshold {})",
        processed.width(),
        processed.height(),
        config.upscale_factor,
        config.opening_kernel,
        config.threshold
    );

    let grid = segment(&processed, config.layout.rows, &config.layout.weights())?;

    Ok(ProcessedScoreboard { region, processed, grid })
}

/// Everything one successful read produced.
#[derive(Clone, Debug, Serialize)]
pub struct ScoreboardRead {
    pub run: RunId,
    pub region: ScoreboardRegion,
    #[serde(skip)]
    pub processed: GrayImage,
    /// Recognized cells, row-major, in input order
    #[serde(rename = "text", serialize_with = "serialize_text")]
    pub cells: Vec<Vec<RecognizedCell>>,
    pub failures: Vec<CellFailure>,
    pub records: Vec<StatRecord>,
}

fn serialize_text<S: serde::Serializer>(cells: &[Vec<RecognizedCell>], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(cells.iter().map(|row| row.iter().map(|c| c.text.as_str()).collect::<Vec<_>>()))
}

impl ScoreboardRead {
    pub fn text_matrix(&self) -> Vec<Vec<String>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|c| c.text.clone()).collect())
            .collect()
    }

    /// The processed surface with cell boundaries drawn on it.
    pub fn overlay(&self, thickness: u32) -> RgbaImage {
        render_grid_overlay(&self.processed, self.cells.iter().flatten().map(|c| &c.cell), thickness)
    }

    /// Writes `processed.png`, `grid.png` and optionally one PNG per cell
    /// under `<out_dir>/runs/<run-id>/`. Returns the run directory.
    pub fn save_audit(&self, out_dir: &Path, save_cells: bool) -> Result<PathBuf> {
        let run_id = self.run.to_string();
        let run_dir = ensure_run_directories(out_dir, &run_id, save_cells)
            .context(format!("Failed to create run directory under {}", out_dir.display()))?;

        let processed_path = run_dir.join("processed.png");
        self.processed
            .save(&processed_path)
            .context(format!("Failed to save {}", processed_path.display()))?;

        let grid_path = run_dir.join("grid.png");
        self.overlay(OVERLAY_THICKNESS)
            .save(&grid_path)
            .context(format!("Failed to save {}", grid_path.display()))?;

        if save_cells {
            let cells_dir = get_cells_dir(out_dir, &run_id);
            for entry in self.cells.iter().flatten() {
                let path = cells_dir.join(format!("r{}_c{}.png", entry.cell.row, entry.cell.col));
                entry
                    .cell
                    .image
                    .save(&path)
                    .context(format!("Failed to save cell image {}", path.display()))?;
            }
        }

        info!("Saved audit images for run {} to {}", run_id, run_dir.display());
        Ok(run_dir)
    }
}

/// Reads scoreboards with one engine and configuration.
///
/// Clones share the run registry, so a read started from any clone
/// supersedes reads in flight on the others.
#[derive(Clone)]
pub struct ScoreboardReader {
    config: PipelineConfig,
    engine: Arc<dyn RecognitionEngine>,
    runs: Arc<RunRegistry>,
}

impl ScoreboardReader {
    pub fn new(config: PipelineConfig, engine: Arc<dyn RecognitionEngine>) -> Self {
        Self::with_registry(config, engine, Arc::new(RunRegistry::new()))
    }

    pub fn with_registry(config: PipelineConfig, engine: Arc<dyn RecognitionEngine>, runs: Arc<RunRegistry>) -> Self {
        Self { config, engine, runs }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn runs(&self) -> &Arc<RunRegistry> {
        &self.runs
    }

    /// Reads one screenshot. Progress is reported per recognized cell.
    ///
    /// Returns `RunSuperseded` if another read starts before this one
    /// finishes; a superseded read returns no partial results.
    pub async fn read(&self, raw: RawImage, progress: &ProgressTracker) -> Result<ScoreboardRead, PipelineError> {
        let guard = self.runs.begin(&raw);
        let (width, height) = raw.dimensions();
        info!("Run {}: reading {}x{} screenshot", guard.id(), width, height);

        let config = self.config.clone();
        let prepared = tokio::task::spawn_blocking(move || prepare_scoreboard(&raw, &config))
            .await
            .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))??;

        if !guard.should_continue() {
            info!("Run {} superseded before recognition", guard.id());
            return Err(PipelineError::RunSuperseded { stage: Stage::Segment, run: guard.id().to_string() });
        }

        let ProcessedScoreboard { region, processed, grid } = prepared;
        info!(
            "Run {}: scoreboard {}x{} segmented into {} cells",
            guard.id(),
            region.width,
            region.height,
            grid.cell_count()
        );

        let outcome = recognize_grid(grid, Arc::clone(&self.engine), self.config.workers, &guard, progress).await?;
        let records = materialize(&outcome.text_matrix(), &self.config.layout.fields());

        let flagged = records.iter().filter(|r| !r.is_blank() && !r.is_clean()).count();
        info!(
            "Run {} finished: {} records, {} need review, {} cell failures",
            guard.id(),
            records.len(),
            flagged,
            outcome.failures.len()
        );

        Ok(ScoreboardRead {
            run: guard.id().clone(),
            region,
            processed,
            cells: outcome.rows,
            failures: outcome.failures,
            records,
        })
    }
}
