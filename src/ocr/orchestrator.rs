//! Per-cell OCR over a segmented grid.
//!
//! Every cell becomes one blocking recognition task. At most `workers` run at
//! once; completions arrive in any order and are slotted back by
//! `(row, col)`. A failing cell is recorded and read as an empty string; an
//! engine that cannot start aborts the whole run.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::engine::{Recognition, RecognitionEngine};
use super::progress::ProgressTracker;
use super::run::{ResultMatrix, RunGuard};
use crate::error::{PipelineError, RecognitionError, Stage};
use crate::grid::{Cell, Grid};

/// A cell together with what the engine read from it.
#[derive(Clone, Debug)]
pub struct RecognizedCell {
    pub cell: Cell,
    pub text: String,
    pub confidence: Option<f32>,
}

/// A cell whose recognition failed and was read as empty.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CellFailure {
    pub row: usize,
    pub col: usize,
    #[serde(serialize_with = "serialize_error")]
    pub error: RecognitionError,
}

fn serialize_error<S: serde::Serializer>(error: &RecognitionError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}

/// Output of one OCR pass: rows in input order, plus accumulated failures.
#[derive(Clone, Debug)]
pub struct OcrOutcome {
    pub rows: Vec<Vec<RecognizedCell>>,
    pub failures: Vec<CellFailure>,
}

impl OcrOutcome {
    pub fn text_matrix(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|c| c.text.clone()).collect())
            .collect()
    }
}

/// Recognizes every cell of `grid`.
///
/// The grid is consumed: each cell image is moved into its own task and
/// returned alongside its text.
pub async fn recognize_grid(
    grid: Grid,
    engine: Arc<dyn RecognitionEngine>,
    workers: usize,
    guard: &RunGuard,
    progress: &ProgressTracker,
) -> Result<OcrOutcome, PipelineError> {
    prepare_engine(&engine).await?;

    let row_count = grid.row_count();
    let columns = grid.column_count();
    let total = grid.cell_count();
    let workers = workers.max(1);
    progress.start(total);

    info!(
        "OCR run {}: {} cells ({} rows x {} columns) on {} workers using {}",
        guard.id(),
        total,
        row_count,
        columns,
        workers,
        engine.name()
    );

    let mut matrix: ResultMatrix<RecognizedCell> = ResultMatrix::new(guard.id().clone(), row_count, columns);
    let mut failures = Vec::new();

    let token = guard.token().clone();
    let mut completions = stream::iter(grid.into_cells())
        .map(|cell| {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || {
                let result = catch_unwind(AssertUnwindSafe(|| engine.recognize(&cell.image)))
                    .unwrap_or_else(|_| Err(RecognitionError::Rejected("engine panicked".to_string())));
                (cell, result)
            })
        })
        .buffer_unordered(workers);

    loop {
        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(superseded(guard)),
            next = completions.next() => match next {
                Some(joined) => joined,
                None => break,
            },
        };

        let (cell, result) = joined.map_err(|e| PipelineError::WorkerPanicked(e.to_string()))?;
        let (row, col) = (cell.row, cell.col);

        let recognition = match result {
            Ok(recognition) => recognition,
            Err(error) => {
                warn!("Cell ({}, {}) failed, reading as empty: {}", row, col, error);
                failures.push(CellFailure { row, col, error });
                Recognition::empty()
            }
        };

        let entry = RecognizedCell {
            cell,
            text: recognition.text.trim().to_string(),
            confidence: recognition.confidence,
        };
        matrix.write(guard, row, col, entry).map_err(|_| superseded(guard))?;

        let p = progress.cell_done();
        debug!("Cell ({}, {}) done, {}/{} ({}%)", row, col, p.completed, p.total, p.percent);
    }

    let rows = matrix
        .into_rows()
        .ok_or_else(|| PipelineError::WorkerPanicked("cell result missing from matrix".to_string()))?;

    failures.sort_by_key(|f| (f.row, f.col));
    info!("OCR run {} complete: {} cell failures", guard.id(), failures.len());

    Ok(OcrOutcome { rows, failures })
}

async fn prepare_engine(engine: &Arc<dyn RecognitionEngine>) -> Result<(), PipelineError> {
    let engine = Arc::clone(engine);
    let name = engine.name().to_string();

    let prepared = tokio::task::spawn_blocking(move || engine.prepare())
        .await
        .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))?;

    prepared.map_err(|e| PipelineError::RecognitionEngineFatal {
        stage: Stage::Recognize,
        engine: name,
        reason: e.reason,
    })
}

fn superseded(guard: &RunGuard) -> PipelineError {
    info!("OCR run {} superseded, abandoning remaining cells", guard.id());
    PipelineError::RunSuperseded { stage: Stage::Recognize, run: guard.id().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineInitError;
    use crate::grid::segment;
    use crate::imaging::RawImage;
    use crate::ocr::run::RunRegistry;
    use crate::testing::FnEngine;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::time::Duration;

    const ROWS: u32 = 4;
    const COLS: usize = 3;

    /// Grid whose cell (r, c) is filled with the value `r * COLS + c`.
    fn indexed_grid() -> Grid {
        let surface = GrayImage::from_fn(40, 40, |x, y| Luma([((y / 10) as usize * COLS + (x / 10) as usize) as u8]));
        segment(&surface, ROWS, &[0.25; COLS]).unwrap()
    }

    fn cell_index(cell: &GrayImage) -> usize {
        cell.get_pixel(0, 0)[0] as usize
    }

    fn guard() -> (RunRegistry, RunGuard) {
        let registry = RunRegistry::new();
        let raw = RawImage::from_rgba(&RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]))).unwrap();
        let guard = registry.begin(&raw);
        (registry, guard)
    }

    fn expected_matrix() -> Vec<Vec<String>> {
        (0..ROWS as usize)
            .map(|r| (0..COLS).map(|c| (r * COLS + c).to_string()).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_matrix_follows_input_order() {
        let (_registry, guard) = guard();
        let progress = ProgressTracker::new();
        let engine = Arc::new(FnEngine::new(|cell| Ok(Recognition::new(cell_index(cell).to_string()))));

        let outcome = recognize_grid(indexed_grid(), engine, 1, &guard, &progress).await.unwrap();

        assert_eq!(outcome.text_matrix(), expected_matrix());
        assert!(outcome.failures.is_empty());
        assert_eq!(progress.current().percent, 100);
        let first = &outcome.rows[1][2];
        assert_eq!((first.cell.row, first.cell.col), (1, 2));
    }

    #[tokio::test]
    async fn test_reverse_completion_order_yields_same_matrix() {
        let (_registry, guard) = guard();
        let progress = ProgressTracker::new();
        let total = ROWS as usize * COLS;
        // Later cells finish first
        let engine = Arc::new(FnEngine::new(move |cell| {
            let index = cell_index(cell);
            std::thread::sleep(Duration::from_millis(((total - index) * 15) as u64));
            Ok(Recognition::new(index.to_string()))
        }));

        let outcome = recognize_grid(indexed_grid(), engine, total, &guard, &progress).await.unwrap();
        assert_eq!(outcome.text_matrix(), expected_matrix());
    }

    #[tokio::test]
    async fn test_failing_cell_reads_empty_without_aborting_siblings() {
        let (_registry, guard) = guard();
        let progress = ProgressTracker::new();
        let engine = Arc::new(FnEngine::new(|cell| match cell_index(cell) {
            5 => Err(RecognitionError::ProcessFailed("segfault".to_string())),
            7 => panic!("engine bug"),
            i => Ok(Recognition::new(i.to_string())),
        }));

        let outcome = recognize_grid(indexed_grid(), engine, 3, &guard, &progress).await.unwrap();

        let mut expected = expected_matrix();
        expected[1][2] = String::new();
        expected[2][1] = String::new();
        assert_eq!(outcome.text_matrix(), expected);

        assert_eq!(outcome.failures.len(), 2);
        assert_eq!((outcome.failures[0].row, outcome.failures[0].col), (1, 2));
        assert_eq!(
            outcome.failures[0].error,
            RecognitionError::ProcessFailed("segfault".to_string())
        );
        assert_eq!((outcome.failures[1].row, outcome.failures[1].col), (2, 1));
        assert_eq!(progress.current().percent, 100);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let (_registry, guard) = guard();
        let (progress, mut rx) = ProgressTracker::channel();
        let engine = Arc::new(FnEngine::new(|cell| {
            std::thread::sleep(Duration::from_millis(2));
            Ok(Recognition::new(cell_index(cell).to_string()))
        }));

        let watcher = tokio::spawn(async move {
            let mut seen = vec![rx.borrow_and_update().percent];
            while *seen.last().unwrap() < 100 && rx.changed().await.is_ok() {
                seen.push(rx.borrow_and_update().percent);
            }
            seen
        });

        recognize_grid(indexed_grid(), engine, 4, &guard, &progress).await.unwrap();
        drop(progress);
        let seen = watcher.await.unwrap();

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_engine_init_failure_is_fatal() {
        let (_registry, guard) = guard();
        let progress = ProgressTracker::new();
        let engine = Arc::new(
            FnEngine::new(|_| Ok(Recognition::new("x"))).failing_prepare(EngineInitError::new("no tessdata")),
        );

        let err = recognize_grid(indexed_grid(), engine, 2, &guard, &progress).await.unwrap_err();
        match err {
            PipelineError::RecognitionEngineFatal { stage, engine, reason } => {
                assert_eq!(stage, Stage::Recognize);
                assert_eq!(engine, "fn-engine");
                assert_eq!(reason, "no tessdata");
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(progress.current().completed, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tesseract_without_language_aborts_run() {
        use crate::config::PipelineConfig;
        use crate::ocr::TesseractEngine;

        let dir = tempfile::tempdir().unwrap();
        let exe = crate::testing::fake_tesseract(dir.path(), &["osd"]);
        let config = PipelineConfig {
            tesseract_path: Some(exe.to_string_lossy().to_string()),
            language: "zzmissing".to_string(),
            ..Default::default()
        };
        let (_registry, guard) = guard();
        let progress = ProgressTracker::new();
        let inked = segment(&GrayImage::from_pixel(40, 40, Luma([0])), ROWS, &[0.25; COLS]).unwrap();

        let err = recognize_grid(inked, Arc::new(TesseractEngine::new(&config)), 4, &guard, &progress)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::RecognitionEngineFatal { ref engine, .. } if engine == "tesseract"));
        assert_eq!(progress.current().completed, 0);
    }

    #[tokio::test]
    async fn test_superseded_run_returns_no_results() {
        let (registry, guard) = guard();
        let progress = ProgressTracker::new();
        let engine = Arc::new(FnEngine::new(|cell| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(Recognition::new(cell_index(cell).to_string()))
        }));

        let newer = RawImage::from_rgba(&RgbaImage::from_pixel(3, 3, Rgba([9, 9, 9, 255]))).unwrap();
        let supersede = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            registry.begin(&newer)
        };

        let (result, newer_guard) = tokio::join!(
            recognize_grid(indexed_grid(), engine, 1, &guard, &progress),
            supersede
        );

        assert!(matches!(result, Err(PipelineError::RunSuperseded { .. })));
        assert!(newer_guard.should_continue());
        assert!(progress.current().completed < ROWS as usize * COLS);
    }
}
