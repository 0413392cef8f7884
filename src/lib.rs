//! Scoreboard OCR
//!
//! Reads per-player statistics off a match-result screenshot: crops the
//! scoreboard, cleans it up for recognition, cuts it into one cell per field,
//! runs OCR on every cell concurrently and maps the text onto candidate
//! records for review.

pub mod config;
pub mod error;
pub mod grid;
pub mod imaging;
pub mod ocr;
pub mod paths;
pub mod pipeline;
pub mod stats;

#[cfg(test)]
mod testing;

pub use config::{load_config, PipelineConfig, ScoreboardLayout, StatField};
pub use error::{PipelineError, RecognitionError, Stage};
pub use imaging::RawImage;
pub use ocr::{Progress, ProgressTracker, RecognitionEngine, RunId, RunRegistry, TesseractEngine};
pub use pipeline::{prepare_scoreboard, ProcessedScoreboard, ScoreboardRead, ScoreboardReader};
pub use stats::StatRecord;
