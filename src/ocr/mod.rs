pub mod engine;
pub mod orchestrator;
pub mod progress;
pub mod run;
pub mod setup;

pub use engine::{Recognition, RecognitionEngine, TesseractEngine};
pub use orchestrator::{recognize_grid, CellFailure, OcrOutcome, RecognizedCell};
pub use progress::{Progress, ProgressTracker};
pub use run::{RunGuard, RunId, RunRegistry};
pub use setup::{ensure_tessdata, locate_tesseract};
