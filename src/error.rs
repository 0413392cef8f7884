use std::fmt;

use thiserror::Error;

/// Pipeline stage a fatal error was raised from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Load,
    Crop,
    Normalize,
    Binarize,
    Segment,
    Recognize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::Crop => "crop",
            Stage::Normalize => "normalize",
            Stage::Binarize => "binarize",
            Stage::Segment => "segment",
            Stage::Recognize => "recognize",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("Row count must be at least 1")]
    NoRows,

    #[error("Column weight vector is empty")]
    NoColumns,

    #[error("Column weight {index} is invalid: {weight}")]
    InvalidWeight { index: usize, weight: f64 },

    #[error("Column weights sum to {sum:.4}, which exceeds 1.0")]
    WeightsExceedOne { sum: f64 },

    #[error("Reference width must be positive, got {0}")]
    InvalidReferenceWidth(f64),

    #[error("Crop ratio {name} must be in (0, 1], got {value}")]
    InvalidRatio { name: &'static str, value: f64 },
}

/// Fatal errors. Any of these aborts the run with no partial results.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[{stage}] Failed to decode image: {reason}")]
    ImageDecode { stage: Stage, reason: String },

    #[error("[{stage}] Invalid crop geometry: {width}x{height}")]
    Geometry { stage: Stage, width: i64, height: i64 },

    #[error("[{stage}] Invalid scoreboard layout: {source}")]
    InvalidLayout {
        stage: Stage,
        #[source]
        source: LayoutError,
    },

    #[error("[{stage}] Recognition engine '{engine}' failed to initialize: {reason}")]
    RecognitionEngineFatal { stage: Stage, engine: String, reason: String },

    #[error("[{stage}] Run {run} was superseded by a newer upload")]
    RunSuperseded { stage: Stage, run: String },

    #[error("[recognize] Worker task failed: {0}")]
    WorkerPanicked(String),
}

impl PipelineError {
    /// The stage that failed, for rendering a retry affordance.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ImageDecode { stage, .. }
            | PipelineError::Geometry { stage, .. }
            | PipelineError::InvalidLayout { stage, .. }
            | PipelineError::RecognitionEngineFatal { stage, .. }
            | PipelineError::RunSuperseded { stage, .. } => *stage,
            PipelineError::WorkerPanicked(_) => Stage::Recognize,
        }
    }
}

/// A single cell's recognition failure. Recovered locally by the orchestrator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecognitionError {
    #[error("Failed to write cell image: {0}")]
    ImageWrite(String),

    #[error("Engine process failed: {0}")]
    ProcessFailed(String),

    #[error("Failed to read engine output: {0}")]
    OutputUnreadable(String),

    #[error("Engine rejected cell: {0}")]
    Rejected(String),
}

/// Raised by `RecognitionEngine::prepare` when the engine cannot run at all.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason}")]
pub struct EngineInitError {
    pub reason: String,
}

impl EngineInitError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}
