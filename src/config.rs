//! Configuration types for the scoreboard pipeline.
//!
//! Loads settings from a JSON file. Provides the scoreboard layout profile
//! (reference geometry, row count, weighted columns) and OCR tuning.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::LayoutError;

/// Tolerance applied when checking that column weights sum to at most 1.0.
const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// A statistic field on the scoreboard, in left-to-right column order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    PlayerName,
    Agent,
    CombatScore,
    Kills,
    Deaths,
    Assists,
    EconRating,
    FirstBloods,
    Plants,
}

/// How a field's recognized text is interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
}

impl StatField {
    pub const ALL: [StatField; 9] = [
        StatField::PlayerName,
        StatField::Agent,
        StatField::CombatScore,
        StatField::Kills,
        StatField::Deaths,
        StatField::Assists,
        StatField::EconRating,
        StatField::FirstBloods,
        StatField::Plants,
    ];

    pub const NUMERIC: [StatField; 7] = [
        StatField::CombatScore,
        StatField::Kills,
        StatField::Deaths,
        StatField::Assists,
        StatField::EconRating,
        StatField::FirstBloods,
        StatField::Plants,
    ];

    pub fn kind(self) -> FieldKind {
        match self {
            StatField::PlayerName | StatField::Agent => FieldKind::Text,
            _ => FieldKind::Integer,
        }
    }

    /// Column header used in exports.
    pub fn key(self) -> &'static str {
        match self {
            StatField::PlayerName => "player",
            StatField::Agent => "agent",
            StatField::CombatScore => "acs",
            StatField::Kills => "kills",
            StatField::Deaths => "deaths",
            StatField::Assists => "assists",
            StatField::EconRating => "econ",
            StatField::FirstBloods => "first_bloods",
            StatField::Plants => "plants",
        }
    }
}

/// One scoreboard column: which field it holds and its share of the width.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: StatField,
    /// Fraction of the processed surface width (0.0-1.0)
    pub weight: f64,
}

/// Scoreboard geometry, calibrated against a capture of `reference_width` pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreboardLayout {
    /// Design width the reference offsets were measured at
    pub reference_width: f64,
    /// Left edge of the scoreboard at the reference width
    pub reference_x: f64,
    /// Top edge of the scoreboard at the reference width
    pub reference_y: f64,
    /// Scoreboard width as a fraction of the screenshot width
    pub width_ratio: f64,
    /// Scoreboard height as a fraction of the screenshot height
    pub height_ratio: f64,
    /// One row per roster slot
    pub rows: u32,
    /// Columns in left-to-right order
    pub columns: Vec<ColumnSpec>,
}

impl Default for ScoreboardLayout {
    fn default() -> Self {
        use StatField::*;

        let columns = [
            (PlayerName, 0.24),
            (Agent, 0.10),
            (CombatScore, 0.10),
            (Kills, 0.08),
            (Deaths, 0.08),
            (Assists, 0.08),
            (EconRating, 0.10),
            (FirstBloods, 0.10),
            (Plants, 0.10),
        ]
        .into_iter()
        .map(|(field, weight)| ColumnSpec { field, weight })
        .collect();

        Self {
            reference_width: 1280.0,
            reference_x: 256.0,
            reference_y: 172.0,
            width_ratio: 0.60,
            height_ratio: 0.58,
            rows: 10,
            columns,
        }
    }
}

impl ScoreboardLayout {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.columns.iter().map(|c| c.weight).collect()
    }

    pub fn fields(&self) -> Vec<StatField> {
        self.columns.iter().map(|c| c.field).collect()
    }

    /// Checks the invariants the cropper and segmenter rely on.
    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(self.reference_width.is_finite() && self.reference_width > 0.0) {
            return Err(LayoutError::InvalidReferenceWidth(self.reference_width));
        }
        for (name, value) in [("width_ratio", self.width_ratio), ("height_ratio", self.height_ratio)] {
            if !(value.is_finite() && value > 0.0 && value <= 1.0) {
                return Err(LayoutError::InvalidRatio { name, value });
            }
        }
        if self.rows == 0 {
            return Err(LayoutError::NoRows);
        }
        validate_weights(&self.weights())
    }
}

/// Weights must be finite, non-negative and sum to at most 1.0.
pub fn validate_weights(weights: &[f64]) -> Result<(), LayoutError> {
    if weights.is_empty() {
        return Err(LayoutError::NoColumns);
    }
    for (index, &weight) in weights.iter().enumerate() {
        if !weight.is_finite() || weight < 0.0 {
            return Err(LayoutError::InvalidWeight { index, weight });
        }
    }
    let sum: f64 = weights.iter().sum();
    if sum > 1.0 + WEIGHT_SUM_EPSILON {
        return Err(LayoutError::WeightsExceedOne { sum });
    }
    Ok(())
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub layout: ScoreboardLayout,
    /// Isotropic upscale multiplier applied before grayscale conversion
    #[serde(default = "default_upscale_factor")]
    pub upscale_factor: u32,
    /// Side length of the square structuring element used for opening
    #[serde(default = "default_opening_kernel")]
    pub opening_kernel: u32,
    /// Inverted binary threshold (pixels above become ink)
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Maximum concurrent cell recognitions
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Tesseract language code
    #[serde(default = "default_language")]
    pub language: String,
    /// Tesseract page segmentation mode (7 = single text line)
    #[serde(default = "default_page_segmentation_mode")]
    pub page_segmentation_mode: u8,
    /// Explicit Tesseract executable, overrides discovery
    #[serde(default)]
    pub tesseract_path: Option<String>,
}

fn default_upscale_factor() -> u32 {
    8
}

fn default_opening_kernel() -> u32 {
    5
}

fn default_threshold() -> u8 {
    127
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_page_segmentation_mode() -> u8 {
    7
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: ScoreboardLayout::default(),
            upscale_factor: default_upscale_factor(),
            opening_kernel: default_opening_kernel(),
            threshold: default_threshold(),
            workers: default_workers(),
            language: default_language(),
            page_segmentation_mode: default_page_segmentation_mode(),
            tesseract_path: None,
        }
    }
}

impl PipelineConfig {
    /// Reads and parses a config file, failing on any error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config
            .layout
            .validate()
            .with_context(|| format!("Invalid layout in {}", path.display()))?;
        Ok(config)
    }
}

/// Loads configuration from `path` or returns defaults.
///
/// A missing, unreadable or invalid file is logged and replaced by defaults,
/// so a broken config never prevents a read.
pub fn load_config(path: &Path) -> PipelineConfig {
    info!("Looking for config at: {}", path.display());

    if !path.exists() {
        info!("{} not found. Using default config.", path.display());
        return PipelineConfig::default();
    }

    match PipelineConfig::from_file(path) {
        Ok(config) => {
            info!("Config loaded from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{:#}. Using defaults.", e);
            PipelineConfig::default()
        }
    }
}
