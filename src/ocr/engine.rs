use image::GrayImage;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;
use tempfile::NamedTempFile;

use super::setup::{locate_tesseract, TesseractPaths};
use crate::config::PipelineConfig;
use crate::error::{EngineInitError, RecognitionError};
use crate::imaging::binarize::has_ink;

/// Text recognized from one cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Recognition {
    pub text: String,
    /// Mean word confidence (0-100), if the engine reports one
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: None }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A single-language text recognizer applied to one cell at a time.
///
/// `recognize` is called from blocking worker threads, possibly concurrently.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per run before any cell is dispatched. An error here
    /// aborts the run.
    fn prepare(&self) -> Result<(), EngineInitError> {
        Ok(())
    }

    fn recognize(&self, cell: &GrayImage) -> Result<Recognition, RecognitionError>;
}

/// Represents a line of OCR text with confidence score
#[derive(Debug, Clone)]
pub struct OcrLine {
    pub text: String,
    pub words: Vec<OcrWord>,
    pub confidence: f32,
}

/// Represents a single word from OCR with confidence score
#[derive(Debug, Clone)]
pub struct OcrWord {
    pub text: String,
    pub confidence: f32,
}

/// Drives the Tesseract CLI, one process per cell.
pub struct TesseractEngine {
    explicit_path: Option<PathBuf>,
    language: String,
    page_segmentation_mode: u8,
    paths: OnceLock<TesseractPaths>,
}

impl TesseractEngine {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            explicit_path: config.tesseract_path.as_ref().map(PathBuf::from),
            language: config.language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            paths: OnceLock::new(),
        }
    }

    fn resolve(&self) -> Result<&TesseractPaths, EngineInitError> {
        if let Some(paths) = self.paths.get() {
            return Ok(paths);
        }
        let paths = locate_tesseract(self.explicit_path.as_deref(), &self.language)
            .map_err(|e| EngineInitError::new(format!("{:#}", e)))?;
        Ok(self.paths.get_or_init(|| paths))
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn prepare(&self) -> Result<(), EngineInitError> {
        self.resolve().map(|_| ())
    }

    fn recognize(&self, cell: &GrayImage) -> Result<Recognition, RecognitionError> {
        // Blank cells are common (empty plant columns, unused roster slots)
        if cell.width() == 0 || cell.height() == 0 || !has_ink(cell) {
            return Ok(Recognition::empty());
        }

        let paths = self
            .resolve()
            .map_err(|e| RecognitionError::ProcessFailed(e.to_string()))?;

        let temp_input = NamedTempFile::with_suffix(".png")
            .map_err(|e| RecognitionError::ImageWrite(e.to_string()))?;
        cell.save(temp_input.path())
            .map_err(|e| RecognitionError::ImageWrite(e.to_string()))?;

        // Tesseract appends .tsv to the output base
        let temp_output = NamedTempFile::new()
            .map_err(|e| RecognitionError::ImageWrite(e.to_string()))?;
        let output_base = temp_output.path().to_string_lossy().to_string();

        let mut command = Command::new(&paths.executable);
        command.arg(temp_input.path()).arg(&output_base);
        if let Some(tessdata) = &paths.tessdata {
            command.arg("--tessdata-dir").arg(tessdata);
        }
        let output = command
            .arg("-l")
            .arg(&self.language)
            .arg("--psm")
            .arg(self.page_segmentation_mode.to_string())
            .arg("tsv")
            .output()
            .map_err(|e| RecognitionError::ProcessFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RecognitionError::ProcessFailed(stderr.trim().to_string()));
        }

        let tsv_path = format!("{}.tsv", output_base);
        let tsv_content = std::fs::read_to_string(&tsv_path)
            .map_err(|e| RecognitionError::OutputUnreadable(e.to_string()))?;
        let _ = std::fs::remove_file(&tsv_path);

        Ok(lines_to_recognition(&parse_tsv_output(&tsv_content)))
    }
}

/// Joins recognized lines into a single cell string with mean confidence.
pub fn lines_to_recognition(lines: &[OcrLine]) -> Recognition {
    if lines.is_empty() {
        return Recognition::empty();
    }
    let text = lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = lines.iter().map(|l| l.confidence).sum::<f32>() / lines.len() as f32;
    Recognition { text, confidence: Some(confidence) }
}

/// Parses Tesseract TSV output into structured OcrLine data
pub fn parse_tsv_output(tsv: &str) -> Vec<OcrLine> {
    let mut lines: Vec<OcrLine> = Vec::new();
    let mut current_key: Option<(i32, i32, i32)> = None;
    let mut current_words: Vec<OcrWord> = Vec::new();

    // TSV fields: level, page_num, block_num, par_num, line_num, word_num,
    //             left, top, width, height, conf, text
    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }

        let level: i32 = fields[0].parse().unwrap_or(-1);
        // Level 5 = word
        if level != 5 {
            continue;
        }

        let block: i32 = fields[2].parse().unwrap_or(-1);
        let par: i32 = fields[3].parse().unwrap_or(-1);
        let line_num: i32 = fields[4].parse().unwrap_or(-1);
        let conf: f32 = fields[10].parse().unwrap_or(-1.0);
        let text = fields[11].trim();

        if text.is_empty() || conf < 0.0 {
            continue;
        }

        let key = (block, par, line_num);
        if current_key.is_some_and(|k| k != key) {
            flush_line(&mut lines, std::mem::take(&mut current_words));
        }
        current_key = Some(key);

        current_words.push(OcrWord { text: text.to_string(), confidence: conf });
    }

    flush_line(&mut lines, current_words);
    lines
}

fn flush_line(lines: &mut Vec<OcrLine>, words: Vec<OcrWord>) {
    if words.is_empty() {
        return;
    }
    let confidence = words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32;
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(OcrLine { text, words, confidence });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn word(block: i32, line: i32, conf: f32, text: &str) -> String {
        format!("5\t1\t{}\t1\t{}\t1\t0\t0\t10\t10\t{}\t{}", block, line, conf, text)
    }

    #[test]
    fn test_parse_tsv_groups_words_by_line() {
        let tsv = [
            HEADER.to_string(),
            "1\t1\t0\t0\t0\t0\t0\t0\t100\t20\t-1\t".to_string(),
            word(1, 1, 90.0, "Sova"),
            word(1, 1, 80.0, "Main"),
            word(1, 2, 70.0, "245"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Sova Main");
        assert_eq!(lines[0].confidence, 85.0);
        assert_eq!(lines[1].text, "245");
    }

    #[test]
    fn test_parse_tsv_skips_empty_and_unconfident_words() {
        let tsv = [
            HEADER.to_string(),
            word(1, 1, -1.0, "ghost"),
            word(1, 1, 95.0, " "),
            word(1, 1, 60.0, "17"),
        ]
        .join("\n");

        let lines = parse_tsv_output(&tsv);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "17");
    }

    #[test]
    fn test_same_line_number_in_new_block_starts_new_line() {
        let tsv = [HEADER.to_string(), word(1, 1, 90.0, "a"), word(2, 1, 90.0, "b")].join("\n");
        assert_eq!(parse_tsv_output(&tsv).len(), 2);
    }

    #[test]
    fn test_lines_to_recognition() {
        let tsv = [HEADER.to_string(), word(1, 1, 90.0, "12"), word(1, 2, 70.0, "/")].join("\n");
        let rec = lines_to_recognition(&parse_tsv_output(&tsv));
        assert_eq!(rec.text, "12 /");
        assert_eq!(rec.confidence, Some(80.0));

        assert_eq!(lines_to_recognition(&[]), Recognition::empty());
    }

    #[test]
    fn test_blank_cell_skips_engine() {
        let config = PipelineConfig {
            tesseract_path: Some("/definitely/not/tesseract".to_string()),
            ..Default::default()
        };
        let engine = TesseractEngine::new(&config);
        let blank = GrayImage::from_pixel(20, 10, Luma([255]));
        assert_eq!(engine.recognize(&blank).unwrap(), Recognition::empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_language_fails_prepare() {
        let dir = tempfile::tempdir().unwrap();
        let exe = crate::testing::fake_tesseract(dir.path(), &["eng"]);
        let config = PipelineConfig {
            tesseract_path: Some(exe.to_string_lossy().to_string()),
            language: "zzmissing".to_string(),
            ..Default::default()
        };

        let err = TesseractEngine::new(&config).prepare().unwrap_err();
        assert!(err.reason.contains("'zzmissing' is not installed"), "{}", err.reason);
    }

    #[test]
    fn test_missing_executable_fails_prepare() {
        let config = PipelineConfig {
            tesseract_path: Some("/definitely/not/tesseract".to_string()),
            ..Default::default()
        };
        let engine = TesseractEngine::new(&config);
        let err = engine.prepare().unwrap_err();
        assert!(err.reason.contains("Configured Tesseract not found"));
    }
}
