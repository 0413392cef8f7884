use std::path::{Path, PathBuf};

/// Returns the directory for locally installed Tesseract files:
/// `<data_local_dir>/scoreboard-ocr/tesseract/`
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scoreboard-ocr")
        .join("tesseract")
}

/// Returns the audit directory for one run: `<out_dir>/runs/<run_id>/`
pub fn get_run_dir(out_dir: &Path, run_id: &str) -> PathBuf {
    out_dir.join("runs").join(run_id)
}

/// Returns the cell image directory for one run: `<out_dir>/runs/<run_id>/cells/`
pub fn get_cells_dir(out_dir: &Path, run_id: &str) -> PathBuf {
    get_run_dir(out_dir, run_id).join("cells")
}

/// Ensures the audit directories for a run exist.
pub fn ensure_run_directories(out_dir: &Path, run_id: &str, with_cells: bool) -> std::io::Result<PathBuf> {
    let run_dir = get_run_dir(out_dir, run_id);
    std::fs::create_dir_all(&run_dir)?;
    if with_cells {
        std::fs::create_dir_all(get_cells_dir(out_dir, run_id))?;
    }
    Ok(run_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_directories_created() {
        let dir = tempdir().unwrap();
        let run_dir = ensure_run_directories(dir.path(), "abc-1", true).unwrap();
        assert_eq!(run_dir, dir.path().join("runs").join("abc-1"));
        assert!(run_dir.is_dir());
        assert!(get_cells_dir(dir.path(), "abc-1").is_dir());
    }
}
