use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::paths::get_tesseract_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

#[cfg(windows)]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];
#[cfg(not(windows))]
const SYSTEM_TESSDATA_DIRS: &[&str] = &[
    "/usr/share/tesseract-ocr/5/tessdata",
    "/usr/share/tesseract-ocr/4.00/tessdata",
    "/usr/share/tessdata",
    "/usr/local/share/tessdata",
    "/opt/homebrew/share/tessdata",
];

/// Resolved locations of the Tesseract install.
#[derive(Clone, Debug)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// `None` lets Tesseract fall back to its compiled-in data path
    pub tessdata: Option<PathBuf>,
}

/// Resolves the executable and the trained data for `language`.
pub fn locate_tesseract(explicit: Option<&Path>, language: &str) -> Result<TesseractPaths> {
    let executable = find_tesseract_executable(explicit)?;
    let version = tesseract_version(&executable)?;
    let tessdata = find_tessdata_dir(language);

    let available = list_languages(&executable, tessdata.as_deref())?;
    let missing: Vec<&str> = language
        .split('+')
        .filter(|lang| !available.iter().any(|a| a == lang))
        .collect();
    if !missing.is_empty() {
        return Err(anyhow!(
            "Tesseract language '{}' is not installed (available: {}). Run with --fetch-tessdata or install {}",
            missing.join("+"),
            if available.is_empty() { "none".to_string() } else { available.join(", ") },
            missing.iter().map(|l| traineddata_file(l)).collect::<Vec<_>>().join(", ")
        ));
    }

    info!(
        "Tesseract {} at {} (tessdata: {})",
        version,
        executable.display(),
        tessdata
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );

    Ok(TesseractPaths { executable, tessdata })
}

/// Finds the Tesseract executable: explicit path, our local dir, PATH, then
/// common install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!("Configured Tesseract not found: {}", path.display()));
    }

    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for dir in COMMON_INSTALL_DIRS {
        let p = Path::new(dir).join(EXECUTABLE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR or set tesseract_path."))
}

/// Returns the first line of `tesseract --version`.
pub fn tesseract_version(executable: &Path) -> Result<String> {
    let output = Command::new(executable)
        .arg("--version")
        .output()
        .with_context(|| format!("Failed to run {}", executable.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Tesseract --version failed: {}", stderr.trim()));
    }

    // Older builds print the version banner on stderr
    let banner = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
    Ok(String::from_utf8_lossy(banner)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}

/// Languages Tesseract can load, from `tesseract --list-langs`.
pub fn list_languages(executable: &Path, tessdata: Option<&Path>) -> Result<Vec<String>> {
    let mut command = Command::new(executable);
    if let Some(dir) = tessdata {
        command.arg("--tessdata-dir").arg(dir);
    }
    let output = command
        .arg("--list-langs")
        .output()
        .with_context(|| format!("Failed to run {} --list-langs", executable.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Tesseract --list-langs failed: {}", stderr.trim()));
    }

    // Older builds print the list on stderr
    let listing = if output.stdout.is_empty() { &output.stderr } else { &output.stdout };
    Ok(parse_language_list(&String::from_utf8_lossy(listing)))
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("List of available languages"))
        .map(String::from)
        .collect()
}

/// Finds a tessdata directory containing `<language>.traineddata`.
pub fn find_tessdata_dir(language: &str) -> Option<PathBuf> {
    let file = traineddata_file(language);

    let local = get_tesseract_dir().join("tessdata");
    if local.join(&file).exists() {
        return Some(local);
    }

    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(&file).exists() {
            return Some(p);
        }
        let p = p.join("tessdata");
        if p.join(&file).exists() {
            return Some(p);
        }
    }

    SYSTEM_TESSDATA_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.join(&file).exists())
}

/// Makes sure trained data for `language` exists, downloading it into the
/// local tesseract dir if no installed copy is found.
pub fn ensure_tessdata(language: &str) -> Result<PathBuf> {
    if let Some(dir) = find_tessdata_dir(language) {
        return Ok(dir);
    }

    let tessdata_dir = get_tesseract_dir().join("tessdata");
    fs::create_dir_all(&tessdata_dir)
        .with_context(|| format!("Failed to create {}", tessdata_dir.display()))?;
    download_tessdata(&tessdata_dir, language)?;
    Ok(tessdata_dir)
}

fn download_tessdata(tessdata_dir: &Path, language: &str) -> Result<()> {
    let file = traineddata_file(language);
    let url = format!("{}/{}", TESSDATA_REPO, file);
    let path = tessdata_dir.join(&file);

    info!("Downloading {}...", file);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "scoreboard-ocr")
        .send()
        .with_context(|| format!("Failed to request {}", url))?;

    if !response.status().is_success() {
        return Err(anyhow!("Failed to download {}: HTTP {}", file, response.status()));
    }

    let bytes = response.bytes()?;
    let mut out = fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    out.write_all(&bytes)?;

    info!("Downloaded {} ({} bytes)", file, bytes.len());
    Ok(())
}

fn traineddata_file(language: &str) -> String {
    format!("{}.traineddata", language)
}
