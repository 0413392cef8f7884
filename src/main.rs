//! Scoreboard OCR command-line front end.
//!
//! Reads one screenshot, prints the candidate records, appends them to a CSV
//! and optionally saves audit images and a JSON dump of the whole read.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use scoreboard_ocr::ocr::ensure_tessdata;
use scoreboard_ocr::stats::{export_to_json, write_records_csv};
use scoreboard_ocr::{load_config, ProgressTracker, RawImage, ScoreboardRead, ScoreboardReader, StatField, TesseractEngine};

/// Progress is logged at info level every this many percent.
const PROGRESS_LOG_STEP: u8 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about = "Read player statistics from a scoreboard screenshot", long_about = None)]
struct Args {
    /// Screenshot to read
    image: PathBuf,

    /// Pipeline configuration (JSON); defaults are used if missing
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Directory for the CSV, audit images and JSON output
    #[arg(short, long, default_value = "output")]
    out: PathBuf,

    /// Concurrent cell recognitions (overrides the config file)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Save one PNG per cell alongside the audit images
    #[arg(long)]
    save_cells: bool,

    /// Also write the full read as JSON
    #[arg(long)]
    json: bool,

    /// Download traineddata for the configured language if it is missing
    #[arg(long)]
    fetch_tessdata: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config);
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }

    if args.fetch_tessdata {
        let language = config.language.clone();
        let dir = tokio::task::spawn_blocking(move || ensure_tessdata(&language))
            .await
            .context("Tessdata download task failed")??;
        info!("Tessdata available in {}", dir.display());
    }

    std::fs::create_dir_all(&args.out)
        .context(format!("Failed to create output directory {}", args.out.display()))?;

    let raw = RawImage::open(&args.image)?;
    let fields = config.layout.fields();
    let engine = Arc::new(TesseractEngine::new(&config));
    let reader = ScoreboardReader::new(config, engine);

    let (progress, mut rx) = ProgressTracker::channel();
    let reporter = tokio::spawn(async move {
        let mut last_logged = 0;
        while rx.changed().await.is_ok() {
            let p = *rx.borrow_and_update();
            if p.percent >= last_logged + PROGRESS_LOG_STEP || (p.percent == 100 && last_logged < 100) {
                info!("Recognizing cells: {}% ({}/{})", p.percent, p.completed, p.total);
                last_logged = p.percent;
            }
        }
    });

    let captured_at = Local::now();
    let result = reader.read(raw, &progress).await;
    drop(progress);
    let _ = reporter.await;

    let read = match result {
        Ok(read) => read,
        Err(e) => {
            error!("Read failed at stage '{}': {}", e.stage(), e);
            return Err(e.into());
        }
    };

    print_records(&read, &fields);

    for failure in &read.failures {
        warn!("Cell ({}, {}) could not be read: {}", failure.row, failure.col, failure.error);
    }

    let csv_path = args.out.join("scoreboard.csv");
    write_records_csv(&csv_path, &read.run.to_string(), captured_at, &fields, &read.records)?;
    info!("Appended {} records to {}", read.records.len(), csv_path.display());

    let run_dir = read.save_audit(&args.out, args.save_cells)?;

    if args.json {
        let json_path = run_dir.join("read.json");
        export_to_json(&read, &json_path)?;
        info!("Wrote {}", json_path.display());
    }

    Ok(())
}

fn print_records(read: &ScoreboardRead, fields: &[StatField]) {
    let header: Vec<&str> = fields.iter().map(|f| f.key()).collect();
    println!("row\t{}\tmvp", header.join("\t"));

    for record in read.records.iter().filter(|r| !r.is_blank()) {
        let values: Vec<String> = fields.iter().map(|&f| record.display(f)).collect();
        let mut line = format!("{}\t{}\t{}", record.row, values.join("\t"), if record.mvp { "*" } else { "" });
        if !record.is_clean() {
            let flagged: Vec<&str> = record.issues.iter().map(|i| i.field.key()).collect();
            line.push_str(&format!("\t(check: {})", flagged.join(", ")));
        }
        println!("{}", line);
    }
}
