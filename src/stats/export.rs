//! CSV and JSON export of candidate records.
//!
//! The CSV is append-only: the header is written once, then each read adds
//! its rows, so a folder of screenshots can be collected into one file.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::record::{FieldIssue, StatRecord};
use crate::config::StatField;

fn csv_header(fields: &[StatField]) -> String {
    let mut columns = vec!["run_id", "captured_at", "row"];
    columns.extend(fields.iter().map(|f| f.key()));
    columns.extend(["mvp", "issues"]);
    columns.join(",")
}

/// Quotes a CSV value if it contains a separator, quote or line break.
fn escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn describe_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}:{}", i.field.key(), i.kind.as_str()))
        .collect::<Vec<_>>()
        .join(";")
}

/// Creates the CSV with a header row unless it already has content.
pub fn init_csv(path: &Path, fields: &[StatField]) -> Result<()> {
    if path.exists() {
        let file = File::open(path).context("Failed to open existing CSV")?;
        if BufReader::new(file).lines().next().is_some() {
            return Ok(());
        }
    }

    let mut file = File::create(path).context("Failed to create CSV file")?;
    writeln!(file, "{}", csv_header(fields)).context("Failed to write CSV header")?;
    Ok(())
}

/// Appends one row per record, columns in `fields` order.
pub fn write_records_csv(
    path: &Path,
    run_id: &str,
    captured_at: DateTime<Local>,
    fields: &[StatField],
    records: &[StatRecord],
) -> Result<()> {
    init_csv(path, fields)?;

    let mut file = OpenOptions::new()
        .append(true)
        .open(path)
        .context(format!("Failed to open CSV for append: {}", path.display()))?;

    let timestamp = captured_at.format("%Y-%m-%dT%H:%M:%S").to_string();
    for record in records {
        let mut values = vec![escape(run_id), timestamp.clone(), record.row.to_string()];
        values.extend(fields.iter().map(|&f| escape(&record.display(f))));
        values.push(record.mvp.to_string());
        values.push(escape(&describe_issues(&record.issues)));

        writeln!(file, "{}", values.join(",")).context("Failed to write CSV row")?;
    }

    Ok(())
}

/// Writes `value` to `output_path` as pretty-printed JSON.
pub fn export_to_json<T: Serialize>(value: &T, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize read to JSON")?;

    let mut file = File::create(output_path)
        .context(format!("Failed to create JSON file: {}", output_path.display()))?;

    file.write_all(json.as_bytes()).context("Failed to write JSON data")?;

    Ok(())
}
