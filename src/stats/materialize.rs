//! Maps the recognized text matrix onto candidate stat records.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::record::{FieldIssue, IssueKind, StatRecord};
use crate::config::{FieldKind, StatField};

/// Characters OCR returns for the "no value" dash shown on the scoreboard.
fn is_dash_char(c: char) -> bool {
    matches!(
        c,
        '-' | '\u{2014}' // em-dash
            | '\u{2013}' // en-dash
            | '\u{2015}' // horizontal bar
            | '\u{2500}' // box drawing horizontal
    )
}

const NUMBER_PATTERN: &str = r"^(\d{1,3}(,\d{3})+|\d+)$";

fn number_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(NUMBER_PATTERN).ok()).as_ref()
}

/// Outcome of reading one numeric cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParsedStat {
    Value(u32),
    Missing,
    /// Only a dash; the board shows no value, the record must be filled in by hand
    Placeholder,
    Unparseable,
}

/// Parses a numeric stat as read by OCR.
///
/// Accepts plain digits and comma thousands separators. A dash placeholder is
/// reported as such, never coerced to a number.
pub fn parse_stat(text: &str) -> ParsedStat {
    let text = text.trim();
    if text.is_empty() {
        return ParsedStat::Missing;
    }
    if text.chars().all(is_dash_char) {
        return ParsedStat::Placeholder;
    }
    if !number_pattern().is_some_and(|re| re.is_match(text)) {
        return ParsedStat::Unparseable;
    }

    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.parse::<u32>() {
        Ok(value) => ParsedStat::Value(value),
        Err(_) => ParsedStat::Unparseable,
    }
}

/// Collapses internal whitespace runs to a single space.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds one record per row of `matrix`, with `fields[c]` naming column `c`.
///
/// Cells beyond the end of a short row are treated as empty.
pub fn materialize(matrix: &[Vec<String>], fields: &[StatField]) -> Vec<StatRecord> {
    let mut records: Vec<StatRecord> = matrix
        .iter()
        .enumerate()
        .map(|(row, texts)| materialize_row(row, texts, fields))
        .collect();

    assign_mvp(&mut records);
    records
}

fn materialize_row(row: usize, texts: &[String], fields: &[StatField]) -> StatRecord {
    let mut record = StatRecord::new(row);

    for (col, &field) in fields.iter().enumerate() {
        let raw = texts.get(col).map(String::as_str).unwrap_or("");

        match field.kind() {
            FieldKind::Text => {
                let value = normalize_text(raw);
                if value.is_empty() {
                    record.issues.push(issue(field, IssueKind::Missing, raw));
                } else {
                    record.set_text(field, value);
                }
            }
            FieldKind::Integer => match parse_stat(raw) {
                ParsedStat::Value(value) => record.set_number(field, value),
                ParsedStat::Missing => record.issues.push(issue(field, IssueKind::Missing, raw)),
                ParsedStat::Placeholder => record.issues.push(issue(field, IssueKind::Placeholder, raw)),
                ParsedStat::Unparseable => {
                    debug!("Row {} {}: could not parse '{}'", row, field.key(), raw);
                    record.issues.push(issue(field, IssueKind::Unparseable, raw));
                }
            },
        }
    }

    record
}

fn issue(field: StatField, kind: IssueKind, raw: &str) -> FieldIssue {
    FieldIssue { field, kind, raw: raw.to_string() }
}

/// Flags the record with the highest combat score; the first row wins ties.
fn assign_mvp(records: &mut [StatRecord]) {
    let mut best: Option<(usize, u32)> = None;
    for (i, record) in records.iter().enumerate() {
        if let Some(acs) = record.combat_score
            && best.is_none_or(|(_, top)| acs > top)
        {
            best = Some((i, acs));
        }
    }

    for record in records.iter_mut() {
        record.mvp = false;
    }
    if let Some((i, _)) = best {
        records[i].mvp = true;
    }
}

/// Moves the MVP flag to the record for `row`. Returns false if no record has that row.
pub fn override_mvp(records: &mut [StatRecord], row: usize) -> bool {
    if !records.iter().any(|r| r.row == row) {
        return false;
    }
    for record in records.iter_mut() {
        record.mvp = record.row == row;
    }
    true
}
