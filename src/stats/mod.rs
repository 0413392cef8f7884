//! Candidate stat records built from recognized text, and their export.

pub mod export;
pub mod materialize;
pub mod record;

pub use export::{export_to_json, write_records_csv};
pub use materialize::{materialize, override_mvp, parse_stat, ParsedStat};
pub use record::{FieldIssue, IssueKind, StatRecord};
