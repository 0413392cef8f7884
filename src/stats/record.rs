use serde::Serialize;

use crate::config::StatField;

/// Why a field needs a human look.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The cell read as empty
    Missing,
    /// The cell held only a "no value" dash
    Placeholder,
    /// The cell had text that is not a valid value for the field
    Unparseable,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Missing => "missing",
            IssueKind::Placeholder => "placeholder",
            IssueKind::Unparseable => "unparseable",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: StatField,
    pub kind: IssueKind,
    /// Recognized text as read
    pub raw: String,
}

/// Candidate statistics for one scoreboard row, pending human review.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatRecord {
    pub row: usize,
    pub player: Option<String>,
    pub agent: Option<String>,
    pub combat_score: Option<u32>,
    pub kills: Option<u32>,
    pub deaths: Option<u32>,
    pub assists: Option<u32>,
    pub econ_rating: Option<u32>,
    pub first_bloods: Option<u32>,
    pub plants: Option<u32>,
    pub mvp: bool,
    pub issues: Vec<FieldIssue>,
}

impl StatRecord {
    pub fn new(row: usize) -> Self {
        Self { row, ..Default::default() }
    }

    /// True if every field came back empty (an unused roster slot).
    pub fn is_blank(&self) -> bool {
        self.player.is_none()
            && self.agent.is_none()
            && StatField::NUMERIC.iter().all(|&f| self.number(f).is_none())
    }

    /// True if nothing was flagged for correction.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn text(&self, field: StatField) -> Option<&str> {
        match field {
            StatField::PlayerName => self.player.as_deref(),
            StatField::Agent => self.agent.as_deref(),
            _ => None,
        }
    }

    pub fn number(&self, field: StatField) -> Option<u32> {
        match field {
            StatField::CombatScore => self.combat_score,
            StatField::Kills => self.kills,
            StatField::Deaths => self.deaths,
            StatField::Assists => self.assists,
            StatField::EconRating => self.econ_rating,
            StatField::FirstBloods => self.first_bloods,
            StatField::Plants => self.plants,
            StatField::PlayerName | StatField::Agent => None,
        }
    }

    pub(crate) fn set_text(&mut self, field: StatField, value: String) {
        match field {
            StatField::PlayerName => self.player = Some(value),
            StatField::Agent => self.agent = Some(value),
            _ => {}
        }
    }

    pub(crate) fn set_number(&mut self, field: StatField, value: u32) {
        let slot = match field {
            StatField::CombatScore => &mut self.combat_score,
            StatField::Kills => &mut self.kills,
            StatField::Deaths => &mut self.deaths,
            StatField::Assists => &mut self.assists,
            StatField::EconRating => &mut self.econ_rating,
            StatField::FirstBloods => &mut self.first_bloods,
            StatField::Plants => &mut self.plants,
            StatField::PlayerName | StatField::Agent => return,
        };
        *slot = Some(value);
    }

    /// Display form of a field for exports (empty when unset).
    pub fn display(&self, field: StatField) -> String {
        match field {
            StatField::PlayerName | StatField::Agent => self.text(field).unwrap_or_default().to_string(),
            _ => self.number(field).map(|n| n.to_string()).unwrap_or_default(),
        }
    }
}
