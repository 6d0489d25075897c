use std::fmt;

use serde::{Deserialize, Serialize};

use crate::breeds::Breed;

/// Which reconciliation step matched the model's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    ParentheticalStripped,
}

impl MatchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::ParentheticalStripped => "parenthetical_stripped",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeMatch {
    pub breed: Breed,
    pub confidence: f64,
}

/// Outcome of one successful recognition. Alternatives are sorted by
/// descending confidence and hold at most three entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub breed: Breed,
    pub confidence: f64,
    pub alternatives: Vec<AlternativeMatch>,
    pub matched_by: MatchKind,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub observed_traits: Vec<String>,
}

/// Renders a percentage the way it reads in messages: `87`, `9.5`.
pub fn format_confidence(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_finite() && value.fract() == 0.0 {
        return format!("{value:.0}");
    }
    format!("{value}")
}
