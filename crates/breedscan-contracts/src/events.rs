//! Lifecycle events of a recognition session, appended to `events.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RecognitionError, RecognitionErrorKind};
use crate::recognition::{AiGuess, HistoryRecord, MatchKind, RecognitionResult};

/// One step of a recognition, serialized with its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognitionEvent {
    SessionStarted {
        provider: String,
        model: String,
        store: String,
    },
    ImageNormalized {
        source: String,
        width: u32,
        height: u32,
        encoded_chars: usize,
    },
    CatalogLoaded {
        store: String,
        count: usize,
        duplicates: Vec<String>,
    },
    AiGuess {
        provider: String,
        identified_breed: String,
        confidence: f64,
        reasoning: String,
        characteristics: Vec<String>,
        provider_request: Map<String, Value>,
        provider_response: Map<String, Value>,
    },
    RecognitionMatched {
        breed_id: String,
        breed: String,
        confidence: f64,
        matched_by: MatchKind,
        alternatives: Vec<RankedBreed>,
    },
    RecognitionFailed {
        kind: RecognitionErrorKind,
        message: String,
    },
    HistoryRecorded {
        breed_id: Option<String>,
        confidence_score: Option<f64>,
    },
    HistoryWriteFailed {
        message: String,
        policy: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBreed {
    pub breed: String,
    pub confidence: f64,
}

impl RecognitionEvent {
    pub fn ai_guess(
        provider: &str,
        guess: &AiGuess,
        provider_request: Map<String, Value>,
        provider_response: Map<String, Value>,
    ) -> Self {
        Self::AiGuess {
            provider: provider.to_string(),
            identified_breed: guess.identified_breed.clone(),
            confidence: guess.confidence,
            reasoning: guess.reasoning.clone(),
            characteristics: guess.characteristics.clone(),
            provider_request,
            provider_response,
        }
    }

    pub fn matched(result: &RecognitionResult) -> Self {
        Self::RecognitionMatched {
            breed_id: result.breed.id.clone(),
            breed: result.breed.name.clone(),
            confidence: result.confidence,
            matched_by: result.matched_by,
            alternatives: result
                .alternatives
                .iter()
                .map(|alt| RankedBreed {
                    breed: alt.breed.name.clone(),
                    confidence: alt.confidence,
                })
                .collect(),
        }
    }

    pub fn failed(err: &RecognitionError) -> Self {
        Self::RecognitionFailed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn history_recorded(record: &HistoryRecord) -> Self {
        Self::HistoryRecorded {
            breed_id: record.breed_id.clone(),
            confidence_score: record.confidence_score,
        }
    }

    /// The `type` tag written for this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionStarted { .. } => "session_started",
            Self::ImageNormalized { .. } => "image_normalized",
            Self::CatalogLoaded { .. } => "catalog_loaded",
            Self::AiGuess { .. } => "ai_guess",
            Self::RecognitionMatched { .. } => "recognition_matched",
            Self::RecognitionFailed { .. } => "recognition_failed",
            Self::HistoryRecorded { .. } => "history_recorded",
            Self::HistoryWriteFailed { .. } => "history_write_failed",
        }
    }
}

/// Append-only JSONL log for one session. Every line carries the event
/// fields plus `session_id` and `ts`.
#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            session_id: session_id.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn with_new_session(path: impl Into<PathBuf>) -> Self {
        Self::new(path, format!("session-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn append(&self, event: &RecognitionEvent) -> Result<()> {
        let line = serde_json::to_string(&self.envelope(event)?)?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating {}", parent.display()))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed opening {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn envelope(&self, event: &RecognitionEvent) -> Result<Map<String, Value>> {
        let Value::Object(mut row) = serde_json::to_value(event)? else {
            return Err(anyhow!("{} did not serialize to an object", event.name()));
        };
        row.insert("session_id".to_string(), Value::String(self.session_id.clone()));
        row.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Ok(row)
    }
}
