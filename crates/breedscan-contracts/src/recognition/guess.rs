use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RecognitionError;

/// Name the model answers with when the photo is not a cattle or buffalo.
pub const UNKNOWN_BREED: &str = "Unknown";

const REASONING_MAX_CHARS: usize = 2_000;
const CHARACTERISTICS_MAX_ITEMS: usize = 12;
const CHARACTERISTIC_MAX_CHARS: usize = 160;

/// Structured guess pulled out of the model's free-form reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiGuess {
    pub identified_breed: String,
    pub confidence: f64,
    pub reasoning: String,
    pub characteristics: Vec<String>,
}

impl AiGuess {
    pub fn new(identified_breed: impl Into<String>, confidence: f64) -> Self {
        Self {
            identified_breed: identified_breed.into(),
            confidence: clamp_confidence(confidence),
            reasoning: String::new(),
            characteristics: Vec::new(),
        }
    }

    /// Parses the reply text of a vision model. Prose around the JSON object
    /// and markdown code fences are tolerated.
    pub fn from_reply_text(text: &str) -> Result<Self, RecognitionError> {
        let Some(object) = extract_json_object_from_text(text) else {
            return Err(RecognitionError::MalformedAiResponse(
                "no JSON object found in model reply".to_string(),
            ));
        };
        Self::from_object(&object)
    }

    pub fn from_object(object: &Map<String, Value>) -> Result<Self, RecognitionError> {
        let identified_breed = object
            .get("identifiedBreed")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                RecognitionError::MalformedAiResponse(
                    "reply is missing the identifiedBreed field".to_string(),
                )
            })?
            .to_string();

        let confidence = object
            .get("confidence")
            .and_then(value_as_f64)
            .map(clamp_confidence)
            .unwrap_or(0.0);

        let reasoning = object
            .get("reasoning")
            .and_then(Value::as_str)
            .map(|text| text.trim().chars().take(REASONING_MAX_CHARS).collect())
            .unwrap_or_default();

        Ok(Self {
            identified_breed,
            confidence,
            reasoning,
            characteristics: coerce_text_list(object.get("characteristics")),
        })
    }

    pub fn is_unknown(&self) -> bool {
        self.identified_breed.trim().eq_ignore_ascii_case(UNKNOWN_BREED)
    }
}

/// Clamps into `[0, 100]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn coerce_text_list(value: Option<&Value>) -> Vec<String> {
    let raw_items: Vec<String> = match value {
        Some(Value::Array(rows)) => rows
            .iter()
            .filter_map(|row| row.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(text)) => text.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut cleaned: Vec<String> = Vec::new();
    for row in raw_items {
        let text = row.split_whitespace().collect::<Vec<&str>>().join(" ");
        if text.is_empty() || cleaned.contains(&text) {
            continue;
        }
        cleaned.push(text.chars().take(CHARACTERISTIC_MAX_CHARS).collect());
        if cleaned.len() >= CHARACTERISTICS_MAX_ITEMS {
            break;
        }
    }
    cleaned
}

fn strip_code_fence(text: &str) -> String {
    let raw = text.trim();
    if !(raw.starts_with("```") && raw.ends_with("```")) {
        return raw.to_string();
    }
    let lines: Vec<&str> = raw.lines().collect();
    if lines.len() < 2 {
        return raw.to_string();
    }
    let mut body = lines[1..lines.len() - 1].join("\n").trim().to_string();
    if body.to_ascii_lowercase().starts_with("json") {
        body = body[4..].trim().to_string();
    }
    body
}

/// Finds the span from the first `{` to the last `}` and decodes it as a JSON
/// object.
pub fn extract_json_object_from_text(text: &str) -> Option<Map<String, Value>> {
    let raw = strip_code_fence(text);
    if raw.trim().is_empty() {
        return None;
    }
    let mut candidates = vec![raw.clone()];
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if end > start {
            candidates.push(raw[start..=end].to_string());
        }
    }
    for candidate in candidates {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&candidate) {
            return Some(object);
        }
    }
    None
}
