use std::time::Duration;

use breedscan_contracts::RecognitionError;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{map_object, VisionProvider, VisionReply, VisionRequest};
use crate::config::{
    EngineConfig, DEFAULT_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S, MIN_REQUEST_TIMEOUT_S,
};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.gemini_api_base.trim_end_matches('/').to_string(),
            api_key: config.gemini_api_key.clone(),
            timeout: request_timeout(config.request_timeout_s),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(request: &VisionRequest<'_>) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.prompt },
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type,
                            "data": request.image.data,
                        }
                    },
                ],
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
            },
        })
    }

    /// Concatenated text parts of the first candidate.
    fn extract_reply_text(response_payload: &Value) -> Option<String> {
        let parts = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)?;
        let text = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<&str>>()
            .join("");
        if text.trim().is_empty() {
            return None;
        }
        Some(text)
    }

    fn api_error_message(body: &str, status: reqwest::StatusCode) -> String {
        serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|payload| {
                payload
                    .get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string()
            })
    }
}

impl VisionProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn ensure_configured(&self) -> Result<(), RecognitionError> {
        if self.api_key.is_none() {
            return Err(RecognitionError::ConfigurationMissing);
        }
        Ok(())
    }

    fn analyze(&self, request: &VisionRequest<'_>) -> Result<VisionReply, RecognitionError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(RecognitionError::ConfigurationMissing);
        };
        let endpoint = self.endpoint_for_model(request.model);
        let payload = Self::build_payload(request);
        debug!(%endpoint, prompt_chars = request.prompt.len(), "sending Gemini request");

        let response = self
            .http
            .post(&endpoint)
            .header(API_KEY_HEADER, api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .map_err(|err| classify_transport_error("Gemini request failed", err))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|err| classify_transport_error("Gemini response body read failed", err))?;
        if !status.is_success() {
            let message = Self::api_error_message(&body, status);
            warn!(status = status.as_u16(), %message, "Gemini returned an error status");
            return Err(RecognitionError::UnknownFailure(format!(
                "Gemini API error: {message}"
            )));
        }

        let response_payload: Value = serde_json::from_str(&body).map_err(|err| {
            RecognitionError::MalformedAiResponse(format!("Gemini returned invalid JSON: {err}"))
        })?;
        let Some(text) = Self::extract_reply_text(&response_payload) else {
            let block_reason = response_payload
                .get("promptFeedback")
                .and_then(|feedback| feedback.get("blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("no text parts");
            return Err(RecognitionError::MalformedAiResponse(format!(
                "Gemini returned no answer ({block_reason})"
            )));
        };

        Ok(VisionReply {
            text,
            provider_request: map_object(json!({
                "endpoint": endpoint,
                "model": request.model,
                "prompt_chars": request.prompt.len(),
                "image": {
                    "mime_type": request.image.mime_type,
                    "width": request.image.width,
                    "height": request.image.height,
                    "encoded_chars": request.image.data.len(),
                },
            })),
            provider_response: map_object(json!({
                "status": status.as_u16(),
                "finish_reason": response_payload
                    .get("candidates")
                    .and_then(|rows| rows.get(0))
                    .and_then(|row| row.get("finishReason"))
                    .cloned()
                    .unwrap_or(Value::Null),
                "usage_metadata": response_payload.get("usageMetadata").cloned().unwrap_or(Value::Null),
            })),
        })
    }
}

/// Out-of-range and NaN timeouts fall back into the accepted window.
fn request_timeout(seconds: f64) -> Duration {
    let seconds = if seconds.is_nan() {
        DEFAULT_REQUEST_TIMEOUT_S
    } else {
        seconds.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
    };
    Duration::try_from_secs_f64(seconds)
        .unwrap_or_else(|_| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_S as u64))
}

/// The request URL is dropped from the message.
fn classify_transport_error(context: &str, err: reqwest::Error) -> RecognitionError {
    let err = err.without_url();
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return RecognitionError::NetworkError(format!("{context}: {err}"));
    }
    RecognitionError::UnknownFailure(format!("{context}: {err}"))
}
