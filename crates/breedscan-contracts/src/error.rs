//! Error kinds surfaced by the recognition flow.

use serde::Serialize;
use thiserror::Error;

use crate::recognition::format_confidence;

/// Message shown when no AI credential is available.
pub const CREDENTIAL_NOT_CONFIGURED: &str =
    "Google Gemini API key not configured. Please set GEMINI_API_KEY (or add it to your .env file) to enable breed recognition.";

/// Every failure a recognition request can end in.
///
/// All variants render to a message fit for direct display. None of them is
/// retried by the engine.
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// No AI credential; raised before any network call.
    #[error("{}", CREDENTIAL_NOT_CONFIGURED)]
    ConfigurationMissing,

    /// The breed catalog could not be read from the store.
    #[error("Failed to fetch breeds from database: {0}")]
    CatalogUnavailable(String),

    /// The AI endpoint could not be reached.
    #[error("Network error: Unable to reach AI service ({0})")]
    NetworkError(String),

    /// The AI reply held no decodable JSON object.
    #[error("Invalid response format from AI: {0}")]
    MalformedAiResponse(String),

    #[error(
        "Could not identify a valid cattle or buffalo breed in the image. AI detected: \"{detected}\" with {}% confidence. Please upload a clear image of an Indian cattle or buffalo.",
        percent(.confidence)
    )]
    NoConfidentMatch { detected: String, confidence: f64 },

    /// Input bytes are not a decodable image.
    #[error("Please select an image file: {0}")]
    InvalidImage(String),

    #[error("{0}")]
    UnknownFailure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionErrorKind {
    ConfigurationMissing,
    CatalogUnavailable,
    NetworkError,
    MalformedAiResponse,
    NoConfidentMatch,
    InvalidImage,
    UnknownFailure,
}

impl RecognitionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationMissing => "configuration_missing",
            Self::CatalogUnavailable => "catalog_unavailable",
            Self::NetworkError => "network_error",
            Self::MalformedAiResponse => "malformed_ai_response",
            Self::NoConfidentMatch => "no_confident_match",
            Self::InvalidImage => "invalid_image",
            Self::UnknownFailure => "unknown_failure",
        }
    }
}

impl RecognitionError {
    pub fn kind(&self) -> RecognitionErrorKind {
        match self {
            Self::ConfigurationMissing => RecognitionErrorKind::ConfigurationMissing,
            Self::CatalogUnavailable(_) => RecognitionErrorKind::CatalogUnavailable,
            Self::NetworkError(_) => RecognitionErrorKind::NetworkError,
            Self::MalformedAiResponse(_) => RecognitionErrorKind::MalformedAiResponse,
            Self::NoConfidentMatch { .. } => RecognitionErrorKind::NoConfidentMatch,
            Self::InvalidImage(_) => RecognitionErrorKind::InvalidImage,
            Self::UnknownFailure(_) => RecognitionErrorKind::UnknownFailure,
        }
    }

    pub fn is_configuration_missing(&self) -> bool {
        matches!(self, Self::ConfigurationMissing)
    }
}

impl From<anyhow::Error> for RecognitionError {
    fn from(err: anyhow::Error) -> Self {
        Self::UnknownFailure(format!("{err:#}"))
    }
}

fn percent(confidence: &f64) -> String {
    format_confidence(*confidence)
}
