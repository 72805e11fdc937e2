use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Validation,
    NotFound,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// A message whose payload is well-formed JSON but not a usable value for its channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPayload {
    #[error("session-start carries no questions")]
    EmptySession,
    #[error("question {index} has no text")]
    BlankQuestion { index: usize },
    #[error("transcription for question {index} must carry exactly one of text or error")]
    AmbiguousTranscription { index: usize },
    #[error("analysis-data carries neither per-answer results nor an overall analysis")]
    EmptyAnalysis,
    #[error("analysis-data has a non-finite score")]
    NonFiniteScore,
    #[error("navigation path '{0}' must start with '/'")]
    RelativePath(String),
}

impl From<InvalidPayload> for ApiError {
    fn from(value: InvalidPayload) -> Self {
        Self::new(ErrorCode::Validation, value.to_string())
    }
}
