use std::time::Duration;

use crate::engine::ExtractionAttempt;

/// Errors raised while decoding an image payload.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// No bytes, or a data URI with no payload after the header.
    #[error("image payload is empty")]
    Empty,

    #[error("image MIME type is empty")]
    MissingMime,

    /// Anything outside `image/*`.
    #[error("unsupported MIME type: {0}")]
    UnsupportedMime(String),

    #[error("data URI is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Errors surfaced by [`crate::ExtractionEngine`].
///
/// Individual attempt failures never show up here. Callers only ever see a
/// rejected request or the exhaustion of the attempt budget.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The request was rejected before any model call.
    #[error("invalid extraction request: {0}")]
    InvalidRequest(String),

    /// Every permitted attempt failed.
    #[error("max retries reached")]
    Exhausted { attempts: Vec<ExtractionAttempt> },
}

impl ExtractionError {
    /// Returns true when every permitted attempt failed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, ExtractionError::Exhausted { .. })
    }

    /// Total time spent waiting between attempts.
    pub fn total_backoff(&self) -> Duration {
        match self {
            ExtractionError::Exhausted { attempts } => {
                attempts.iter().filter_map(|a| a.backoff).sum()
            }
            ExtractionError::InvalidRequest(_) => Duration::ZERO,
        }
    }
}

/// Errors from a single call to the Gemini `generateContent` endpoint.
#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    /// Transport or body decoding failure. The request URL is stripped.
    #[error("http error: {0}")]
    Http(reqwest::Error),

    /// Non-2xx reply, with whatever body the API sent back.
    #[error("gemini returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// A 2xx reply with no candidate or no text part.
    #[error("gemini response contained no text")]
    EmptyResponse,
}

impl From<reqwest::Error> for GeminiError {
    fn from(e: reqwest::Error) -> Self {
        GeminiError::Http(e.without_url())
    }
}

/// Errors raised while setting up the Gemini backend.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is unset or empty.
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
