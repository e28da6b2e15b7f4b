//! Address extraction from photos using a vision-capable generative model.
//!
//! The core piece is [`ExtractionEngine`], which runs an instruction plus an
//! image against a [`VisionModel`] and retries failed invocations with bounded
//! exponential backoff. [`GeminiModel`] is the production model and
//! [`server::router`] exposes the engine over HTTP.

mod engine;
mod error;
mod gemini;
mod image;
mod model;

pub mod server;

pub use engine::{
    ADDRESS_INSTRUCTION, AttemptOutcome, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, Extraction,
    ExtractionAttempt, ExtractionEngine, ExtractionRequest, RetryPolicy,
};
pub use error::{ConfigError, ExtractionError, GeminiError, ImageError};
pub use gemini::{
    API_KEY_VAR, BASE_URL_VAR, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiConfig,
    GeminiModel, MODEL_VAR,
};
pub use image::{DEFAULT_MIME_TYPE, ImagePayload};
pub use model::VisionModel;
