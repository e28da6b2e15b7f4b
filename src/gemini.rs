use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, GeminiError},
    image::ImagePayload,
    model::VisionModel,
};

/// Model used when neither `GEMINI_MODEL` nor the config names one.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
/// Public Gemini REST endpoint.
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Environment variable holding the API key. Required.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Environment variable overriding the model name.
pub const MODEL_VAR: &str = "GEMINI_MODEL";
/// Environment variable overriding the base URL.
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for the Gemini REST API.
#[derive(Clone, Debug)]
pub struct GeminiConfig {
    /// Sent in the `x-goog-api-key` header, never in the URL.
    pub api_key: String,
    /// Model name, e.g. `gemini-1.5-flash`.
    pub model: String,
    /// Scheme and host the `/v1beta/...` path is appended to.
    pub base_url: String,
    /// Per-call timeout. `None` lets a hung call stall until the server gives up.
    pub timeout: Option<Duration>,
}

impl GeminiConfig {
    /// Creates a config for the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            timeout: None,
        }
    }

    /// Reads `GEMINI_API_KEY`, and optionally `GEMINI_MODEL` and `GEMINI_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingVar(API_KEY_VAR))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var(MODEL_VAR) {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var(BASE_URL_VAR) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Overrides the model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Overrides the base URL, mostly useful to point at a local upstream.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Bounds each model call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    InlineData { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let mut texts = content.parts.into_iter().filter_map(|p| p.text).peekable();
        texts.peek()?;
        Some(texts.collect())
    }
}

/// [`VisionModel`] backed by Gemini's `generateContent` endpoint.
pub struct GeminiModel {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiModel {
    /// Builds the HTTP client. Fails only if reqwest cannot initialise TLS.
    pub fn new(config: GeminiConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// The settings this model was built with.
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

impl VisionModel for GeminiModel {
    type Error = GeminiError;

    async fn generate(&self, instruction: &str, image: &ImagePayload) -> Result<String, GeminiError> {
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [
                    Part::Text { text: instruction },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type(),
                            data: image.to_base64(),
                        },
                    },
                ],
            }],
        };

        log::debug!("Calling {} with {} byte image", self.config.model, image.len());

        let response = self
            .client
            .post(self.config.endpoint())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Status { status, body });
        }

        response
            .json::<GenerateContentResponse>()
            .await?
            .into_text()
            .ok_or(GeminiError::EmptyResponse)
    }
}
