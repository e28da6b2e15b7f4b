use std::time::Duration;

use crate::{error::ExtractionError, image::ImagePayload, model::VisionModel};

/// Instruction used to pull a single postal address out of a photo.
pub const ADDRESS_INSTRUCTION: &str = "Extract only the address from this image. If multiple addresses are present, choose the most prominent one. Return only the address, nothing else.";

/// Attempts made before a request is declared exhausted.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Wait after the first failure. Each later wait doubles it.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5000);

/// Bounded exponential backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. A `max_attempts` of zero is clamped to one.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Upper bound on model invocations per request, always at least one.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the first failed attempt.
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Delay applied after the failed attempt with the given 0-based index.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BASE_DELAY)
    }
}

/// One image plus the instruction to run against it.
#[derive(Clone, Debug)]
pub struct ExtractionRequest {
    instruction: String,
    image: ImagePayload,
}

impl ExtractionRequest {
    /// Creates a request, rejecting a blank instruction.
    pub fn new(instruction: impl Into<String>, image: ImagePayload) -> Result<Self, ExtractionError> {
        let instruction = instruction.into();
        if instruction.trim().is_empty() {
            return Err(ExtractionError::InvalidRequest(
                "instruction must not be empty".to_string(),
            ));
        }
        Ok(Self { instruction, image })
    }

    /// Shorthand for a request using [`ADDRESS_INSTRUCTION`].
    pub fn address(image: ImagePayload) -> Self {
        Self {
            instruction: ADDRESS_INSTRUCTION.to_string(),
            image,
        }
    }

    /// Natural-language instruction sent alongside the image.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// The image to run the instruction against.
    pub fn image(&self) -> &ImagePayload {
        &self.image
    }
}

/// What a single model invocation produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The model answered. The text lives in [`Extraction::text`].
    Succeeded,
    /// The model call failed with this cause.
    Failed(String),
}

/// Record of a single model invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionAttempt {
    /// 0-based attempt index.
    pub index: u32,
    /// Success, or the display text of the failure.
    pub outcome: AttemptOutcome,
    /// Wait applied before the next attempt. `None` on success and on the final attempt.
    pub backoff: Option<Duration>,
}

/// Text produced by a successful extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    /// Model output with surrounding whitespace removed.
    pub text: String,
    /// Every attempt made for this request, the last one being the success.
    pub attempts: Vec<ExtractionAttempt>,
}

/// Runs extraction requests against a [`VisionModel`], retrying failed
/// invocations with exponential backoff.
///
/// The engine holds no per-request state: every call to [`extract`] keeps its
/// own attempt log, so one engine can serve any number of concurrent requests.
///
/// [`extract`]: ExtractionEngine::extract
pub struct ExtractionEngine<M: VisionModel> {
    model: M,
    policy: RetryPolicy,
}

impl<M: VisionModel> ExtractionEngine<M> {
    /// Creates an engine with [`RetryPolicy::default`].
    pub fn new(model: M) -> Self {
        Self::with_policy(model, RetryPolicy::default())
    }

    /// Creates an engine with a custom retry policy.
    pub fn with_policy(model: M, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    /// The retry policy applied to every request.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The underlying model.
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Runs the request until the model answers or the attempt budget is spent.
    ///
    /// Returns the model output with surrounding whitespace trimmed, or
    /// [`ExtractionError::Exhausted`] carrying the log of every failed attempt.
    pub async fn extract(&self, request: &ExtractionRequest) -> Result<Extraction, ExtractionError> {
        let max_attempts = self.policy.max_attempts;
        let mut attempts = Vec::with_capacity(max_attempts as usize);

        for index in 0..max_attempts {
            log::debug!(
                "Running attempt {} of {} ({} bytes of {})",
                index + 1,
                max_attempts,
                request.image.len(),
                request.image.mime_type()
            );

            match self.model.generate(&request.instruction, &request.image).await {
                Ok(text) => {
                    attempts.push(ExtractionAttempt {
                        index,
                        outcome: AttemptOutcome::Succeeded,
                        backoff: None,
                    });
                    log::info!("Extraction succeeded after {} attempt(s)", index + 1);
                    return Ok(Extraction {
                        text: text.trim().to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    log::warn!("Attempt {} failed: {}", index + 1, e);

                    let is_last = index + 1 == max_attempts;
                    let backoff = (!is_last).then(|| self.policy.delay_for(index));
                    attempts.push(ExtractionAttempt {
                        index,
                        outcome: AttemptOutcome::Failed(e.to_string()),
                        backoff,
                    });

                    if let Some(delay) = backoff {
                        log::debug!("Backing off for {:?}", delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        log::error!("Extraction failed after {} attempts", max_attempts);
        Err(ExtractionError::Exhausted { attempts })
    }
}
