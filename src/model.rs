use std::future::Future;

use crate::image::ImagePayload;

/// A vision-capable generative model that turns an instruction plus an image
/// into text.
///
/// Implementors are shared between concurrent requests, so `generate` takes
/// `&self`. Every call is an independent invocation.
pub trait VisionModel {
    /// The error type returned by a single failed invocation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs one invocation of the model.
    fn generate(
        &self,
        instruction: &str,
        image: &ImagePayload,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}
