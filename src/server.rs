use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    engine::{ExtractionEngine, ExtractionRequest},
    error::ExtractionError,
    image::ImagePayload,
    model::VisionModel,
};

/// Route of the extraction endpoint.
pub const EXTRACT_ADDRESS_PATH: &str = "/api/extract-address";

/// Error text sent with a 503 once every attempt has failed.
pub const UNAVAILABLE_MESSAGE: &str = "Model temporarily unavailable. Please try again later.";
/// Error text sent with a 500 for anything unexpected.
pub const FAILURE_MESSAGE: &str = "Failed to process image";

/// Body of `POST /api/extract-address`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractAddressRequest {
    /// The photo as a `data:<mime>;base64,...` URI.
    pub image: String,
}

/// Body of a successful extraction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractAddressResponse {
    /// Extracted address, trimmed. May be empty if the model found nothing.
    pub address: String,
}

/// Body of every non-2xx reply.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    /// Human-readable reason.
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

/// Handler for `POST /api/extract-address`.
pub async fn extract_address<M>(
    State(engine): State<Arc<ExtractionEngine<M>>>,
    payload: Result<Json<ExtractAddressRequest>, JsonRejection>,
) -> Response
where
    M: VisionModel + Send + Sync + 'static,
{
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            log::debug!("Rejecting body: {}", rejection);
            return error_response(rejection.status(), rejection.body_text());
        }
    };

    let image = match ImagePayload::from_data_uri(&payload.image) {
        Ok(image) => image,
        Err(e) => {
            log::debug!("Rejecting image: {}", e);
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match engine.extract(&ExtractionRequest::address(image)).await {
        Ok(extraction) => {
            log::info!("Extracted address: {}", extraction.text);
            (
                StatusCode::OK,
                Json(ExtractAddressResponse {
                    address: extraction.text,
                }),
            )
                .into_response()
        }
        Err(e) => extraction_error_response(e),
    }
}

/// Maps an engine failure to a reply. Only exhaustion reaches this from
/// [`extract_address`] today; every other variant falls through to a 500.
fn extraction_error_response(e: ExtractionError) -> Response {
    match e {
        ExtractionError::Exhausted { .. } => {
            log::error!("Giving up on extraction: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, UNAVAILABLE_MESSAGE)
        }
        _ => {
            log::error!("Error processing image: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, FAILURE_MESSAGE)
        }
    }
}

/// Builds the HTTP router around a shared engine.
pub fn router<M>(engine: Arc<ExtractionEngine<M>>) -> Router
where
    M: VisionModel + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(|| async { "Welcome to scanroute!" }))
        .route(EXTRACT_ADDRESS_PATH, post(extract_address::<M>))
        .with_state(engine)
}
