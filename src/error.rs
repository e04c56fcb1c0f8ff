use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model directory not found at {}", .path.display())]
    ModelNotFound { path: PathBuf },

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("model not loaded")]
    ServiceUnavailable,

    #[error("No emails provided")]
    InvalidBatch,

    #[error("Maximum {max} emails per batch request, got {len}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Classification error: {0:#}")]
    ClassificationFailure(#[source] anyhow::Error),

    #[error("Batch classification error at email {index}: {source}")]
    BatchClassification {
        index: usize,
        #[source]
        source: Box<InferenceError>,
    },
}

impl InferenceError {
    pub fn load(reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad(reason.to_string())
    }

    pub fn failure(reason: impl std::fmt::Display) -> Self {
        Self::ClassificationFailure(anyhow::anyhow!("{reason}"))
    }
}

/// Request-boundary error: everything a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Inference(err) => match err {
                InferenceError::InvalidBatch | InferenceError::BatchTooLarge { .. } => {
                    StatusCode::BAD_REQUEST
                }
                InferenceError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                InferenceError::ModelNotFound { .. }
                | InferenceError::ModelLoad(_)
                | InferenceError::ClassificationFailure(_)
                | InferenceError::BatchClassification { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            metrics::counter!("email_classification_errors_total").increment(1);
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }

        let body = Json(ErrorResponse {
            detail: self.to_string(),
        });
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_errors_are_client_errors() {
        assert_eq!(
            ApiError::from(InferenceError::InvalidBatch).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(InferenceError::BatchTooLarge { len: 101, max: 100 }).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unloaded_model_is_service_unavailable() {
        assert_eq!(
            ApiError::from(InferenceError::ServiceUnavailable).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn batch_failure_wraps_item_cause() {
        let err = InferenceError::BatchClassification {
            index: 3,
            source: Box::new(InferenceError::ClassificationFailure(anyhow::anyhow!(
                "forward pass exploded"
            ))),
        };
        let message = err.to_string();
        assert!(message.contains("email 3"));
        assert!(message.contains("forward pass exploded"));
        assert_eq!(
            ApiError::from(err).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn client_facing_details_keep_their_wording() {
        assert_eq!(InferenceError::InvalidBatch.to_string(), "No emails provided");
        assert_eq!(
            InferenceError::BatchTooLarge { len: 101, max: 100 }.to_string(),
            "Maximum 100 emails per batch request, got 101"
        );
        assert_eq!(
            InferenceError::failure("logits contained NaN").to_string(),
            "Classification error: logits contained NaN"
        );
    }

    #[test]
    fn unauthorized_sets_bearer_challenge() {
        let response = ApiError::Unauthorized("Bearer token required").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }
}
