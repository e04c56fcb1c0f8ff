use axum::{
    Router,
    extract::{Query, Request, State},
    http::header,
    middleware::{self, Next},
    response::{Json, Response},
    routing::{get, post},
};
use metrics::counter;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ApiError, InferenceError};
use crate::service::ClassificationService;
use crate::types::{BatchRequest, BatchResult, EmailInput, EmailResult, HealthReport, ModelInfo};

#[derive(Clone)]
pub struct AppState {
    service: Arc<ClassificationService>,
    api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<ClassificationService>, api_token: Option<String>) -> Self {
        Self {
            service,
            api_token: api_token.map(Arc::from),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScoreParams {
    #[serde(default)]
    show_all_scores: bool,
}

/// API routes. `/health` stays open; everything else sits behind the bearer check.
pub fn routes(state: AppState) -> Router {
    let protected = Router::new()
        .route("/", get(root_handler))
        .route("/classify", post(classify_handler))
        .route("/classify-batch", post(classify_batch_handler))
        .route("/model-info", get(model_info_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .with_state(state)
}

/// Serves the routes under `prefix` and at their bare paths, so the app works
/// both behind a prefix-stripping proxy and when addressed directly.
pub fn mount(router: Router, prefix: Option<&str>) -> Router {
    match prefix {
        Some(prefix) => Router::new().nest(prefix, router.clone()).merge(router),
        None => router,
    }
}

async fn require_bearer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim());

    match presented {
        None => return Err(ApiError::Unauthorized("Bearer token required")),
        Some(token) if token != expected => {
            return Err(ApiError::Unauthorized("Invalid bearer token"));
        }
        Some(_) => {}
    }
    Ok(next.run(request).await)
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Email Classifier Inference API is running" }))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.service.health())
}

/// Runs a classification off the async workers; the forward pass is CPU/GPU bound.
async fn blocking<T, F>(state: &AppState, work: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ClassificationService) -> Result<T, InferenceError> + Send + 'static,
{
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || work(service.as_ref()))
        .await
        .map_err(|e| ApiError::Internal(format!("classification task failed: {e}")))??;
    Ok(result)
}

#[tracing::instrument(skip(state, email), fields(show_all_scores = params.show_all_scores))]
async fn classify_handler(
    State(state): State<AppState>,
    Query(params): Query<ScoreParams>,
    Json(email): Json<EmailInput>,
) -> Result<Json<EmailResult>, ApiError> {
    counter!("email_classifications_total").increment(1);
    tracing::info!("Processing classification request");

    let result = blocking(&state, move |service| {
        service.classify(&email.subject, &email.body, params.show_all_scores)
    })
    .await?;
    Ok(Json(result))
}

#[tracing::instrument(
    skip(state, request),
    fields(batch_size = request.emails.len(), show_all_scores = params.show_all_scores)
)]
async fn classify_batch_handler(
    State(state): State<AppState>,
    Query(params): Query<ScoreParams>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResult>, ApiError> {
    counter!("email_batches_total").increment(1);
    tracing::info!("Processing batch classification request");

    let result = blocking(&state, move |service| {
        service.classify_batch(&request.emails, params.show_all_scores)
    })
    .await?;
    counter!("email_classifications_total").increment(result.total_count as u64);
    Ok(Json(result))
}

async fn model_info_handler(State(state): State<AppState>) -> Result<Json<ModelInfo>, ApiError> {
    Ok(Json(state.service.model_info()?))
}
