use crate::types::*;
use crate::AppState;
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Builds the HTTP surface. With no allowed origin, CORS is permissive.
pub fn router(state: Arc<AppState>, allowed_origin: Option<&str>) -> anyhow::Result<Router> {
    let cors = match allowed_origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("invalid ALLOWED_ORIGIN {}", origin))?,
            )
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]),
        None => CorsLayer::permissive(),
    };

    Ok(Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/cooking/whats-for-dinner/merge", post(merge_recipe))
        .route("/cooking/whats-for-dinner/merge/:job_id/status", get(job_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "recipe-merge",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn merge_recipe(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MergeRecipeRequest>, JsonRejection>,
) -> Result<Json<SubmitJobResponse>, ApiError> {
    let Json(mut request) = payload.map_err(|e| {
        warn!("Rejected merge request body: {}", e);
        error_response(StatusCode::BAD_REQUEST, "invalid request body")
    })?;
    request
        .validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    let job_id = state.submit_job(request);
    info!("Accepted merge job {}", job_id);
    Ok(Json(SubmitJobResponse { job_id }))
}

async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<MergeJob>, ApiError> {
    state
        .job_status(&job_id)
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "job not found"))
}
