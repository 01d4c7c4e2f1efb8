use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};

use super::{
    ModelInfo, RealisticRequest, RealisticResponse, ScoreRequest, ScoreResponse, ScoringService,
};
use crate::error::AppError;

/// Router builder exposing the scoring endpoints.
pub fn scoring_router(service: Arc<ScoringService>) -> Router {
    Router::new()
        .route("/api/v1/score", post(score_handler))
        .route("/api/v1/score/realistic", post(realistic_handler))
        .route("/api/v1/model", get(model_handler))
        .with_state(service)
}

pub(crate) async fn score_handler(
    State(service): State<Arc<ScoringService>>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<ScoreResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(service.score(&request)?))
}

pub(crate) async fn realistic_handler(
    State(service): State<Arc<ScoringService>>,
    payload: Result<Json<RealisticRequest>, JsonRejection>,
) -> Result<Json<RealisticResponse>, AppError> {
    let Json(request) = payload?;
    Ok(Json(service.score_realistic(&request)?))
}

pub(crate) async fn model_handler(State(service): State<Arc<ScoringService>>) -> Json<ModelInfo> {
    Json(service.model_info())
}
