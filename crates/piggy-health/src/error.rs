use crate::config::ConfigError;
use crate::model::{ArtifactError, DatasetError, ModelError};
use crate::scoring::ReferenceTableError;
use crate::service::ScoringServiceError;
use crate::telemetry::TelemetryError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Model(ModelError),
    Artifact(ArtifactError),
    Dataset(DatasetError),
    ReferenceTable(ReferenceTableError),
    Scoring(ScoringServiceError),
    Request(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Model(err) => write!(f, "model error: {}", err),
            AppError::Artifact(err) => write!(f, "artifact error: {}", err),
            AppError::Dataset(err) => write!(f, "dataset error: {}", err),
            AppError::ReferenceTable(err) => write!(f, "reference table error: {}", err),
            AppError::Scoring(err) => write!(f, "scoring error: {}", err),
            AppError::Request(message) => write!(f, "invalid request: {}", message),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Model(err) => Some(err),
            AppError::Artifact(err) => Some(err),
            AppError::Dataset(err) => Some(err),
            AppError::ReferenceTable(err) => Some(err),
            AppError::Scoring(err) => Some(err),
            AppError::Request(_) => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Model(ModelError::NotTrained) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Scoring(ScoringServiceError::RealisticUnavailable) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Scoring(ScoringServiceError::Inference(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Model(_)
            | AppError::Dataset(_)
            | AppError::Request(_)
            | AppError::Scoring(ScoringServiceError::Invalid { .. }) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Artifact(_)
            | AppError::ReferenceTable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<ModelError> for AppError {
    fn from(value: ModelError) -> Self {
        Self::Model(value)
    }
}

impl From<ArtifactError> for AppError {
    fn from(value: ArtifactError) -> Self {
        Self::Artifact(value)
    }
}

impl From<DatasetError> for AppError {
    fn from(value: DatasetError) -> Self {
        Self::Dataset(value)
    }
}

impl From<ReferenceTableError> for AppError {
    fn from(value: ReferenceTableError) -> Self {
        Self::ReferenceTable(value)
    }
}

impl From<ScoringServiceError> for AppError {
    fn from(value: ScoringServiceError) -> Self {
        Self::Scoring(value)
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        Self::Request(value.body_text())
    }
}
