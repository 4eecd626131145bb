use axum::{
    Json,
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{config::ConfigError, database::StoreError};

pub const MISSING_CREDENTIAL: &str = "Missing authorization header";
pub const INVALID_CREDENTIAL: &str = "Unauthorized - invalid or expired token";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    InvalidPayload(String),

    #[error("Issue not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::InternalError(Box::new(err))
    }
}

/// Oversized or unreadable request bodies.
impl From<BytesRejection> for AppError {
    fn from(rejection: BytesRejection) -> Self {
        AppError::InvalidPayload(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            AppError::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self {
            AppError::InternalError(err) => {
                error!("Dispatch failed: {err}");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("email templates: {0}")]
    Template(#[from] handlebars::TemplateError),

    #[error("http client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
