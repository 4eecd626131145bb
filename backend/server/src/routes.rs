use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, header::AUTHORIZATION},
    response::IntoResponse,
};
use serde_json::json;

use crate::{error::AppError, models::DispatchKind, models::DispatchResult, state::AppState};

pub async fn status_change_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DispatchResult>, AppError> {
    dispatch(&state, DispatchKind::Status, &headers, &body?).await
}

pub async fn verification_change_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<DispatchResult>, AppError> {
    dispatch(&state, DispatchKind::Verification, &headers, &body?).await
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "email_enabled": state.dispatcher.email_enabled(),
    }))
}

async fn dispatch(
    state: &AppState,
    kind: DispatchKind,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<DispatchResult>, AppError> {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    state
        .dispatcher
        .dispatch(kind, body, credential)
        .await
        .map(Json)
}
