use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::error::ApiError;
use crate::state::AppState;

pub async fn check(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.gate.evaluate(user_id).await?;
    Ok(Json(result))
}

pub async fn confirm(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let confirmation = state.gate.confirm_membership(user_id).await?;
    Ok(Json(confirmation))
}
