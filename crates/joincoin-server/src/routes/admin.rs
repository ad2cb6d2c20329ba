use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use joincoin_types::api::{
    AddForcedChannelRequest, ResolveCoinOrderRequest, TransactionQuery, WarnRequest,
    WarnResponse, WelcomeMessage,
};
use serde_json::json;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

// -- Coin orders --

pub async fn resolve_coin_order(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(req): Json<ResolveCoinOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = blocking(&state, move |s| {
        s.economy
            .resolve_coin_order(order_id, req.resolution, req.admin_id)
    })
    .await?;
    Ok(Json(order))
}

pub async fn pending_coin_orders(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let orders = blocking(&state, |s| s.economy.pending_coin_orders()).await?;
    Ok(Json(orders))
}

// -- Users --

pub async fn ban(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.economy.ban(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unban(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.economy.unban(user_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn warn(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(req): Json<WarnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let warnings = blocking(&state, move |s| s.economy.warn(user_id, req.delta)).await?;
    Ok(Json(WarnResponse { user_id, warnings }))
}

// -- Forced channels --

pub async fn list_forced_channels(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let channels = blocking(&state, |s| s.gate.list_channels()).await?;
    Ok(Json(channels))
}

pub async fn add_forced_channel(
    State(state): State<AppState>,
    Json(req): Json<AddForcedChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = blocking(&state, move |s| {
        s.gate.add_channel(&req.channel_username, req.limit)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "channel_username": channel }))))
}

pub async fn remove_forced_channel(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let name = channel.clone();
    let removed = blocking(&state, move |s| s.gate.remove_channel(&name)).await?;
    if !removed {
        return Err(ApiError::NotFound(format!("forced channel {}", channel)));
    }
    Ok(StatusCode::NO_CONTENT)
}

// -- Settings --

pub async fn transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = blocking(&state, move |s| s.economy.recent_transactions(query.limit)).await?;
    Ok(Json(entries))
}

pub async fn set_welcome_message(
    State(state): State<AppState>,
    Json(req): Json<WelcomeMessage>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |s| s.economy.set_welcome_message(&req.message)).await?;
    Ok(StatusCode::NO_CONTENT)
}
