use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use joincoin_db::JoinOutcome;
use joincoin_types::api::{
    CreateCoinOrderRequest, CreateCoinOrderResponse, OrderListQuery, PlaceOrderRequest,
    PlaceOrderResponse, RecordJoinRequest, RecordJoinResponse,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Orders a collector can fulfil, best first.
pub async fn collector_orders(
    State(state): State<AppState>,
    Path(collector_id): Path<i64>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ranked = blocking(&state, move |s| {
        s.economy
            .orders_for_collector(collector_id, query.policy, query.limit)
    })
    .await?;
    Ok(Json(ranked))
}

pub async fn place_order(
    State(state): State<AppState>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (order, cost) = blocking(&state, move |s| {
        s.economy
            .place_order(req.owner_id, &req.channel_username, req.required)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(PlaceOrderResponse { order, cost })))
}

pub async fn owner_orders(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = blocking(&state, move |s| s.economy.orders_of(owner_id)).await?;
    Ok(Json(orders))
}

pub async fn record_join(
    State(state): State<AppState>,
    Json(req): Json<RecordJoinRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = blocking(&state, move |s| {
        s.economy
            .record_organic_join(req.user_id, &req.channel_username, req.order_id)
    })
    .await?;

    let (status, body) = match outcome {
        JoinOutcome::Recorded { order_completed, credited } => (
            StatusCode::CREATED,
            RecordJoinResponse {
                recorded: true,
                credited,
                order_completed,
            },
        ),
        JoinOutcome::AlreadyJoined => (
            StatusCode::OK,
            RecordJoinResponse {
                recorded: false,
                credited: 0.0,
                order_completed: false,
            },
        ),
    };
    Ok((status, Json(body)))
}

pub async fn create_coin_order(
    State(state): State<AppState>,
    Json(req): Json<CreateCoinOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order_id = blocking(&state, move |s| {
        s.economy.create_coin_order(
            req.user_id,
            req.quantity,
            req.price,
            req.receipt_file_id.as_deref(),
        )
    })
    .await?;
    Ok((StatusCode::CREATED, Json(CreateCoinOrderResponse { order_id })))
}
