use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use joincoin_types::api::{
    ReferralRequest, ReferralResponse, RegisterUserRequest, RegisterUserResponse, WelcomeMessage,
};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registration = blocking(&state, move |s| {
        s.economy
            .register_user(req.user_id, req.phone.as_deref(), req.referrer_id)
    })
    .await?;

    let status = if registration.created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(RegisterUserResponse {
            user: registration.user,
            created: registration.created,
            referral_registered: registration.referral_registered,
        }),
    ))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |s| s.economy.account(user_id)).await?;
    Ok(Json(user))
}

pub async fn register_referral(
    State(state): State<AppState>,
    Json(req): Json<ReferralRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (registered, total) = blocking(&state, move |s| {
        s.economy
            .register_referral(req.referrer_id, req.referred_user_id)
    })
    .await?;

    Ok(Json(ReferralResponse {
        registered,
        total_referrals: total as i64,
    }))
}

pub async fn welcome_message(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let message = blocking(&state, |s| s.economy.welcome_message()).await?;
    Ok(Json(WelcomeMessage { message }))
}
