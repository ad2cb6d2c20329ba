use serde::{Deserialize, Serialize};

use crate::models::{ForcedLimit, RankingPolicy, Resolution, SubscriberOrder, User};

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterUserRequest {
    pub user_id: i64,
    pub phone: Option<String>,
    /// Set when the user arrived through a referral link.
    pub referrer_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RegisterUserResponse {
    pub user: User,
    pub created: bool,
    pub referral_registered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarnRequest {
    pub delta: i64,
}

#[derive(Debug, Serialize)]
pub struct WarnResponse {
    pub user_id: i64,
    pub warnings: i64,
}

// -- Subscriber orders --

#[derive(Debug, Deserialize)]
pub struct OrderListQuery {
    #[serde(default)]
    pub policy: RankingPolicy,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlaceOrderRequest {
    pub owner_id: i64,
    pub channel_username: String,
    pub required: i64,
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderResponse {
    pub order: SubscriberOrder,
    pub cost: i64,
}

// -- Joins --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordJoinRequest {
    pub user_id: i64,
    pub channel_username: String,
    pub order_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RecordJoinResponse {
    /// False when this join had already been recorded.
    pub recorded: bool,
    pub credited: f64,
    pub order_completed: bool,
}

// -- Coin orders --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCoinOrderRequest {
    pub user_id: i64,
    pub quantity: i64,
    pub price: f64,
    pub receipt_file_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateCoinOrderResponse {
    pub order_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveCoinOrderRequest {
    pub resolution: Resolution,
    pub admin_id: i64,
}

// -- Referrals --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferralRequest {
    pub referrer_id: i64,
    pub referred_user_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ReferralResponse {
    pub registered: bool,
    pub total_referrals: i64,
}

// -- Forced membership --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddForcedChannelRequest {
    pub channel_username: String,
    pub limit: ForcedLimit,
}

// -- Settings --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WelcomeMessage {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub limit: Option<u32>,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}
