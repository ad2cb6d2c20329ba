use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub phone: Option<String>,
    pub coin_balance: i64,
    /// Sub-coin remainder, always in `[0, 1)`.
    pub coin_fraction: f64,
    pub warnings: i64,
    pub banned: bool,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub owner_id: i64,
    pub channel_username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A request by `owner_id` to receive `required` new members on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberOrder {
    pub id: i64,
    pub owner_id: i64,
    pub channel_username: String,
    pub required: i64,
    pub current: i64,
    pub created_at: DateTime<Utc>,
}

impl SubscriberOrder {
    pub fn is_active(&self) -> bool {
        self.current < self.required
    }

    pub fn remaining(&self) -> i64 {
        (self.required - self.current).max(0)
    }

    /// Fulfilment ratio in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.required <= 0 {
            return 1.0;
        }
        self.current as f64 / self.required as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    /// Join made in fulfilment of a paid subscriber order.
    Organic,
    /// Join required by the mandatory-membership gate.
    Forced,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Organic => "organic",
            Self::Forced => "forced",
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JoinType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organic" => Ok(Self::Organic),
            "forced" => Ok(Self::Forced),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRecord {
    pub id: i64,
    pub user_id: i64,
    pub channel_username: String,
    pub join_type: JoinType,
    pub order_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoinOrderStatus {
    Pending,
    Approved,
    Rejected,
}

impl CoinOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CoinOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoinOrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Terminal decision an admin can apply to a pending coin order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Approved,
    Rejected,
}

impl From<Resolution> for CoinOrderStatus {
    fn from(r: Resolution) -> Self {
        match r {
            Resolution::Approved => Self::Approved,
            Resolution::Rejected => Self::Rejected,
        }
    }
}

/// A manual coin purchase awaiting receipt review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinOrder {
    pub id: i64,
    pub user_id: i64,
    pub quantity: i64,
    pub price: f64,
    pub receipt_file_id: Option<String>,
    pub status: CoinOrderStatus,
    pub created_at: DateTime<Utc>,
    pub admin_id: Option<i64>,
}

/// How long a mandatory channel stays in the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForcedLimit {
    /// Removed once the clock passes `expires_at`.
    Time { expires_at: DateTime<Utc> },
    /// Removed once `quota` members have confirmed through the gate.
    Members { quota: i64 },
}

impl ForcedLimit {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Time { .. } => "time",
            Self::Members { .. } => "members",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedChannel {
    pub channel_username: String,
    pub limit: ForcedLimit,
    pub current_members: i64,
    pub added_at: DateTime<Utc>,
}

impl ForcedChannel {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.limit {
            ForcedLimit::Time { expires_at } => now > expires_at,
            ForcedLimit::Members { quota } => self.current_members >= quota,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    pub referrer_id: i64,
    pub referred_user_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogEntry {
    pub id: i64,
    pub kind: String,
    pub amount: f64,
    pub description: String,
    pub date: DateTime<Utc>,
}

/// Selection policy for the orders shown to a collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    #[default]
    Weighted,
    Random,
    Recency,
    NearCompletion,
}

impl FromStr for RankingPolicy {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weighted" => Ok(Self::Weighted),
            "random" => Ok(Self::Random),
            "recency" => Ok(Self::Recency),
            "near_completion" => Ok(Self::NearCompletion),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// An eligible order with the rank field its policy sorted on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedOrder {
    pub order: SubscriberOrder,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    Pass,
    Blocked,
}

/// Outcome of a forced-membership check. `unmet` lists the channels the
/// user still has to join, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub status: GateStatus,
    pub unmet: Vec<String>,
}

impl GateResult {
    pub fn from_unmet(unmet: Vec<String>) -> Self {
        let status = if unmet.is_empty() { GateStatus::Pass } else { GateStatus::Blocked };
        Self { status, unmet }
    }

    pub fn is_pass(&self) -> bool {
        self.status == GateStatus::Pass
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    /// Channels recorded as joined by this confirmation.
    pub newly_joined: Vec<String>,
    pub gate: GateResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn order_progress_and_remaining() {
        let order = SubscriberOrder {
            id: 1,
            owner_id: 7,
            channel_username: "@news".into(),
            required: 5,
            current: 4,
            created_at: at(0),
        };
        assert!(order.is_active());
        assert_eq!(order.remaining(), 1);
        assert!((order.progress() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn time_limit_expires_strictly_after_deadline() {
        let deadline = at(1_000);
        let channel = ForcedChannel {
            channel_username: "@promo".into(),
            limit: ForcedLimit::Time { expires_at: deadline },
            current_members: 0,
            added_at: at(0),
        };
        assert!(!channel.is_expired(deadline));
        assert!(channel.is_expired(deadline + Duration::seconds(1)));
    }

    #[test]
    fn member_limit_expires_at_quota() {
        let mut channel = ForcedChannel {
            channel_username: "@promo".into(),
            limit: ForcedLimit::Members { quota: 2 },
            current_members: 1,
            added_at: at(0),
        };
        assert!(!channel.is_expired(at(0)));
        channel.current_members = 2;
        assert!(channel.is_expired(at(0)));
    }

    #[test]
    fn status_strings_parse_back() {
        assert_eq!("approved".parse::<CoinOrderStatus>(), Ok(CoinOrderStatus::Approved));
        assert_eq!("forced".parse::<JoinType>(), Ok(JoinType::Forced));
        assert!("refunded".parse::<CoinOrderStatus>().is_err());
    }
}
