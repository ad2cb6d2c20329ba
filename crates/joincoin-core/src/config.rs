use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Result, anyhow, bail};

/// Weight of the fulfilment percentage (0..=100) in the weighted score.
pub const DEFAULT_PROGRESS_WEIGHT: f64 = 3.0;
/// Weight of the order age in hours.
pub const DEFAULT_AGE_WEIGHT: f64 = 2.0;
/// Weight of the members still missing.
pub const DEFAULT_REMAINING_WEIGHT: f64 = 1.0;

/// Default number of orders returned to a collector, for every policy.
pub const DEFAULT_ORDER_LIMIT: u32 = 10;
pub const DEFAULT_MAX_ORDER_LIMIT: u32 = 100;

/// Default number of entries in the admin transaction listing.
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 5;
pub const DEFAULT_MAX_TRANSACTION_LIMIT: u32 = 100;

/// Coins credited for one organic join.
pub const DEFAULT_JOIN_REWARD: f64 = 1.0;
pub const DEFAULT_ORDER_COST_PER_MEMBER: i64 = 2;
pub const DEFAULT_REFERRAL_REWARD: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub progress: f64,
    pub age: f64,
    pub remaining: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            progress: DEFAULT_PROGRESS_WEIGHT,
            age: DEFAULT_AGE_WEIGHT,
            remaining: DEFAULT_REMAINING_WEIGHT,
        }
    }
}

/// Economic constants of a deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct EconomyConfig {
    pub initial_coins: i64,
    pub join_reward: f64,
    pub order_cost_per_member: i64,
    pub referral_reward: i64,
    pub default_order_limit: u32,
    pub max_order_limit: u32,
    pub default_transaction_limit: u32,
    pub max_transaction_limit: u32,
    pub weights: RankingWeights,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            initial_coins: 0,
            join_reward: DEFAULT_JOIN_REWARD,
            order_cost_per_member: DEFAULT_ORDER_COST_PER_MEMBER,
            referral_reward: DEFAULT_REFERRAL_REWARD,
            default_order_limit: DEFAULT_ORDER_LIMIT,
            max_order_limit: DEFAULT_MAX_ORDER_LIMIT,
            default_transaction_limit: DEFAULT_TRANSACTION_LIMIT,
            max_transaction_limit: DEFAULT_MAX_TRANSACTION_LIMIT,
            weights: RankingWeights::default(),
        }
    }
}

impl EconomyConfig {
    /// Reads `JOINCOIN_*` variables, falling back to the defaults above.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            initial_coins: var_or(&lookup, "JOINCOIN_INITIAL_COINS", defaults.initial_coins)?,
            join_reward: var_or(&lookup, "JOINCOIN_JOIN_REWARD", defaults.join_reward)?,
            order_cost_per_member: var_or(
                &lookup,
                "JOINCOIN_ORDER_COST",
                defaults.order_cost_per_member,
            )?,
            referral_reward: var_or(&lookup, "JOINCOIN_REFERRAL_REWARD", defaults.referral_reward)?,
            default_order_limit: var_or(
                &lookup,
                "JOINCOIN_ORDER_LIMIT",
                defaults.default_order_limit,
            )?,
            max_order_limit: var_or(&lookup, "JOINCOIN_ORDER_LIMIT_MAX", defaults.max_order_limit)?,
            default_transaction_limit: var_or(
                &lookup,
                "JOINCOIN_TRANSACTION_LIMIT",
                defaults.default_transaction_limit,
            )?,
            max_transaction_limit: var_or(
                &lookup,
                "JOINCOIN_TRANSACTION_LIMIT_MAX",
                defaults.max_transaction_limit,
            )?,
            weights: RankingWeights {
                progress: var_or(&lookup, "JOINCOIN_WEIGHT_PROGRESS", defaults.weights.progress)?,
                age: var_or(&lookup, "JOINCOIN_WEIGHT_AGE", defaults.weights.age)?,
                remaining: var_or(
                    &lookup,
                    "JOINCOIN_WEIGHT_REMAINING",
                    defaults.weights.remaining,
                )?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_coins < 0 {
            bail!("JOINCOIN_INITIAL_COINS must not be negative");
        }
        if !self.join_reward.is_finite() || self.join_reward < 0.0 {
            bail!("JOINCOIN_JOIN_REWARD must be a non-negative number");
        }
        if self.order_cost_per_member < 0 || self.referral_reward < 0 {
            bail!("order cost and referral reward must not be negative");
        }
        if self.max_order_limit == 0 || self.default_order_limit > self.max_order_limit {
            bail!(
                "order limit {} must be within 1..={}",
                self.default_order_limit,
                self.max_order_limit
            );
        }
        if self.max_transaction_limit == 0
            || self.default_transaction_limit > self.max_transaction_limit
        {
            bail!(
                "transaction limit {} must be within 1..={}",
                self.default_transaction_limit,
                self.max_transaction_limit
            );
        }
        let w = self.weights;
        if ![w.progress, w.age, w.remaining].iter().all(|v| v.is_finite()) {
            bail!("ranking weights must be finite");
        }
        Ok(())
    }

    /// Resolves a caller-supplied limit against the configured default and cap.
    pub fn clamp_limit(&self, requested: Option<u32>) -> usize {
        requested
            .unwrap_or(self.default_order_limit)
            .min(self.max_order_limit) as usize
    }

    /// Same as [`clamp_limit`](Self::clamp_limit), for the transaction log.
    pub fn clamp_transaction_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_transaction_limit)
            .min(self.max_transaction_limit)
    }
}

fn var_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        _ => Ok(default),
    }
}
