//! Order selection for collectors.
//!
//! Every policy starts from the eligible set sorted by ascending order id and
//! uses a stable sort, so equal scores always come back in id order.

use chrono::{DateTime, Utc};
use joincoin_types::models::{RankedOrder, RankingPolicy, SubscriberOrder};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::config::RankingWeights;

/// `progress·(100·current/required) + age·age_hours + remaining·(required−current)`
pub fn weighted_score(order: &SubscriberOrder, now: DateTime<Utc>, weights: &RankingWeights) -> f64 {
    let percent = 100.0 * order.progress();
    let age_hours = (now - order.created_at).num_seconds().max(0) as f64 / 3600.0;
    weights.progress * percent + weights.age * age_hours + weights.remaining * order.remaining() as f64
}

/// Ranks `orders` under `policy` and keeps the first `limit`.
/// Orders that are already complete are dropped regardless of policy.
pub fn rank_orders<R>(
    orders: Vec<SubscriberOrder>,
    policy: RankingPolicy,
    limit: usize,
    now: DateTime<Utc>,
    weights: &RankingWeights,
    rng: &mut R,
) -> Vec<RankedOrder>
where
    R: Rng + ?Sized,
{
    let mut eligible: Vec<SubscriberOrder> = orders.into_iter().filter(|o| o.is_active()).collect();
    eligible.sort_by_key(|o| o.id);

    let mut ranked: Vec<RankedOrder> = match policy {
        RankingPolicy::Random => {
            eligible.shuffle(rng);
            eligible
                .into_iter()
                .map(|order| RankedOrder { order, score: 0.0 })
                .collect()
        }
        RankingPolicy::Weighted => scored(eligible, |o| weighted_score(o, now, weights)),
        RankingPolicy::Recency => scored(eligible, |o| o.created_at.timestamp() as f64),
        RankingPolicy::NearCompletion => scored(eligible, |o| o.progress()),
    };

    ranked.truncate(limit);
    ranked
}

fn scored<F>(orders: Vec<SubscriberOrder>, score: F) -> Vec<RankedOrder>
where
    F: Fn(&SubscriberOrder) -> f64,
{
    let mut ranked: Vec<RankedOrder> = orders
        .into_iter()
        .map(|order| {
            let score = score(&order);
            RankedOrder { order, score }
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
