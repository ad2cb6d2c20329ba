use chrono::{DateTime, Utc};
use joincoin_types::models::{JoinRecord, JoinType};
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::ledger::credit_reward_in;
use crate::models::{JOIN_COLUMNS, join_from_row};
use crate::orders::query_subscriber_order;
use crate::{Database, LedgerError, Result};

/// Result of [`Database::record_join`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JoinOutcome {
    /// First record for this (user, channel, type); side effects applied.
    Recorded { order_completed: bool, credited: f64 },
    /// The join was already on file. Nothing changed.
    AlreadyJoined,
}

impl JoinOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, Self::Recorded { .. })
    }
}

impl Database {
    /// Records that `user_id` joined `channel_username`, exactly once per
    /// (user, channel, join type).
    ///
    /// On the first organic join tied to an order, the order counter moves
    /// up by one and the joiner is credited `reward`. On the first forced
    /// join, the forced channel's member counter moves up by one. The record,
    /// the counter and the credit commit together or not at all.
    pub fn record_join(
        &self,
        user_id: i64,
        channel_username: &str,
        join_type: JoinType,
        order_id: Option<i64>,
        reward: f64,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome> {
        if join_type == JoinType::Forced && order_id.is_some() {
            return Err(LedgerError::InvalidOrderState(
                "forced joins are not tied to orders".into(),
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            // The join row references the order, so the order is validated first.
            let order = match (join_type, order_id) {
                (JoinType::Organic, Some(order_id)) => {
                    let order = query_subscriber_order(&tx, order_id)?
                        .ok_or(LedgerError::OrderNotFound(order_id))?;
                    if order.channel_username != channel_username {
                        return Err(LedgerError::InvalidOrderState(format!(
                            "order {} is for {}, not {}",
                            order_id, order.channel_username, channel_username
                        )));
                    }
                    if order.owner_id == user_id {
                        return Err(LedgerError::InvalidOrderState(format!(
                            "user {} owns order {}",
                            user_id, order_id
                        )));
                    }
                    Some(order)
                }
                _ => None,
            };

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO joined_channels (user_id, channel_username, join_type, order_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, channel_username, join_type.as_str(), order_id, now.timestamp()],
            )?;
            if inserted == 0 {
                debug!(user_id, channel_username, %join_type, "Join already recorded");
                return Ok(JoinOutcome::AlreadyJoined);
            }

            let outcome = match (join_type, order) {
                (JoinType::Organic, Some(order)) => {
                    let order_id = order.id;
                    let current: i64 = tx
                        .query_row(
                            "UPDATE subscriber_orders SET current = current + 1
                             WHERE order_id = ?1 AND current < required
                             RETURNING current",
                            [order_id],
                            |row| row.get(0),
                        )
                        .optional()?
                        .ok_or_else(|| {
                            LedgerError::InvalidOrderState(format!("order {} is already complete", order_id))
                        })?;

                    credit_reward_in(&tx, user_id, reward)?;

                    JoinOutcome::Recorded {
                        order_completed: current >= order.required,
                        credited: reward,
                    }
                }
                (JoinType::Organic, None) => JoinOutcome::Recorded {
                    order_completed: false,
                    credited: 0.0,
                },
                (JoinType::Forced, _) => {
                    tx.execute(
                        "UPDATE forced_channels SET current_members = current_members + 1
                         WHERE channel_username = ?1",
                        [channel_username],
                    )?;
                    JoinOutcome::Recorded {
                        order_completed: false,
                        credited: 0.0,
                    }
                }
            };

            tx.commit()?;
            info!(user_id, channel_username, %join_type, ?order_id, "Join recorded");
            Ok(outcome)
        })
    }

    pub fn has_joined(&self, user_id: i64, channel_username: &str, join_type: JoinType) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM joined_channels
                     WHERE user_id = ?1 AND channel_username = ?2 AND join_type = ?3",
                    params![user_id, channel_username, join_type.as_str()],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Deletes a join record without touching counters or balances.
    pub fn remove_join(&self, user_id: i64, channel_username: &str, join_type: JoinType) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM joined_channels
                 WHERE user_id = ?1 AND channel_username = ?2 AND join_type = ?3",
                params![user_id, channel_username, join_type.as_str()],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_joins(&self, user_id: i64) -> Result<Vec<JoinRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM joined_channels WHERE user_id = ?1 ORDER BY id",
                JOIN_COLUMNS
            ))?;
            let rows = stmt
                .query_map([user_id], join_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use joincoin_types::models::ForcedLimit;

    const OWNER: i64 = 1;
    const COLLECTOR: i64 = 2;

    fn setup(required: i64) -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_user(OWNER, None, 0, now).unwrap();
        db.create_user(COLLECTOR, None, 0, now).unwrap();
        let order = db.create_subscriber_order(OWNER, "@grow", required, now).unwrap();
        (db, order)
    }

    fn balance(db: &Database, id: i64) -> i64 {
        db.get_user(id).unwrap().unwrap().coin_balance
    }

    #[test]
    fn organic_join_counts_and_credits_once() {
        let (db, order) = setup(3);
        let now = Utc::now();

        let first = db.record_join(COLLECTOR, "@grow", JoinType::Organic, Some(order), 1.0, now).unwrap();
        assert_eq!(first, JoinOutcome::Recorded { order_completed: false, credited: 1.0 });

        let second = db.record_join(COLLECTOR, "@grow", JoinType::Organic, Some(order), 1.0, now).unwrap();
        assert_eq!(second, JoinOutcome::AlreadyJoined);

        assert_eq!(db.get_subscriber_order(order).unwrap().unwrap().current, 1);
        assert_eq!(balance(&db, COLLECTOR), 1);
        assert!(db.has_joined(COLLECTOR, "@grow", JoinType::Organic).unwrap());
        assert!(!db.has_joined(COLLECTOR, "@grow", JoinType::Forced).unwrap());
    }

    #[test]
    fn last_join_completes_the_order() {
        let (db, order) = setup(1);
        let outcome = db
            .record_join(COLLECTOR, "@grow", JoinType::Organic, Some(order), 1.0, Utc::now())
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Recorded { order_completed: true, credited: 1.0 });
        assert!(db.eligible_orders_for_collector(3).unwrap().is_empty());
    }

    #[test]
    fn join_on_complete_order_rolls_back() {
        let (db, order) = setup(1);
        let now = Utc::now();
        db.create_user(3, None, 0, now).unwrap();
        db.record_join(COLLECTOR, "@grow", JoinType::Organic, Some(order), 1.0, now).unwrap();

        let err = db.record_join(3, "@grow", JoinType::Organic, Some(order), 1.0, now).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidOrderState(_)));
        assert!(!db.has_joined(3, "@grow", JoinType::Organic).unwrap());
        assert_eq!(balance(&db, 3), 0);
        assert_eq!(db.get_subscriber_order(order).unwrap().unwrap().current, 1);
    }

    #[test]
    fn failed_credit_rolls_back_counter_and_record() {
        let (db, order) = setup(3);
        // user 9 was never registered, so the credit step fails
        let err = db.record_join(9, "@grow", JoinType::Organic, Some(order), 1.0, Utc::now()).unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound(9)));
        assert_eq!(db.get_subscriber_order(order).unwrap().unwrap().current, 0);
        assert!(!db.has_joined(9, "@grow", JoinType::Organic).unwrap());
    }

    #[test]
    fn owner_and_channel_mismatch_are_rejected() {
        let (db, order) = setup(3);
        let now = Utc::now();
        assert!(matches!(
            db.record_join(OWNER, "@grow", JoinType::Organic, Some(order), 1.0, now),
            Err(LedgerError::InvalidOrderState(_))
        ));
        assert!(matches!(
            db.record_join(COLLECTOR, "@other", JoinType::Organic, Some(order), 1.0, now),
            Err(LedgerError::InvalidOrderState(_))
        ));
        assert!(matches!(
            db.record_join(COLLECTOR, "@grow", JoinType::Organic, Some(404), 1.0, now),
            Err(LedgerError::OrderNotFound(404))
        ));
        assert!(db.list_joins(COLLECTOR).unwrap().is_empty());
    }

    #[test]
    fn fractional_rewards_accumulate() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_user(OWNER, None, 0, now).unwrap();
        db.create_user(COLLECTOR, None, 0, now).unwrap();
        for channel in ["@a", "@b", "@c", "@d"] {
            let order = db.create_subscriber_order(OWNER, channel, 5, now).unwrap();
            db.record_join(COLLECTOR, channel, JoinType::Organic, Some(order), 0.5, now).unwrap();
        }
        let user = db.get_user(COLLECTOR).unwrap().unwrap();
        assert_eq!(user.coin_balance, 2);
        assert!(user.coin_fraction.abs() < 1e-9);
    }

    #[test]
    fn forced_join_bumps_member_counter_once() {
        let (db, _) = setup(1);
        let now = Utc::now();
        db.add_forced_channel("@promo", ForcedLimit::Members { quota: 10 }, now).unwrap();

        assert!(db.record_join(COLLECTOR, "@promo", JoinType::Forced, None, 0.0, now).unwrap().is_recorded());
        assert!(!db.record_join(COLLECTOR, "@promo", JoinType::Forced, None, 0.0, now).unwrap().is_recorded());
        assert_eq!(db.get_forced_channel("@promo").unwrap().unwrap().current_members, 1);
        assert!(matches!(
            db.record_join(COLLECTOR, "@promo", JoinType::Forced, Some(1), 0.0, now),
            Err(LedgerError::InvalidOrderState(_))
        ));
    }

    #[test]
    fn removed_join_can_be_recorded_again() {
        let (db, _) = setup(1);
        let now = Utc::now();
        db.record_join(COLLECTOR, "@free", JoinType::Organic, None, 0.0, now).unwrap();
        assert!(db.remove_join(COLLECTOR, "@free", JoinType::Organic).unwrap());
        assert!(db.record_join(COLLECTOR, "@free", JoinType::Organic, None, 0.0, now).unwrap().is_recorded());
        assert_eq!(db.list_joins(COLLECTOR).unwrap().len(), 1);
    }
}
