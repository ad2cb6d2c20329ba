use chrono::{DateTime, Utc};
use joincoin_types::models::{ForcedChannel, ForcedLimit};
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::info;

use crate::models::{FORCED_COLUMNS, forced_from_row};
use crate::{Database, LedgerError, Result};

const EXPIRED_PREDICATE: &str = "(limit_type = 'time' AND limit_value < ?1)
     OR (limit_type = 'members' AND current_members >= limit_value)";

impl Database {
    /// Adds or replaces a mandatory channel. Replacing resets its member count.
    pub fn add_forced_channel(
        &self,
        channel_username: &str,
        limit: ForcedLimit,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let value = match limit {
            ForcedLimit::Time { expires_at } => expires_at.timestamp(),
            ForcedLimit::Members { quota } => {
                if quota <= 0 {
                    return Err(LedgerError::InvalidAmount(format!("member quota {}", quota)));
                }
                quota
            }
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO forced_channels
                     (channel_username, limit_type, limit_value, current_members, added_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                params![channel_username, limit.kind(), value, now.timestamp()],
            )?;
            info!(channel_username, limit = limit.kind(), value, "Forced channel added");
            Ok(())
        })
    }

    pub fn remove_forced_channel(&self, channel_username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM forced_channels WHERE channel_username = ?1",
                [channel_username],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn get_forced_channel(&self, channel_username: &str) -> Result<Option<ForcedChannel>> {
        self.with_conn(|conn| {
            let channel = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM forced_channels WHERE channel_username = ?1",
                        FORCED_COLUMNS
                    ),
                    [channel_username],
                    forced_from_row,
                )
                .optional()?;
            Ok(channel)
        })
    }

    /// Every registered forced channel, oldest first, expired or not.
    pub fn list_forced_channels(&self) -> Result<Vec<ForcedChannel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM forced_channels ORDER BY added_at, rowid",
                FORCED_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], forced_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes channels past their deadline or quota and returns their names.
    pub fn prune_expired_forced_channels(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let expired = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT channel_username FROM forced_channels WHERE {} ORDER BY added_at, rowid",
                    EXPIRED_PREDICATE
                ))?;
                let names = stmt
                    .query_map([now.timestamp()], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                names
            };

            if !expired.is_empty() {
                tx.execute(
                    &format!("DELETE FROM forced_channels WHERE {}", EXPIRED_PREDICATE),
                    [now.timestamp()],
                )?;
            }
            tx.commit()?;

            for channel in &expired {
                info!(channel_username = %channel, "Forced channel expired and removed");
            }
            Ok(expired)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use joincoin_types::models::JoinType;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn time_limited_channel_expires_after_deadline() {
        let db = Database::open_in_memory().unwrap();
        let deadline = at(10_000);
        db.add_forced_channel("@promo", ForcedLimit::Time { expires_at: deadline }, at(0)).unwrap();

        assert!(db.prune_expired_forced_channels(deadline).unwrap().is_empty());
        assert_eq!(
            db.prune_expired_forced_channels(deadline + Duration::seconds(1)).unwrap(),
            vec!["@promo".to_string()]
        );
        assert!(db.list_forced_channels().unwrap().is_empty());
    }

    #[test]
    fn member_quota_reached_is_pruned() {
        let db = Database::open_in_memory().unwrap();
        db.add_forced_channel("@full", ForcedLimit::Members { quota: 2 }, at(0)).unwrap();
        db.add_forced_channel("@open", ForcedLimit::Members { quota: 3 }, at(1)).unwrap();
        for user in [1, 2] {
            db.record_join(user, "@full", JoinType::Forced, None, 0.0, at(5)).unwrap();
            db.record_join(user, "@open", JoinType::Forced, None, 0.0, at(5)).unwrap();
        }

        let removed = db.prune_expired_forced_channels(at(6)).unwrap();
        assert_eq!(removed, vec!["@full".to_string()]);
        let left: Vec<String> = db
            .list_forced_channels()
            .unwrap()
            .into_iter()
            .map(|c| c.channel_username)
            .collect();
        assert_eq!(left, vec!["@open".to_string()]);
    }

    #[test]
    fn re_adding_resets_the_counter() {
        let db = Database::open_in_memory().unwrap();
        db.add_forced_channel("@c", ForcedLimit::Members { quota: 5 }, at(0)).unwrap();
        db.record_join(1, "@c", JoinType::Forced, None, 0.0, at(1)).unwrap();
        db.add_forced_channel("@c", ForcedLimit::Members { quota: 5 }, at(2)).unwrap();
        assert_eq!(db.get_forced_channel("@c").unwrap().unwrap().current_members, 0);
        assert!(matches!(
            db.add_forced_channel("@c", ForcedLimit::Members { quota: 0 }, at(3)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(db.remove_forced_channel("@c").unwrap());
        assert!(!db.remove_forced_channel("@c").unwrap());
    }
}
