use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{info, warn};

use crate::ledger::{credit_in, ensure_user_in, insert_user_in};
use crate::settings::log_transaction_in;
use crate::{Database, LedgerError, Result};

/// Result of [`Database::register_user_with_referral`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signup {
    pub created: bool,
    pub referral_registered: bool,
}

impl Database {
    /// Stores the edge `referrer -> referred` and pays the referrer `reward`
    /// coins, once per edge. Returns false when the edge already existed.
    pub fn register_referral(
        &self,
        referrer_id: i64,
        referred_user_id: i64,
        reward: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        validate_referral(referrer_id, referred_user_id, reward)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let inserted = register_referral_in(&tx, referrer_id, referred_user_id, reward, now)?;
            tx.commit()?;
            if inserted {
                info!(referrer_id, referred_user_id, reward, "Referral registered");
            }
            Ok(inserted)
        })
    }

    /// Creates the user and, when they are new, credits their referrer, all
    /// in one transaction. A self-referral or an unknown referrer is skipped
    /// without failing the registration. An existing user is left untouched
    /// and no referral is recorded for them.
    pub fn register_user_with_referral(
        &self,
        id: i64,
        phone: Option<&str>,
        initial_coins: i64,
        referrer_id: Option<i64>,
        reward: i64,
        now: DateTime<Utc>,
    ) -> Result<Signup> {
        if let Some(referrer_id) = referrer_id {
            if referrer_id != id {
                validate_referral(referrer_id, id, reward)?;
            }
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let created = insert_user_in(&tx, id, phone, initial_coins, now)?;
            let mut referral_registered = false;
            if let (true, Some(referrer_id)) = (created, referrer_id) {
                if referrer_id == id {
                    warn!(user_id = id, "Ignoring self-referral");
                } else if !user_exists_in(&tx, referrer_id)? {
                    warn!(user_id = id, referrer_id, "Ignoring unknown referrer");
                } else {
                    referral_registered = register_referral_in(&tx, referrer_id, id, reward, now)?;
                }
            }

            tx.commit()?;
            if created {
                info!(user_id = id, ?referrer_id, referral_registered, "User registered");
            }
            Ok(Signup {
                created,
                referral_registered,
            })
        })
    }

    pub fn referral_exists(&self, referrer_id: i64, referred_user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM referrals WHERE referrer_id = ?1 AND referred_user_id = ?2",
                    params![referrer_id, referred_user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn referred_users(&self, referrer_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT referred_user_id FROM referrals WHERE referrer_id = ?1 ORDER BY created_at, referred_user_id",
            )?;
            let rows = stmt
                .query_map([referrer_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_referrals(&self, referrer_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM referrals WHERE referrer_id = ?1",
                [referrer_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn validate_referral(referrer_id: i64, referred_user_id: i64, reward: i64) -> Result<()> {
    if referrer_id == referred_user_id {
        return Err(LedgerError::InvalidReferral);
    }
    if reward < 0 {
        return Err(LedgerError::InvalidAmount(format!("referral reward {}", reward)));
    }
    Ok(())
}

fn user_exists_in(conn: &Connection, user_id: i64) -> Result<bool> {
    match ensure_user_in(conn, user_id) {
        Ok(()) => Ok(true),
        Err(LedgerError::UserNotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

fn register_referral_in(
    conn: &Connection,
    referrer_id: i64,
    referred_user_id: i64,
    reward: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    ensure_user_in(conn, referrer_id)?;

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO referrals (referrer_id, referred_user_id, created_at)
         VALUES (?1, ?2, ?3)",
        params![referrer_id, referred_user_id, now.timestamp()],
    )?;
    if inserted == 0 {
        return Ok(false);
    }

    if reward > 0 {
        credit_in(conn, referrer_id, reward)?;
        log_transaction_in(
            conn,
            "referral_reward",
            reward as f64,
            &format!("user {} referred {}", referrer_id, referred_user_id),
            now,
        )?;
    }
    Ok(true)
}
