use chrono::{DateTime, Utc};
use joincoin_types::models::User;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::models::{USER_COLUMNS, user_from_row};
use crate::{Database, LedgerError, Result};

/// Absorbs float error so that e.g. ten credits of 0.1 still roll over.
const FRACTION_EPSILON: f64 = 1e-9;

impl Database {
    // -- Accounts --

    /// Registers a user. Returns false if the id already exists, in which
    /// case the stored row is left untouched.
    pub fn create_user(
        &self,
        id: i64,
        phone: Option<&str>,
        initial_coins: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| insert_user_in(conn, id, phone, initial_coins, now))
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM users ORDER BY user_id", USER_COLUMNS))?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Substring match on phone number or user id.
    pub fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let pattern = format!("%{}%", query);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users
                 WHERE phone LIKE ?1 OR CAST(user_id AS TEXT) LIKE ?1
                 ORDER BY user_id",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([&pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Balance --

    /// Adds whole coins. Returns the new balance.
    pub fn credit(&self, user_id: i64, amount: i64) -> Result<i64> {
        self.with_conn(|conn| credit_in(conn, user_id, amount))
    }

    /// Removes whole coins, failing without any change if the balance is short.
    /// Returns the new balance.
    pub fn debit(&self, user_id: i64, amount: i64) -> Result<i64> {
        self.with_conn(|conn| debit_in(conn, user_id, amount))
    }

    /// Adds a sub-coin amount; whole coins roll into the balance.
    /// Returns `(balance, fraction)` after the update.
    pub fn add_fraction(&self, user_id: i64, delta: f64) -> Result<(i64, f64)> {
        self.with_conn(|conn| add_fraction_in(conn, user_id, delta))
    }

    // -- Moderation --

    /// Adjusts the warning count by `delta`, flooring at zero.
    pub fn warn(&self, user_id: i64, delta: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE users SET warnings = MAX(warnings + ?1, 0)
                 WHERE user_id = ?2
                 RETURNING warnings",
                params![delta, user_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(LedgerError::UserNotFound(user_id))
        })
    }

    pub fn ban(&self, user_id: i64) -> Result<()> {
        self.set_banned(user_id, true)
    }

    pub fn unban(&self, user_id: i64) -> Result<()> {
        self.set_banned(user_id, false)
    }

    pub fn is_banned(&self, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let banned: Option<i64> = conn
                .query_row("SELECT banned FROM users WHERE user_id = ?1", [user_id], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(banned.unwrap_or(0) != 0)
        })
    }

    fn set_banned(&self, user_id: i64, banned: bool) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET banned = ?1 WHERE user_id = ?2",
                params![banned as i64, user_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::UserNotFound(user_id));
            }
            debug!(user_id, banned, "Ban flag updated");
            Ok(())
        })
    }
}

pub(crate) fn insert_user_in(
    conn: &Connection,
    id: i64,
    phone: Option<&str>,
    initial_coins: i64,
    now: DateTime<Utc>,
) -> Result<bool> {
    if initial_coins < 0 {
        return Err(LedgerError::InvalidAmount(format!(
            "initial balance {} is negative",
            initial_coins
        )));
    }

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (user_id, phone, coin_balance, registered_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![id, phone, initial_coins, now.timestamp()],
    )?;
    Ok(inserted == 1)
}

pub(crate) fn query_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE user_id = ?1", USER_COLUMNS),
            [id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub(crate) fn ensure_user_in(conn: &Connection, user_id: i64) -> Result<()> {
    let exists = conn
        .query_row("SELECT 1 FROM users WHERE user_id = ?1", [user_id], |_| Ok(()))
        .optional()?
        .is_some();
    if exists { Ok(()) } else { Err(LedgerError::UserNotFound(user_id)) }
}

pub(crate) fn credit_in(conn: &Connection, user_id: i64, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!("credit of {} coins", amount)));
    }

    // SQLite turns an overflowing integer sum into a REAL, so the guard
    // has to sit in the WHERE clause, before anything is written.
    let balance: Option<i64> = conn
        .query_row(
            "UPDATE users SET coin_balance = coin_balance + ?1
             WHERE user_id = ?2 AND coin_balance <= 9223372036854775807 - ?1
             RETURNING coin_balance",
            params![amount, user_id],
            |row| row.get(0),
        )
        .optional()?;

    match balance {
        Some(balance) => Ok(balance),
        None => Err(overflow_or_missing(conn, user_id, amount)?),
    }
}

/// Explains why a guarded credit matched no row.
fn overflow_or_missing(conn: &Connection, user_id: i64, amount: i64) -> Result<LedgerError> {
    ensure_user_in(conn, user_id)?;
    Ok(LedgerError::InvalidAmount(format!(
        "crediting {} coins would overflow the balance of user {}",
        amount, user_id
    )))
}

pub(crate) fn debit_in(conn: &Connection, user_id: i64, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(format!("debit of {} coins", amount)));
    }

    let balance: Option<i64> = conn
        .query_row(
            "UPDATE users SET coin_balance = coin_balance - ?1
             WHERE user_id = ?2 AND coin_balance >= ?1
             RETURNING coin_balance",
            params![amount, user_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(balance) = balance {
        return Ok(balance);
    }

    let available: Option<i64> = conn
        .query_row("SELECT coin_balance FROM users WHERE user_id = ?1", [user_id], |row| {
            row.get(0)
        })
        .optional()?;

    match available {
        None => Err(LedgerError::UserNotFound(user_id)),
        Some(available) => Err(LedgerError::InsufficientBalance {
            user_id,
            requested: amount,
            available,
        }),
    }
}

pub(crate) fn add_fraction_in(conn: &Connection, user_id: i64, delta: f64) -> Result<(i64, f64)> {
    if !delta.is_finite() || delta < 0.0 {
        return Err(LedgerError::InvalidAmount(format!("fraction delta {}", delta)));
    }

    // All SET expressions see the pre-update row, so the carry and the
    // remainder are computed from the same fraction. CAST saturates at
    // i64::MAX, which keeps the overflow guard itself in range.
    let updated: Option<(i64, f64)> = conn
        .query_row(
            "UPDATE users SET
                 coin_balance  = coin_balance + CAST(coin_fraction + ?1 + ?3 AS INTEGER),
                 coin_fraction = MAX(coin_fraction + ?1 - CAST(coin_fraction + ?1 + ?3 AS INTEGER), 0.0)
             WHERE user_id = ?2
               AND coin_balance <= 9223372036854775807 - CAST(coin_fraction + ?1 + ?3 AS INTEGER)
             RETURNING coin_balance, coin_fraction",
            params![delta, user_id, FRACTION_EPSILON],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match updated {
        Some(updated) => Ok(updated),
        None => Err(overflow_or_missing(conn, user_id, delta.trunc() as i64)?),
    }
}

/// Credits a possibly fractional reward: the whole part goes straight to the
/// balance, the rest through the fraction accumulator.
pub(crate) fn credit_reward_in(conn: &Connection, user_id: i64, reward: f64) -> Result<()> {
    if !reward.is_finite() || reward < 0.0 {
        return Err(LedgerError::InvalidAmount(format!("reward {}", reward)));
    }

    ensure_user_in(conn, user_id)?;

    let whole = reward.trunc() as i64;
    let fraction = reward - whole as f64;
    if whole > 0 {
        credit_in(conn, user_id, whole)?;
    }
    if fraction > 0.0 {
        add_fraction_in(conn, user_id, fraction)?;
    }
    Ok(())
}
