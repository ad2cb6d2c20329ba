use chrono::{DateTime, Utc};
use joincoin_types::models::TransactionLogEntry;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{TRANSACTION_COLUMNS, transaction_from_row};
use crate::{Database, Result};

pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome!";

const WELCOME_KEY: &str = "welcome_message";

impl Database {
    // -- Settings --

    pub fn welcome_message(&self) -> Result<String> {
        self.with_conn(|conn| {
            let value: Option<String> = conn
                .query_row("SELECT value FROM settings WHERE key = ?1", [WELCOME_KEY], |row| {
                    row.get(0)
                })
                .optional()?;
            Ok(value.unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string()))
        })
    }

    pub fn set_welcome_message(&self, message: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![WELCOME_KEY, message],
            )?;
            Ok(())
        })
    }

    // -- Transaction log --

    pub fn log_transaction(
        &self,
        kind: &str,
        amount: f64,
        description: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| log_transaction_in(conn, kind, amount, description, now))
    }

    /// Newest entries first.
    pub fn recent_transactions(&self, limit: u32) -> Result<Vec<TransactionLogEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM transactions ORDER BY date DESC, id DESC LIMIT ?1",
                TRANSACTION_COLUMNS
            ))?;
            let rows = stmt
                .query_map([limit], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn log_transaction_in(
    conn: &Connection,
    kind: &str,
    amount: f64,
    description: &str,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (kind, amount, description, date) VALUES (?1, ?2, ?3, ?4)",
        params![kind, amount, description, now.timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}
