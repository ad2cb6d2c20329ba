use chrono::{DateTime, Utc};
use joincoin_types::models::{
    Channel, CoinOrder, CoinOrderStatus, Resolution, SubscriberOrder,
};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::info;

use crate::ledger::{credit_in, debit_in, ensure_user_in};
use crate::models::{
    CHANNEL_COLUMNS, COIN_ORDER_COLUMNS, ORDER_COLUMNS, channel_from_row, coin_order_from_row,
    order_from_row,
};
use crate::settings::log_transaction_in;
use crate::{Database, LedgerError, Result};

/// Largest coin purchase a single order may request.
pub const MAX_COIN_ORDER_QUANTITY: i64 = 1_000_000_000;

impl Database {
    // -- Channels --

    /// Registers a channel under its owner. Returns false if already present.
    pub fn add_channel(
        &self,
        owner_id: i64,
        channel_username: &str,
        display_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| add_channel_in(conn, owner_id, channel_username, display_name, now))
    }

    pub fn remove_channel(&self, owner_id: i64, channel_username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM channels WHERE owner_id = ?1 AND channel_username = ?2",
                params![owner_id, channel_username],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn list_channels(&self, owner_id: i64) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM channels WHERE owner_id = ?1 ORDER BY channel_id",
                CHANNEL_COLUMNS
            ))?;
            let rows = stmt
                .query_map([owner_id], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn channel_exists(&self, owner_id: i64, channel_username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM channels WHERE owner_id = ?1 AND channel_username = ?2",
                    params![owner_id, channel_username],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    // -- Subscriber orders --

    pub fn create_subscriber_order(
        &self,
        owner_id: i64,
        channel_username: &str,
        required: i64,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn(|conn| insert_subscriber_order_in(conn, owner_id, channel_username, required, now))
    }

    /// Charges `required * cost_per_member` coins, registers the channel under
    /// its owner and opens the order in one transaction. Nothing is written if
    /// the owner cannot pay or already has an open order for the channel.
    pub fn place_subscriber_order(
        &self,
        owner_id: i64,
        channel_username: &str,
        required: i64,
        cost_per_member: i64,
        now: DateTime<Utc>,
    ) -> Result<(SubscriberOrder, i64)> {
        if cost_per_member < 0 {
            return Err(LedgerError::InvalidAmount(format!(
                "cost per member {}",
                cost_per_member
            )));
        }
        let cost = required.checked_mul(cost_per_member).ok_or_else(|| {
            LedgerError::InvalidAmount(format!("{} members overflow the order cost", required))
        })?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if has_active_order_in(&tx, owner_id, channel_username)? {
                return Err(LedgerError::InvalidOrderState(format!(
                    "{} already has an open order",
                    channel_username
                )));
            }

            if cost > 0 {
                debit_in(&tx, owner_id, cost)?;
            }
            add_channel_in(&tx, owner_id, channel_username, None, now)?;
            let order_id = insert_subscriber_order_in(&tx, owner_id, channel_username, required, now)?;
            log_transaction_in(
                &tx,
                "order_placement",
                -(cost as f64),
                &format!("user {} ordered {} members for {}", owner_id, required, channel_username),
                now,
            )?;
            let order = query_subscriber_order(&tx, order_id)?.ok_or(LedgerError::OrderNotFound(order_id))?;

            tx.commit()?;
            info!(order_id, owner_id, cost, "Subscriber order placed");
            Ok((order, cost))
        })
    }

    pub fn get_subscriber_order(&self, order_id: i64) -> Result<Option<SubscriberOrder>> {
        self.with_conn(|conn| query_subscriber_order(conn, order_id))
    }

    /// All orders owned by `owner_id`, newest first.
    pub fn list_subscriber_orders(&self, owner_id: i64) -> Result<Vec<SubscriberOrder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM subscriber_orders WHERE user_id = ?1 ORDER BY order_id DESC",
                ORDER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([owner_id], order_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn has_active_order(&self, owner_id: i64, channel_username: &str) -> Result<bool> {
        self.with_conn(|conn| has_active_order_in(conn, owner_id, channel_username))
    }

    /// Open orders a collector may fulfil, in ascending id order: not their
    /// own, not complete, and not for a channel they already joined organically.
    pub fn eligible_orders_for_collector(&self, collector_id: i64) -> Result<Vec<SubscriberOrder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT o.order_id, o.user_id, o.channel_username, o.required, o.current, o.created_at
                 FROM subscriber_orders o
                 WHERE o.user_id != ?1
                   AND o.current < o.required
                   AND NOT EXISTS (
                       SELECT 1 FROM joined_channels j
                       WHERE j.user_id = ?1
                         AND j.channel_username = o.channel_username
                         AND j.join_type = 'organic'
                   )
                 ORDER BY o.order_id ASC",
            )?;
            let rows = stmt
                .query_map([collector_id], order_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Coin orders --

    pub fn create_coin_order(
        &self,
        user_id: i64,
        quantity: i64,
        price: f64,
        receipt_file_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        if quantity <= 0 || quantity > MAX_COIN_ORDER_QUANTITY {
            return Err(LedgerError::InvalidAmount(format!("quantity {}", quantity)));
        }
        if !price.is_finite() || price < 0.0 {
            return Err(LedgerError::InvalidAmount(format!("price {}", price)));
        }

        self.with_conn(|conn| {
            ensure_user_in(conn, user_id)?;
            conn.execute(
                "INSERT INTO coin_orders (user_id, quantity, price, receipt_file_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
                params![user_id, quantity, price, receipt_file_id, now.timestamp()],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_coin_order(&self, order_id: i64) -> Result<Option<CoinOrder>> {
        self.with_conn(|conn| query_coin_order(conn, order_id))
    }

    pub fn list_pending_coin_orders(&self) -> Result<Vec<CoinOrder>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM coin_orders WHERE status = 'pending' ORDER BY order_id",
                COIN_ORDER_COLUMNS
            ))?;
            let rows = stmt
                .query_map([], coin_order_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Moves a pending coin order to its terminal state. Approval credits the
    /// buyer in the same transaction. A resolved order is never touched again.
    pub fn resolve_coin_order(
        &self,
        order_id: i64,
        resolution: Resolution,
        admin_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CoinOrder> {
        let status = CoinOrderStatus::from(resolution);

        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let order = query_coin_order(&tx, order_id)?.ok_or(LedgerError::OrderNotFound(order_id))?;
            if order.status != CoinOrderStatus::Pending {
                return Err(LedgerError::AlreadyResolved {
                    order_id,
                    status: order.status,
                });
            }

            let changed = tx.execute(
                "UPDATE coin_orders SET status = ?1, admin_id = ?2
                 WHERE order_id = ?3 AND status = 'pending'",
                params![status.as_str(), admin_id, order_id],
            )?;
            if changed == 0 {
                return Err(LedgerError::AlreadyResolved {
                    order_id,
                    status: order.status,
                });
            }

            if status == CoinOrderStatus::Approved {
                credit_in(&tx, order.user_id, order.quantity)?;
                log_transaction_in(
                    &tx,
                    "coin_purchase",
                    order.price,
                    &format!(
                        "order {}: {} coins for user {} approved by {}",
                        order_id, order.quantity, order.user_id, admin_id
                    ),
                    now,
                )?;
            }

            let resolved = query_coin_order(&tx, order_id)?.ok_or(LedgerError::OrderNotFound(order_id))?;
            tx.commit()?;

            info!(order_id, admin_id, status = %status, "Coin order resolved");
            Ok(resolved)
        })
    }
}

pub(crate) fn query_subscriber_order(conn: &Connection, order_id: i64) -> Result<Option<SubscriberOrder>> {
    let order = conn
        .query_row(
            &format!("SELECT {} FROM subscriber_orders WHERE order_id = ?1", ORDER_COLUMNS),
            [order_id],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

fn query_coin_order(conn: &Connection, order_id: i64) -> Result<Option<CoinOrder>> {
    let order = conn
        .query_row(
            &format!("SELECT {} FROM coin_orders WHERE order_id = ?1", COIN_ORDER_COLUMNS),
            [order_id],
            coin_order_from_row,
        )
        .optional()?;
    Ok(order)
}

fn add_channel_in(
    conn: &Connection,
    owner_id: i64,
    channel_username: &str,
    display_name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool> {
    ensure_user_in(conn, owner_id)?;
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO channels (owner_id, channel_username, display_name, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![owner_id, channel_username, display_name, now.timestamp()],
    )?;
    Ok(inserted == 1)
}

fn has_active_order_in(conn: &Connection, owner_id: i64, channel_username: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM subscriber_orders
             WHERE user_id = ?1 AND channel_username = ?2 AND current < required",
            params![owner_id, channel_username],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn insert_subscriber_order_in(
    conn: &Connection,
    owner_id: i64,
    channel_username: &str,
    required: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    if required <= 0 {
        return Err(LedgerError::InvalidAmount(format!("required members {}", required)));
    }
    ensure_user_in(conn, owner_id)?;

    conn.execute(
        "INSERT INTO subscriber_orders (user_id, channel_username, required, current, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
        params![owner_id, channel_username, required, now.timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}
