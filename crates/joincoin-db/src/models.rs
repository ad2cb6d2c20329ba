//! Row mappers from SQLite rows to the typed records in `joincoin-types`.
//! Each mapper reads columns in the order of its `*_COLUMNS` constant.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use joincoin_types::models::{
    CoinOrder, Channel, ForcedChannel, ForcedLimit, JoinRecord, SubscriberOrder,
    TransactionLogEntry, UnknownVariant, User,
};
use rusqlite::Row;
use rusqlite::types::Type;

pub(crate) const USER_COLUMNS: &str =
    "user_id, phone, coin_balance, coin_fraction, warnings, banned, registered_at";

pub(crate) const CHANNEL_COLUMNS: &str =
    "channel_id, owner_id, channel_username, display_name, created_at";

pub(crate) const ORDER_COLUMNS: &str =
    "order_id, user_id, channel_username, required, current, created_at";

pub(crate) const JOIN_COLUMNS: &str =
    "id, user_id, channel_username, join_type, order_id, created_at";

pub(crate) const COIN_ORDER_COLUMNS: &str =
    "order_id, user_id, quantity, price, receipt_file_id, status, created_at, admin_id";

pub(crate) const FORCED_COLUMNS: &str =
    "channel_username, limit_type, limit_value, current_members, added_at";

pub(crate) const TRANSACTION_COLUMNS: &str = "id, kind, amount, description, date";

/// Stored timestamps are Unix seconds.
pub(crate) fn to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn parse_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        phone: row.get(1)?,
        coin_balance: row.get(2)?,
        coin_fraction: row.get(3)?,
        warnings: row.get(4)?,
        banned: row.get::<_, i64>(5)? != 0,
        registered_at: to_datetime(row.get(6)?),
    })
}

pub(crate) fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        channel_username: row.get(2)?,
        display_name: row.get(3)?,
        created_at: to_datetime(row.get(4)?),
    })
}

pub(crate) fn order_from_row(row: &Row) -> rusqlite::Result<SubscriberOrder> {
    Ok(SubscriberOrder {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        channel_username: row.get(2)?,
        required: row.get(3)?,
        current: row.get(4)?,
        created_at: to_datetime(row.get(5)?),
    })
}

pub(crate) fn join_from_row(row: &Row) -> rusqlite::Result<JoinRecord> {
    Ok(JoinRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        channel_username: row.get(2)?,
        join_type: parse_column(row, 3)?,
        order_id: row.get(4)?,
        created_at: to_datetime(row.get(5)?),
    })
}

pub(crate) fn coin_order_from_row(row: &Row) -> rusqlite::Result<CoinOrder> {
    Ok(CoinOrder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        quantity: row.get(2)?,
        price: row.get(3)?,
        receipt_file_id: row.get(4)?,
        status: parse_column(row, 5)?,
        created_at: to_datetime(row.get(6)?),
        admin_id: row.get(7)?,
    })
}

pub(crate) fn forced_from_row(row: &Row) -> rusqlite::Result<ForcedChannel> {
    let kind: String = row.get(1)?;
    let value: i64 = row.get(2)?;
    let limit = match kind.as_str() {
        "time" => ForcedLimit::Time {
            expires_at: to_datetime(value),
        },
        "members" => ForcedLimit::Members { quota: value },
        other => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                1,
                Type::Text,
                Box::new(UnknownVariant(other.to_string())),
            ));
        }
    };

    Ok(ForcedChannel {
        channel_username: row.get(0)?,
        limit,
        current_members: row.get(3)?,
        added_at: to_datetime(row.get(4)?),
    })
}

pub(crate) fn transaction_from_row(row: &Row) -> rusqlite::Result<TransactionLogEntry> {
    Ok(TransactionLogEntry {
        id: row.get(0)?,
        kind: row.get(1)?,
        amount: row.get(2)?,
        description: row.get(3)?,
        date: to_datetime(row.get(4)?),
    })
}
