use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (ledger, orders, joins)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                user_id         INTEGER PRIMARY KEY,
                phone           TEXT,
                coin_balance    INTEGER NOT NULL DEFAULT 0 CHECK (coin_balance >= 0),
                coin_fraction   REAL NOT NULL DEFAULT 0,
                warnings        INTEGER NOT NULL DEFAULT 0,
                banned          INTEGER NOT NULL DEFAULT 0,
                registered_at   INTEGER NOT NULL
            );

            CREATE TABLE channels (
                channel_id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id            INTEGER NOT NULL REFERENCES users(user_id),
                channel_username    TEXT NOT NULL,
                display_name        TEXT,
                created_at          INTEGER NOT NULL,
                UNIQUE(owner_id, channel_username)
            );

            CREATE TABLE subscriber_orders (
                order_id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL REFERENCES users(user_id),
                channel_username    TEXT NOT NULL,
                required            INTEGER NOT NULL CHECK (required > 0),
                current             INTEGER NOT NULL DEFAULT 0
                                        CHECK (current >= 0 AND current <= required),
                created_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_subscriber_orders_owner
                ON subscriber_orders(user_id, channel_username);

            CREATE TABLE joined_channels (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL,
                channel_username    TEXT NOT NULL,
                join_type           TEXT NOT NULL CHECK (join_type IN ('organic', 'forced')),
                order_id            INTEGER REFERENCES subscriber_orders(order_id),
                created_at          INTEGER NOT NULL,
                UNIQUE(user_id, channel_username, join_type)
            );

            CREATE TABLE coin_orders (
                order_id            INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id             INTEGER NOT NULL REFERENCES users(user_id),
                quantity            INTEGER NOT NULL CHECK (quantity > 0),
                price               REAL NOT NULL,
                receipt_file_id     TEXT,
                status              TEXT NOT NULL DEFAULT 'pending'
                                        CHECK (status IN ('pending', 'approved', 'rejected')),
                created_at          INTEGER NOT NULL,
                admin_id            INTEGER
            );

            CREATE TABLE referrals (
                referrer_id         INTEGER NOT NULL,
                referred_user_id    INTEGER NOT NULL,
                created_at          INTEGER NOT NULL,
                PRIMARY KEY (referrer_id, referred_user_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (forced channels, settings, transaction log)");
        conn.execute_batch(
            "
            CREATE TABLE forced_channels (
                channel_username    TEXT PRIMARY KEY,
                limit_type          TEXT NOT NULL CHECK (limit_type IN ('time', 'members')),
                limit_value         INTEGER NOT NULL,
                current_members     INTEGER NOT NULL DEFAULT 0,
                added_at            INTEGER NOT NULL
            );

            CREATE TABLE settings (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            );

            CREATE TABLE transactions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                kind        TEXT NOT NULL,
                amount      REAL NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                date        INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
