use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use joincoin_core::{EconomyConfig, SystemClock, TelegramMembership};
use joincoin_db::Database;
use joincoin_server::config::ServerConfig;
use joincoin_server::state::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "joincoin=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let config = ServerConfig::from_env()?;
    let economy = EconomyConfig::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let provider = TelegramMembership::new(
        &config.telegram_api,
        &config.bot_token,
        config.membership_timeout,
    )?;

    // Shared state
    let state = Arc::new(AppStateInner::new(
        db,
        Arc::new(SystemClock),
        Arc::new(provider),
        economy,
        config.admin_token.clone(),
    ));

    let app = joincoin_server::router(state);

    let addr: SocketAddr = config.bind_addr().parse()?;
    info!("joincoin server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
