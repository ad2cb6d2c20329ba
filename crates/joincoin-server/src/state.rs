use std::sync::Arc;

use joincoin_core::{Clock, Economy, EconomyConfig, ForcedMembershipGate, MembershipProvider};
use joincoin_db::Database;
use tracing::error;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub economy: Economy,
    pub gate: ForcedMembershipGate,
    pub admin_token: String,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        provider: Arc<dyn MembershipProvider>,
        config: EconomyConfig,
        admin_token: String,
    ) -> Self {
        Self {
            economy: Economy::new(db.clone(), clock.clone(), config),
            gate: ForcedMembershipGate::new(db, clock, provider),
            admin_token,
        }
    }
}

/// Runs a blocking ledger call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> joincoin_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    let result = tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?;
    Ok(result?)
}
