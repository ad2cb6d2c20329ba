use std::sync::Arc;

use chrono::{DateTime, Utc};
use joincoin_db::{Database, JoinOutcome, LedgerError, Result};
use joincoin_types::channel::normalize_channel;
use joincoin_types::models::{Confirmation, ForcedChannel, ForcedLimit, GateResult, JoinType};
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::membership::MembershipProvider;

/// Mandatory channels a user has to be in before using the bot.
///
/// The async checks hand every ledger step to the blocking pool and only
/// await the membership provider on the runtime itself.
pub struct ForcedMembershipGate {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    provider: Arc<dyn MembershipProvider>,
}

impl ForcedMembershipGate {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, provider: Arc<dyn MembershipProvider>) -> Self {
        Self { db, clock, provider }
    }

    /// Adds (or replaces) a mandatory channel and returns its canonical name.
    pub fn add_channel(&self, raw_channel: &str, limit: ForcedLimit) -> Result<String> {
        let channel = normalize_channel(raw_channel)
            .ok_or_else(|| LedgerError::InvalidChannel(raw_channel.to_string()))?;
        self.db.add_forced_channel(&channel, limit, self.clock.now())?;
        Ok(channel)
    }

    pub fn remove_channel(&self, raw_channel: &str) -> Result<bool> {
        let channel = normalize_channel(raw_channel)
            .ok_or_else(|| LedgerError::InvalidChannel(raw_channel.to_string()))?;
        self.db.remove_forced_channel(&channel)
    }

    /// Channels still in force; expired ones are deleted on the way.
    pub fn list_channels(&self) -> Result<Vec<ForcedChannel>> {
        active_channels(&self.db, self.clock.now())
    }

    pub async fn evaluate(&self, user_id: i64) -> Result<GateResult> {
        let now = self.clock.now();
        let channels = self.on_ledger(move |db| active_channels(db, now)).await?;

        let mut unmet = Vec::new();
        for channel in channels {
            if !self.is_member(&channel.channel_username, user_id).await {
                unmet.push(channel.channel_username);
            }
        }
        Ok(GateResult::from_unmet(unmet))
    }

    /// Re-checks every active channel and records a forced join for each one
    /// the user is now in. Each user counts toward a channel's quota once.
    pub async fn confirm_membership(&self, user_id: i64) -> Result<Confirmation> {
        let now = self.clock.now();
        let channels = self.on_ledger(move |db| active_channels(db, now)).await?;

        let mut newly_joined = Vec::new();
        let mut unmet = Vec::new();
        for channel in channels {
            let name = channel.channel_username;
            if !self.is_member(&name, user_id).await {
                unmet.push(name);
                continue;
            }
            let joined_at = self.clock.now();
            let channel = name.clone();
            let outcome = self
                .on_ledger(move |db| {
                    db.record_join(user_id, &channel, JoinType::Forced, None, 0.0, joined_at)
                })
                .await?;
            if let JoinOutcome::Recorded { .. } = outcome {
                newly_joined.push(name);
            }
        }

        let gate = GateResult::from_unmet(unmet);
        info!(user_id, joined = newly_joined.len(), status = ?gate.status, "Gate confirmation");
        Ok(Confirmation { newly_joined, gate })
    }

    async fn is_member(&self, channel: &str, user_id: i64) -> bool {
        match self.provider.membership_status(channel, user_id).await {
            Ok(status) => status.is_member(),
            Err(e) => {
                warn!(channel, user_id, error = %e, "Membership check failed, treating as not joined");
                false
            }
        }
    }

    /// Runs `f` against the ledger on the blocking pool.
    async fn on_ledger<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                LedgerError::TaskFailed(e.to_string())
            })?
    }
}

fn active_channels(db: &Database, now: DateTime<Utc>) -> Result<Vec<ForcedChannel>> {
    let removed = db.prune_expired_forced_channels(now)?;
    if !removed.is_empty() {
        info!(channels = ?removed, "Expired forced channels removed");
    }
    Ok(db
        .list_forced_channels()?
        .into_iter()
        .filter(|c| !c.is_expired(now))
        .collect())
}
