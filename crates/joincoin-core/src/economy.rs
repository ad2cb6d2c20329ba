//! Coin economy operations as exposed to the bot and the HTTP API.
//!
//! Every state change goes through a single `Database` call, so each
//! operation here is one atomic unit. This layer adds channel
//! normalization, ban checks, configured amounts and the clock.

use std::sync::Arc;

use joincoin_db::{Database, JoinOutcome, LedgerError, Result};
use joincoin_types::channel::normalize_channel;
use joincoin_types::models::{
    CoinOrder, JoinType, RankedOrder, RankingPolicy, Resolution, SubscriberOrder,
    TransactionLogEntry, User,
};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::EconomyConfig;
use crate::ranking::rank_orders;
use crate::referrals::ReferralCache;

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub user: User,
    pub created: bool,
    pub referral_registered: bool,
}

pub struct Economy {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    config: EconomyConfig,
    referrals: ReferralCache,
}

impl Economy {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, config: EconomyConfig) -> Self {
        let referrals = ReferralCache::new(db.clone());
        Self {
            db,
            clock,
            config,
            referrals,
        }
    }

    pub fn config(&self) -> &EconomyConfig {
        &self.config
    }

    // -- Accounts --

    /// Registers `user_id` with the configured starting balance. A referrer
    /// is only credited for users that did not exist before, in the same
    /// transaction that creates them.
    pub fn register_user(
        &self,
        user_id: i64,
        phone: Option<&str>,
        referrer_id: Option<i64>,
    ) -> Result<Registration> {
        let signup = self.db.register_user_with_referral(
            user_id,
            phone,
            self.config.initial_coins,
            referrer_id,
            self.config.referral_reward,
            self.clock.now(),
        )?;
        if let (true, Some(referrer_id)) = (signup.referral_registered, referrer_id) {
            self.referrals.invalidate(referrer_id)?;
        }

        let user = self.account(user_id)?;
        Ok(Registration {
            user,
            created: signup.created,
            referral_registered: signup.referral_registered,
        })
    }

    pub fn account(&self, user_id: i64) -> Result<User> {
        self.db.get_user(user_id)?.ok_or(LedgerError::UserNotFound(user_id))
    }

    pub fn warn(&self, user_id: i64, delta: i64) -> Result<i64> {
        let warnings = self.db.warn(user_id, delta)?;
        info!(user_id, warnings, "Warnings updated");
        Ok(warnings)
    }

    pub fn ban(&self, user_id: i64) -> Result<()> {
        self.db.ban(user_id)?;
        info!(user_id, "User banned");
        Ok(())
    }

    pub fn unban(&self, user_id: i64) -> Result<()> {
        self.db.unban(user_id)?;
        info!(user_id, "User unbanned");
        Ok(())
    }

    // -- Subscriber orders --

    /// Orders shown to a collector, ranked under `policy`.
    pub fn orders_for_collector(
        &self,
        collector_id: i64,
        policy: RankingPolicy,
        limit: Option<u32>,
    ) -> Result<Vec<RankedOrder>> {
        self.active_user(collector_id)?;
        let limit = self.config.clamp_limit(limit);
        let eligible = self.db.eligible_orders_for_collector(collector_id)?;
        debug!(collector_id, ?policy, limit, eligible = eligible.len(), "Ranking orders");

        let mut rng = rand::rng();
        Ok(rank_orders(
            eligible,
            policy,
            limit,
            self.clock.now(),
            &self.config.weights,
            &mut rng,
        ))
    }

    /// Charges the owner and opens an order for `required` new members.
    /// Returns the order and the coins spent.
    pub fn place_order(
        &self,
        owner_id: i64,
        raw_channel: &str,
        required: i64,
    ) -> Result<(SubscriberOrder, i64)> {
        let channel = channel_name(raw_channel)?;
        if required <= 0 {
            return Err(LedgerError::InvalidAmount(format!("required members {}", required)));
        }
        self.active_user(owner_id)?;

        self.db.place_subscriber_order(
            owner_id,
            &channel,
            required,
            self.config.order_cost_per_member,
            self.clock.now(),
        )
    }

    pub fn orders_of(&self, owner_id: i64) -> Result<Vec<SubscriberOrder>> {
        self.db.list_subscriber_orders(owner_id)
    }

    // -- Joins --

    /// Records that a collector joined a channel. With an order attached the
    /// order advances and the collector earns the configured reward.
    pub fn record_organic_join(
        &self,
        user_id: i64,
        raw_channel: &str,
        order_id: Option<i64>,
    ) -> Result<JoinOutcome> {
        let channel = channel_name(raw_channel)?;
        self.active_user(user_id)?;

        let reward = if order_id.is_some() { self.config.join_reward } else { 0.0 };
        self.db.record_join(
            user_id,
            &channel,
            JoinType::Organic,
            order_id,
            reward,
            self.clock.now(),
        )
    }

    pub fn has_joined(&self, user_id: i64, raw_channel: &str, join_type: JoinType) -> Result<bool> {
        let channel = channel_name(raw_channel)?;
        self.db.has_joined(user_id, &channel, join_type)
    }

    // -- Coin purchases --

    pub fn create_coin_order(
        &self,
        user_id: i64,
        quantity: i64,
        price: f64,
        receipt_file_id: Option<&str>,
    ) -> Result<i64> {
        self.active_user(user_id)?;
        let order_id =
            self.db
                .create_coin_order(user_id, quantity, price, receipt_file_id, self.clock.now())?;
        info!(order_id, user_id, quantity, price, "Coin order created");
        Ok(order_id)
    }

    pub fn resolve_coin_order(
        &self,
        order_id: i64,
        resolution: Resolution,
        admin_id: i64,
    ) -> Result<CoinOrder> {
        self.db
            .resolve_coin_order(order_id, resolution, admin_id, self.clock.now())
    }

    pub fn pending_coin_orders(&self) -> Result<Vec<CoinOrder>> {
        self.db.list_pending_coin_orders()
    }

    // -- Referrals --

    /// Returns whether the edge is new and the referrer's referral count.
    pub fn register_referral(&self, referrer_id: i64, referred_user_id: i64) -> Result<(bool, usize)> {
        let registered = self.referrals.register(
            referrer_id,
            referred_user_id,
            self.config.referral_reward,
            self.clock.now(),
        )?;
        let total = self.referrals.count(referrer_id)?;
        Ok((registered, total))
    }

    pub fn referral_exists(&self, referrer_id: i64, referred_user_id: i64) -> Result<bool> {
        self.referrals.exists(referrer_id, referred_user_id)
    }

    // -- Settings --

    pub fn welcome_message(&self) -> Result<String> {
        self.db.welcome_message()
    }

    pub fn set_welcome_message(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(LedgerError::InvalidMessage("welcome message is empty".into()));
        }
        self.db.set_welcome_message(message)
    }

    pub fn recent_transactions(&self, limit: Option<u32>) -> Result<Vec<TransactionLogEntry>> {
        self.db
            .recent_transactions(self.config.clamp_transaction_limit(limit))
    }

    fn active_user(&self, user_id: i64) -> Result<User> {
        let user = self.account(user_id)?;
        if user.banned {
            return Err(LedgerError::UserBanned(user_id));
        }
        Ok(user)
    }
}

fn channel_name(raw: &str) -> Result<String> {
    normalize_channel(raw).ok_or_else(|| LedgerError::InvalidChannel(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn economy_with(config: EconomyConfig) -> Economy {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Economy::new(db, Arc::new(SystemClock), config)
    }

    fn economy() -> Economy {
        economy_with(EconomyConfig {
            initial_coins: 20,
            ..EconomyConfig::default()
        })
    }

    #[test]
    fn registration_is_idempotent_and_pays_referrer_once() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();

        let first = eco.register_user(2, Some("+44"), Some(1)).unwrap();
        assert!(first.created);
        assert!(first.referral_registered);
        assert_eq!(first.user.coin_balance, 20);
        assert_eq!(eco.account(1).unwrap().coin_balance, 25);

        let again = eco.register_user(2, None, Some(1)).unwrap();
        assert!(!again.created);
        assert!(!again.referral_registered);
        assert_eq!(again.user.phone.as_deref(), Some("+44"));
        assert_eq!(eco.account(1).unwrap().coin_balance, 25);
        assert!(eco.referral_exists(1, 2).unwrap());
    }

    #[test]
    fn unknown_referrer_does_not_block_registration() {
        let eco = economy();
        let reg = eco.register_user(3, None, Some(99)).unwrap();
        assert!(reg.created);
        assert!(!reg.referral_registered);
    }

    #[test]
    fn placing_an_order_charges_per_member() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();

        let (order, cost) = eco.place_order(1, "https://t.me/MyChannel", 4).unwrap();
        assert_eq!(cost, 8);
        assert_eq!(order.channel_username, "@mychannel");
        assert_eq!(eco.account(1).unwrap().coin_balance, 12);

        // second open order for the same channel is refused without charging
        assert!(matches!(
            eco.place_order(1, "@mychannel", 1),
            Err(LedgerError::InvalidOrderState(_))
        ));
        assert_eq!(eco.account(1).unwrap().coin_balance, 12);
    }

    #[test]
    fn unaffordable_order_leaves_nothing_behind() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();
        let err = eco.place_order(1, "@big", 11).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { requested: 22, available: 20, .. }));
        assert!(eco.orders_of(1).unwrap().is_empty());
        assert!(!eco.db.channel_exists(1, "@big").unwrap());
        assert_eq!(eco.account(1).unwrap().coin_balance, 20);
    }

    #[test]
    fn referral_cache_sees_registrations() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();
        assert!(!eco.referral_exists(1, 2).unwrap());

        eco.register_user(2, None, Some(1)).unwrap();
        assert!(eco.referral_exists(1, 2).unwrap());
        assert_eq!(eco.register_referral(1, 3).unwrap(), (true, 2));
    }

    #[test]
    fn transaction_listing_uses_its_own_limit() {
        let eco = economy_with(EconomyConfig {
            initial_coins: 100,
            max_order_limit: 1,
            default_order_limit: 1,
            ..EconomyConfig::default()
        });
        eco.register_user(1, None, None).unwrap();
        for name in ["@a", "@b", "@c"] {
            eco.place_order(1, name, 1).unwrap();
        }
        assert_eq!(eco.recent_transactions(None).unwrap().len(), 3);
        assert_eq!(eco.recent_transactions(Some(2)).unwrap().len(), 2);
    }

    #[test]
    fn banned_users_cannot_trade() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();
        eco.ban(1).unwrap();

        assert!(matches!(eco.place_order(1, "@chan", 1), Err(LedgerError::UserBanned(1))));
        assert!(matches!(
            eco.orders_for_collector(1, RankingPolicy::Weighted, None),
            Err(LedgerError::UserBanned(1))
        ));
        assert!(matches!(eco.create_coin_order(1, 5, 1.0, None), Err(LedgerError::UserBanned(1))));

        eco.unban(1).unwrap();
        assert!(eco.place_order(1, "@chan", 1).is_ok());
    }

    #[test]
    fn joins_credit_only_with_an_order() {
        let eco = economy();
        eco.register_user(1, None, None).unwrap();
        eco.register_user(2, None, None).unwrap();
        let (order, _) = eco.place_order(1, "@grow", 2).unwrap();

        let outcome = eco.record_organic_join(2, "@Grow", Some(order.id)).unwrap();
        assert_eq!(outcome, JoinOutcome::Recorded { order_completed: false, credited: 1.0 });
        assert_eq!(eco.account(2).unwrap().coin_balance, 21);

        eco.record_organic_join(2, "@elsewhere", None).unwrap();
        assert_eq!(eco.account(2).unwrap().coin_balance, 21);
        assert!(eco.has_joined(2, "t.me/elsewhere", JoinType::Organic).unwrap());

        // already-joined channels drop out of the collector's list
        assert!(eco.orders_for_collector(2, RankingPolicy::Weighted, None).unwrap().is_empty());
    }

    #[test]
    fn collector_limit_is_clamped() {
        let eco = economy_with(EconomyConfig {
            initial_coins: 100,
            max_order_limit: 3,
            default_order_limit: 2,
            ..EconomyConfig::default()
        });
        eco.register_user(1, None, None).unwrap();
        eco.register_user(2, None, None).unwrap();
        for name in ["@a", "@b", "@c", "@d"] {
            eco.place_order(1, name, 1).unwrap();
        }

        assert_eq!(eco.orders_for_collector(2, RankingPolicy::Recency, None).unwrap().len(), 2);
        assert_eq!(eco.orders_for_collector(2, RankingPolicy::Random, Some(50)).unwrap().len(), 3);
        assert!(eco.orders_for_collector(1, RankingPolicy::Weighted, None).unwrap().is_empty());
    }

    #[test]
    fn empty_welcome_message_is_rejected() {
        let eco = economy();
        assert_eq!(eco.welcome_message().unwrap(), joincoin_db::settings::DEFAULT_WELCOME_MESSAGE);
        assert!(matches!(eco.set_welcome_message("  "), Err(LedgerError::InvalidMessage(_))));
        eco.set_welcome_message("Hi there").unwrap();
        assert_eq!(eco.welcome_message().unwrap(), "Hi there");
    }
}
