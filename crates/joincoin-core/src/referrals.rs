use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use joincoin_db::{Database, LedgerError, Result};
use tracing::debug;

/// Read-through cache of referral edges, keyed by referrer.
///
/// The database stays the only source of truth: a referrer's entry is loaded
/// whole on first lookup and dropped whenever one of its edges is written.
/// Each drop bumps the referrer's generation, and a load only lands in the
/// cache if no drop happened while it was reading.
pub struct ReferralCache {
    db: Arc<Database>,
    entries: RwLock<Entries>,
}

#[derive(Default)]
struct Entries {
    by_referrer: HashMap<i64, HashSet<i64>>,
    generations: HashMap<i64, u64>,
}

impl Entries {
    fn generation(&self, referrer_id: i64) -> u64 {
        self.generations.get(&referrer_id).copied().unwrap_or(0)
    }
}

impl ReferralCache {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            entries: RwLock::new(Entries::default()),
        }
    }

    pub fn exists(&self, referrer_id: i64, referred_user_id: i64) -> Result<bool> {
        self.with_referred(referrer_id, |set| set.contains(&referred_user_id))
    }

    pub fn count(&self, referrer_id: i64) -> Result<usize> {
        self.with_referred(referrer_id, |set| set.len())
    }

    /// Stores the edge and pays the referrer. Returns false for a known edge.
    pub fn register(
        &self,
        referrer_id: i64,
        referred_user_id: i64,
        reward: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let created = self
            .db
            .register_referral(referrer_id, referred_user_id, reward, now);
        self.invalidate(referrer_id)?;
        created
    }

    /// Drops the referrer's entry. Call after any committed write to its edges.
    pub fn invalidate(&self, referrer_id: i64) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| LedgerError::LockPoisoned)?;
        entries.by_referrer.remove(&referrer_id);
        *entries.generations.entry(referrer_id).or_insert(0) += 1;
        Ok(())
    }

    fn with_referred<F, T>(&self, referrer_id: i64, f: F) -> Result<T>
    where
        F: Fn(&HashSet<i64>) -> T,
    {
        let generation = {
            let entries = self.entries.read().map_err(|_| LedgerError::LockPoisoned)?;
            if let Some(set) = entries.by_referrer.get(&referrer_id) {
                return Ok(f(set));
            }
            entries.generation(referrer_id)
        };

        debug!(referrer_id, generation, "Loading referrals");
        let loaded: HashSet<i64> = self.db.referred_users(referrer_id)?.into_iter().collect();
        let result = f(&loaded);
        self.fill(referrer_id, generation, loaded)?;
        Ok(result)
    }

    /// Caches `loaded` unless the referrer was invalidated after `generation`
    /// was read. Returns whether the set was kept.
    fn fill(&self, referrer_id: i64, generation: u64, loaded: HashSet<i64>) -> Result<bool> {
        let mut entries = self.entries.write().map_err(|_| LedgerError::LockPoisoned)?;
        if entries.generation(referrer_id) != generation {
            debug!(referrer_id, generation, "Discarding referrals loaded before a write");
            return Ok(false);
        }
        entries.by_referrer.insert(referrer_id, loaded);
        Ok(true)
    }

    #[cfg(test)]
    fn generation(&self, referrer_id: i64) -> u64 {
        self.entries
            .read()
            .map(|entries| entries.generation(referrer_id))
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn is_cached(&self, referrer_id: i64) -> bool {
        self.entries
            .read()
            .map(|entries| entries.by_referrer.contains_key(&referrer_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, ReferralCache) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for id in 1..=4 {
            db.create_user(id, None, 0, Utc::now()).unwrap();
        }
        let cache = ReferralCache::new(db.clone());
        (db, cache)
    }

    #[test]
    fn lookups_are_served_from_the_store_then_cached() {
        let (db, cache) = setup();
        db.register_referral(1, 2, 0, Utc::now()).unwrap();

        assert!(!cache.is_cached(1));
        assert!(cache.exists(1, 2).unwrap());
        assert!(cache.is_cached(1));
        assert!(!cache.exists(1, 3).unwrap());
        assert_eq!(cache.count(1).unwrap(), 1);
    }

    #[test]
    fn writes_invalidate_the_referrer() {
        let (db, cache) = setup();
        assert_eq!(cache.count(1).unwrap(), 0);
        assert!(cache.is_cached(1));

        assert!(cache.register(1, 2, 5, Utc::now()).unwrap());
        assert!(!cache.is_cached(1));
        assert!(cache.exists(1, 2).unwrap());

        // repeated edge pays nothing
        assert!(!cache.register(1, 2, 5, Utc::now()).unwrap());
        assert_eq!(db.get_user(1).unwrap().unwrap().coin_balance, 5);
        assert_eq!(cache.count(1).unwrap(), 1);
    }

    #[test]
    fn load_overtaken_by_a_write_is_not_cached() {
        let (db, cache) = setup();
        let generation = cache.generation(1);
        let before: HashSet<i64> = db.referred_users(1).unwrap().into_iter().collect();

        cache.register(1, 2, 0, Utc::now()).unwrap();
        assert!(!cache.fill(1, generation, before).unwrap());
        assert!(!cache.is_cached(1));
        assert!(cache.exists(1, 2).unwrap());
        assert!(cache.is_cached(1));
    }

    #[test]
    fn concurrent_writes_and_reads_agree_with_the_store() {
        let (db, cache) = setup();
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let referred = 100 + worker * 25 + i;
                        cache.register(1, referred, 0, Utc::now()).unwrap();
                        cache.count(1).unwrap();
                    }
                })
            })
            .chain((0..2).map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        cache.exists(1, 100).unwrap();
                    }
                })
            }))
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(db.count_referrals(1).unwrap(), 100);
        assert_eq!(cache.count(1).unwrap(), 100);
        assert!(cache.exists(1, 199).unwrap());
    }

    #[test]
    fn self_referral_is_rejected() {
        let (_, cache) = setup();
        assert!(matches!(cache.register(3, 3, 5, Utc::now()), Err(LedgerError::InvalidReferral)));
        assert_eq!(cache.count(3).unwrap(), 0);
    }
}
