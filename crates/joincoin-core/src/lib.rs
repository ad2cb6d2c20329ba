pub mod clock;
pub mod config;
pub mod economy;
pub mod gate;
pub mod membership;
pub mod ranking;
pub mod referrals;

pub use clock::{Clock, SystemClock};
pub use config::{EconomyConfig, RankingWeights};
pub use economy::{Economy, Registration};
pub use gate::ForcedMembershipGate;
pub use membership::{MembershipError, MembershipProvider, MembershipStatus, TelegramMembership};
pub use referrals::ReferralCache;
