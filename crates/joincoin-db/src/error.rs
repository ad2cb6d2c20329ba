use joincoin_types::models::CoinOrderStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("user {user_id} has {available} coins but {requested} are required")]
    InsufficientBalance {
        user_id: i64,
        requested: i64,
        available: i64,
    },

    #[error("coin order {order_id} is already {status}")]
    AlreadyResolved {
        order_id: i64,
        status: CoinOrderStatus,
    },

    #[error("invalid order state: {0}")]
    InvalidOrderState(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("a user cannot refer themselves")]
    InvalidReferral,

    #[error("invalid channel username '{0}'")]
    InvalidChannel(String),

    #[error("user {0} is banned")]
    UserBanned(i64),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error("ledger task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
