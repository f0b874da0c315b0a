use thiserror::Error;

/// Rejected endpoint configuration. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Name cannot be empty")]
    EmptyName,

    #[error("Name too long: {len} characters (maximum: {max})")]
    NameTooLong { len: usize, max: usize },

    #[error("Interval {interval}s is not one of the allowed intervals {allowed:?}")]
    IntervalNotAllowed { interval: u64, allowed: Vec<u64> },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid scheme '{0}'. Must be http or https")]
    UnsupportedScheme(String),

    #[error("Private/local addresses are not allowed: {0}")]
    PrivateTarget(String),

    #[error("Expected content cannot be blank")]
    BlankExpectedContent,
}

/// Persistence failure in the registry or status store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database query failed: {0}")]
    Query(#[from] libsql::Error),

    #[error("Database connection unavailable: {0}")]
    Pool(#[from] deadpool::managed::PoolError<libsql::Error>),

    #[error("Endpoint {0} already exists")]
    Conflict(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Failure of [`crate::database::Registry::add`]
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Alert transport failure. Logged, never retried within a tick.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification endpoint returned status {0}")]
    Rejected(u16),

    #[error("Invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build alert email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Mail transport failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
