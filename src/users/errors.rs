use thiserror::Error;

/// Conditions raised by the primary store. Constraint violations are typed so
/// callers can tell them apart from infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("skill not in the skills list")]
    InvalidSkill,

    #[error("user not found")]
    NotFound,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("user already exists")]
    AlreadyExists,

    #[error("skill not in the skills list")]
    InvalidSkill,

    #[error("user not found")]
    NotFound,

    #[error("email is not verified")]
    EmailNotVerified,

    /// The primary store was updated but the cache could not be overwritten.
    #[error("cache out of sync: {0:#}")]
    CacheOutOfSync(#[source] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(#[source] anyhow::Error),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists => Self::AlreadyExists,
            StoreError::InvalidSkill => Self::InvalidSkill,
            StoreError::NotFound => Self::NotFound,
            StoreError::Other(e) => Self::Internal(e),
        }
    }
}
