use thiserror::Error;

pub type CinderResult<T> = Result<T, CinderError>;

/// Error taxonomy for the sharing core.
///
/// `AccessDenied` deliberately carries no reason: callers outside the
/// access controller must not be able to distinguish an inaccessible
/// vault from one that never existed. `NoViewsRemaining` is the one
/// policy outcome surfaced separately, since the receive flow reports
/// it to the user as "already burned".
#[derive(Debug, Error)]
pub enum CinderError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("access denied")]
    AccessDenied,

    #[error("no views remaining")]
    NoViewsRemaining,

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CinderError {
    /// True if retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CinderError::StorageUnavailable(_))
    }
}
