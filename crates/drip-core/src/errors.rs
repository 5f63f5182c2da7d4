/// Core error type for the daily delivery bot.
///
/// Adapter crates map their specific errors into this type so the core can
/// handle failures consistently (reject at the boundary vs retry vs
/// deactivate).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Bad timezone/time/skip-set. Rejected at the boundary; no job is
    /// created or mutated when this is returned.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Malformed step input in a dialog flow. Re-prompt, no state advance.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Recoverable delivery failure; the scheduler retries with backoff.
    #[error("transient delivery failure: {0}")]
    TransientDelivery(String),

    /// Recipient is unreachable for good. Triggers deactivation, no retry.
    #[error("permanent delivery failure: {0}")]
    PermanentDelivery(String),

    /// Anchor message unusable and the send fallback failed too.
    #[error("message edit failed: {0}")]
    EditFailed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
