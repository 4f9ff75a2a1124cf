use thiserror::Error;

/// Errors surfaced by webhook management calls.
///
/// Delivery failures are not errors: they end up in the counters and the
/// delivery log, never in this enum.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Malformed input: bad URL, unknown event, empty name.
    #[error("{0}")]
    Validation(String),

    /// No webhook with the given ID exists in the store.
    #[error("Webhook not found: {id}")]
    NotFound { id: String },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Http(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
