use thiserror::Error;

/// Centralized error type for the application.
///
/// Storage, policy and crypto code all return this enum so handlers can
/// decide between re-prompting, reporting "not found" and failing the
/// event. Uses `thiserror` for conversions and display formatting.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// A referenced entity (org, participant, card, membership) is gone.
    /// Handlers report this to the user and clear conversation state.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// User input that fails validation; recovered by re-prompting.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Card cipher errors (bad key, undecryptable tagged value)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Missing or malformed process configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
