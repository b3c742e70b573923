use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Bad connection string or a backend this build was compiled without.
    /// Fatal at startup.
    #[error("database configuration error: {0}")]
    Configuration(String),

    /// Engine construction or direct-connection failure.
    #[error("database connection error: {0}")]
    Connection(String),

    /// Pool exhausted; the caller decides whether to retry.
    #[error("database session unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("database query error: {0}")]
    Query(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<ConfigError> for DatabaseError {
    fn from(err: ConfigError) -> Self {
        DatabaseError::Configuration(err.to_string())
    }
}
