//! Unified error type.

use thiserror::Error;

use crate::config::ConfigError;

/// Infrastructure failures: startup, binding, the database, logging.
///
/// Request-level failures never become an `Error`; they are answered as
/// response envelopes by the handler or the pipeline stage that saw them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid {what} header value: {source}")]
    InvalidHeader {
        what: &'static str,
        #[source]
        source: http::header::InvalidHeaderValue,
    },

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("logging: {0}")]
    Logging(String),
}
