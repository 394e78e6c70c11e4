//! Logging initialization.
//!
//! Everything logs through `tracing`. This installs the process-wide
//! subscriber: JSON lines in production-style deployments, compact human
//! output for local work. `RUST_LOG`, when set, wins over `LOG_LEVEL`.

use tracing_subscriber::EnvFilter;

use crate::config::{LogEncoding, LogSettings};
use crate::error::Error;

/// Installs the global subscriber.
///
/// Calling it again after a subscriber is already installed is a no-op.
pub fn init(settings: &LogSettings) -> Result<(), Error> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(settings.level.as_str().to_lowercase())
            .map_err(|e| Error::Logging(e.to_string()))?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // Only fails when a global subscriber is already set.
    let _ = match settings.encoding {
        LogEncoding::Json => builder
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init(),
        LogEncoding::Console => builder.compact().try_init(),
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        let settings = LogSettings { level: tracing::Level::DEBUG, encoding: LogEncoding::Console };
        assert!(init(&settings).is_ok());
        assert!(init(&settings).is_ok());
    }
}
