// Logging module - Logging infrastructure
use crate::domain::error::{LinePortError, LinePortResult};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging system.
///
/// `RUST_LOG` takes precedence; otherwise `level` applies to this crate, or
/// `debug` when `verbose` is set.
pub fn init_logging(level: &str, verbose: bool) -> LinePortResult<()> {
    let level = if verbose { "debug" } else { level };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lineport={},warn", level)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(verbose)
                .with_file(verbose)
                .with_line_number(verbose),
        )
        .try_init()
        .map_err(|e| LinePortError::Config {
            message: format!("Failed to initialize logging: {}", e),
        })?;

    tracing::debug!("LinePort logging system initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_init() {
        assert!(init_logging("info", false).is_ok());
        // A second subscriber cannot be installed
        assert!(init_logging("info", true).is_err());
    }
}
