//! Tracing bring-up
//!
//! Maps the numeric debug level used by telephony engines (0 to 8) onto a
//! `tracing` level filter and installs a `tracing-subscriber` fmt layer.
//! Initialization is explicit; nothing in the crate installs a subscriber
//! on its own.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{PhoneError, PhoneResult};
use crate::session::config::MAX_DEBUG_LEVEL;

/// Level filter for a numeric debug level
pub fn level_filter(debug_level: u8) -> PhoneResult<LevelFilter> {
    let filter = match debug_level {
        0 => LevelFilter::OFF,
        1 => LevelFilter::ERROR,
        2 => LevelFilter::WARN,
        3 => LevelFilter::INFO,
        4 | 5 => LevelFilter::DEBUG,
        6..=MAX_DEBUG_LEVEL => LevelFilter::TRACE,
        other => {
            return Err(PhoneError::invalid_configuration(
                "debug_level",
                format!("{} is above the maximum of {}", other, MAX_DEBUG_LEVEL),
            ))
        }
    };
    Ok(filter)
}

/// Install a global fmt subscriber
///
/// `RUST_LOG`, when set, takes precedence over `debug_level`. Fails if a
/// global subscriber is already installed.
pub fn init(debug_level: u8) -> PhoneResult<()> {
    let level = level_filter(debug_level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| PhoneError::internal_error(format!("tracing already initialized: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_filter(0).unwrap(), LevelFilter::OFF);
        assert_eq!(level_filter(1).unwrap(), LevelFilter::ERROR);
        assert_eq!(level_filter(2).unwrap(), LevelFilter::WARN);
        assert_eq!(level_filter(3).unwrap(), LevelFilter::INFO);
        assert_eq!(level_filter(4).unwrap(), LevelFilter::DEBUG);
        assert_eq!(level_filter(5).unwrap(), LevelFilter::DEBUG);
        assert_eq!(level_filter(6).unwrap(), LevelFilter::TRACE);
        assert_eq!(level_filter(8).unwrap(), LevelFilter::TRACE);
        assert!(matches!(level_filter(9), Err(PhoneError::InvalidConfiguration { .. })));
    }
}
