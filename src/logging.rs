//! Logging initialisation
//!
//! Events are emitted with `tracing` under the `luabase` target family.
//! Embedders that install their own subscriber can skip [`init`].

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Filter directives for `config`, unless `RUST_LOG` is set
fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("luabase={}", config.level.as_str())))
}

/// Install a global `fmt` subscriber.
///
/// Returns false if a global subscriber was already installed.
pub fn init(config: &LogConfig) -> bool {
    let filter = build_filter(config);

    let result = match config.format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer().pretty().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .try_init(),
    };

    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_second_init_is_harmless() {
        let config = LogConfig {
            level: LogLevel::Debug,
            format: LogFormat::Compact,
        };
        init(&config);
        assert!(!init(&config));
    }
}
