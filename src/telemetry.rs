//! Tracing subscriber setup for applications embedding the data source layer.

use crate::config::Config;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level`. Returns `false` when a subscriber
/// was already installed (e.g. by the host application or another test).
pub fn init_tracing(config: &Config) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).try_init().is_ok()
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .try_init()
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_rejected() {
        let config = Config {
            json_logs: true,
            log_level: "debug".to_string(),
            ..Config::default()
        };
        // Another test binary thread may have installed one already
        init_tracing(&config);
        assert!(!init_tracing(&Config::default()));
    }
}
