//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins over the configured `level`.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber with compact stderr output.
///
/// Call once at startup. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init_subscriber("debug");
        init_subscriber("info");
        tracing::info!("logging initialized");
    }

    #[test]
    fn filter_accepts_directives() {
        let filter = EnvFilter::new("hld_store=debug,info");
        assert!(filter.to_string().contains("hld_store=debug"));
    }
}
