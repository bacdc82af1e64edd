use tracing_subscriber::{EnvFilter, fmt};

/// Install the process-wide subscriber: compact output, `RUST_LOG` wins
/// over the supplied default filter. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing(service_name: &str, default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let installed = fmt()
        .with_target(false)
        .with_env_filter(env_filter)
        .compact()
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(service = service_name, "tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_does_not_panic() {
        init_tracing("escrow-test", "warn");
        init_tracing("escrow-test", "debug");
    }
}
