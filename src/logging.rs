use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "CALLWRAP_LOG";

/// Install a stderr subscriber. Call **once** near the start of `main`.
///
/// The filter comes from `CALLWRAP_LOG`, falling back to `default_directive`.
/// Does nothing if a global subscriber is already set.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        init("info");
        tracing::debug!("logging initialised twice without panicking");
    }
}
