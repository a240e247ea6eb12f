use std::env;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Map a `LOG_LEVEL` value onto a tracing level; unknown values mean info.
pub fn parse_level(raw: &str) -> Level {
    match raw.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Install the fmt subscriber on stderr. `RUST_LOG` directives apply on top of
/// the `LOG_LEVEL` default.
pub fn init_logging() {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| parse_level(&level))
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Level::DEBUG);
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }
}
