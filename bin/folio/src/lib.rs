//! Folio CLI Library
//!
//! Command implementations for the `folio` binary, exposed as a library so
//! they can be driven from tests and other tools.
//!
//! # Modules
//!
//! - [`cmd`] - Command implementations (build, check)
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use folio::{BuildOverrides, cmd};
//!
//! cmd::build::run(Path::new("folio.toml"), BuildOverrides::default()).unwrap();
//! ```

pub mod cmd;

pub use folio_core::{BuildOverrides, Config};
pub use folio_generator::{BuildReport, Builder};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
///
/// When the `CI` environment variable is set, ANSI colours are disabled and
/// the level never drops below INFO.
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let ci = std::env::var_os("CI").is_some();
    let level = tracing_level(verbose, ci);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(!ci))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn tracing_level(verbose: u8, ci: bool) -> tracing::Level {
    match verbose {
        0 if ci => tracing::Level::INFO,
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_level() {
        assert_eq!(tracing_level(0, false), tracing::Level::WARN);
        assert_eq!(tracing_level(0, true), tracing::Level::INFO);
        assert_eq!(tracing_level(2, true), tracing::Level::DEBUG);
        assert_eq!(tracing_level(5, false), tracing::Level::TRACE);
    }
}
