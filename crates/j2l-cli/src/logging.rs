//! Logging initialization
//!
//! Honors `RUST_LOG` when set; otherwise the filter follows the verbosity
//! and quiet flags. Output goes to stderr so reports on stdout stay clean.

use anyhow::Result;
use std::io::IsTerminal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber
///
/// # Errors
/// An invalid filter or a subscriber that is already installed.
pub fn init_logging(verbosity: u8, quiet: bool, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter(verbosity, quiet)))?;
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr).with_current_span(true))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity > 1)
                    .with_ansi(std::io::stderr().is_terminal()),
            )
            .try_init()?;
    }
    Ok(())
}

/// Filter used when `RUST_LOG` is not set
#[must_use]
pub fn default_filter(verbosity: u8, quiet: bool) -> String {
    if quiet {
        return "error".to_string();
    }
    match verbosity {
        0 => "warn,j2l_core=info,j2l_cli=info".to_string(),
        1 => "info,j2l_core=debug,j2l_markup=debug,j2l_cli=debug".to_string(),
        _ => "debug,j2l_core=trace,j2l_markup=trace,j2l_model=trace".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbosity() {
        assert_eq!(default_filter(3, true), "error");
    }

    #[test]
    fn every_default_filter_parses() {
        for verbosity in 0..4 {
            assert!(EnvFilter::try_new(default_filter(verbosity, false)).is_ok());
        }
    }
}
