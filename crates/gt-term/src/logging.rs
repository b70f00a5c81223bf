// SPDX-License-Identifier: MIT
//
// Diagnostic log file.
//
// stdout carries the terminal protocol and stdin is in raw mode, so the
// only safe place for diagnostics is a file. `init` installs a global
// `tracing` subscriber writing plain (no ANSI colour) lines to the
// configured path, opened in append mode so successive sessions pile up
// in one place.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};
use crate::options::Options;

/// Install the file logger described by `options`.
///
/// Returns `Ok(false)` when logging is disabled (`log_path` is `None`).
/// `RUST_LOG` takes precedence over `options.log_filter`.
///
/// # Errors
///
/// Fails if the log file can't be opened or a global subscriber is
/// already installed.
pub fn init(options: &Options) -> Result<bool> {
    let Some(path) = options.log_path.as_ref() else {
        return Ok(false);
    };

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter(options))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|e| Error::Log(e.to_string()))?;

    Ok(true)
}

fn filter(options: &Options) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&options.log_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_logging_is_a_no_op() {
        let options = Options::default().with_log_path(None);
        assert!(!init(&options).unwrap());
    }

    #[test]
    fn unopenable_path_is_an_io_error() {
        let options = Options::default()
            .with_log_path(Some("/nonexistent-dir/for/sure/gt.log".into()));
        assert!(matches!(init(&options), Err(Error::Io(_))));
    }

    #[test]
    fn bad_directive_falls_back() {
        let options = Options::default().with_log_filter("[[not a filter");
        let _ = filter(&options);
    }
}
