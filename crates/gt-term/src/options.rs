// SPDX-License-Identifier: MIT
//
// Session options.
//
// Everything has a sensible default, so `Options::default()` is what most
// programs want. `Options::from_env()` layers a handful of environment
// overrides on top, handy when debugging inside a terminal that can't
// easily pass flags through:
//
// | Variable               | Field             | Default               |
// |------------------------|-------------------|-----------------------|
// | `GTERM_LOG`            | `log_path`        | `graphical-term.log`  |
// | `GTERM_LOG_LEVEL`      | `log_filter`      | `info`                |
// | `GTERM_KEYBOARD_FLAGS` | `keyboard_flags`  | `31`                  |
// | `GTERM_SHM_PREFIX`     | `shm_prefix`      | `/gtshm-image-`       |
// | `GTERM_FRAME_MS`       | `frame_interval`  | `16`                  |
//
// Unparseable values are ignored rather than rejected.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Kitty keyboard progressive-enhancement flags: disambiguate (1), report
/// event types (2), alternate keys (4), all keys as escape codes (8),
/// associated text (16).
pub const DEFAULT_KEYBOARD_FLAGS: u8 = 0b1_1111;

/// Default shared-memory name prefix; the generation id is appended.
pub const DEFAULT_SHM_PREFIX: &str = "/gtshm-image-";

/// Default diagnostic log file, relative to the working directory.
pub const DEFAULT_LOG_PATH: &str = "graphical-term.log";

/// Configuration for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Diagnostic log file, opened in append mode. `None` disables logging.
    pub log_path: Option<PathBuf>,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Flags pushed with `CSI > flags u` on entry.
    pub keyboard_flags: u8,
    /// Prefix for framebuffer shared-memory object names.
    pub shm_prefix: String,
    /// Target frame period for [`frame_loop::run`](crate::frame_loop::run).
    pub frame_interval: Duration,
    /// Install SIGINT/SIGTERM/SIGHUP/SIGQUIT handlers that restore the terminal.
    pub install_signal_handlers: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            log_path: Some(PathBuf::from(DEFAULT_LOG_PATH)),
            log_filter: "info".to_owned(),
            keyboard_flags: DEFAULT_KEYBOARD_FLAGS,
            shm_prefix: DEFAULT_SHM_PREFIX.to_owned(),
            frame_interval: Duration::from_millis(16),
            install_signal_handlers: true,
        }
    }
}

impl Options {
    /// Defaults, overridden by any `GTERM_*` variables that are set.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in
    /// production, a map in tests).
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("GTERM_LOG") {
            self.log_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(filter) = lookup("GTERM_LOG_LEVEL").filter(|f| !f.is_empty()) {
            self.log_filter = filter;
        }
        if let Some(flags) = lookup("GTERM_KEYBOARD_FLAGS").and_then(|v| v.parse().ok()) {
            self.keyboard_flags = flags;
        }
        if let Some(prefix) = lookup("GTERM_SHM_PREFIX").filter(|p| p.starts_with('/')) {
            self.shm_prefix = prefix;
        }
        if let Some(ms) = lookup("GTERM_FRAME_MS").and_then(|v| v.parse::<u64>().ok()) {
            self.frame_interval = Duration::from_millis(ms);
        }
        self
    }

    #[must_use]
    pub fn with_log_path(mut self, path: Option<PathBuf>) -> Self {
        self.log_path = path;
        self
    }

    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    #[must_use]
    pub const fn with_keyboard_flags(mut self, flags: u8) -> Self {
        self.keyboard_flags = flags;
        self
    }

    #[must_use]
    pub fn with_shm_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.shm_prefix = prefix.into();
        self
    }

    #[must_use]
    pub const fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_signal_handlers(mut self, install: bool) -> Self {
        self.install_signal_handlers = install;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let o = Options::default();
        assert_eq!(o.keyboard_flags, 31);
        assert_eq!(o.shm_prefix, "/gtshm-image-");
        assert_eq!(o.log_path, Some(PathBuf::from("graphical-term.log")));
        assert!(o.install_signal_handlers);
    }

    #[test]
    fn overrides_apply() {
        let o = Options::default().with_overrides(lookup(&[
            ("GTERM_LOG", "/tmp/gt.log"),
            ("GTERM_LOG_LEVEL", "debug"),
            ("GTERM_KEYBOARD_FLAGS", "11"),
            ("GTERM_SHM_PREFIX", "/mine-"),
            ("GTERM_FRAME_MS", "33"),
        ]));
        assert_eq!(o.log_path, Some(PathBuf::from("/tmp/gt.log")));
        assert_eq!(o.log_filter, "debug");
        assert_eq!(o.keyboard_flags, 11);
        assert_eq!(o.shm_prefix, "/mine-");
        assert_eq!(o.frame_interval, Duration::from_millis(33));
    }

    #[test]
    fn empty_log_path_disables_logging() {
        let o = Options::default().with_overrides(lookup(&[("GTERM_LOG", "")]));
        assert_eq!(o.log_path, None);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let o = Options::default().with_overrides(lookup(&[
            ("GTERM_KEYBOARD_FLAGS", "lots"),
            ("GTERM_SHM_PREFIX", "no-leading-slash"),
            ("GTERM_FRAME_MS", "-1"),
        ]));
        assert_eq!(o, Options::default());
    }
}
