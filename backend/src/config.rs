//! Runtime configuration from the environment.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `TABFLOW_STORE_DIR` | `.tabflow` |
//! | `TABFLOW_PORT` | `3000` |
//! | `TABFLOW_RERUN_SECS` | `5` |
//!
//! A `.env` file is loaded by the CLI before reading these. Unparseable
//! values fall back to the default. CLI flags override the result.

use std::path::PathBuf;
use std::time::Duration;

use crate::store::DEFAULT_STORE_DIR;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_RERUN_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store_dir: PathBuf,
    pub port: u16,
    /// Periodic re-run interval; zero disables the timer.
    pub rerun_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(DEFAULT_STORE_DIR),
            port: DEFAULT_PORT,
            rerun_interval: Duration::from_secs(DEFAULT_RERUN_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            store_dir: lookup("TABFLOW_STORE_DIR")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            port: lookup("TABFLOW_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.port),
            rerun_interval: lookup("TABFLOW_RERUN_SECS")
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.rerun_interval),
        }
    }

    pub fn with_store_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.store_dir = dir;
        }
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn test_reads_values() {
        let config = Config::from_lookup(lookup(&[
            ("TABFLOW_STORE_DIR", "/tmp/tf"),
            ("TABFLOW_PORT", "8080"),
            ("TABFLOW_RERUN_SECS", "0"),
        ]));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/tf"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.rerun_interval, Duration::ZERO);
    }

    #[test]
    fn test_bad_values_and_overrides() {
        let config = Config::from_lookup(lookup(&[("TABFLOW_PORT", "http")]))
            .with_port(Some(9000))
            .with_store_dir(None);
        assert_eq!(config.port, 9000);
        assert_eq!(config.store_dir, PathBuf::from(DEFAULT_STORE_DIR));
    }
}
