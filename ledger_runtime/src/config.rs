//! Ledger configuration, read from a TOML file.
//!
//! ```toml
//! data_dir = "/var/lib/ledger"
//! require_known_evidence = true
//! enforce_transitions = false
//! stats_window_days = 7
//! fsync = true
//! ```
//!
//! Every key is optional. A missing or unreadable file is not fatal:
//! `LedgerConfig::load` logs a warning and returns the defaults.

use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use ledger_kernel::aggregation::DEFAULT_STATS_WINDOW_DAYS;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Root directory holding one subdirectory per workspace.
    pub data_dir: PathBuf,
    /// Close/approve evidence and commit sources must name a memory already
    /// captured in the workspace.
    pub require_known_evidence: bool,
    /// Reject lifecycle operations the transition policy does not allow
    /// from the commitment's current state. Off by default: the log itself
    /// accepts any well-formed operation.
    pub enforce_transitions: bool,
    /// Trailing window for `closed_this_week`.
    pub stats_window_days: i64,
    pub fsync: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("ledger-data"),
            require_known_evidence: true,
            enforce_transitions: false,
            stats_window_days: DEFAULT_STATS_WINDOW_DAYS,
            fsync: true,
        }
    }
}

impl LedgerConfig {
    /// Load from `path`, falling back to defaults when the file is
    /// missing or invalid.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no ledger config, using defaults");
                return Self::default();
            }
            Err(err) => {
                tracing::warn!("Failed to read ledger config at {:?}: {}", path, err);
                return Self::default();
            }
        };

        match Self::parse(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!("Failed to parse ledger config at {:?}: {}", path, err);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn stats_window(&self) -> Duration {
        Duration::days(self.stats_window_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = LedgerConfig::parse("").unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert!(config.require_known_evidence);
        assert!(!config.enforce_transitions);
        assert_eq!(config.stats_window(), Duration::days(7));
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = LedgerConfig::parse(
            r#"
            data_dir = "/tmp/ledger"
            enforce_transitions = true
            stats_window_days = 14
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ledger"));
        assert!(config.enforce_transitions);
        assert!(config.fsync);
        assert_eq!(config.stats_window(), Duration::days(14));
    }

    #[test]
    fn wrong_types_fail_to_parse() {
        assert!(LedgerConfig::parse("fsync = \"yes\"").is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let config = LedgerConfig::load(Path::new("/definitely/not/here/ledger.toml"));
        assert_eq!(config, LedgerConfig::default());
    }
}
