//! Runtime configuration for extraction and watching.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default quiet interval between a change burst and the extraction pass.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

/// Output directory layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// One directory per primary domain holding four fixed-name PEM files.
    PerDomain,
    /// One flat directory of `<name>.key` / `<name>.crt` / `<name>.chain.pem`
    /// files, with every alternate name materialized as an alias.
    Flat,
}

/// Everything one extraction pass, and the watch loop around it, needs.
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// The proxy's ACME state file.
    pub state_path: PathBuf,
    /// Directory the output layout is created under.
    pub output_root: PathBuf,
    /// Output layout variant.
    pub layout: Layout,
    /// Primary names to extract; empty means all.
    pub include: BTreeSet<String>,
    /// Primary names to skip; empty means none.
    pub exclude: BTreeSet<String>,
    /// Challenge section to read from a multi-challenge state file.
    pub challenge: Option<String>,
    /// Resolve output targets without writing anything.
    pub dry_run: bool,
    /// Invoke the change sink after each pass that processed domains.
    pub notify_on_change: bool,
    /// Quiet interval for the change debouncer.
    pub debounce: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("acme.json"),
            output_root: PathBuf::from("."),
            layout: Layout::PerDomain,
            include: BTreeSet::new(),
            exclude: BTreeSet::new(),
            challenge: None,
            dry_run: false,
            notify_on_change: false,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl ExtractorConfig {
    /// Check the configuration for contradictions before running anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(ConfigError::IncludeExcludeConflict);
        }
        if self.state_path.file_name().is_none() {
            return Err(ConfigError::NotAFile(self.state_path.clone()));
        }
        if self.debounce.is_zero() {
            return Err(ConfigError::ZeroDebounce);
        }
        Ok(())
    }

    /// Apply the include/exclude filter to a primary domain name.
    ///
    /// A name passes when the include list is empty or contains it, and the
    /// exclude list is empty or does not contain it. `validate` guarantees
    /// at most one of the lists is populated.
    pub fn is_included(&self, name: &str) -> bool {
        (self.include.is_empty() || self.include.contains(name))
            && (self.exclude.is_empty() || !self.exclude.contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ExtractorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_include_exclude_conflict_rejected() {
        let config = ExtractorConfig {
            include: BTreeSet::from(["a.com".to_string()]),
            exclude: BTreeSet::from(["b.com".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IncludeExcludeConflict)
        ));
    }

    #[test]
    fn test_zero_debounce_rejected() {
        let config = ExtractorConfig {
            debounce: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroDebounce)));
    }

    #[test]
    fn test_state_path_must_name_a_file() {
        let config = ExtractorConfig {
            state_path: PathBuf::from("/"),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NotAFile(_))));
    }

    #[test]
    fn test_filter_include_only() {
        let config = ExtractorConfig {
            include: BTreeSet::from(["a.com".to_string()]),
            ..Default::default()
        };
        assert!(config.is_included("a.com"));
        assert!(!config.is_included("b.com"));
    }

    #[test]
    fn test_filter_exclude_only() {
        let config = ExtractorConfig {
            exclude: BTreeSet::from(["b.com".to_string()]),
            ..Default::default()
        };
        assert!(config.is_included("a.com"));
        assert!(!config.is_included("b.com"));
        assert!(config.is_included("c.com"));
    }

    #[test]
    fn test_filter_empty_lists_pass_everything() {
        let config = ExtractorConfig::default();
        assert!(config.is_included("anything.example"));
    }
}
