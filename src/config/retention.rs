//! Retention configuration.
//!
//! Configures how old a series may get before its points and index entries
//! are removed, and how often the cleaner checks.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! max_age_plain = "14d"
//! max_age_tagged = "30d"
//! loop_interval = "1h"
//! dry_run = false
//! ```

use serde::{Deserialize, Serialize};

use super::{ConfigError, HumanDuration};

/// Retention configuration.
///
/// Plain (dotted graphite paths) and tagged series age independently.
/// A series becomes obsolete once its most recent index version is older
/// than the max age of its class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Max age of plain series before they get dropped.
    /// Default: 14d
    #[serde(default = "default_max_age")]
    pub max_age_plain: HumanDuration,

    /// Max age of tagged series before they get dropped.
    /// Default: 14d
    #[serde(default = "default_max_age")]
    pub max_age_tagged: HumanDuration,

    /// Pause between two cleanup cycles.
    /// Default: 1h
    #[serde(default = "default_loop_interval")]
    pub loop_interval: HumanDuration,

    /// If true, log every delete statement without executing it.
    /// Default: true (deleting has to be enabled explicitly)
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_plain: default_max_age(),
            max_age_tagged: default_max_age(),
            loop_interval: default_loop_interval(),
            dry_run: default_dry_run(),
        }
    }
}

fn default_max_age() -> HumanDuration {
    HumanDuration::from_days(14)
}

fn default_loop_interval() -> HumanDuration {
    HumanDuration::from_hours(1)
}

fn default_dry_run() -> bool {
    true
}

impl RetentionConfig {
    /// Get the loop interval as a std Duration.
    pub fn interval(&self) -> std::time::Duration {
        self.loop_interval.as_std()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_age_plain.is_zero() {
            return Err(ConfigError::Validation(
                "retention.max_age_plain must be greater than zero".into(),
            ));
        }
        if self.max_age_tagged.is_zero() {
            return Err(ConfigError::Validation(
                "retention.max_age_tagged must be greater than zero".into(),
            ));
        }
        if self.loop_interval.is_zero() {
            return Err(ConfigError::Validation(
                "retention.loop_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
