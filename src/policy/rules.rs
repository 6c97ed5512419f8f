// Flagging rules: the configurable thresholds and toggles the decision
// policy reads.
//
// A rule set is an immutable snapshot. RulesHandle holds the active one and
// swaps in replacements atomically, so a decision running concurrently with
// an update sees either the old rules or the new ones, never a mix.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One versioned snapshot of the flagging rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlaggingRules {
    /// Monotonic version; a replacement must carry a higher one
    pub version: u32,
    /// Confidence at or above which harassment / hate speech is auto-rejected
    pub auto_reject_threshold: f64,
    /// Confidence at or above which spam / inappropriate content is auto-flagged
    pub auto_flag_threshold: f64,
    pub pii_auto_reject: bool,
    pub harassment_auto_reject: bool,
    pub hate_speech_auto_reject: bool,
    pub spam_auto_flag: bool,
    /// Report count at which flagged content is escalated to the review queue
    pub multiple_reports_threshold: u32,
    pub new_user_stricter_rules: bool,
}

impl Default for FlaggingRules {
    fn default() -> Self {
        Self {
            version: 1,
            auto_reject_threshold: 0.9,
            auto_flag_threshold: 0.7,
            pii_auto_reject: true,
            harassment_auto_reject: true,
            hate_speech_auto_reject: true,
            spam_auto_flag: true,
            multiple_reports_threshold: 3,
            new_user_stricter_rules: true,
        }
    }
}

impl FlaggingRules {
    /// Check that the thresholds make sense together.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("autoRejectThreshold", self.auto_reject_threshold),
            ("autoFlagThreshold", self.auto_flag_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{name} must be between 0.0 and 1.0, got {value}");
            }
        }
        if self.auto_flag_threshold > self.auto_reject_threshold {
            anyhow::bail!(
                "autoFlagThreshold ({}) must not exceed autoRejectThreshold ({})",
                self.auto_flag_threshold,
                self.auto_reject_threshold
            );
        }
        Ok(())
    }

    /// Load and validate a rule set from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let rules: FlaggingRules = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse rules file {}", path.display()))?;
        rules
            .validate()
            .with_context(|| format!("Invalid rules in {}", path.display()))?;
        Ok(rules)
    }
}

/// Holder of the active rule set.
pub struct RulesHandle {
    current: ArcSwap<FlaggingRules>,
}

impl RulesHandle {
    pub fn new(rules: FlaggingRules) -> Result<Self> {
        rules.validate()?;
        Ok(Self {
            current: ArcSwap::from_pointee(rules),
        })
    }

    /// The rule set to use for one decision (or one batch of decisions).
    pub fn snapshot(&self) -> Arc<FlaggingRules> {
        self.current.load_full()
    }

    /// Atomically install a newer rule set.
    ///
    /// Fails if the rules are invalid or the version does not move forward;
    /// the active rules are left untouched in that case.
    pub fn replace(&self, rules: FlaggingRules) -> Result<Arc<FlaggingRules>> {
        rules.validate()?;
        let new = Arc::new(rules);

        loop {
            let current = self.current.load_full();
            if new.version <= current.version {
                anyhow::bail!(
                    "Rules version {} is not newer than active version {}",
                    new.version,
                    current.version
                );
            }
            let previous = self.current.compare_and_swap(&current, Arc::clone(&new));
            if Arc::ptr_eq(&*previous, &current) {
                info!(
                    from = current.version,
                    to = new.version,
                    "Flagging rules updated"
                );
                return Ok(new);
            }
            // Lost a race with another writer; re-check against the winner
        }
    }

    /// Read a rule set from disk and install it.
    pub fn load_file(&self, path: &Path) -> Result<Arc<FlaggingRules>> {
        self.replace(FlaggingRules::load(path)?)
    }
}

impl Default for RulesHandle {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(FlaggingRules::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FlaggingRules::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let rules = FlaggingRules {
            auto_reject_threshold: 0.6,
            auto_flag_threshold: 0.8,
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let rules = FlaggingRules {
            auto_reject_threshold: 1.5,
            ..Default::default()
        };
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_replace_swaps_snapshot_without_touching_old_one() {
        let handle = RulesHandle::default();
        let before = handle.snapshot();

        handle
            .replace(FlaggingRules {
                version: 2,
                auto_flag_threshold: 0.5,
                ..Default::default()
            })
            .unwrap();

        // The old snapshot is unchanged; new readers see version 2
        assert_eq!(before.version, 1);
        assert_eq!(before.auto_flag_threshold, 0.7);
        assert_eq!(handle.snapshot().version, 2);
        assert_eq!(handle.snapshot().auto_flag_threshold, 0.5);
    }

    #[test]
    fn test_replace_requires_newer_version() {
        let handle = RulesHandle::default();
        let err = handle.replace(FlaggingRules::default()).unwrap_err();
        assert!(err.to_string().contains("not newer"));
        assert_eq!(handle.snapshot().version, 1);
    }

    #[test]
    fn test_load_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"version": 4, "spamAutoFlag": false}}"#).unwrap();

        let handle = RulesHandle::default();
        let rules = handle.load_file(file.path()).unwrap();
        assert_eq!(rules.version, 4);
        assert!(!rules.spam_auto_flag);
        assert_eq!(rules.auto_reject_threshold, 0.9);
    }

    #[test]
    fn test_load_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(FlaggingRules::load(file.path()).is_err());
    }
}
