// ABOUTME: Engine settings with defaults, loadable from an optional skopia.yml.
// ABOUTME: CLI flags override file values; unspecified options mean "off".

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_FILENAME: &str = "skopia.yml";

/// Whether a successor inherits the predecessor's CPU affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuCopyMode {
    /// Copy only when the predecessor had an explicit CPU set.
    #[default]
    Auto,
    Always,
    Never,
}

/// All knobs for one update cycle. Every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Remove old images after successful replacement.
    pub cleanup: bool,

    /// Stop and replace stale containers but never start the successor.
    pub no_restart: bool,

    /// Skip the updater's own self-update even when stale.
    pub run_once: bool,

    /// Check staleness but never update anything.
    pub monitor_only: bool,

    /// Per-container monitor-only labels win over the global flag.
    pub label_precedence: bool,

    /// Update one container at a time, waiting for health between each.
    pub rolling_restart: bool,

    /// Execute lifecycle hook commands from container labels.
    pub lifecycle_hooks: bool,
    pub lifecycle_uid: Option<u32>,
    pub lifecycle_gid: Option<u32>,

    /// Scope tag. Empty means "unscoped containers only".
    pub scope: String,

    /// Only containers labelled enable=true are candidates.
    pub label_enable: bool,

    /// Explicit container-name allowlist. Empty means all.
    pub names: Vec<String>,

    /// Consider stopped containers as update candidates.
    pub include_stopped: bool,

    /// Consider restarting containers as update candidates.
    pub include_restarting: bool,

    /// Minimum wait after a self-update pull failure before returning.
    #[serde(with = "humantime_serde")]
    pub pull_failure_delay: Duration,

    /// Timeout handed to the runtime's stop call.
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Delay between excess-instance removal attempts.
    #[serde(with = "humantime_serde")]
    pub cleanup_retry_delay: Duration,

    /// Attempts per excess instance before giving up.
    pub max_removal_attempts: u32,

    /// Upper bound for the rolling-restart health wait.
    #[serde(with = "humantime_serde")]
    pub health_wait_timeout: Duration,

    pub cpu_copy_mode: CpuCopyMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cleanup: false,
            no_restart: false,
            run_once: false,
            monitor_only: false,
            label_precedence: false,
            rolling_restart: false,
            lifecycle_hooks: false,
            lifecycle_uid: None,
            lifecycle_gid: None,
            scope: String::new(),
            label_enable: false,
            names: Vec::new(),
            include_stopped: false,
            include_restarting: false,
            pull_failure_delay: Duration::ZERO,
            stop_timeout: Duration::from_secs(600),
            cleanup_retry_delay: Duration::from_millis(500),
            max_removal_attempts: 3,
            health_wait_timeout: Duration::from_secs(60),
            cpu_copy_mode: CpuCopyMode::Auto,
        }
    }
}

impl Settings {
    /// Load settings from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let settings = serde_yaml::from_str(&raw)?;
        Ok(settings)
    }

    /// Load `skopia.yml` from `dir` if present, defaults otherwise.
    pub fn discover(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILENAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Effective monitor-only decision for one container.
    ///
    /// With label precedence the container label wins when present;
    /// otherwise the global flag wins when set.
    pub fn effective_monitor_only(&self, label: Option<bool>) -> bool {
        if self.label_precedence {
            label.unwrap_or(self.monitor_only)
        } else if self.monitor_only {
            true
        } else {
            label.unwrap_or(false)
        }
    }

    /// Validate option combinations that cannot work together.
    pub fn validate(&self) -> Result<()> {
        if self.max_removal_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_removal_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::default();
        assert_eq!(s.stop_timeout, Duration::from_secs(600));
        assert_eq!(s.cleanup_retry_delay, Duration::from_millis(500));
        assert_eq!(s.max_removal_attempts, 3);
        assert_eq!(s.cpu_copy_mode, CpuCopyMode::Auto);
        assert!(!s.cleanup);
        assert!(s.scope.is_empty());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let s: Settings = serde_yaml::from_str(
            "cleanup: true\nstop_timeout: 30s\nscope: prod\ncpu_copy_mode: never\n",
        )
        .unwrap();
        assert!(s.cleanup);
        assert_eq!(s.stop_timeout, Duration::from_secs(30));
        assert_eq!(s.scope, "prod");
        assert_eq!(s.cpu_copy_mode, CpuCopyMode::Never);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed: std::result::Result<Settings, _> = serde_yaml::from_str("clean_up: true\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn monitor_only_label_precedence() {
        let mut s = Settings {
            monitor_only: true,
            ..Default::default()
        };

        // Global wins by default.
        assert!(s.effective_monitor_only(Some(false)));
        assert!(s.effective_monitor_only(None));

        // With precedence the label wins when present.
        s.label_precedence = true;
        assert!(!s.effective_monitor_only(Some(false)));
        assert!(s.effective_monitor_only(None));
        assert!(s.effective_monitor_only(Some(true)));
    }

    #[test]
    fn zero_removal_attempts_rejected() {
        let s = Settings {
            max_removal_attempts: 0,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }
}
