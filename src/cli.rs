// ABOUTME: Command-line interface definitions using clap derive.
// ABOUTME: Flags override values loaded from the optional skopia.yml.

use std::path::PathBuf;

use clap::Parser;

use skopia::config::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "skopia",
    about = "Automatically update running containers when their images change",
    version
)]
pub struct Cli {
    /// Containers to consider; all eligible containers when empty.
    pub names: Vec<String>,

    /// Path to a settings file (defaults to ./skopia.yml when present).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Remove old images after a successful replacement.
    #[arg(long)]
    pub cleanup: bool,

    /// Replace stale containers but leave the successor stopped.
    #[arg(long)]
    pub no_restart: bool,

    /// Skip the updater's own self-update even when its image is stale.
    #[arg(long)]
    pub run_once: bool,

    /// Check for updates without replacing anything.
    #[arg(long)]
    pub monitor_only: bool,

    /// Per-container monitor-only labels win over --monitor-only.
    #[arg(long)]
    pub label_precedence: bool,

    /// Update one container at a time, waiting for health between each.
    #[arg(long)]
    pub rolling_restart: bool,

    /// Execute lifecycle hook commands from container labels.
    #[arg(long)]
    pub enable_lifecycle_hooks: bool,

    /// UID for lifecycle hook execution.
    #[arg(long, value_name = "UID")]
    pub lifecycle_uid: Option<u32>,

    /// GID for lifecycle hook execution.
    #[arg(long, value_name = "GID")]
    pub lifecycle_gid: Option<u32>,

    /// Scope tag; only containers with this scope label are touched.
    #[arg(long, value_name = "SCOPE")]
    pub scope: Option<String>,

    /// Only containers labelled io.skopia.enable=true are candidates.
    #[arg(long)]
    pub label_enable: bool,

    /// Consider stopped containers as update candidates.
    #[arg(long)]
    pub include_stopped: bool,

    /// Consider restarting containers as update candidates.
    #[arg(long)]
    pub include_restarting: bool,

    /// Seconds to wait when stopping a container.
    #[arg(long, value_name = "SECONDS")]
    pub stop_timeout: Option<u64>,

    /// Print the cycle report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Fold CLI flags into file-loaded settings. Flags win where given.
    pub fn apply_to(&self, mut settings: Settings) -> Settings {
        settings.cleanup |= self.cleanup;
        settings.no_restart |= self.no_restart;
        settings.run_once |= self.run_once;
        settings.monitor_only |= self.monitor_only;
        settings.label_precedence |= self.label_precedence;
        settings.rolling_restart |= self.rolling_restart;
        settings.lifecycle_hooks |= self.enable_lifecycle_hooks;
        settings.label_enable |= self.label_enable;
        settings.include_stopped |= self.include_stopped;
        settings.include_restarting |= self.include_restarting;

        if let Some(uid) = self.lifecycle_uid {
            settings.lifecycle_uid = Some(uid);
        }
        if let Some(gid) = self.lifecycle_gid {
            settings.lifecycle_gid = Some(gid);
        }
        if let Some(scope) = &self.scope {
            settings.scope = scope.clone();
        }
        if let Some(secs) = self.stop_timeout {
            settings.stop_timeout = std::time::Duration::from_secs(secs);
        }
        if !self.names.is_empty() {
            settings.names = self.names.clone();
        }

        settings
    }
}
