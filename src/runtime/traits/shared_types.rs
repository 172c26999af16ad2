// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: CreateSpec, staleness verdicts, and hook execution results.

use std::collections::HashMap;
use std::time::Duration;

use crate::types::ImageId;

/// Everything needed to create a successor container.
///
/// Filled from the predecessor's inspect data; the pipeline swaps the name,
/// labels, and CPU affinity before handing it back to the client.
#[derive(Debug, Clone, Default)]
pub struct CreateSpec {
    /// Name for the container.
    pub name: String,
    /// Image reference to create from.
    pub image: String,
    /// Environment variables as `KEY=value` entries.
    pub env: Vec<String>,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
    /// Command (overrides image CMD).
    pub cmd: Vec<String>,
    /// Entrypoint (overrides image ENTRYPOINT).
    pub entrypoint: Option<Vec<String>>,
    /// User to run as.
    pub user: Option<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// Volume binds in `source:target[:opts]` form.
    pub binds: Vec<String>,
    /// Port bindings in `host:container[/proto]` form.
    pub ports: Vec<String>,
    /// Network mode passthrough.
    pub network_mode: Option<String>,
    /// Legacy links passthrough.
    pub links: Vec<String>,
    /// Restart policy name passthrough.
    pub restart_policy: Option<String>,
    /// Explicit CPU set (e.g. "0-2,7"), copied per the configured mode.
    pub cpuset_cpus: Option<String>,
    /// Stop timeout baked into the container config.
    pub stop_timeout: Option<Duration>,
}

/// Result of comparing a container's image against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// The local image matches the registry.
    Fresh,
    /// The registry has a newer image; it has been pulled into the local
    /// store and the successor should be created from it.
    Stale { latest: ImageId },
}

/// Outcome of executing a command inside a container.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i64,
    /// Captured combined output, for logging.
    pub output: String,
}
