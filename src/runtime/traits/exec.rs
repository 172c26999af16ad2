// ABOUTME: Exec operations trait for container runtime clients.
// ABOUTME: Runs lifecycle hook commands inside running containers.

use std::time::Duration;

use async_trait::async_trait;

use super::sealed::Sealed;
use super::shared_types::ExecOutcome;
use crate::types::ContainerId;

/// Exec operations: run commands in containers.
#[async_trait]
pub trait ExecOps: Sealed + Send + Sync {
    /// Run `command` through a shell inside the container and wait for it,
    /// bounded by `timeout`. Runs as `uid:gid` when either is set.
    async fn execute(
        &self,
        container: &ContainerId,
        command: &str,
        timeout: Duration,
        uid: Option<u32>,
        gid: Option<u32>,
    ) -> Result<ExecOutcome, ExecError>;
}

/// Errors from exec operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("container not running: {0}")]
    ContainerNotRunning(String),

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("runtime error: {0}")]
    Runtime(String),
}
