// ABOUTME: Container operations trait for container runtime clients.
// ABOUTME: List, inspect, stop, start, rename, remove, and health-wait.

use std::time::Duration;

use async_trait::async_trait;

use super::sealed::Sealed;
use super::shared_types::CreateSpec;
use crate::container::Container;
use crate::types::ContainerId;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// List containers known to the runtime.
    async fn list_containers(&self, include_stopped: bool)
    -> Result<Vec<Container>, ContainerError>;

    /// Get detailed information about a single container.
    async fn get_container(&self, id: &ContainerId) -> Result<Container, ContainerError>;

    /// Stop a running container, waiting up to `timeout` before killing it.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// Stop and remove a container. Idempotent: not-found is success.
    async fn stop_and_remove(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// Create a container from the given spec without starting it.
    async fn create_container(&self, spec: &CreateSpec) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Rename a container.
    async fn rename_container(
        &self,
        id: &ContainerId,
        new_name: &str,
    ) -> Result<(), ContainerError>;

    /// Block until the container reports healthy, bounded by `timeout`.
    ///
    /// Containers without a configured health probe count as healthy once
    /// they are running.
    async fn wait_for_healthy(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container name conflict: {0}")]
    Conflict(String),

    #[error("removal already in progress: {0}")]
    RemovalInProgress(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("health wait timed out after {0:?}")]
    HealthTimeout(Duration),

    #[error("container reported unhealthy: {0}")]
    Unhealthy(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ContainerError {
    /// Whether the error means the container is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::NotFound(_))
    }
}
