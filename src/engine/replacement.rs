// ABOUTME: Per-container replacement using the type state pattern.
// ABOUTME: Each transition consumes self: parked -> created -> started.

use crate::config::CpuCopyMode;
use crate::container::Container;
use crate::engine::error::EngineError;
use crate::runtime::{ContainerOps, CreateSpec};
use crate::types::ContainerId;
use std::time::Duration;

/// Ready to replace: pre-update checks passed.
pub struct Pending;

/// The predecessor is renamed to its tombstone and taken out of service.
pub struct Parked;

/// The successor exists but has not been started.
pub struct Created {
    successor: ContainerId,
}

/// The successor is running.
pub struct Started {
    successor: ContainerId,
}

/// One container's replacement in progress, parameterized by its state.
///
/// The state type parameter carries state-specific data (the successor ID)
/// so it cannot be observed before it exists.
pub struct Replacement<S> {
    target: Container,
    spec: CreateSpec,
    state: S,
}

impl Replacement<Pending> {
    /// Prepare a replacement for `target`.
    ///
    /// The successor spec is the predecessor's creation snapshot with the
    /// original name and the configured CPU-affinity policy applied.
    pub fn new(target: Container, cpu_mode: CpuCopyMode) -> Self {
        let mut spec = target.spec.clone();
        spec.name = target.name.clone();
        if cpu_mode == CpuCopyMode::Never {
            spec.cpuset_cpus = None;
        }
        Self {
            target,
            spec,
            state: Pending,
        }
    }

    /// Override labels on the successor (self-update hand-off).
    pub fn with_labels(mut self, labels: std::collections::HashMap<String, String>) -> Self {
        self.spec.labels = labels;
        self
    }

    /// The tombstone name the predecessor is parked under.
    pub fn tombstone(&self) -> String {
        format!("{}_{}", self.target.name, self.target.id.short())
    }

    /// Rename the predecessor out of the way, then stop and remove it.
    ///
    /// The rename frees the original name so the successor can take it.
    pub async fn park<C: ContainerOps>(
        self,
        client: &C,
        stop_timeout: Duration,
    ) -> Result<Replacement<Parked>, EngineError> {
        let tombstone = self.tombstone();
        tracing::debug!(
            container = %self.target.name,
            tombstone = %tombstone,
            "parking predecessor"
        );

        client
            .rename_container(&self.target.id, &tombstone)
            .await
            .map_err(EngineError::stop_failed)?;

        client
            .stop_and_remove(&self.target.id, stop_timeout)
            .await
            .map_err(EngineError::stop_failed)?;

        Ok(Replacement {
            target: self.target,
            spec: self.spec,
            state: Parked,
        })
    }

    /// Rename the predecessor out of the way without stopping it.
    ///
    /// Used for the self-update hand-off: the predecessor must keep running
    /// until the successor reaps it, but its name has to be freed first.
    pub async fn rename_only<C: ContainerOps>(
        self,
        client: &C,
    ) -> Result<Replacement<Parked>, EngineError> {
        let tombstone = self.tombstone();
        tracing::debug!(
            container = %self.target.name,
            tombstone = %tombstone,
            "renaming predecessor, leaving it running"
        );

        client
            .rename_container(&self.target.id, &tombstone)
            .await
            .map_err(EngineError::stop_failed)?;

        Ok(Replacement {
            target: self.target,
            spec: self.spec,
            state: Parked,
        })
    }
}

impl Replacement<Parked> {
    /// Create the successor under the original name.
    pub async fn create<C: ContainerOps>(
        self,
        client: &C,
    ) -> Result<Replacement<Created>, EngineError> {
        let successor = client
            .create_container(&self.spec)
            .await
            .map_err(EngineError::create_failed)?;

        tracing::debug!(
            container = %self.spec.name,
            successor = %successor,
            "created successor"
        );

        Ok(Replacement {
            target: self.target,
            spec: self.spec,
            state: Created { successor },
        })
    }
}

impl Replacement<Created> {
    pub fn successor(&self) -> &ContainerId {
        &self.state.successor
    }

    /// Start the successor.
    pub async fn start<C: ContainerOps>(
        self,
        client: &C,
    ) -> Result<Replacement<Started>, EngineError> {
        client
            .start_container(&self.state.successor)
            .await
            .map_err(EngineError::start_failed)?;

        Ok(Replacement {
            target: self.target,
            spec: self.spec,
            state: Started {
                successor: self.state.successor,
            },
        })
    }

    /// Leave the successor created but stopped (no-restart mode).
    pub fn leave_stopped(self) -> ContainerId {
        self.state.successor
    }
}

impl Replacement<Started> {
    pub fn successor(&self) -> &ContainerId {
        &self.state.successor
    }

    /// Consume the replacement, yielding the running successor's ID.
    pub fn finish(self) -> ContainerId {
        self.state.successor
    }
}
