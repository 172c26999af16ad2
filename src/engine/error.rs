// ABOUTME: Error types for the update engine using SNAFU with ErrorKind pattern.
// ABOUTME: Provides opaque errors with kind() accessor for stable API.

use snafu::Snafu;

use crate::runtime::{ContainerError, ExecError, ImageError};

/// Categories of engine errors.
///
/// Use `EngineError::kind()` to get this value for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineErrorKind {
    InvalidReference,
    PullFailed,
    CircularDependency,
    RollingRestartHasLinks,
    PreUpdateTempfail,
    PreUpdateFailed,
    HookTimeout,
    StopFailed,
    StartFailed,
    CreateFailed,
    RemoveFailed,
    HealthWaitTimeout,
    ImageCleanupFailed,
    ReaperPartialFailure,
    ReaperTotalFailure,
    ListContainersFailed,
    UpdateCancelled,
}

/// Errors raised by the update engine.
///
/// This is an opaque error type. Use `kind()` to determine the error category.
#[derive(Debug)]
pub struct EngineError(InnerEngineError);

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl EngineError {
    /// Returns the kind of this error for programmatic handling.
    pub fn kind(&self) -> EngineErrorKind {
        match &self.0 {
            InnerEngineError::InvalidReference { .. } => EngineErrorKind::InvalidReference,
            InnerEngineError::PullFailed { .. } => EngineErrorKind::PullFailed,
            InnerEngineError::CircularDependency { .. } => EngineErrorKind::CircularDependency,
            InnerEngineError::RollingRestartHasLinks { .. } => {
                EngineErrorKind::RollingRestartHasLinks
            }
            InnerEngineError::PreUpdateTempfail { .. } => EngineErrorKind::PreUpdateTempfail,
            InnerEngineError::PreUpdateFailed { .. } => EngineErrorKind::PreUpdateFailed,
            InnerEngineError::HookTimeout { .. } => EngineErrorKind::HookTimeout,
            InnerEngineError::StopFailed { .. } => EngineErrorKind::StopFailed,
            InnerEngineError::StartFailed { .. } => EngineErrorKind::StartFailed,
            InnerEngineError::CreateFailed { .. } => EngineErrorKind::CreateFailed,
            InnerEngineError::RemoveFailed { .. } => EngineErrorKind::RemoveFailed,
            InnerEngineError::HealthWaitTimeout { .. } => EngineErrorKind::HealthWaitTimeout,
            InnerEngineError::ImageCleanupFailed { .. } => EngineErrorKind::ImageCleanupFailed,
            InnerEngineError::ReaperPartialFailure { .. } => EngineErrorKind::ReaperPartialFailure,
            InnerEngineError::ReaperTotalFailure { .. } => EngineErrorKind::ReaperTotalFailure,
            InnerEngineError::ListContainersFailed { .. } => EngineErrorKind::ListContainersFailed,
            InnerEngineError::UpdateCancelled => EngineErrorKind::UpdateCancelled,
        }
    }

    /// Returns the recorded hook exit code for a `PreUpdateFailed` error.
    pub fn exit_code(&self) -> Option<i64> {
        match &self.0 {
            InnerEngineError::PreUpdateFailed { exit_code } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Internal error type with full context - not exposed in public API.
#[derive(Debug, Snafu)]
enum InnerEngineError {
    #[snafu(display("invalid image reference: {message}"))]
    InvalidReference { message: String },

    #[snafu(display("failed to pull image: {source}"))]
    PullFailed { source: ImageError },

    #[snafu(display("container is part of a dependency cycle: {name}"))]
    CircularDependency { name: String },

    #[snafu(display("rolling restart cannot be combined with legacy links: {name}"))]
    RollingRestartHasLinks { name: String },

    #[snafu(display("pre-update hook requested skip (EX_TEMPFAIL)"))]
    PreUpdateTempfail,

    #[snafu(display("pre-update hook failed with exit code {exit_code}"))]
    PreUpdateFailed { exit_code: i64 },

    #[snafu(display("lifecycle hook timed out: {source}"))]
    HookTimeout { source: ExecError },

    #[snafu(display("failed to stop container: {source}"))]
    StopFailed { source: ContainerError },

    #[snafu(display("failed to start container: {source}"))]
    StartFailed { source: ContainerError },

    #[snafu(display("failed to create container: {source}"))]
    CreateFailed { source: ContainerError },

    #[snafu(display("failed to remove container: {source}"))]
    RemoveFailed { source: ContainerError },

    #[snafu(display("health wait timed out: {source}"))]
    HealthWaitTimeout { source: ContainerError },

    #[snafu(display("image cleanup failed: {message}"))]
    ImageCleanupFailed { message: String },

    #[snafu(display("failed to remove {failed} of {total} excess instances: {message}"))]
    ReaperPartialFailure {
        failed: usize,
        total: usize,
        message: String,
    },

    #[snafu(display("failed to remove all {total} excess instances: {message}"))]
    ReaperTotalFailure { total: usize, message: String },

    #[snafu(display("failed to list containers: {source}"))]
    ListContainersFailed { source: ContainerError },

    #[snafu(display("update cycle cancelled"))]
    UpdateCancelled,
}

use snafu::IntoError;

// Factory functions for constructing errors at call sites.
impl EngineError {
    pub fn invalid_reference(message: impl Into<String>) -> Self {
        EngineError(
            InvalidReferenceSnafu {
                message: message.into(),
            }
            .build(),
        )
    }

    pub fn pull_failed(source: ImageError) -> Self {
        EngineError(PullFailedSnafu.into_error(source))
    }

    pub fn circular_dependency(name: impl Into<String>) -> Self {
        EngineError(CircularDependencySnafu { name: name.into() }.build())
    }

    pub fn rolling_restart_has_links(name: impl Into<String>) -> Self {
        EngineError(RollingRestartHasLinksSnafu { name: name.into() }.build())
    }

    pub fn pre_update_tempfail() -> Self {
        EngineError(PreUpdateTempfailSnafu.build())
    }

    pub fn pre_update_failed(exit_code: i64) -> Self {
        EngineError(PreUpdateFailedSnafu { exit_code }.build())
    }

    pub fn hook_timeout(source: ExecError) -> Self {
        EngineError(HookTimeoutSnafu.into_error(source))
    }

    pub fn stop_failed(source: ContainerError) -> Self {
        EngineError(StopFailedSnafu.into_error(source))
    }

    pub fn start_failed(source: ContainerError) -> Self {
        EngineError(StartFailedSnafu.into_error(source))
    }

    pub fn create_failed(source: ContainerError) -> Self {
        EngineError(CreateFailedSnafu.into_error(source))
    }

    pub fn remove_failed(source: ContainerError) -> Self {
        EngineError(RemoveFailedSnafu.into_error(source))
    }

    pub fn health_wait_timeout(source: ContainerError) -> Self {
        EngineError(HealthWaitTimeoutSnafu.into_error(source))
    }

    pub fn image_cleanup_failed(message: impl Into<String>) -> Self {
        EngineError(
            ImageCleanupFailedSnafu {
                message: message.into(),
            }
            .build(),
        )
    }

    pub fn reaper_partial_failure(failed: usize, total: usize, message: impl Into<String>) -> Self {
        EngineError(
            ReaperPartialFailureSnafu {
                failed,
                total,
                message: message.into(),
            }
            .build(),
        )
    }

    pub fn reaper_total_failure(total: usize, message: impl Into<String>) -> Self {
        EngineError(
            ReaperTotalFailureSnafu {
                total,
                message: message.into(),
            }
            .build(),
        )
    }

    pub fn list_containers_failed(source: ContainerError) -> Self {
        EngineError(ListContainersFailedSnafu.into_error(source))
    }

    pub fn cancelled() -> Self {
        EngineError(UpdateCancelledSnafu.build())
    }
}
