// ABOUTME: Image operations trait for container runtime clients.
// ABOUTME: Registry staleness comparison and image removal.

use async_trait::async_trait;

use super::sealed::Sealed;
use super::shared_types::Staleness;
use crate::container::Container;
use crate::types::ImageId;

/// Image operations: staleness comparison and removal.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Compare the container's image against the registry.
    ///
    /// On a stale result the newer image has been pulled into the local
    /// store, so a successor can be created from the same reference.
    async fn is_stale(&self, container: &Container) -> Result<Staleness, ImageError>;

    /// Remove an image by ID. `name` is only used for diagnostics.
    async fn remove_image(&self, id: &ImageId, name: &str) -> Result<(), ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("authentication failed for registry: {0}")]
    AuthenticationFailed(String),

    #[error("registry unreachable: {0}")]
    RegistryUnreachable(String),

    #[error("pull failed: {0}")]
    PullFailed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ImageError {
    /// Whether the error means the image is already gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ImageError::NotFound(_))
    }

    /// Whether the error means another container still uses the image.
    pub fn is_in_use(&self) -> bool {
        matches!(self, ImageError::InUse(_))
    }
}
