// ABOUTME: Composable capability traits for container runtime clients.
// ABOUTME: Defines ContainerOps, ImageOps, ExecOps and the combined Client trait.

mod container;
mod exec;
mod image;
pub(crate) mod sealed;
mod shared_types;

pub use container::{ContainerError, ContainerOps};
pub use exec::{ExecError, ExecOps};
pub use image::{ImageError, ImageOps};
pub use shared_types::{CreateSpec, ExecOutcome, Staleness};

/// Full client capability - convenience trait combining all sub-traits.
///
/// Auto-implemented for any type that implements all the required traits.
pub trait Client: ContainerOps + ImageOps + ExecOps {}

impl<T> Client for T where T: ContainerOps + ImageOps + ExecOps {}
