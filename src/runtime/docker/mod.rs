// ABOUTME: Docker-compatible runtime client module.
// ABOUTME: Exposes the bollard-backed implementation of the capability traits.

mod runtime;

pub use runtime::DockerClient;
