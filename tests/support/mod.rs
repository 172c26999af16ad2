// ABOUTME: Shared helpers for the integration test suites.
// ABOUTME: Builds engines over the mock client with common label shorthand.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use skopia::config::Settings;
use skopia::container::{Container, labels};
use skopia::engine::Engine;
use skopia::runtime::mock::{ContainerBuilder, MockClient};
use skopia::types::ContainerId;

/// A container that depends on `deps` via the explicit label.
pub fn dependent(name: &str, deps: &str) -> Container {
    ContainerBuilder::new(name)
        .label(labels::DEPENDS_ON, deps)
        .build()
}

/// A plain running container.
pub fn plain(name: &str) -> Container {
    ContainerBuilder::new(name).build()
}

/// An updater instance container.
pub fn updater(name: &str, id: &str, created: i64) -> Container {
    ContainerBuilder::new(name)
        .id(id)
        .label(labels::INSTANCE, "true")
        .created_at(created)
        .build()
}

/// Engine over a fresh mock client with the given containers.
pub fn engine(
    settings: Settings,
    self_id: Option<&str>,
    containers: Vec<Container>,
) -> Engine<MockClient> {
    let client = MockClient::new();
    for c in containers {
        client.add_container(c);
    }
    Engine::new(
        client,
        settings,
        self_id.map(ContainerId::new),
    )
}

/// Names in a report bucket, sorted for set comparison.
pub fn sorted_names(outcomes: &[skopia::engine::report::ContainerOutcome]) -> Vec<String> {
    let mut names: Vec<String> = outcomes.iter().map(|o| o.name.clone()).collect();
    names.sort();
    names
}
