// ABOUTME: Candidate selection predicates for one update cycle.
// ABOUTME: Scope isolation, enable labels, name allowlists, and state filters.

use crate::config::Settings;
use crate::container::Container;

/// Strict scope isolation predicate.
///
/// An empty configured scope selects only containers whose scope label is
/// absent or empty; a non-empty scope requires an exact label match.
pub fn scope_matches(configured: &str, container: &Container) -> bool {
    match container.scope() {
        None => configured.is_empty(),
        Some(label) => label == configured,
    }
}

/// Decides whether a container is in the update set for a cycle.
#[derive(Debug, Clone)]
pub struct ContainerSelector {
    scope: String,
    label_enable: bool,
    names: Vec<String>,
    include_stopped: bool,
    include_restarting: bool,
}

impl ContainerSelector {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            scope: settings.scope.clone(),
            label_enable: settings.label_enable,
            names: settings.names.clone(),
            include_stopped: settings.include_stopped,
            include_restarting: settings.include_restarting,
        }
    }

    pub fn includes(&self, container: &Container) -> bool {
        if !self.names.is_empty() && !self.names.iter().any(|n| n == &container.name) {
            return false;
        }

        match container.enable_label() {
            Some(false) => return false,
            Some(true) => {}
            None if self.label_enable => return false,
            None => {}
        }

        if container.is_restarting() && !self.include_restarting {
            return false;
        }
        if !container.is_running() && !container.is_restarting() && !self.include_stopped {
            return false;
        }

        scope_matches(&self.scope, container)
    }
}
