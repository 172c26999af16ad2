// ABOUTME: Read-only view of a runtime container at a point in time.
// ABOUTME: Identity, image, labels, links, state, and the snapshot a successor is created from.

pub mod labels;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::runtime::CreateSpec;
use crate::types::{ContainerId, ImageId, ImageRef, ParseImageRefError};

/// Coarse container state as the engine cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Restarting,
    Stopped,
}

/// One container as observed from the runtime.
///
/// `image_id` never changes for the life of a container; a stopped container
/// still has a valid `image_id` until it is removed.
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub image_id: ImageId,
    /// The reference the container was created from. May be empty when the
    /// image was built locally without a tag.
    pub image_ref: String,
    pub created: DateTime<Utc>,
    pub state: ContainerState,
    /// Legacy link names this container explicitly depends on.
    pub links: Vec<String>,
    /// Raw network mode; `container:<name>` creates a dependency.
    pub network_mode: Option<String>,
    pub labels: HashMap<String, String>,
    /// Snapshot of the creation config, used to build a successor.
    pub spec: CreateSpec,
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }

    pub fn is_restarting(&self) -> bool {
        self.state == ContainerState::Restarting
    }

    /// Parse the image reference this container was created from.
    pub fn parsed_ref(&self) -> Result<ImageRef, ParseImageRefError> {
        ImageRef::parse(&self.image_ref)
    }

    /// Whether this container is a skopia instance.
    pub fn is_updater(&self) -> bool {
        labels::bool_label(&self.labels, labels::INSTANCE).unwrap_or(false)
    }

    /// The scope label, if present and non-empty.
    pub fn scope(&self) -> Option<&str> {
        self.labels
            .get(labels::SCOPE)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The enable label, if present.
    pub fn enable_label(&self) -> Option<bool> {
        labels::bool_label(&self.labels, labels::ENABLE)
    }

    /// The per-container monitor-only label, if present.
    pub fn monitor_only_label(&self) -> Option<bool> {
        labels::bool_label(&self.labels, labels::MONITOR_ONLY)
    }

    /// Explicit dependency names from the skopia label.
    pub fn depends_on(&self) -> Vec<String> {
        labels::name_list(&self.labels, labels::DEPENDS_ON)
    }

    /// Dependency names from the compose label set.
    pub fn compose_depends_on(&self) -> Vec<String> {
        labels::name_list(&self.labels, labels::COMPOSE_DEPENDS_ON)
    }

    pub fn compose_project(&self) -> Option<&str> {
        self.labels.get(labels::COMPOSE_PROJECT).map(String::as_str)
    }

    pub fn compose_service(&self) -> Option<&str> {
        self.labels.get(labels::COMPOSE_SERVICE).map(String::as_str)
    }

    /// The peer name a `container:<name>` network mode points at.
    pub fn network_mode_dependency(&self) -> Option<&str> {
        self.network_mode
            .as_deref()
            .and_then(|mode| mode.strip_prefix("container:"))
            .filter(|name| !name.is_empty())
    }

    /// Predecessor IDs recorded across self-updates, oldest first.
    pub fn replacement_chain(&self) -> Vec<ContainerId> {
        self.labels
            .get(labels::CONTAINER_CHAIN)
            .map(|raw| labels::parse_chain(raw))
            .unwrap_or_default()
    }

    /// A lifecycle hook command label, if set and non-empty.
    pub fn hook_command(&self, label: &str) -> Option<&str> {
        self.labels
            .get(label)
            .map(String::as_str)
            .filter(|cmd| !cmd.is_empty())
    }

    /// Per-hook timeout in seconds from `<label>-timeout`, if parsable.
    pub fn hook_timeout_secs(&self, label: &str) -> Option<u64> {
        self.labels
            .get(&format!("{label}-timeout"))
            .and_then(|raw| raw.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::CreateSpec;

    fn container_with_labels(pairs: &[(&str, &str)]) -> Container {
        Container {
            id: ContainerId::new("c0ffee"),
            name: "app".to_string(),
            image_id: ImageId::new("sha256:1111"),
            image_ref: "app:latest".to_string(),
            created: Utc::now(),
            state: ContainerState::Running,
            links: vec![],
            network_mode: None,
            labels: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            spec: CreateSpec::default(),
        }
    }

    #[test]
    fn updater_flag_requires_true() {
        let c = container_with_labels(&[(labels::INSTANCE, "true")]);
        assert!(c.is_updater());
        let c = container_with_labels(&[(labels::INSTANCE, "banana")]);
        assert!(!c.is_updater());
        let c = container_with_labels(&[]);
        assert!(!c.is_updater());
    }

    #[test]
    fn empty_scope_label_counts_as_unscoped() {
        let c = container_with_labels(&[(labels::SCOPE, "")]);
        assert_eq!(c.scope(), None);
        let c = container_with_labels(&[(labels::SCOPE, "prod")]);
        assert_eq!(c.scope(), Some("prod"));
    }

    #[test]
    fn network_mode_dependency_extracts_peer() {
        let mut c = container_with_labels(&[]);
        c.network_mode = Some("container:db".to_string());
        assert_eq!(c.network_mode_dependency(), Some("db"));

        c.network_mode = Some("bridge".to_string());
        assert_eq!(c.network_mode_dependency(), None);

        c.network_mode = Some("container:".to_string());
        assert_eq!(c.network_mode_dependency(), None);
    }

    #[test]
    fn hook_timeout_parses_seconds() {
        let c = container_with_labels(&[(
            "io.skopia.lifecycle.pre-update-timeout",
            "120",
        )]);
        assert_eq!(c.hook_timeout_secs(labels::PRE_UPDATE), Some(120));
    }

    #[test]
    fn replacement_chain_reads_label() {
        let c = container_with_labels(&[(labels::CONTAINER_CHAIN, "aaa,bbb")]);
        assert_eq!(
            c.replacement_chain(),
            vec![ContainerId::new("aaa"), ContainerId::new("bbb")]
        );
    }
}
