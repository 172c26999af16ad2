// ABOUTME: Per-cycle outcome classification and the final immutable report.
// ABOUTME: Every touched container lands in exactly one bucket.

use serde::Serialize;

use crate::container::Container;
use crate::types::{ContainerId, ImageId};

/// One container's outcome entry.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerOutcome {
    pub id: ContainerId,
    pub name: String,
    pub image_ref: String,
    pub old_image_id: ImageId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_image_id: Option<ImageId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContainerOutcome {
    fn from_container(container: &Container) -> Self {
        Self {
            id: container.id.clone(),
            name: container.name.clone(),
            image_ref: container.image_ref.clone(),
            old_image_id: container.image_id.clone(),
            new_image_id: None,
            error: None,
        }
    }
}

/// An image scheduled for deferred removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedImage {
    pub image_id: ImageId,
    pub image_name: String,
    pub container_id: ContainerId,
    pub container_name: String,
}

/// The immutable result of one update cycle.
///
/// `scanned` is derived: it is the union of updated, restarted, fresh, and
/// failed. Skipped containers failed pre-conditions and were never scanned.
#[derive(Debug, Default, Serialize)]
pub struct UpdateReport {
    pub fresh: Vec<ContainerOutcome>,
    pub updated: Vec<ContainerOutcome>,
    pub restarted: Vec<ContainerOutcome>,
    pub skipped: Vec<ContainerOutcome>,
    pub failed: Vec<ContainerOutcome>,
    pub removed_images: Vec<RemovedImage>,
}

impl UpdateReport {
    /// Every scanned container: updated, restarted, fresh, and failed.
    pub fn scanned(&self) -> Vec<&ContainerOutcome> {
        self.updated
            .iter()
            .chain(self.restarted.iter())
            .chain(self.fresh.iter())
            .chain(self.failed.iter())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
            && self.updated.is_empty()
            && self.restarted.is_empty()
            && self.skipped.is_empty()
            && self.failed.is_empty()
    }

    /// One-line summary for the log.
    pub fn summary(&self) -> String {
        format!(
            "scanned={} updated={} restarted={} fresh={} skipped={} failed={}",
            self.scanned().len(),
            self.updated.len(),
            self.restarted.len(),
            self.fresh.len(),
            self.skipped.len(),
            self.failed.len(),
        )
    }
}

/// Accumulates outcomes during a cycle and seals them into a report.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    report: UpdateReport,
    seen: Vec<ContainerId>,
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(&mut self, container: &Container) -> ContainerOutcome {
        debug_assert!(
            !self.seen.contains(&container.id),
            "container {} classified twice",
            container.name
        );
        self.seen.push(container.id.clone());
        ContainerOutcome::from_container(container)
    }

    pub fn fresh(&mut self, container: &Container) {
        let outcome = self.mark(container);
        self.report.fresh.push(outcome);
    }

    pub fn updated(&mut self, container: &Container, new_image_id: ImageId) {
        let mut outcome = self.mark(container);
        outcome.new_image_id = Some(new_image_id);
        self.report.updated.push(outcome);
    }

    pub fn restarted(&mut self, container: &Container) {
        let outcome = self.mark(container);
        self.report.restarted.push(outcome);
    }

    pub fn skipped(&mut self, container: &Container, error: impl std::fmt::Display) {
        let mut outcome = self.mark(container);
        outcome.error = Some(error.to_string());
        self.report.skipped.push(outcome);
    }

    pub fn failed(&mut self, container: &Container, error: impl std::fmt::Display) {
        let mut outcome = self.mark(container);
        outcome.error = Some(error.to_string());
        self.report.failed.push(outcome);
    }

    pub fn removed_image(&mut self, removed: RemovedImage) {
        self.report.removed_images.push(removed);
    }

    /// Drop any pending removal entries for `image_id`.
    ///
    /// Used when a surviving container turns out to still use the image.
    pub fn retain_removed_images(&mut self, keep: impl Fn(&RemovedImage) -> bool) {
        self.report.removed_images.retain(|r| keep(r));
    }

    pub fn removed_images(&self) -> &[RemovedImage] {
        &self.report.removed_images
    }

    pub fn build(self) -> UpdateReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::ContainerBuilder;

    #[test]
    fn buckets_are_disjoint_and_scanned_is_their_union() {
        let mut builder = ReportBuilder::new();
        builder.fresh(&ContainerBuilder::new("a").build());
        builder.updated(
            &ContainerBuilder::new("b").build(),
            ImageId::new("sha256:new"),
        );
        builder.restarted(&ContainerBuilder::new("c").build());
        builder.skipped(&ContainerBuilder::new("d").build(), "cycle");
        builder.failed(&ContainerBuilder::new("e").build(), "boom");

        let report = builder.build();
        assert_eq!(report.scanned().len(), 4);
        assert_eq!(report.skipped.len(), 1);

        let mut all: Vec<&str> = report
            .scanned()
            .iter()
            .map(|o| o.name.as_str())
            .chain(report.skipped.iter().map(|o| o.name.as_str()))
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn updated_entries_carry_the_new_image() {
        let mut builder = ReportBuilder::new();
        builder.updated(
            &ContainerBuilder::new("a").image_id("sha256:old").build(),
            ImageId::new("sha256:new"),
        );
        let report = builder.build();
        assert_eq!(report.updated[0].old_image_id, ImageId::new("sha256:old"));
        assert_eq!(
            report.updated[0].new_image_id,
            Some(ImageId::new("sha256:new"))
        );
    }

    #[test]
    fn report_serializes_to_json() {
        let mut builder = ReportBuilder::new();
        builder.fresh(&ContainerBuilder::new("a").build());
        let report = builder.build();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"fresh\""));
    }

    #[test]
    #[should_panic(expected = "classified twice")]
    fn double_classification_panics_in_debug() {
        let mut builder = ReportBuilder::new();
        let c = ContainerBuilder::new("a").build();
        builder.fresh(&c);
        builder.failed(&c, "boom");
    }
}
