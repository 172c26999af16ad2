// ABOUTME: Ordered stop/start drivers for one cycle's replacements.
// ABOUTME: Batch and rolling variants plus deferred image cleanup.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::container::Container;
use crate::engine::error::EngineError;
use crate::engine::graph::DependencyGraph;
use crate::engine::lifecycle::{HookKind, HookOutcome, HookRunner};
use crate::engine::propagate::RestartFlags;
use crate::engine::replacement::{Parked, Replacement};
use crate::engine::report::{RemovedImage, ReportBuilder};
use crate::runtime::Client;
use crate::types::ImageId;

/// Everything the pipeline needs for one cycle, indices aligned with
/// `candidates`.
pub struct PipelineInput {
    pub candidates: Vec<Container>,
    pub graph: DependencyGraph,
    pub flags: RestartFlags,
    /// The pulled newer image per candidate, set iff the candidate is stale.
    pub latest: Vec<Option<ImageId>>,
}

/// Drives the stop -> remove -> create -> start sequence for a cycle.
pub struct UpdatePipeline<'a, C: Client> {
    client: &'a C,
    settings: &'a Settings,
    hooks: &'a HookRunner,
    cancel: &'a CancellationToken,
}

impl<'a, C: Client> UpdatePipeline<'a, C> {
    pub fn new(
        client: &'a C,
        settings: &'a Settings,
        hooks: &'a HookRunner,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            client,
            settings,
            hooks,
            cancel,
        }
    }

    fn ensure_live(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            Err(EngineError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Apply all pending replacements. Returns an error only on
    /// cancellation; per-container failures land in the report.
    pub async fn apply(
        &self,
        input: &PipelineInput,
        report: &mut ReportBuilder,
    ) -> Result<(), EngineError> {
        if self.settings.rolling_restart {
            self.apply_rolling(input, report).await
        } else {
            self.apply_batch(input, report).await
        }
    }

    /// Batch mode: all stops in reverse-topological order, then all starts
    /// in topological order, so shared dependencies restart once.
    async fn apply_batch(
        &self,
        input: &PipelineInput,
        report: &mut ReportBuilder,
    ) -> Result<(), EngineError> {
        let mut parked: HashMap<usize, Replacement<Parked>> = HashMap::new();

        for &idx in &input.graph.stop_order() {
            if !input.flags.to_restart(idx) {
                continue;
            }
            self.ensure_live()?;
            if let Some(replacement) = self.park_one(&input.candidates[idx], report).await? {
                parked.insert(idx, replacement);
            }
        }

        for &idx in &input.graph.start_order() {
            let Some(replacement) = parked.remove(&idx) else {
                continue;
            };
            self.ensure_live()?;
            self.finish_one(idx, replacement, input, report, false).await?;
        }

        Ok(())
    }

    /// Rolling mode: the full per-container sequence, including the health
    /// wait, completes before the next container is touched.
    async fn apply_rolling(
        &self,
        input: &PipelineInput,
        report: &mut ReportBuilder,
    ) -> Result<(), EngineError> {
        for &idx in &input.graph.start_order() {
            if !input.flags.to_restart(idx) {
                continue;
            }
            self.ensure_live()?;
            let Some(replacement) = self.park_one(&input.candidates[idx], report).await? else {
                continue;
            };
            self.finish_one(idx, replacement, input, report, true).await?;
        }

        Ok(())
    }

    /// Run the pre-update gate and take the predecessor out of service.
    ///
    /// `None` means the container was classified (skipped or failed) and
    /// needs no further work.
    async fn park_one(
        &self,
        container: &Container,
        report: &mut ReportBuilder,
    ) -> Result<Option<Replacement<Parked>>, EngineError> {
        match self.hooks.run(self.client, container, HookKind::PreUpdate).await {
            HookOutcome::Proceed | HookOutcome::NoTarget => {}
            HookOutcome::SkipTempFail => {
                report.skipped(container, EngineError::pre_update_tempfail());
                return Ok(None);
            }
            HookOutcome::SkipFailed { exit_code } => {
                report.skipped(container, EngineError::pre_update_failed(exit_code));
                return Ok(None);
            }
            HookOutcome::TimedOut(timeout) => {
                report.skipped(
                    container,
                    EngineError::hook_timeout(crate::runtime::ExecError::Timeout(timeout)),
                );
                return Ok(None);
            }
        }

        let replacement =
            Replacement::new(container.clone(), self.settings.cpu_copy_mode);
        match replacement.park(self.client, self.settings.stop_timeout).await {
            Ok(parked) => Ok(Some(parked)),
            Err(e) => {
                tracing::error!(container = %container.name, error = %e, "failed to park");
                report.failed(container, e);
                Ok(None)
            }
        }
    }

    /// Create and (unless no-restart) start the successor, then classify.
    async fn finish_one(
        &self,
        idx: usize,
        replacement: Replacement<Parked>,
        input: &PipelineInput,
        report: &mut ReportBuilder,
        rolling: bool,
    ) -> Result<(), EngineError> {
        let container = &input.candidates[idx];
        let stale = input.flags.is_stale(idx);

        let created = match replacement.create(self.client).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(container = %container.name, error = %e, "failed to create successor");
                report.failed(container, e);
                return Ok(());
            }
        };

        if self.settings.no_restart {
            tracing::info!(container = %container.name, "restart disabled, leaving successor stopped");
            let _ = created.leave_stopped();
            report.skipped(container, "restart disabled by configuration");
            return Ok(());
        }

        self.ensure_live()?;
        let started = match created.start(self.client).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(container = %container.name, error = %e, "failed to start successor");
                report.failed(container, e);
                return Ok(());
            }
        };

        // Post hooks run inside the successor.
        let post_hook = if stale {
            HookKind::PostUpdate
        } else {
            HookKind::PostRestart
        };
        if let Ok(successor) = self.client.get_container(started.successor()).await {
            self.hooks
                .run_best_effort(self.client, &successor, post_hook)
                .await;
        }

        if rolling {
            if let Err(e) = self
                .client
                .wait_for_healthy(started.successor(), self.settings.health_wait_timeout)
                .await
            {
                tracing::warn!(container = %container.name, error = %e, "health wait failed");
                report.failed(container, EngineError::health_wait_timeout(e));
                return Ok(());
            }
        }

        if stale {
            let latest = input.latest[idx]
                .clone()
                .unwrap_or_else(|| container.image_id.clone());
            self.record_cleanup(container, &latest, report);
            report.updated(container, latest);
        } else {
            report.restarted(container);
        }

        Ok(())
    }

    /// Queue the predecessor's image for deferred removal.
    ///
    /// Skipped when cleanup is off, when the image did not actually change,
    /// and when the image is already queued.
    fn record_cleanup(
        &self,
        container: &Container,
        latest: &ImageId,
        report: &mut ReportBuilder,
    ) {
        if !self.settings.cleanup || latest == &container.image_id {
            return;
        }
        if report
            .removed_images()
            .iter()
            .any(|r| r.image_id == container.image_id)
        {
            return;
        }
        report.removed_image(RemovedImage {
            image_id: container.image_id.clone(),
            image_name: container.image_ref.clone(),
            container_id: container.id.clone(),
            container_name: container.name.clone(),
        });
    }

    /// Walk the deferred list and remove each image.
    ///
    /// Images still used by a surviving container are dropped from the list.
    /// Missing images count as success; in-use conflicts are logged and
    /// skipped; everything else aggregates into one non-fatal error.
    pub async fn cleanup_images(
        &self,
        report: &mut ReportBuilder,
        exclude: &[ImageId],
    ) -> Result<(), EngineError> {
        if report.removed_images().is_empty() {
            return Ok(());
        }

        // An image still in use by a surviving container is not removable.
        let in_use: Vec<ImageId> = match self.client.list_containers(true).await {
            Ok(containers) => containers.into_iter().map(|c| c.image_id).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "could not list survivors before image cleanup");
                Vec::new()
            }
        };
        report.retain_removed_images(|r| {
            !in_use.contains(&r.image_id) && !exclude.contains(&r.image_id)
        });

        let mut failures = Vec::new();
        for removed in report.removed_images().to_vec() {
            self.ensure_live()?;
            tracing::info!(
                image = %removed.image_id.short(),
                name = %removed.image_name,
                "removing old image"
            );
            match self
                .client
                .remove_image(&removed.image_id, &removed.image_name)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    tracing::debug!(image = %removed.image_id.short(), "image already gone");
                }
                Err(e) if e.is_in_use() => {
                    tracing::warn!(image = %removed.image_id.short(), "image still in use, skipping");
                }
                Err(e) => failures.push(format!("{}: {e}", removed.image_id.short())),
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::image_cleanup_failed(failures.join("; ")))
        }
    }
}
