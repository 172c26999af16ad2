// ABOUTME: The update engine: one idempotent cycle over the container runtime.
// ABOUTME: filter -> stale check -> propagate -> sort -> apply -> report.

pub mod error;
pub mod filter;
pub mod graph;
pub mod lifecycle;
pub mod pipeline;
pub mod propagate;
pub mod reaper;
pub mod replacement;
pub mod report;
pub mod staleness;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::container::{Container, labels};
use crate::runtime::Client;
use crate::types::{ContainerId, ImageId};

use error::EngineError;
use filter::ContainerSelector;
use graph::DependencyGraph;
use lifecycle::{HookKind, HookRunner};
use pipeline::{PipelineInput, UpdatePipeline};
use propagate::RestartFlags;
use replacement::Replacement;
use report::{ReportBuilder, UpdateReport};
use staleness::Verdict;

/// The update engine. One instance drives one runtime.
///
/// A cycle is a single-threaded cooperative procedure; the caller must not
/// run two cycles concurrently. Cancellation is observed between every
/// state transition and every container.
pub struct Engine<C: Client> {
    client: C,
    settings: Settings,
    /// The updater's own container, when it runs containerized.
    self_id: Option<ContainerId>,
}

impl<C: Client> Engine<C> {
    pub fn new(client: C, settings: Settings, self_id: Option<ContainerId>) -> Self {
        Self {
            client,
            settings,
            self_id,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Run one update cycle.
    ///
    /// Per-container errors are recorded in the report; only infrastructure
    /// failures (cannot list, cancelled, total reap failure) abort with an
    /// error and no report.
    pub async fn run_cycle(
        &self,
        cancel: &CancellationToken,
    ) -> Result<UpdateReport, EngineError> {
        let mut report = ReportBuilder::new();
        let hooks = HookRunner::from_settings(&self.settings);

        self.ensure_live(cancel)?;

        // Reap leftovers from an earlier self-update before touching anything.
        if let Some(self_id) = &self.self_id {
            let summary =
                reaper::reap_excess_instances(&self.client, &self.settings, self_id, cancel, &mut report)
                    .await?;
            if let Some(warning) = &summary.warning {
                tracing::warn!(error = %warning, "reaper finished with warnings");
            }
            if summary.reaped > 0 {
                tracing::info!(reaped = summary.reaped, "removed excess updater instances");
            }
        }

        self.ensure_live(cancel)?;

        let all = self
            .client
            .list_containers(true)
            .await
            .map_err(EngineError::list_containers_failed)?;

        let selector = ContainerSelector::from_settings(&self.settings);
        let candidates: Vec<Container> =
            all.into_iter().filter(|c| selector.includes(c)).collect();

        tracing::debug!(candidates = candidates.len(), "selected update candidates");

        let self_index = self
            .self_id
            .as_ref()
            .and_then(|id| candidates.iter().position(|c| &c.id == id));

        // Legacy links are synchronous; one-by-one restarts cannot honor them.
        if self.settings.rolling_restart {
            if let Some(linked) = candidates.iter().find(|c| !c.links.is_empty()) {
                return Err(EngineError::rolling_restart_has_links(linked.name.clone()));
            }
        }

        // Pre-check hooks run before any staleness I/O.
        for container in &candidates {
            self.ensure_live(cancel)?;
            hooks
                .run_best_effort(&self.client, container, HookKind::PreCheck)
                .await;
        }

        let ScanOutcome {
            stale,
            latest,
            classified,
            pull_failure,
            self_stale,
        } = self
            .scan(&candidates, self_index, cancel, &mut report)
            .await?;

        let graph = DependencyGraph::build(&candidates);

        let mut classified = classified;
        for idx in graph.cycle_members() {
            if !classified[idx] {
                tracing::warn!(
                    container = graph.name(idx),
                    "container participates in a dependency cycle, skipping"
                );
                report.skipped(
                    &candidates[idx],
                    EngineError::circular_dependency(graph.name(idx)),
                );
                classified[idx] = true;
            }
        }

        let mut flags = RestartFlags::new(stale);
        propagate::propagate(&graph, &mut flags);

        // Already-classified containers and the updater itself never go
        // through the pipeline; self-update is handled last.
        for idx in 0..candidates.len() {
            if classified[idx] {
                flags.suppress(idx);
            }
        }
        if let Some(idx) = self_index {
            flags.suppress(idx);
        }

        let input = PipelineInput {
            candidates,
            graph,
            flags,
            latest,
        };
        let pipeline = UpdatePipeline::new(&self.client, &self.settings, &hooks, cancel);
        pipeline.apply(&input, &mut report).await?;

        // Whatever is left untouched was scanned and found current.
        for (idx, container) in input.candidates.iter().enumerate() {
            if !classified[idx] && !input.flags.to_restart(idx) && Some(idx) != self_index {
                report.fresh(container);
            }
        }

        // The updater replaces itself only after everyone else is done.
        if let Some(idx) = self_index {
            self.ensure_live(cancel)?;
            let own = &input.candidates[idx];
            if self_stale && !classified[idx] {
                self.replace_self(own, &mut report).await;
            } else if !classified[idx] {
                report.fresh(own);
            }
        }

        if self.settings.cleanup {
            let exclude: Vec<ImageId> = self_index
                .map(|idx| vec![input.candidates[idx].image_id.clone()])
                .unwrap_or_default();
            if let Err(e) = pipeline.cleanup_images(&mut report, &exclude).await {
                if e.kind() == error::EngineErrorKind::UpdateCancelled {
                    return Err(e);
                }
                tracing::warn!(error = %e, "deferred image cleanup finished with errors");
            }
        }

        // A failed self-update pull must not turn into a restart storm.
        if pull_failure && !self.settings.pull_failure_delay.is_zero() {
            tracing::warn!(
                delay = ?self.settings.pull_failure_delay,
                "waiting out the pull-failure delay before returning"
            );
            tokio::time::sleep(self.settings.pull_failure_delay).await;
        }

        let report = report.build();
        tracing::info!("update cycle finished: {}", report.summary());
        Ok(report)
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            Err(EngineError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Staleness verdicts for every candidate, the updater's own container
    /// checked last so its replacement cannot interrupt anyone else's.
    async fn scan(
        &self,
        candidates: &[Container],
        self_index: Option<usize>,
        cancel: &CancellationToken,
        report: &mut ReportBuilder,
    ) -> Result<ScanOutcome, EngineError> {
        let n = candidates.len();
        let mut outcome = ScanOutcome {
            stale: vec![false; n],
            latest: vec![None; n],
            classified: vec![false; n],
            pull_failure: false,
            self_stale: false,
        };

        let mut order: Vec<usize> = (0..n).filter(|&i| Some(i) != self_index).collect();
        if let Some(idx) = self_index {
            order.push(idx);
        }

        for idx in order {
            self.ensure_live(cancel)?;
            let container = &candidates[idx];
            let is_self = Some(idx) == self_index;

            match staleness::check(&self.client, container, is_self).await {
                Verdict::Fresh => {}
                Verdict::Stale { latest } => {
                    let monitor_only =
                        self.settings.effective_monitor_only(container.monitor_only_label());
                    if monitor_only {
                        tracing::info!(
                            container = %container.name,
                            "container is stale but monitor-only, not updating"
                        );
                        report.fresh(container);
                        outcome.classified[idx] = true;
                    } else if is_self && self.settings.run_once {
                        tracing::info!(
                            "own container is stale, but run-once skips self-update"
                        );
                        report.fresh(container);
                        outcome.classified[idx] = true;
                    } else if is_self {
                        outcome.self_stale = true;
                        outcome.stale[idx] = true;
                        outcome.latest[idx] = Some(latest);
                    } else {
                        tracing::info!(container = %container.name, "container is stale");
                        outcome.stale[idx] = true;
                        outcome.latest[idx] = Some(latest);
                    }
                }
                Verdict::Skip(e) => {
                    report.skipped(container, e);
                    outcome.classified[idx] = true;
                }
                Verdict::Failed(e) => {
                    report.failed(container, e);
                    outcome.classified[idx] = true;
                }
                Verdict::FreshAfterPullFailure(e) => {
                    tracing::warn!(error = %e, "self-update image pull failed");
                    outcome.pull_failure = true;
                }
            }
        }

        Ok(outcome)
    }

    /// Replace the updater's own container: the successor inherits the scope
    /// label and the replacement chain gains the current container's ID.
    async fn replace_self(&self, own: &Container, report: &mut ReportBuilder) {
        tracing::info!(container = %own.name, "updating own container, handing off");

        let mut successor_labels = own.labels.clone();
        successor_labels.insert(labels::INSTANCE.to_string(), "true".to_string());
        let chain = labels::extend_chain(
            own.labels.get(labels::CONTAINER_CHAIN).map(String::as_str),
            &own.id,
        );
        successor_labels.insert(labels::CONTAINER_CHAIN.to_string(), chain);

        let replacement = Replacement::new(own.clone(), self.settings.cpu_copy_mode)
            .with_labels(successor_labels);

        // The predecessor keeps running through the hand-off; the successor
        // reaps it on its first cycle via the replacement chain.
        let parked = match replacement.rename_only(&self.client).await {
            Ok(parked) => parked,
            Err(e) => {
                tracing::error!(error = %e, "failed to rename own container");
                report.failed(own, e);
                return;
            }
        };

        let created = match parked.create(&self.client).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!(error = %e, "failed to create own successor");
                report.failed(own, e);
                return;
            }
        };

        match created.start(&self.client).await {
            Ok(started) => {
                let latest = self
                    .client
                    .get_container(started.successor())
                    .await
                    .map(|c| c.image_id)
                    .unwrap_or_else(|_| own.image_id.clone());
                tracing::info!(
                    successor = %started.successor().short(),
                    "successor started, it will reap this instance"
                );
                report.updated(own, latest);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start own successor");
                report.failed(own, e);
            }
        }
    }
}

struct ScanOutcome {
    stale: Vec<bool>,
    latest: Vec<Option<ImageId>>,
    classified: Vec<bool>,
    pull_failure: bool,
    self_stale: bool,
}
