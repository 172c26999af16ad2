// ABOUTME: Excess-instance reaping: at most one updater per scope survives.
// ABOUTME: Removes scope-matching siblings and chained predecessors with retries.

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::container::Container;
use crate::engine::error::EngineError;
use crate::engine::filter::scope_matches;
use crate::engine::report::{RemovedImage, ReportBuilder};
use crate::runtime::{Client, ContainerError};
use crate::types::ContainerId;

/// Result of one reaping pass.
#[derive(Debug, Default)]
pub struct ReapSummary {
    /// Instances successfully stopped and removed.
    pub reaped: usize,
    /// Set when some (but not all) removals failed.
    pub warning: Option<EngineError>,
}

/// Remove every excess updater instance in scope, plus chained predecessors.
///
/// Chained predecessors are removed regardless of scope: a scope rename must
/// not orphan the containers recorded in the replacement chain.
pub async fn reap_excess_instances<C: Client>(
    client: &C,
    settings: &Settings,
    self_id: &ContainerId,
    cancel: &CancellationToken,
    report: &mut ReportBuilder,
) -> Result<ReapSummary, EngineError> {
    let all = client
        .list_containers(true)
        .await
        .map_err(EngineError::list_containers_failed)?;

    let Some(current) = all.iter().find(|c| &c.id == self_id) else {
        tracing::debug!(id = %self_id.short(), "own container not found, skipping reap");
        return Ok(ReapSummary::default());
    };

    let siblings: Vec<&Container> = all
        .iter()
        .filter(|c| c.is_updater() && scope_matches(&settings.scope, c) && &c.id != self_id)
        .collect();

    let chain = current.replacement_chain();
    if siblings.is_empty() && chain.is_empty() {
        return Ok(ReapSummary::default());
    }

    let mut doomed: Vec<&Container> = siblings;
    for chained in all.iter().filter(|c| chain.contains(&c.id)) {
        if &chained.id != self_id && !doomed.iter().any(|d| d.id == chained.id) {
            doomed.push(chained);
        }
    }

    if doomed.is_empty() {
        return Ok(ReapSummary::default());
    }

    tracing::info!(count = doomed.len(), "removing excess updater instances");

    let mut summary = ReapSummary::default();
    let mut failures: Vec<String> = Vec::new();

    for &container in &doomed {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }
        match remove_with_retries(client, container, settings, cancel).await {
            Ok(()) => {
                summary.reaped += 1;
                if settings.cleanup
                    && container.image_id != current.image_id
                    && !container.image_id.is_empty()
                    && !report
                        .removed_images()
                        .iter()
                        .any(|r| r.image_id == container.image_id)
                {
                    report.removed_image(RemovedImage {
                        image_id: container.image_id.clone(),
                        image_name: container.image_ref.clone(),
                        container_id: container.id.clone(),
                        container_name: container.name.clone(),
                    });
                }
            }
            Err(e) => {
                if cancel.is_cancelled() {
                    return Err(EngineError::cancelled());
                }
                tracing::error!(container = %container.name, error = %e, "failed to reap instance");
                failures.push(format!("{}: {e}", container.name));
            }
        }
    }

    if failures.is_empty() {
        Ok(summary)
    } else if summary.reaped > 0 {
        summary.warning = Some(EngineError::reaper_partial_failure(
            failures.len(),
            doomed.len(),
            failures.join("; "),
        ));
        Ok(summary)
    } else {
        Err(EngineError::reaper_total_failure(
            doomed.len(),
            failures.join("; "),
        ))
    }
}

/// Stop-and-remove with bounded retries.
///
/// Not-found and concurrent-removal responses count as success.
async fn remove_with_retries<C: Client>(
    client: &C,
    container: &Container,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let mut last_error: Option<ContainerError> = None;

    for attempt in 1..=settings.max_removal_attempts {
        if cancel.is_cancelled() {
            return Err(EngineError::cancelled());
        }
        match client
            .stop_and_remove(&container.id, settings.stop_timeout)
            .await
        {
            Ok(()) => return Ok(()),
            Err(ContainerError::NotFound(_)) => return Ok(()),
            Err(ContainerError::RemovalInProgress(_)) => {
                tracing::debug!(
                    container = %container.name,
                    "removal already in progress elsewhere"
                );
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    container = %container.name,
                    attempt,
                    error = %e,
                    "removal attempt failed"
                );
                last_error = Some(e);
                if attempt < settings.max_removal_attempts {
                    tokio::time::sleep(settings.cleanup_retry_delay).await;
                }
            }
        }
    }

    Err(EngineError::remove_failed(last_error.unwrap_or_else(|| {
        ContainerError::Runtime("removal failed".to_string())
    })))
}
