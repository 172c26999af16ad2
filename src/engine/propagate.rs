// ABOUTME: Restart propagation from updated containers to their dependents.
// ABOUTME: Unidirectional and transitive; dependencies are never touched.

use std::collections::VecDeque;

use super::graph::DependencyGraph;

/// Per-container restart flags for one cycle.
///
/// `to_restart = stale OR linked`; `linked` marks containers whose own image
/// is unchanged but whose lifetime is tied to an updated dependency.
#[derive(Debug, Clone)]
pub struct RestartFlags {
    stale: Vec<bool>,
    linked: Vec<bool>,
}

impl RestartFlags {
    pub fn new(stale: Vec<bool>) -> Self {
        let linked = vec![false; stale.len()];
        Self { stale, linked }
    }

    pub fn is_stale(&self, idx: usize) -> bool {
        self.stale[idx]
    }

    pub fn is_linked(&self, idx: usize) -> bool {
        self.linked[idx]
    }

    pub fn to_restart(&self, idx: usize) -> bool {
        self.stale[idx] || self.linked[idx]
    }

    /// Snapshot of the full to-restart set, for fixpoint assertions.
    pub fn to_restart_set(&self) -> Vec<bool> {
        (0..self.stale.len()).map(|i| self.to_restart(i)).collect()
    }

    /// Take a container out of the restart set entirely.
    ///
    /// Used for containers that are already classified (skipped, failed,
    /// or handled by the self-update path) after propagation has run.
    pub fn suppress(&mut self, idx: usize) {
        self.stale[idx] = false;
        self.linked[idx] = false;
    }
}

/// Mark every dependent of a restarting container as linked, transitively.
///
/// Propagation flows dependency → dependent only, never the other way, and
/// never into cycle members (those are skipped for the whole cycle).
pub fn propagate(graph: &DependencyGraph, flags: &mut RestartFlags) {
    let mut queue: VecDeque<usize> = (0..graph.len())
        .filter(|&i| flags.to_restart(i) && !graph.in_cycle(i))
        .collect();

    while let Some(idx) = queue.pop_front() {
        for &dependent in graph.dependents_of(idx) {
            if graph.in_cycle(dependent) || flags.to_restart(dependent) {
                continue;
            }
            tracing::debug!(
                container = graph.name(dependent),
                dependency = graph.name(idx),
                "marking dependent for restart"
            );
            flags.linked[dependent] = true;
            queue.push_back(dependent);
        }
    }
}
