// ABOUTME: Dependency graph over the candidate set: build, cycle-detect, order.
// ABOUTME: Arena representation with dense indices; names only matter at the edges.

use std::collections::{BTreeSet, HashMap};

use crate::container::Container;

/// Where a container's dependency names came from.
///
/// The first non-empty source in this order wins; sources never merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeSource {
    ExplicitLabel,
    ComposeLabel,
    Links,
    NetworkMode,
}

struct Node {
    name: String,
    /// Outbound edges: this node depends on each target.
    deps: Vec<usize>,
    /// Inbound edges: each source depends on this node.
    dependents: Vec<usize>,
    in_cycle: bool,
}

/// Dependency graph over one cycle's candidates.
///
/// Node `i` corresponds to `candidates[i]` as passed to [`DependencyGraph::build`].
pub struct DependencyGraph {
    nodes: Vec<Node>,
}

impl DependencyGraph {
    /// Build the graph for `candidates`.
    ///
    /// Edges are created between candidates exclusively; dependencies that
    /// point outside the update set are logged and ignored.
    pub fn build(candidates: &[Container]) -> Self {
        let resolver = NameResolver::new(candidates);

        let mut nodes: Vec<Node> = candidates
            .iter()
            .map(|c| Node {
                name: c.name.clone(),
                deps: Vec::new(),
                dependents: Vec::new(),
                in_cycle: false,
            })
            .collect();

        for (idx, container) in candidates.iter().enumerate() {
            let (names, source) = dependency_names(container);
            for raw in names {
                let targets = match source {
                    EdgeSource::ExplicitLabel | EdgeSource::ComposeLabel => {
                        resolver.resolve(&raw, container.compose_project())
                    }
                    // Link and network-mode targets are literal container names.
                    EdgeSource::Links | EdgeSource::NetworkMode => {
                        resolver.resolve_exact(&raw)
                    }
                };

                if targets.is_empty() {
                    tracing::warn!(
                        container = %container.name,
                        dependency = %raw,
                        "dependency does not resolve to any candidate, ignoring"
                    );
                    continue;
                }

                for target in targets {
                    if !nodes[idx].deps.contains(&target) {
                        nodes[idx].deps.push(target);
                    }
                }
            }
        }

        for idx in 0..nodes.len() {
            for dep_pos in 0..nodes[idx].deps.len() {
                let target = nodes[idx].deps[dep_pos];
                nodes[target].dependents.push(idx);
            }
        }

        let mut graph = Self { nodes };
        graph.mark_cycles();
        graph
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.nodes[idx].name
    }

    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].deps
    }

    pub fn dependents_of(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].dependents
    }

    /// Whether the node participates in any dependency cycle (including
    /// a self-reference).
    pub fn in_cycle(&self, idx: usize) -> bool {
        self.nodes[idx].in_cycle
    }

    /// Indices of all cycle members, in name order.
    pub fn cycle_members(&self) -> Vec<usize> {
        let mut members: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| self.nodes[i].in_cycle)
            .collect();
        members.sort_by(|&a, &b| self.nodes[a].name.cmp(&self.nodes[b].name));
        members
    }

    /// Topological start order: dependencies before dependents, ties broken
    /// by ascending name. Cycle members are excluded.
    pub fn start_order(&self) -> Vec<usize> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for idx in 0..n {
            if self.nodes[idx].in_cycle {
                continue;
            }
            in_degree[idx] = self.nodes[idx]
                .deps
                .iter()
                .filter(|&&d| !self.nodes[d].in_cycle)
                .count();
        }

        // Ready set keyed by name for deterministic tie-breaking.
        let mut ready: BTreeSet<(&str, usize)> = (0..n)
            .filter(|&i| !self.nodes[i].in_cycle && in_degree[i] == 0)
            .map(|i| (self.nodes[i].name.as_str(), i))
            .collect();

        let mut order = Vec::with_capacity(n);
        while let Some(&(name, idx)) = ready.iter().next() {
            ready.remove(&(name, idx));
            order.push(idx);
            for &dependent in &self.nodes[idx].dependents {
                if self.nodes[dependent].in_cycle {
                    continue;
                }
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert((self.nodes[dependent].name.as_str(), dependent));
                }
            }
        }
        order
    }

    /// Reverse topological stop order: dependents before dependencies.
    ///
    /// The exact reverse of [`DependencyGraph::start_order`], so the two
    /// orders are mirror images.
    pub fn stop_order(&self) -> Vec<usize> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    /// Iterative Tarjan SCC. Every SCC of size > 1 and every self-loop
    /// marks its members as cycle participants.
    fn mark_cycles(&mut self) {
        let n = self.nodes.len();
        let mut index = vec![usize::MAX; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_index = 0usize;

        // Explicit DFS frames: (node, next child position).
        let mut frames: Vec<(usize, usize)> = Vec::new();

        for root in 0..n {
            if index[root] != usize::MAX {
                continue;
            }
            frames.push((root, 0));
            while let Some(&(v, child_pos)) = frames.last() {
                if child_pos == 0 && index[v] == usize::MAX {
                    index[v] = next_index;
                    lowlink[v] = next_index;
                    next_index += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }

                if child_pos < self.nodes[v].deps.len() {
                    if let Some(frame) = frames.last_mut() {
                        frame.1 += 1;
                    }
                    let w = self.nodes[v].deps[child_pos];
                    if index[w] == usize::MAX {
                        frames.push((w, 0));
                    } else if on_stack[w] {
                        lowlink[v] = lowlink[v].min(index[w]);
                    }
                    continue;
                }

                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }

                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    let has_self_loop =
                        component.len() == 1 && self.nodes[v].deps.contains(&v);
                    if component.len() > 1 || has_self_loop {
                        for w in component {
                            self.nodes[w].in_cycle = true;
                        }
                    }
                }
            }
        }
    }
}

/// Extract dependency names and their source for one container.
fn dependency_names(container: &Container) -> (Vec<String>, EdgeSource) {
    let explicit = container.depends_on();
    if !explicit.is_empty() {
        return (explicit, EdgeSource::ExplicitLabel);
    }

    // Compose entries may carry a ":condition[:restart]" suffix.
    let compose: Vec<String> = container
        .compose_depends_on()
        .iter()
        .map(|entry| entry.split(':').next().unwrap_or(entry).to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !compose.is_empty() {
        return (compose, EdgeSource::ComposeLabel);
    }

    if !container.links.is_empty() {
        return (container.links.clone(), EdgeSource::Links);
    }

    if let Some(peer) = container.network_mode_dependency() {
        return (vec![peer.to_string()], EdgeSource::NetworkMode);
    }

    (Vec::new(), EdgeSource::ExplicitLabel)
}

/// Maps dependency names to candidate indices.
///
/// Exact container names win; otherwise compose service names resolve to
/// every instance of the service, preferring the dependent's own project.
struct NameResolver {
    by_name: HashMap<String, usize>,
    /// (project, service) -> instances, name-sorted.
    by_project_service: HashMap<(String, String), Vec<usize>>,
    /// service -> instances across projects, name-sorted.
    by_service: HashMap<String, Vec<usize>>,
}

impl NameResolver {
    fn new(candidates: &[Container]) -> Self {
        let mut by_name = HashMap::new();
        let mut by_project_service: HashMap<(String, String), Vec<usize>> = HashMap::new();
        let mut by_service: HashMap<String, Vec<usize>> = HashMap::new();

        let mut sorted: Vec<usize> = (0..candidates.len()).collect();
        sorted.sort_by(|&a, &b| candidates[a].name.cmp(&candidates[b].name));

        for &idx in &sorted {
            let container = &candidates[idx];
            by_name.insert(container.name.clone(), idx);
            if let (Some(project), Some(service)) =
                (container.compose_project(), container.compose_service())
            {
                by_project_service
                    .entry((project.to_string(), service.to_string()))
                    .or_default()
                    .push(idx);
                by_service
                    .entry(service.to_string())
                    .or_default()
                    .push(idx);
            }
        }

        Self {
            by_name,
            by_project_service,
            by_service,
        }
    }

    fn resolve_exact(&self, name: &str) -> Vec<usize> {
        self.by_name.get(name).copied().into_iter().collect()
    }

    fn resolve(&self, name: &str, project: Option<&str>) -> Vec<usize> {
        if let Some(&idx) = self.by_name.get(name) {
            return vec![idx];
        }
        if let Some(project) = project {
            if let Some(instances) = self
                .by_project_service
                .get(&(project.to_string(), name.to_string()))
            {
                return instances.clone();
            }
        }
        self.by_service
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::labels;
    use crate::runtime::mock::ContainerBuilder;

    fn names(graph: &DependencyGraph, order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| graph.name(i).to_string()).collect()
    }

    #[test]
    fn chain_orders_stop_and_start_as_mirrors() {
        let candidates = vec![
            ContainerBuilder::new("c").build(),
            ContainerBuilder::new("b").label(labels::DEPENDS_ON, "c").build(),
            ContainerBuilder::new("a").label(labels::DEPENDS_ON, "b").build(),
        ];
        let graph = DependencyGraph::build(&candidates);

        assert_eq!(names(&graph, &graph.start_order()), vec!["c", "b", "a"]);
        assert_eq!(names(&graph, &graph.stop_order()), vec!["a", "b", "c"]);
    }

    #[test]
    fn diamond_places_base_first_and_top_last() {
        let candidates = vec![
            ContainerBuilder::new("d").build(),
            ContainerBuilder::new("b").label(labels::DEPENDS_ON, "d").build(),
            ContainerBuilder::new("c").label(labels::DEPENDS_ON, "d").build(),
            ContainerBuilder::new("a").label(labels::DEPENDS_ON, "b,c").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        let start = names(&graph, &graph.start_order());

        assert_eq!(start, vec!["d", "b", "c", "a"]);
    }

    #[test]
    fn replicas_on_shared_base_order_by_name() {
        let candidates = vec![
            ContainerBuilder::new("app-2").label(labels::DEPENDS_ON, "db").build(),
            ContainerBuilder::new("db").build(),
            ContainerBuilder::new("app-3").label(labels::DEPENDS_ON, "db").build(),
            ContainerBuilder::new("app-1").label(labels::DEPENDS_ON, "db").build(),
        ];
        let graph = DependencyGraph::build(&candidates);

        assert_eq!(
            names(&graph, &graph.start_order()),
            vec!["db", "app-1", "app-2", "app-3"]
        );
        assert_eq!(
            names(&graph, &graph.stop_order()),
            vec!["app-3", "app-2", "app-1", "db"]
        );
    }

    #[test]
    fn two_cycle_marks_both_members() {
        let candidates = vec![
            ContainerBuilder::new("a").label(labels::DEPENDS_ON, "b").build(),
            ContainerBuilder::new("b").label(labels::DEPENDS_ON, "a").build(),
            ContainerBuilder::new("solo").build(),
        ];
        let graph = DependencyGraph::build(&candidates);

        assert!(graph.in_cycle(0));
        assert!(graph.in_cycle(1));
        assert!(!graph.in_cycle(2));
        assert_eq!(names(&graph, &graph.start_order()), vec!["solo"]);
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let candidates = vec![
            ContainerBuilder::new("narcissus")
                .label(labels::DEPENDS_ON, "narcissus")
                .build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert!(graph.in_cycle(0));
        assert!(graph.start_order().is_empty());
    }

    #[test]
    fn dependents_of_cycle_members_still_order() {
        let candidates = vec![
            ContainerBuilder::new("a").label(labels::DEPENDS_ON, "b").build(),
            ContainerBuilder::new("b").label(labels::DEPENDS_ON, "a").build(),
            ContainerBuilder::new("c").label(labels::DEPENDS_ON, "a").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        // c depends only on a cycle member; it still gets ordered.
        assert_eq!(names(&graph, &graph.start_order()), vec!["c"]);
    }

    #[test]
    fn explicit_label_replaces_compose_label() {
        let candidates = vec![
            ContainerBuilder::new("app")
                .label(labels::DEPENDS_ON, "db")
                .label(labels::COMPOSE_DEPENDS_ON, "cache")
                .build(),
            ContainerBuilder::new("db").build(),
            ContainerBuilder::new("cache").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(names(&graph, graph.dependencies_of(0)), vec!["db"]);
    }

    #[test]
    fn compose_condition_suffix_is_stripped() {
        let candidates = vec![
            ContainerBuilder::new("app")
                .label(labels::COMPOSE_DEPENDS_ON, "db:service_started")
                .build(),
            ContainerBuilder::new("db").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(names(&graph, graph.dependencies_of(0)), vec!["db"]);
    }

    #[test]
    fn compose_service_resolves_to_project_instances() {
        let candidates = vec![
            ContainerBuilder::new("shop-web-1")
                .label(labels::COMPOSE_PROJECT, "shop")
                .label(labels::COMPOSE_SERVICE, "web")
                .label(labels::COMPOSE_DEPENDS_ON, "db")
                .build(),
            ContainerBuilder::new("shop-db-1")
                .label(labels::COMPOSE_PROJECT, "shop")
                .label(labels::COMPOSE_SERVICE, "db")
                .build(),
            ContainerBuilder::new("other-db-1")
                .label(labels::COMPOSE_PROJECT, "other")
                .label(labels::COMPOSE_SERVICE, "db")
                .build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(names(&graph, graph.dependencies_of(0)), vec!["shop-db-1"]);
    }

    #[test]
    fn service_resolution_spans_replicas() {
        let candidates = vec![
            ContainerBuilder::new("proj-app-1")
                .label(labels::COMPOSE_PROJECT, "proj")
                .label(labels::COMPOSE_SERVICE, "app")
                .label(labels::COMPOSE_DEPENDS_ON, "db")
                .build(),
            ContainerBuilder::new("proj_db_2")
                .label(labels::COMPOSE_PROJECT, "proj")
                .label(labels::COMPOSE_SERVICE, "db")
                .label(labels::COMPOSE_NUMBER, "2")
                .build(),
            ContainerBuilder::new("proj_db_1")
                .label(labels::COMPOSE_PROJECT, "proj")
                .label(labels::COMPOSE_SERVICE, "db")
                .label(labels::COMPOSE_NUMBER, "1")
                .build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(
            names(&graph, graph.dependencies_of(0)),
            vec!["proj_db_1", "proj_db_2"]
        );
    }

    #[test]
    fn unresolved_dependency_is_ignored() {
        let candidates = vec![
            ContainerBuilder::new("app").label(labels::DEPENDS_ON, "ghost").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert!(graph.dependencies_of(0).is_empty());
        assert!(!graph.in_cycle(0));
    }

    #[test]
    fn links_create_edges() {
        let candidates = vec![
            ContainerBuilder::new("web").link("db").build(),
            ContainerBuilder::new("db").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(names(&graph, graph.dependencies_of(0)), vec!["db"]);
    }

    #[test]
    fn network_mode_creates_edge() {
        let candidates = vec![
            ContainerBuilder::new("sidecar").network_mode("container:app").build(),
            ContainerBuilder::new("app").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(names(&graph, graph.dependencies_of(0)), vec!["app"]);
    }

    #[test]
    fn duplicate_names_create_one_edge() {
        let candidates = vec![
            ContainerBuilder::new("app").label(labels::DEPENDS_ON, "db,db").build(),
            ContainerBuilder::new("db").build(),
        ];
        let graph = DependencyGraph::build(&candidates);
        assert_eq!(graph.dependencies_of(0).len(), 1);
    }
}
