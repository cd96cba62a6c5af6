//! Dependency graph over spec elements.
//!
//! Nodes are typed IDs (`s:`, `d:`, `c:`); an edge `u -> v` means "v depends
//! on u". Construction tolerates bad specs: unresolved references and cycles
//! are recorded, not fatal, so impact analysis can still run on the sound
//! subgraph. All containers are ordered (`BTreeMap`/`BTreeSet`) and every
//! query result is deterministically sorted.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::error::GraphError;
use crate::spec::MappingSpec;

/// Maximum number of alternative paths ever reported.
pub const MAX_ALT_PATHS: usize = 10;

/// Alternative paths may be at most this many edges longer than the shortest.
pub const ALT_PATH_SLACK: usize = 10;

/// Dependency graph for a mapping spec.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    unresolved: BTreeMap<String, BTreeSet<String>>,
    cycles: Vec<Vec<String>>,
}

impl DependencyGraph {
    /// Build the graph from a spec.
    ///
    /// References to undeclared IDs are recorded in
    /// [`unresolved`](Self::unresolved) and the edge is still created so
    /// paths through the flagged node remain explainable. Cycles are
    /// detected here and recorded.
    pub fn build(spec: &MappingSpec) -> Self {
        let declared = spec.all_ids();

        let mut graph = DependencyGraph {
            nodes: BTreeSet::new(),
            dependencies: BTreeMap::new(),
            dependents: BTreeMap::new(),
            unresolved: BTreeMap::new(),
            cycles: Vec::new(),
        };

        for source in &spec.sources {
            graph.nodes.insert(source.id.clone());
            graph.dependencies.entry(source.id.clone()).or_default();
        }

        let edges: Vec<(String, Vec<String>)> = spec
            .derived
            .iter()
            .map(|d| (d.id.clone(), d.inputs.clone()))
            .chain(
                spec.constraints
                    .iter()
                    .map(|c| (c.id.clone(), c.inputs.clone())),
            )
            .collect();

        for (node, inputs) in edges {
            graph.nodes.insert(node.clone());
            let deps = graph.dependencies.entry(node.clone()).or_default();
            for input in inputs {
                deps.insert(input.clone());
                graph
                    .dependents
                    .entry(input.clone())
                    .or_default()
                    .insert(node.clone());
                if !declared.contains(&input) {
                    graph.nodes.insert(input.clone());
                    graph
                        .unresolved
                        .entry(node.clone())
                        .or_default()
                        .insert(input);
                }
            }
        }

        graph.cycles = graph.detect_cycles();
        graph
    }

    /// All node IDs, sorted.
    pub fn nodes(&self) -> &BTreeSet<String> {
        &self.nodes
    }

    /// Whether the graph contains a node.
    pub fn contains(&self, node: &str) -> bool {
        self.nodes.contains(node)
    }

    /// Direct dependencies of a node.
    pub fn dependencies(&self, node: &str) -> BTreeSet<String> {
        self.dependencies.get(node).cloned().unwrap_or_default()
    }

    /// Direct dependents of a node.
    pub fn dependents(&self, node: &str) -> BTreeSet<String> {
        self.dependents.get(node).cloned().unwrap_or_default()
    }

    /// Unresolved references, per referencing node.
    pub fn unresolved(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.unresolved
    }

    /// Cycles found at construction, each normalized to start at its
    /// lexicographically smallest member.
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }

    /// First cycle as a [`GraphError`], if any cycle exists.
    pub fn cycle_error(&self) -> Option<GraphError> {
        self.cycles.first().map(|nodes| GraphError::CycleDetected {
            nodes: nodes.clone(),
        })
    }

    /// All transitive dependents of a node (BFS closure). The node itself is
    /// excluded even when a cycle makes it reachable from itself.
    pub fn transitive_dependents(&self, node: &str) -> BTreeSet<String> {
        let mut reached = BTreeSet::new();
        let mut queue: VecDeque<String> = self.dependents(node).into_iter().collect();
        while let Some(current) = queue.pop_front() {
            if reached.insert(current.clone()) {
                queue.extend(self.dependents(&current));
            }
        }
        reached.remove(node);
        reached
    }

    /// Shortest dependency path from `from` to `to` along dependent edges.
    ///
    /// BFS with sorted neighbor expansion, which makes the result the
    /// lexicographically smallest among equal-length paths.
    pub fn shortest_path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        if !self.contains(from) {
            return None;
        }
        if from == to {
            return Some(vec![from.to_string()]);
        }

        let mut parent: BTreeMap<String, String> = BTreeMap::new();
        let mut visited = BTreeSet::from([from.to_string()]);
        let mut queue = VecDeque::from([from.to_string()]);

        while let Some(current) = queue.pop_front() {
            for next in self.dependents(&current) {
                if visited.insert(next.clone()) {
                    parent.insert(next.clone(), current.clone());
                    if next == to {
                        let mut path = vec![to.to_string()];
                        let mut cursor = to.to_string();
                        while let Some(prev) = parent.get(&cursor) {
                            path.push(prev.clone());
                            cursor = prev.clone();
                        }
                        path.reverse();
                        return Some(path);
                    }
                    queue.push_back(next);
                }
            }
        }
        None
    }

    /// Count simple paths from `from` to `to` whose length stays within
    /// `shortest + ALT_PATH_SLACK` edges, capped at `MAX_ALT_PATHS + 1`.
    pub fn path_count_within_bound(&self, from: &str, to: &str) -> usize {
        let Some(shortest) = self.shortest_path(from, to) else {
            return 0;
        };
        if from == to {
            return 1;
        }
        let max_edges = (shortest.len() - 1) + ALT_PATH_SLACK;
        let cap = MAX_ALT_PATHS + 1;
        let mut visited = BTreeSet::from([from.to_string()]);
        self.count_paths(from, to, &mut visited, max_edges, cap)
    }

    /// Alternative paths beyond the shortest: `max(0, total - 1)`, capped at
    /// [`MAX_ALT_PATHS`].
    pub fn alternative_path_count(&self, from: &str, to: &str) -> usize {
        self.path_count_within_bound(from, to)
            .saturating_sub(1)
            .min(MAX_ALT_PATHS)
    }

    fn count_paths(
        &self,
        current: &str,
        target: &str,
        visited: &mut BTreeSet<String>,
        remaining_edges: usize,
        cap: usize,
    ) -> usize {
        if current == target {
            return 1;
        }
        if remaining_edges == 0 {
            return 0;
        }
        let mut count = 0;
        for next in self.dependents(current) {
            if visited.contains(&next) {
                continue;
            }
            visited.insert(next.clone());
            count += self.count_paths(&next, target, visited, remaining_edges - 1, cap - count);
            visited.remove(&next);
            if count >= cap {
                return cap;
            }
        }
        count
    }

    /// DFS cycle detection over dependent edges. Each back edge yields one
    /// cycle; cycles are deduplicated under rotation.
    fn detect_cycles(&self) -> Vec<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn dfs(
            graph: &DependencyGraph,
            node: &str,
            color: &mut BTreeMap<String, Color>,
            path: &mut Vec<String>,
            cycles: &mut Vec<Vec<String>>,
        ) {
            color.insert(node.to_string(), Color::Gray);
            path.push(node.to_string());

            for next in graph.dependents(node) {
                match color.get(&next).copied().unwrap_or(Color::White) {
                    Color::White => dfs(graph, &next, color, path, cycles),
                    Color::Gray => {
                        let start = path.iter().position(|n| *n == next).unwrap_or(0);
                        let cycle = normalize_cycle(&path[start..]);
                        if !cycles.contains(&cycle) {
                            cycles.push(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            color.insert(node.to_string(), Color::Black);
            path.pop();
        }

        let mut color: BTreeMap<String, Color> = BTreeMap::new();
        let mut cycles = Vec::new();
        for node in &self.nodes {
            if color.get(node).copied().unwrap_or(Color::White) == Color::White {
                let mut path = Vec::new();
                dfs(self, node, &mut color, &mut path, &mut cycles);
            }
        }
        cycles.sort();
        cycles
    }
}

/// Rotate a cycle so it starts at its lexicographically smallest member.
fn normalize_cycle(cycle: &[String]) -> Vec<String> {
    if cycle.is_empty() {
        return Vec::new();
    }
    let min_idx = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| n.as_str())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_idx..]);
    rotated.extend_from_slice(&cycle[..min_idx]);
    rotated
}
