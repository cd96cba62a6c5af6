//! Impact propagation: events + graph + binding state → impacted set.
//!
//! A node is impacted when a change event or binding problem invalidates it
//! directly, or when anything it transitively depends on is impacted.
//! Renames and additions never impact. The engine accumulates `(reason,
//! origin)` pairs per node while processing events, then resolves paths once
//! at the end, so both the reasons map and the reported paths are
//! insensitive to event order.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use cheshbon_core::graph::DependencyGraph;
use cheshbon_core::registry::TransformRegistry;
use cheshbon_core::spec::MappingSpec;

use crate::event::{ChangeEvent, ChangeKind};

/// Why a node is impacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// A required source is bound by more than one raw column. Terminal.
    AmbiguousBinding,
    /// The node references a transform the registry no longer has.
    MissingTransformRef,
    /// A required source has no binding.
    MissingBinding,
    /// A direct input was removed from the spec.
    MissingInput,
    /// The node's own inputs changed and now reference missing IDs.
    DirectChangeMissingInput,
    /// The node's own definition changed.
    DirectChange,
    /// The referenced transform implementation changed.
    TransformImplChanged,
    /// The node participates in a dependency cycle with an impacted member.
    Cycle,
    /// Something upstream is impacted.
    TransitiveDependency,
}

impl ReasonCode {
    /// Precedence for selecting a node's primary reason. Higher wins.
    pub fn precedence(self) -> u8 {
        match self {
            ReasonCode::AmbiguousBinding => 90,
            ReasonCode::MissingTransformRef => 80,
            ReasonCode::MissingBinding => 70,
            ReasonCode::MissingInput => 60,
            ReasonCode::DirectChangeMissingInput => 50,
            ReasonCode::DirectChange => 40,
            ReasonCode::TransformImplChanged => 30,
            ReasonCode::Cycle => 20,
            ReasonCode::TransitiveDependency => 10,
        }
    }

    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::AmbiguousBinding => "AMBIGUOUS_BINDING",
            ReasonCode::MissingTransformRef => "MISSING_TRANSFORM_REF",
            ReasonCode::MissingBinding => "MISSING_BINDING",
            ReasonCode::MissingInput => "MISSING_INPUT",
            ReasonCode::DirectChangeMissingInput => "DIRECT_CHANGE_MISSING_INPUT",
            ReasonCode::DirectChange => "DIRECT_CHANGE",
            ReasonCode::TransformImplChanged => "TRANSFORM_IMPL_CHANGED",
            ReasonCode::Cycle => "CYCLE",
            ReasonCode::TransitiveDependency => "TRANSITIVE_DEPENDENCY",
        }
    }
}

/// Accumulated impact findings, before path resolution.
#[derive(Debug, Default)]
pub(crate) struct ImpactState {
    /// Reasons carried by each marked node.
    reasons: BTreeMap<String, BTreeSet<ReasonCode>>,
    /// Origin nodes per (node, reason), for path resolution.
    origins: BTreeMap<String, BTreeMap<ReasonCode, BTreeSet<String>>>,
    pub(crate) missing_inputs: BTreeMap<String, BTreeSet<String>>,
    pub(crate) missing_bindings: BTreeMap<String, BTreeSet<String>>,
    pub(crate) ambiguous_bindings: BTreeMap<String, BTreeSet<String>>,
    pub(crate) missing_transform_refs: BTreeMap<String, BTreeSet<String>>,
    pub(crate) validation_failed: bool,
    pub(crate) validation_errors: BTreeSet<String>,
}

impl ImpactState {
    pub(crate) fn mark(&mut self, node: &str, reason: ReasonCode, origin: &str) {
        self.reasons
            .entry(node.to_string())
            .or_default()
            .insert(reason);
        self.origins
            .entry(node.to_string())
            .or_default()
            .entry(reason)
            .or_default()
            .insert(origin.to_string());
    }

    /// Seed a direct reason on `node` and mark its closure transitive.
    pub(crate) fn seed_direct(
        &mut self,
        graph: &DependencyGraph,
        node: &str,
        reason: ReasonCode,
    ) {
        self.mark(node, reason, node);
        for dependent in graph.transitive_dependents(node) {
            self.mark(&dependent, ReasonCode::TransitiveDependency, node);
        }
    }

    /// Seed the removal of `removed`: direct dependents lose an input, the
    /// rest of the closure is transitive.
    fn seed_removal(&mut self, graph: &DependencyGraph, removed: &str) {
        let direct = graph.dependents(removed);
        for dependent in graph.transitive_dependents(removed) {
            if direct.contains(&dependent) {
                self.mark(&dependent, ReasonCode::MissingInput, removed);
                self.missing_inputs
                    .entry(dependent.clone())
                    .or_default()
                    .insert(removed.to_string());
            } else {
                self.mark(&dependent, ReasonCode::TransitiveDependency, removed);
            }
        }
    }

    fn seed_missing_transform_ref(
        &mut self,
        graph: &DependencyGraph,
        derived_id: &str,
        derived_name: &str,
        transform_ref: &str,
    ) {
        self.validation_failed = true;
        self.validation_errors.insert(format!(
            "derived variable '{derived_id}' ({derived_name}) references missing transform \
             '{transform_ref}': not found in registry"
        ));
        self.seed_direct(graph, derived_id, ReasonCode::MissingTransformRef);
        self.missing_transform_refs
            .entry(derived_id.to_string())
            .or_default()
            .insert(transform_ref.to_string());
    }
}

/// Resolved impact, ready for report assembly.
#[derive(Debug, Clone)]
pub(crate) struct ImpactOutcome {
    pub(crate) impacted: Vec<String>,
    pub(crate) unaffected: Vec<String>,
    pub(crate) reasons: BTreeMap<String, Vec<ReasonCode>>,
    pub(crate) paths: BTreeMap<String, Vec<String>>,
    pub(crate) alt_path_counts: BTreeMap<String, usize>,
    pub(crate) missing_inputs: BTreeMap<String, Vec<String>>,
    pub(crate) missing_bindings: BTreeMap<String, Vec<String>>,
    pub(crate) ambiguous_bindings: BTreeMap<String, Vec<String>>,
    pub(crate) missing_transform_refs: BTreeMap<String, Vec<String>>,
    pub(crate) validation_failed: bool,
    pub(crate) validation_errors: Vec<String>,
}

/// Process change events and the registry check into an impact state.
pub(crate) fn compute_impact(
    spec_v1: &MappingSpec,
    spec_v2: &MappingSpec,
    graph_v1: &DependencyGraph,
    graph_v2: &DependencyGraph,
    events: &[ChangeEvent],
    registry_v2: Option<&TransformRegistry>,
) -> ImpactState {
    let mut state = ImpactState::default();
    let declared_v2 = spec_v2.all_ids();

    for event in events {
        let id = event.element_id.as_str();
        match event.kind {
            ChangeKind::SourceRemoved
            | ChangeKind::DerivedRemoved
            | ChangeKind::ConstraintRemoved => {
                state.seed_removal(graph_v1, id);
            }

            ChangeKind::DerivedTransformRefChanged
            | ChangeKind::DerivedTransformParamsChanged
            | ChangeKind::DerivedTypeChanged => {
                state.seed_direct(graph_v1, id, ReasonCode::DirectChange);
            }

            ChangeKind::DerivedInputsChanged => {
                state.seed_direct(graph_v1, id, ReasonCode::DirectChange);
                if let Some(d2) = spec_v2.derived_by_id(id) {
                    let missing: BTreeSet<String> = d2
                        .inputs
                        .iter()
                        .filter(|input| !declared_v2.contains(*input))
                        .cloned()
                        .collect();
                    if !missing.is_empty() {
                        state.mark(id, ReasonCode::DirectChangeMissingInput, id);
                        state
                            .missing_inputs
                            .entry(id.to_string())
                            .or_default()
                            .extend(missing);
                    }
                }
            }

            ChangeKind::ConstraintInputsChanged | ChangeKind::ConstraintExpressionChanged => {
                for dependent in graph_v1.transitive_dependents(id) {
                    state.mark(&dependent, ReasonCode::TransitiveDependency, id);
                }
            }

            ChangeKind::TransformImplChanged => {
                for derived in &spec_v1.derived {
                    if derived.transform_ref.as_deref() == Some(id) {
                        state.seed_direct(graph_v1, &derived.id, ReasonCode::TransformImplChanged);
                    }
                }
            }

            ChangeKind::TransformRemoved => {
                for derived in &spec_v2.derived {
                    if derived.transform_ref.as_deref() == Some(id) {
                        let graph = graph_containing(&derived.id, graph_v1, graph_v2);
                        state.seed_missing_transform_ref(graph, &derived.id, &derived.name, id);
                    }
                }
            }

            // Additions and renames never invalidate existing outputs;
            // TRANSFORM_ADDED is audit-only.
            ChangeKind::SourceAdded
            | ChangeKind::DerivedAdded
            | ChangeKind::ConstraintAdded
            | ChangeKind::TransformAdded
            | ChangeKind::SourceRenamed
            | ChangeKind::DerivedRenamed
            | ChangeKind::ConstraintRenamed => {}
        }
    }

    if let Some(registry) = registry_v2 {
        for derived in &spec_v2.derived {
            let Some(transform_ref) = &derived.transform_ref else {
                continue;
            };
            if !registry.contains(transform_ref) {
                let graph = graph_containing(&derived.id, graph_v1, graph_v2);
                state.seed_missing_transform_ref(graph, &derived.id, &derived.name, transform_ref);
            }
        }
    }

    state
}

fn graph_containing<'a>(
    node: &str,
    graph_v1: &'a DependencyGraph,
    graph_v2: &'a DependencyGraph,
) -> &'a DependencyGraph {
    if graph_v1.contains(node) {
        graph_v1
    } else {
        graph_v2
    }
}

/// Resolve the accumulated state into sorted outputs, paths, and counts.
pub(crate) fn finalize(
    mut state: ImpactState,
    spec_v1: &MappingSpec,
    spec_v2: &MappingSpec,
    graph_v1: &DependencyGraph,
    graph_v2: &DependencyGraph,
    compute_paths: bool,
) -> ImpactOutcome {
    apply_cycles(&mut state, graph_v1, graph_v2);

    let mut universe: BTreeSet<String> = spec_v1.derived_ids();
    universe.extend(spec_v1.constraint_ids());
    universe.extend(spec_v2.derived_ids());
    universe.extend(spec_v2.constraint_ids());

    let impacted: Vec<String> = state.reasons.keys().cloned().collect();
    let impacted_set: BTreeSet<&String> = impacted.iter().collect();
    let unaffected: Vec<String> = universe
        .iter()
        .filter(|id| !impacted_set.contains(id))
        .cloned()
        .collect();

    let mut reasons = BTreeMap::new();
    let mut paths = BTreeMap::new();
    let mut alt_path_counts = BTreeMap::new();

    for (node, reason_set) in &state.reasons {
        let ordered = ordered_reasons(reason_set);
        let primary = ordered[0];
        reasons.insert(node.clone(), ordered);

        if !compute_paths {
            continue;
        }

        let origins = state
            .origins
            .get(node)
            .and_then(|by_reason| by_reason.get(&primary))
            .cloned()
            .unwrap_or_default();

        if origins.contains(node) {
            paths.insert(node.clone(), vec![node.clone()]);
            continue;
        }

        // Nearest origin wins; ties break on the lexicographically smallest
        // node sequence. Origins from binding impact may only connect in the
        // to-graph, so fall back to it when the from-graph has no path.
        let mut best: Option<(Vec<String>, &DependencyGraph, String)> = None;
        for origin in &origins {
            for graph in [graph_v1, graph_v2] {
                let Some(path) = graph.shortest_path(origin, node) else {
                    continue;
                };
                let better = match &best {
                    None => true,
                    Some((current, _, _)) => (path.len(), &path) < (current.len(), current),
                };
                if better {
                    best = Some((path, graph, origin.clone()));
                }
                break;
            }
        }

        match best {
            Some((path, graph, origin)) => {
                let alt = graph.alternative_path_count(&origin, node);
                if alt > 0 {
                    alt_path_counts.insert(node.clone(), alt);
                }
                paths.insert(node.clone(), path);
            }
            None => {
                paths.insert(node.clone(), vec![node.clone()]);
            }
        }
    }

    ImpactOutcome {
        impacted,
        unaffected,
        reasons,
        paths,
        alt_path_counts,
        missing_inputs: sort_map(state.missing_inputs),
        missing_bindings: sort_map(state.missing_bindings),
        ambiguous_bindings: sort_map(state.ambiguous_bindings),
        missing_transform_refs: sort_map(state.missing_transform_refs),
        validation_failed: state.validation_failed,
        validation_errors: state.validation_errors.into_iter().collect(),
    }
}

/// Cycle members form one component: when any member is impacted, every
/// member is, with reason [`ReasonCode::Cycle`]. Iterates to a fixpoint so
/// overlapping cycles chain.
fn apply_cycles(state: &mut ImpactState, graph_v1: &DependencyGraph, graph_v2: &DependencyGraph) {
    let mut cycles: BTreeSet<Vec<String>> = graph_v1.cycles().iter().cloned().collect();
    cycles.extend(graph_v2.cycles().iter().cloned());

    let mut changed = true;
    while changed {
        changed = false;
        for cycle in &cycles {
            let any_impacted = cycle.iter().any(|n| state.reasons.contains_key(n));
            if !any_impacted {
                continue;
            }
            for member in cycle {
                let already = state
                    .reasons
                    .get(member)
                    .is_some_and(|set| set.contains(&ReasonCode::Cycle));
                if !already {
                    state.mark(member, ReasonCode::Cycle, member);
                    changed = true;
                }
            }
        }
    }
}

/// Primary reason first, remaining reasons in lexicographic wire-name order.
fn ordered_reasons(set: &BTreeSet<ReasonCode>) -> Vec<ReasonCode> {
    let primary = *set
        .iter()
        .max_by_key(|r| r.precedence())
        .expect("reason set is never empty");
    let mut rest: Vec<ReasonCode> = set.iter().copied().filter(|r| *r != primary).collect();
    rest.sort_by_key(|r| r.as_str());
    std::iter::once(primary).chain(rest).collect()
}

fn sort_map(map: BTreeMap<String, BTreeSet<String>>) -> BTreeMap<String, Vec<String>> {
    map.into_iter()
        .map(|(k, v)| (k, v.into_iter().collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::diff_specs;
    use crate::event::sort_events;
    use serde_json::{json, Value};

    fn spec(value: Value) -> MappingSpec {
        MappingSpec::from_value(&value).unwrap()
    }

    fn chain_spec(params_u: bool) -> MappingSpec {
        let params = if params_u {
            json!({"map": {"M": "M", "F": "F", "U": "UNKNOWN"}})
        } else {
            json!({"map": {"M": "M", "F": "F"}})
        };
        spec(json!({
            "schema_version": "0.7",
            "sources": [{"id": "s:SEX_RAW", "name": "SEX_RAW", "type": "string"}],
            "derived": [
                {
                    "id": "d:SEX",
                    "name": "SEX",
                    "type": "string",
                    "inputs": ["s:SEX_RAW"],
                    "transform_ref": "t:ct_map",
                    "params": params
                },
                {
                    "id": "d:SEX_CDISC",
                    "name": "SEX_CDISC",
                    "type": "string",
                    "inputs": ["d:SEX"],
                    "transform_ref": "t:identity"
                }
            ],
        }))
    }

    fn run(v1: &MappingSpec, v2: &MappingSpec) -> ImpactOutcome {
        let g1 = DependencyGraph::build(v1);
        let g2 = DependencyGraph::build(v2);
        let mut events = diff_specs(v1, v2);
        sort_events(&mut events);
        let state = compute_impact(v1, v2, &g1, &g2, &events, None);
        finalize(state, v1, v2, &g1, &g2, true)
    }

    #[test]
    fn params_change_impacts_node_and_dependents() {
        let v1 = chain_spec(false);
        let v2 = chain_spec(true);
        let outcome = run(&v1, &v2);

        assert_eq!(outcome.impacted, vec!["d:SEX", "d:SEX_CDISC"]);
        assert_eq!(outcome.reasons["d:SEX"][0], ReasonCode::DirectChange);
        assert_eq!(
            outcome.reasons["d:SEX_CDISC"][0],
            ReasonCode::TransitiveDependency
        );
        assert_eq!(outcome.paths["d:SEX"], vec!["d:SEX"]);
        assert_eq!(outcome.paths["d:SEX_CDISC"], vec!["d:SEX", "d:SEX_CDISC"]);
    }

    #[test]
    fn source_removal_distinguishes_direct_and_transitive() {
        let v1 = chain_spec(false);
        let mut v2 = chain_spec(false);
        v2.sources.clear();
        let outcome = run(&v1, &v2);

        assert_eq!(outcome.reasons["d:SEX"][0], ReasonCode::MissingInput);
        assert_eq!(
            outcome.reasons["d:SEX_CDISC"][0],
            ReasonCode::TransitiveDependency
        );
        assert_eq!(outcome.missing_inputs["d:SEX"], vec!["s:SEX_RAW"]);
    }

    #[test]
    fn reasons_are_event_order_insensitive() {
        let v1 = chain_spec(false);
        let mut v2 = chain_spec(true);
        v2.sources.clear();
        let g1 = DependencyGraph::build(&v1);
        let g2 = DependencyGraph::build(&v2);

        let mut events = diff_specs(&v1, &v2);
        sort_events(&mut events);
        let baseline = finalize(
            compute_impact(&v1, &v2, &g1, &g2, &events, None),
            &v1,
            &v2,
            &g1,
            &g2,
            true,
        );

        // Exhaustive permutations for small event counts, rotations beyond.
        let mut permuted = events.clone();
        permuted.reverse();
        let reversed = finalize(
            compute_impact(&v1, &v2, &g1, &g2, &permuted, None),
            &v1,
            &v2,
            &g1,
            &g2,
            true,
        );
        assert_eq!(baseline.reasons, reversed.reasons);
        assert_eq!(baseline.paths, reversed.paths);

        for rotation in 1..events.len() {
            let mut rotated = events.clone();
            rotated.rotate_left(rotation);
            let outcome = finalize(
                compute_impact(&v1, &v2, &g1, &g2, &rotated, None),
                &v1,
                &v2,
                &g1,
                &g2,
                true,
            );
            assert_eq!(baseline.reasons, outcome.reasons);
        }
    }

    #[test]
    fn multiple_reasons_keep_primary_first() {
        // d:SEX loses its source and changes params: MISSING_INPUT beats
        // DIRECT_CHANGE.
        let v1 = chain_spec(false);
        let mut v2 = chain_spec(true);
        v2.sources.clear();
        let outcome = run(&v1, &v2);

        let reasons = &outcome.reasons["d:SEX"];
        assert_eq!(reasons[0], ReasonCode::MissingInput);
        assert!(reasons.contains(&ReasonCode::DirectChange));
        let rest: Vec<&str> = reasons[1..].iter().map(|r| r.as_str()).collect();
        let mut sorted = rest.clone();
        sorted.sort();
        assert_eq!(rest, sorted, "non-primary reasons sort lexicographically");
    }

    #[test]
    fn constraint_change_impacts_dependents_only() {
        let v1 = spec(json!({
            "schema_version": "0.7",
            "sources": [{"id": "s:AGE_RAW", "name": "AGE_RAW", "type": "int"}],
            "derived": [{
                "id": "d:AGE_OK",
                "name": "AGE_OK",
                "type": "bool",
                "inputs": ["c:AGE_GE_0"],
                "transform_ref": "t:identity"
            }],
            "constraints": [{
                "id": "c:AGE_GE_0",
                "name": "AGE >= 0",
                "inputs": ["s:AGE_RAW"],
                "expression": "AGE_RAW >= 0"
            }]
        }));
        let mut v2 = v1.clone();
        v2.constraints[0].expression = Some("AGE_RAW >= 1".into());
        let outcome = run(&v1, &v2);

        assert_eq!(outcome.impacted, vec!["d:AGE_OK"]);
        assert_eq!(
            outcome.reasons["d:AGE_OK"][0],
            ReasonCode::TransitiveDependency
        );
        assert!(outcome.unaffected.contains(&"c:AGE_GE_0".to_string()));
    }

    #[test]
    fn cycle_members_marked_when_any_member_impacted() {
        let v1 = spec(json!({
            "schema_version": "0.7",
            "sources": [{"id": "s:X", "name": "X", "type": "string"}],
            "derived": [
                {"id": "d:A", "name": "A", "type": "string",
                 "inputs": ["d:B", "s:X"], "transform_ref": "t:identity"},
                {"id": "d:B", "name": "B", "type": "string",
                 "inputs": ["d:A"], "transform_ref": "t:identity"}
            ],
        }));
        let mut v2 = v1.clone();
        v2.sources.clear();
        let outcome = run(&v1, &v2);

        assert!(outcome.reasons["d:A"].contains(&ReasonCode::Cycle));
        assert!(outcome.reasons["d:B"].contains(&ReasonCode::Cycle));
        assert_eq!(outcome.reasons["d:A"][0], ReasonCode::MissingInput);
    }

    #[test]
    fn missing_transform_ref_from_registry_check() {
        let v1 = chain_spec(false);
        let v2 = chain_spec(false);
        let g1 = DependencyGraph::build(&v1);
        let g2 = DependencyGraph::build(&v2);
        let registry = TransformRegistry::from_value(&json!({
            "registry_version": "1.0.0",
            "transforms": [{
                "id": "t:identity",
                "version": "1.0.0",
                "kind": "builtin",
                "signature": {"inputs": ["string"], "output": "string"},
                "impl_fingerprint": {
                    "algo": "sha256",
                    "source": "builtin",
                    "ref": "transforms/identity.py",
                    "digest": "a".repeat(64)
                }
            }]
        }))
        .unwrap();

        let state = compute_impact(&v1, &v2, &g1, &g2, &[], Some(&registry));
        let outcome = finalize(state, &v1, &v2, &g1, &g2, true);

        assert!(outcome.validation_failed);
        assert_eq!(outcome.reasons["d:SEX"][0], ReasonCode::MissingTransformRef);
        assert_eq!(outcome.missing_transform_refs["d:SEX"], vec!["t:ct_map"]);
        // The dependent of the broken node is transitively impacted.
        assert_eq!(
            outcome.reasons["d:SEX_CDISC"][0],
            ReasonCode::TransitiveDependency
        );
    }

    #[test]
    fn inputs_changed_to_missing_reference() {
        let v1 = chain_spec(false);
        let v2_value = json!({
            "schema_version": "0.7",
            "sources": [{"id": "s:SEX_RAW", "name": "SEX_RAW", "type": "string"}],
            "derived": [
                {
                    "id": "d:SEX",
                    "name": "SEX",
                    "type": "string",
                    "inputs": ["s:GHOST"],
                    "transform_ref": "t:ct_map",
                    "params": {"map": {"M": "M", "F": "F"}}
                },
                {
                    "id": "d:SEX_CDISC",
                    "name": "SEX_CDISC",
                    "type": "string",
                    "inputs": ["d:SEX"],
                    "transform_ref": "t:identity"
                }
            ],
        });
        let v2 = spec(v2_value);
        let outcome = run(&v1, &v2);

        assert_eq!(
            outcome.reasons["d:SEX"][0],
            ReasonCode::DirectChangeMissingInput
        );
        assert_eq!(outcome.missing_inputs["d:SEX"], vec!["s:GHOST"]);
    }
}
