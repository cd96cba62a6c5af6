//! Binding-aware impact: folds missing and ambiguous bindings into the
//! impact state.
//!
//! Bindings are evaluated against the to-spec and its graph. A missing
//! binding starves every consumer of the source; an ambiguous binding is a
//! terminal failure that forces `validation_failed`. Both propagate to the
//! consumers' transitive dependents.

use cheshbon_core::bindings::{ambiguous_bindings, binding_status, BindingStatus, Bindings};
use cheshbon_core::graph::DependencyGraph;
use cheshbon_core::spec::MappingSpec;

use crate::impact::{ImpactState, ReasonCode};

pub(crate) fn apply_binding_impact(
    state: &mut ImpactState,
    spec_v2: &MappingSpec,
    graph_v2: &DependencyGraph,
    bindings: &Bindings,
) {
    let status = binding_status(spec_v2, bindings);
    let ambiguous = ambiguous_bindings(bindings);

    for (source_id, source_status) in &status {
        match source_status {
            BindingStatus::Bound => {}

            BindingStatus::MissingBinding => {
                for consumer in graph_v2.dependents(source_id) {
                    state.mark(&consumer, ReasonCode::MissingBinding, &consumer);
                    state
                        .missing_bindings
                        .entry(consumer.clone())
                        .or_default()
                        .insert(source_id.clone());
                    for dependent in graph_v2.transitive_dependents(&consumer) {
                        state.mark(&dependent, ReasonCode::TransitiveDependency, &consumer);
                    }
                }
            }

            BindingStatus::AmbiguousBinding => {
                state.validation_failed = true;
                let raw_columns = ambiguous
                    .get(source_id)
                    .map(|columns| columns.join(", "))
                    .unwrap_or_default();
                state.validation_errors.insert(format!(
                    "ambiguous binding for source '{source_id}': raw columns {raw_columns} \
                     map to the same source; cannot determine which to use"
                ));
                for consumer in graph_v2.dependents(source_id) {
                    state.mark(&consumer, ReasonCode::AmbiguousBinding, &consumer);
                    state
                        .ambiguous_bindings
                        .entry(consumer.clone())
                        .or_default()
                        .insert(source_id.clone());
                    for dependent in graph_v2.transitive_dependents(&consumer) {
                        state.mark(&dependent, ReasonCode::TransitiveDependency, &consumer);
                    }
                }
            }
        }
    }
}
