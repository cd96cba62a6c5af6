//! Change-event ontology.
//!
//! The event set is closed: every structural delta between two artifact
//! versions maps to exactly one of these kinds. Events are totally ordered
//! by `(element_id, kind priority, kind, old, new)` with fixed priorities
//! `removed < added < changed-structural < changed-metadata`, so event lists
//! are stable for testing while downstream reasons stay order-insensitive.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a structural change between two artifact versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    SourceAdded,
    SourceRemoved,
    SourceRenamed,
    DerivedAdded,
    DerivedRemoved,
    DerivedRenamed,
    DerivedInputsChanged,
    DerivedTransformRefChanged,
    DerivedTransformParamsChanged,
    DerivedTypeChanged,
    ConstraintAdded,
    ConstraintRemoved,
    ConstraintRenamed,
    ConstraintInputsChanged,
    ConstraintExpressionChanged,
    TransformAdded,
    TransformRemoved,
    TransformImplChanged,
}

impl ChangeKind {
    /// Fixed ordering priority: removals first, then additions, then
    /// structural changes, then metadata (renames) last.
    pub fn priority(self) -> u8 {
        use ChangeKind::*;
        match self {
            SourceRemoved | DerivedRemoved | ConstraintRemoved | TransformRemoved => 10,
            SourceAdded | DerivedAdded | ConstraintAdded | TransformAdded => 20,
            DerivedTransformRefChanged | ConstraintInputsChanged | TransformImplChanged => 30,
            DerivedTransformParamsChanged | ConstraintExpressionChanged => 31,
            DerivedTypeChanged => 32,
            DerivedInputsChanged => 33,
            SourceRenamed | DerivedRenamed | ConstraintRenamed => 40,
        }
    }

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        use ChangeKind::*;
        match self {
            SourceAdded => "SOURCE_ADDED",
            SourceRemoved => "SOURCE_REMOVED",
            SourceRenamed => "SOURCE_RENAMED",
            DerivedAdded => "DERIVED_ADDED",
            DerivedRemoved => "DERIVED_REMOVED",
            DerivedRenamed => "DERIVED_RENAMED",
            DerivedInputsChanged => "DERIVED_INPUTS_CHANGED",
            DerivedTransformRefChanged => "DERIVED_TRANSFORM_REF_CHANGED",
            DerivedTransformParamsChanged => "DERIVED_TRANSFORM_PARAMS_CHANGED",
            DerivedTypeChanged => "DERIVED_TYPE_CHANGED",
            ConstraintAdded => "CONSTRAINT_ADDED",
            ConstraintRemoved => "CONSTRAINT_REMOVED",
            ConstraintRenamed => "CONSTRAINT_RENAMED",
            ConstraintInputsChanged => "CONSTRAINT_INPUTS_CHANGED",
            ConstraintExpressionChanged => "CONSTRAINT_EXPRESSION_CHANGED",
            TransformAdded => "TRANSFORM_ADDED",
            TransformRemoved => "TRANSFORM_REMOVED",
            TransformImplChanged => "TRANSFORM_IMPL_CHANGED",
        }
    }
}

/// A single normalized change between two artifact versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What kind of change this is.
    #[serde(rename = "change_type")]
    pub kind: ChangeKind,
    /// Stable ID of the affected element (`s:`/`d:`/`c:`/`t:`).
    pub element_id: String,
    /// Old value, when the kind carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<String>,
    /// New value, when the kind carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<String>,
    /// Structured payload for kinds that need more than old/new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ChangeEvent {
    /// Construct an event with no details payload.
    pub fn new(
        kind: ChangeKind,
        element_id: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
    ) -> Self {
        Self {
            kind,
            element_id: element_id.into(),
            old,
            new,
            details: None,
        }
    }

    /// Attach a details payload.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    fn sort_key(&self) -> (&str, u8, &'static str, &str, &str) {
        (
            &self.element_id,
            self.kind.priority(),
            self.kind.as_str(),
            self.old.as_deref().unwrap_or(""),
            self.new.as_deref().unwrap_or(""),
        )
    }
}

/// Sort events into their canonical total order.
pub fn sort_events(events: &mut [ChangeEvent]) {
    events.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_before_added_before_changed_before_renamed() {
        let mut events = vec![
            ChangeEvent::new(ChangeKind::DerivedRenamed, "d:X", None, None),
            ChangeEvent::new(ChangeKind::DerivedTypeChanged, "d:X", None, None),
            ChangeEvent::new(ChangeKind::DerivedAdded, "d:X", None, None),
            ChangeEvent::new(ChangeKind::DerivedRemoved, "d:X", None, None),
        ];
        sort_events(&mut events);
        let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::DerivedRemoved,
                ChangeKind::DerivedAdded,
                ChangeKind::DerivedTypeChanged,
                ChangeKind::DerivedRenamed,
            ]
        );
    }

    #[test]
    fn element_id_dominates_ordering() {
        let mut events = vec![
            ChangeEvent::new(ChangeKind::SourceRemoved, "s:B", None, None),
            ChangeEvent::new(ChangeKind::SourceRenamed, "s:A", None, None),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].element_id, "s:A");
    }

    #[test]
    fn serializes_with_wire_names() {
        let event = ChangeEvent::new(
            ChangeKind::TransformImplChanged,
            "t:ct_map",
            Some("abc".into()),
            Some("def".into()),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["change_type"], "TRANSFORM_IMPL_CHANGED");
        assert_eq!(value["element_id"], "t:ct_map");
        assert!(value.get("details").is_none());
    }
}
