//! Universal invariants over the public API.

use serde_json::{json, Value};

use cheshbon_core::canonical::canonical_json;
use cheshbon_core::spec::MappingSpec;
use cheshbon_diff::{diff, DetailLevel, DiffResult};

fn spec(value: Value) -> MappingSpec {
    MappingSpec::from_value(&value).unwrap()
}

fn wide_spec(names_suffix: &str, inputs_reversed: bool) -> Value {
    let inputs = if inputs_reversed {
        json!(["s:WEIGHT", "s:HEIGHT"])
    } else {
        json!(["s:HEIGHT", "s:WEIGHT"])
    };
    json!({
        "schema_version": "0.7",
        "sources": [
            {"id": "s:HEIGHT", "name": format!("HEIGHT{names_suffix}"), "type": "int"},
            {"id": "s:WEIGHT", "name": format!("WEIGHT{names_suffix}"), "type": "int"}
        ],
        "derived": [
            {
                "id": "d:BMI",
                "name": format!("BMI{names_suffix}"),
                "type": "int",
                "inputs": inputs,
                "transform_ref": "t:bmi",
                "params": {"round": "nearest"}
            },
            {
                "id": "d:BMI_GRP",
                "name": format!("BMI_GRP{names_suffix}"),
                "type": "string",
                "inputs": ["d:BMI"],
                "transform_ref": "t:bucket"
            }
        ],
    })
}

fn result_bytes(result: &DiffResult) -> String {
    canonical_json(&serde_json::to_value(result).unwrap()).unwrap()
}

#[test]
fn diff_is_deterministic_byte_for_byte() {
    let run = || {
        let v1 = spec(wide_spec("", false));
        let mut v2_value = wide_spec("", false);
        v2_value["derived"][0]["params"] = json!({"round": "up"});
        let v2 = spec(v2_value);
        result_bytes(&diff(&v1, &v2, None, None, None, DetailLevel::Full))
    };
    assert_eq!(run(), run());
}

#[test]
fn rename_neutrality() {
    let v1 = spec(wide_spec("", false));
    let v2 = spec(wide_spec("_RENAMED", false));

    let result = diff(&v1, &v2, None, None, None, DetailLevel::Full);
    assert!(result.impacted_ids.is_empty());
    assert_eq!(result.exit_code(), 0);
    // Every element renamed, so every element gets exactly one event.
    assert_eq!(result.events.len(), 4);
}

#[test]
fn input_order_neutrality() {
    let v1 = spec(wide_spec("", false));
    let v2 = spec(wide_spec("", true));

    let result = diff(&v1, &v2, None, None, None, DetailLevel::Full);
    assert!(result.events.is_empty());
    assert!(result.impacted_ids.is_empty());
}

#[test]
fn impacted_and_unaffected_partition_the_universe() {
    let v1 = spec(wide_spec("", false));
    let mut v2_value = wide_spec("", false);
    v2_value["derived"][0]["params"] = json!({"round": "up"});
    let v2 = spec(v2_value);

    let result = diff(&v1, &v2, None, None, None, DetailLevel::Full);
    let mut all: Vec<String> = result
        .impacted_ids
        .iter()
        .chain(result.unaffected_ids.iter())
        .cloned()
        .collect();
    all.sort();
    assert_eq!(all, vec!["d:BMI", "d:BMI_GRP"]);
    for id in &result.impacted_ids {
        assert!(!result.unaffected_ids.contains(id));
    }
}

#[test]
fn outputs_are_sorted() {
    let v1 = spec(wide_spec("", false));
    let mut v2_value = wide_spec("", false);
    v2_value["sources"] = json!([]);
    v2_value["derived"][0]["params"] = json!({"round": "up"});
    let v2 = spec(v2_value);

    let result = diff(&v1, &v2, None, None, None, DetailLevel::Full);

    let mut impacted = result.impacted_ids.clone();
    impacted.sort();
    assert_eq!(result.impacted_ids, impacted);

    let mut previous: Option<(&String, u8)> = None;
    for event in &result.events {
        let key = (&event.element_id, event.kind.priority());
        if let Some(prev) = previous {
            assert!(prev <= key, "events out of order: {prev:?} then {key:?}");
        }
        previous = Some(key);
    }
}
