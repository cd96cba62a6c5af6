//! Canonical JSON serialization and hashing.
//!
//! Every digest in the system is computed over this encoding, so its rules
//! are load-bearing:
//!
//! - Object keys sorted recursively by Unicode code point
//! - Separators `","` and `":"`, no other whitespace
//! - Strings normalized to NFC before emission, minimal JCS escaping
//! - Integers only; floats are a hard error (encode decimals as strings)
//! - Arrays preserve order, except set-tagged arrays which sort by
//!   `(type_tag, canonical_form)`

use std::fmt::Write as _;

use serde_json::{Number, Value};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use crate::error::CanonicalizationError;

/// Maximum nesting depth accepted by the canonicalizer.
pub const MAX_DEPTH: usize = 128;

/// Serialize a JSON value to its canonical string form.
///
/// Arrays preserve input order. Fails on floats and on values that cannot be
/// represented canonically.
pub fn canonical_json(value: &Value) -> Result<String, CanonicalizationError> {
    let mut out = String::new();
    emit_value(value, &mut out, "", 0)?;
    Ok(out)
}

/// Serialize a JSON value whose top-level array is a semantic set.
///
/// Set elements are sorted by the two-level key `(type_tag, canonical_form)`
/// where the type tag orders `null < bool < number < string < array < object`.
/// Non-array values canonicalize exactly as [`canonical_json`].
pub fn canonical_json_set_array(value: &Value) -> Result<String, CanonicalizationError> {
    match value {
        Value::Array(items) => {
            let mut keyed: Vec<(u8, String)> = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let mut form = String::new();
                emit_value(item, &mut form, &format!("[{i}]"), 1)?;
                keyed.push((type_tag(item), form));
            }
            keyed.sort();
            let mut out = String::from("[");
            for (i, (_, form)) in keyed.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(form);
            }
            out.push(']');
            Ok(out)
        }
        other => canonical_json(other),
    }
}

/// Parse JSON bytes at the kernel boundary.
///
/// Invalid UTF-8 maps to [`CanonicalizationError::InvalidUtf8`]; anything
/// else unparseable maps to [`CanonicalizationError::NonJsonType`].
pub fn parse_json_bytes(bytes: &[u8]) -> Result<Value, CanonicalizationError> {
    let text = std::str::from_utf8(bytes).map_err(|_| CanonicalizationError::InvalidUtf8)?;
    serde_json::from_str(text).map_err(|e| CanonicalizationError::NonJsonType {
        detail: e.to_string(),
    })
}

/// SHA-256 of a byte slice as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().fold(String::with_capacity(64), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Canonical digest of a JSON value, prefixed with `sha256:`.
pub fn digest_value(value: &Value) -> Result<String, CanonicalizationError> {
    let canonical = canonical_json(value)?;
    Ok(format!("sha256:{}", sha256_hex(canonical.as_bytes())))
}

/// Digest of transform params. Absent params hash as the empty object.
pub fn hash_params(params: Option<&Value>) -> Result<String, CanonicalizationError> {
    match params {
        Some(value) => digest_value(value),
        None => digest_value(&Value::Object(serde_json::Map::new())),
    }
}

/// Length in bytes of a value's canonical form, for size-limit checks.
pub fn canonical_len(value: &Value) -> Result<usize, CanonicalizationError> {
    Ok(canonical_json(value)?.len())
}

fn type_tag(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn emit_value(
    value: &Value,
    out: &mut String,
    path: &str,
    depth: usize,
) -> Result<(), CanonicalizationError> {
    if depth > MAX_DEPTH {
        return Err(CanonicalizationError::NonJsonType {
            detail: format!("nested deeper than {MAX_DEPTH} levels"),
        });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => emit_number(n, out, path)?,
        Value::String(s) => emit_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_value(item, out, &format!("{path}[{i}]"), depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Normalize keys before sorting so the ordering is over the
            // emitted form, then emit in code-point order.
            let mut entries: Vec<(String, &Value)> = map
                .iter()
                .map(|(k, v)| (k.nfc().collect::<String>(), v))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                emit_string(key, out);
                out.push(':');
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                emit_value(val, out, &child_path, depth + 1)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn emit_number(n: &Number, out: &mut String, path: &str) -> Result<(), CanonicalizationError> {
    if let Some(i) = n.as_i64() {
        let _ = write!(out, "{i}");
        return Ok(());
    }
    if let Some(u) = n.as_u64() {
        let _ = write!(out, "{u}");
        return Ok(());
    }
    Err(CanonicalizationError::FloatForbidden {
        path: if path.is_empty() { "$".into() } else { path.into() },
    })
}

/// Minimal escaping per RFC 8785: only `"`, `\`, and C0 controls.
fn emit_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.nfc() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if ('\u{0000}'..='\u{001F}').contains(&c) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively() {
        let value = json!({"z": 1, "a": {"d": 2, "b": 3}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"b":3,"d":2},"z":1}"#
        );
    }

    #[test]
    fn key_order_is_irrelevant() {
        let v1 = json!({"c": 3, "a": 1, "b": 2});
        let v2 = json!({"a": 1, "b": 2, "c": 3});
        assert_eq!(canonical_json(&v1).unwrap(), canonical_json(&v2).unwrap());
    }

    #[test]
    fn arrays_preserve_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(canonical_json(&value).unwrap(), "[3,1,2]");
    }

    #[test]
    fn floats_rejected_with_path() {
        let value = json!({"map": {"rate": 1.5}});
        let err = canonical_json(&value).unwrap_err();
        assert_eq!(
            err,
            CanonicalizationError::FloatForbidden {
                path: "map.rate".into()
            }
        );
    }

    #[test]
    fn integers_emitted_as_decimal() {
        let value = json!({"n": -42, "u": 9007199254740993u64});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"n":-42,"u":9007199254740993}"#
        );
    }

    #[test]
    fn strings_normalized_to_nfc() {
        // "e" + combining acute composes to U+00E9.
        let decomposed = json!("e\u{0301}");
        let composed = json!("\u{00e9}");
        assert_eq!(
            canonical_json(&decomposed).unwrap(),
            canonical_json(&composed).unwrap()
        );
    }

    #[test]
    fn nfc_keys_compare_equal() {
        let mut m1 = serde_json::Map::new();
        m1.insert("e\u{0301}".into(), json!(1));
        let mut m2 = serde_json::Map::new();
        m2.insert("\u{00e9}".into(), json!(1));
        assert_eq!(
            canonical_json(&Value::Object(m1)).unwrap(),
            canonical_json(&Value::Object(m2)).unwrap()
        );
    }

    #[test]
    fn set_array_sorts_by_type_then_form() {
        let value = json!(["b", 2, null, true, "a", [1], {"k": 1}]);
        assert_eq!(
            canonical_json_set_array(&value).unwrap(),
            r#"[null,true,2,"a","b",[1],{"k":1}]"#
        );
    }

    #[test]
    fn set_array_equality_under_permutation() {
        let v1 = json!(["s:AGE", "s:BRTHDT", "d:AGE"]);
        let v2 = json!(["d:AGE", "s:BRTHDT", "s:AGE"]);
        assert_eq!(
            canonical_json_set_array(&v1).unwrap(),
            canonical_json_set_array(&v2).unwrap()
        );
    }

    #[test]
    fn digest_is_stable_and_prefixed() {
        let value = json!({"a": 1});
        let d1 = digest_value(&value).unwrap();
        let d2 = digest_value(&value).unwrap();
        assert_eq!(d1, d2);
        assert!(d1.starts_with("sha256:"));
        assert_eq!(d1.len(), 7 + 64);
    }

    #[test]
    fn hash_params_none_matches_empty_object() {
        assert_eq!(
            hash_params(None).unwrap(),
            hash_params(Some(&json!({}))).unwrap()
        );
    }

    #[test]
    fn depth_bound_enforced() {
        let mut value = json!(0);
        for _ in 0..(MAX_DEPTH + 2) {
            value = json!([value]);
        }
        let err = canonical_json(&value).unwrap_err();
        assert!(matches!(err, CanonicalizationError::NonJsonType { .. }));
    }

    #[test]
    fn parse_bytes_rejects_invalid_utf8() {
        let err = parse_json_bytes(&[0xff, 0xfe]).unwrap_err();
        assert_eq!(err, CanonicalizationError::InvalidUtf8);
    }

    #[test]
    fn escaping_is_minimal() {
        let value = json!("line1\nquote\"back\\slash");
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#""line1\nquote\"back\\slash""#
        );
    }
}
