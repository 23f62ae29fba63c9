//! Key-case conversion between storage rows and application records.
//!
//! Remote rows use snake_case column names (`fee_structure`, `paid_amount`)
//! while the in-memory models, the mirror and export files use camelCase
//! (`feeStructure`, `paidAmount`). Conversion is a pure key-renaming projection
//! that recurses through nested objects and arrays; scalar values are never
//! touched.

use serde_json::{Map, Value};

/// Converts a single snake_case key to camelCase.
///
/// Only an underscore followed by a lowercase ASCII letter is folded, so
/// `line_2` and `a_` stay as they are and the conversion can be undone by
/// [`snake_key`].
pub fn camel_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(next) = chars.peek().copied() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Converts a single camelCase key to snake_case.
pub fn snake_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Recursively renames every object key from snake_case to camelCase.
pub fn to_camel_case(value: Value) -> Value {
    rename_keys(value, camel_key)
}

/// Recursively renames every object key from camelCase to snake_case.
pub fn to_snake_case(value: Value) -> Value {
    rename_keys(value, snake_key)
}

fn rename_keys(value: Value, rename: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (rename(&k), rename_keys(v, rename)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| rename_keys(v, rename)).collect())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_camel_key() {
        assert_eq!(camel_key("fee_structure"), "feeStructure");
        assert_eq!(camel_key("paid_amount"), "paidAmount");
        assert_eq!(camel_key("id"), "id");
        assert_eq!(camel_key("address_line_2"), "addressLine_2");
    }

    #[test]
    fn test_snake_key() {
        assert_eq!(snake_key("feeStructure"), "fee_structure");
        assert_eq!(snake_key("schoolId"), "school_id");
        assert_eq!(snake_key("addressLine_2"), "address_line_2");
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let row = json!({
            "student_id": "s1",
            "fee_structure": [{"fee_head_id": "h1", "amount": 500}],
            "payment_history": [{"amount": 100, "date": "2024-03-02"}],
            "meta": {"last_login": null}
        });

        let camel = to_camel_case(row.clone());
        assert_eq!(camel["studentId"], "s1");
        assert_eq!(camel["feeStructure"][0]["feeHeadId"], "h1");
        assert_eq!(camel["paymentHistory"][0]["amount"], 100);
        assert!(camel["meta"].get("lastLogin").is_some());

        assert_eq!(to_snake_case(camel), row);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(to_camel_case(json!("some_text")), json!("some_text"));
        assert_eq!(to_camel_case(json!(42)), json!(42));
        assert_eq!(to_snake_case(Value::Null), Value::Null);
    }

    #[test]
    fn test_string_values_are_not_renamed() {
        let camel = to_camel_case(json!({"status": "pending_approval"}));
        assert_eq!(camel["status"], "pending_approval");
    }

    proptest! {
        #[test]
        fn prop_snake_keys_round_trip(key in "[a-z0-9_]{0,24}") {
            prop_assert_eq!(snake_key(&camel_key(&key)), key);
        }

        #[test]
        fn prop_record_key_set_round_trips(keys in prop::collection::btree_set("[a-z][a-z0-9_]{0,16}", 0..8)) {
            let record: Map<String, Value> = keys
                .iter()
                .map(|k| (k.clone(), Value::from(k.len())))
                .collect();
            let original = Value::Object(record);
            let back = to_snake_case(to_camel_case(original.clone()));
            prop_assert_eq!(back, original);
        }
    }
}
