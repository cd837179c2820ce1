use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::schema::{FieldType, RemoteSchema};

/// A field dropped before the write, with enough context to tell the
/// user what happened to it and why.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedField {
    pub field: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_type: Option<String>,
    pub original_value: Value,
}

pub struct Validated {
    pub valid: BTreeMap<String, Value>,
    pub excluded: Vec<ExcludedField>,
}

/// Check transformed values against the known schema. With no schema at
/// all, everything passes. Empty values are dropped silently; they are
/// expected, not errors.
pub fn validate_fields(
    fields: BTreeMap<String, Value>,
    schema: Option<&RemoteSchema>,
) -> Validated {
    let mut valid = BTreeMap::new();
    let mut excluded = Vec::new();

    for (name, value) in fields {
        if is_empty(&value) {
            debug!(field = %name, "empty value skipped");
            continue;
        }
        let Some(schema) = schema else {
            valid.insert(name, value);
            continue;
        };
        match schema.field_type(&name) {
            None => excluded.push(ExcludedField {
                field: name,
                reason: "does not exist in the target schema".into(),
                expected_type: None,
                original_value: value,
            }),
            Some(ft) => match shape_error(&value, ft) {
                None => {
                    valid.insert(name, value);
                }
                Some(reason) => excluded.push(ExcludedField {
                    field: name,
                    reason,
                    expected_type: Some(ft.as_str().to_string()),
                    original_value: value,
                }),
            },
        }
    }

    Validated { valid, excluded }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn shape_error(value: &Value, ft: FieldType) -> Option<String> {
    match ft {
        FieldType::MultipleRecordLinks => {
            let Some(items) = value.as_array() else {
                return Some(mismatch(ft, value));
            };
            if !items.iter().all(Value::is_string) {
                return Some(format!("expected {}, got mixed array entries", ft.expects()));
            }
            if items.iter().filter_map(Value::as_str).any(looks_like_url) {
                return Some("linked records need record ids, not URLs".to_string());
            }
            None
        }
        FieldType::MultipleSelects => {
            let ok = value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string));
            (!ok).then(|| mismatch(ft, value))
        }
        FieldType::MultipleAttachments => {
            let ok = value.as_array().is_some_and(|items| {
                items
                    .iter()
                    .all(|item| item.get("url").is_some_and(Value::is_string))
            });
            (!ok).then(|| mismatch(ft, value))
        }
        FieldType::Number | FieldType::Currency | FieldType::Percent | FieldType::Rating => {
            (!value.is_number()).then(|| mismatch(ft, value))
        }
        FieldType::Checkbox => (!value.is_boolean()).then(|| mismatch(ft, value)),
        _ => (!value.is_string()).then(|| mismatch(ft, value)),
    }
}

fn mismatch(ft: FieldType, value: &Value) -> String {
    format!("expected {}, got {}", ft.expects(), kind_of(value))
}

fn looks_like_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airtable::schema::FieldInfo;
    use serde_json::json;

    fn schema() -> RemoteSchema {
        RemoteSchema::new(vec![
            FieldInfo {
                id: "fld1".into(),
                name: "Name".into(),
                field_type: FieldType::SingleLineText,
            },
            FieldInfo {
                id: "fld2".into(),
                name: "Score".into(),
                field_type: FieldType::Number,
            },
            FieldInfo {
                id: "fld3".into(),
                name: "Related".into(),
                field_type: FieldType::MultipleRecordLinks,
            },
            FieldInfo {
                id: "fld4".into(),
                name: "Done".into(),
                field_type: FieldType::Checkbox,
            },
        ])
    }

    fn fields(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn no_schema_accepts_everything_nonempty() {
        let out = validate_fields(
            fields(&[("Whatever", json!("x")), ("Odd", json!([1, 2]))]),
            None,
        );
        assert_eq!(out.valid.len(), 2);
        assert!(out.excluded.is_empty());
    }

    #[test]
    fn unknown_field_is_excluded_with_reason() {
        let out = validate_fields(fields(&[("Ghost", json!("boo"))]), Some(&schema()));
        assert!(out.valid.is_empty());
        assert_eq!(out.excluded.len(), 1);
        assert_eq!(out.excluded[0].field, "Ghost");
        assert!(out.excluded[0].reason.contains("does not exist"));
        assert_eq!(out.excluded[0].expected_type, None);
    }

    #[test]
    fn shape_mismatches_are_excluded_with_expected_type() {
        let out = validate_fields(
            fields(&[("Score", json!("fast")), ("Done", json!("yes"))]),
            Some(&schema()),
        );
        assert!(out.valid.is_empty());
        assert_eq!(out.excluded.len(), 2);
        let score = out.excluded.iter().find(|e| e.field == "Score").unwrap();
        assert_eq!(score.expected_type.as_deref(), Some("number"));
        assert!(score.reason.contains("expected a number, got a string"));
    }

    #[test]
    fn record_link_url_entries_are_categorically_excluded() {
        let out = validate_fields(
            fields(&[("Related", json!(["https://example.com/in/jane"]))]),
            Some(&schema()),
        );
        assert_eq!(out.excluded.len(), 1);
        assert!(out.excluded[0].reason.contains("record ids, not URLs"));
    }

    #[test]
    fn record_link_id_arrays_pass() {
        let out = validate_fields(
            fields(&[("Related", json!(["rec111", "rec222"]))]),
            Some(&schema()),
        );
        assert_eq!(out.valid.len(), 1);
    }

    #[test]
    fn empty_values_are_skipped_silently() {
        let out = validate_fields(
            fields(&[
                ("Name", json!("")),
                ("Related", json!([])),
                ("Score", json!(null)),
            ]),
            Some(&schema()),
        );
        assert!(out.valid.is_empty());
        assert!(out.excluded.is_empty());
    }

    #[test]
    fn matching_shapes_pass_through() {
        let out = validate_fields(
            fields(&[
                ("Name", json!("Jane Doe")),
                ("Score", json!(10)),
                ("Done", json!(true)),
            ]),
            Some(&schema()),
        );
        assert_eq!(out.valid.len(), 3);
        assert!(out.excluded.is_empty());
    }
}
