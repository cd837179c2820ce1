use serde_json::{json, Number, Value};
use url::Url;

use super::schema::FieldType;

/// Outcome of coercing one value toward its column's type.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    Value(Value),
    /// The value cannot be represented in this column at all.
    Exclude(String),
}

/// Reshape a mapped value for its column. With no known type (schema
/// unavailable, or column not in it) a name-based heuristic decides;
/// the write API's typecast mode absorbs the rest.
pub fn transform_field(name: &str, value: &Value, field_type: Option<FieldType>) -> Coerced {
    let Some(ft) = field_type else {
        return heuristic(name, value);
    };
    match ft {
        FieldType::MultipleAttachments => Coerced::Value(to_attachments(value)),
        FieldType::MultipleRecordLinks => to_record_links(value),
        FieldType::MultipleSelects => Coerced::Value(to_multi_select(value)),
        FieldType::SingleSelect => Coerced::Value(Value::String(to_select_option(value))),
        FieldType::Number | FieldType::Currency | FieldType::Percent | FieldType::Rating => {
            to_number(value)
        }
        FieldType::Checkbox => Coerced::Value(Value::Bool(truthy(value))),
        FieldType::Date | FieldType::DateTime => Coerced::Value(Value::String(stringify(value))),
        FieldType::SingleLineText
        | FieldType::MultilineText
        | FieldType::RichText
        | FieldType::Unknown => Coerced::Value(Value::String(clean_text(value))),
        FieldType::Url | FieldType::Email | FieldType::PhoneNumber => {
            Coerced::Value(Value::String(stringify(value)))
        }
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text columns get trimmed and stripped of one layer of wrapping quotes
/// left behind by sloppy upstream serialization.
fn clean_text(value: &Value) -> String {
    let s = stringify(value);
    let trimmed = s.trim();
    let unwrapped = trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|rest| rest.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    unwrapped.trim().to_string()
}

/// URL strings and object-with-url entries both become attachment
/// objects; anything else is dropped, and unusable shapes collapse to
/// an empty array.
fn to_attachments(value: &Value) -> Value {
    match value {
        Value::String(s) if is_url(s) => json!([{ "url": s }]),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if is_url(s) => Some(json!({ "url": s })),
                    Value::Object(obj) => obj
                        .get("url")
                        .and_then(Value::as_str)
                        .filter(|u| is_url(u))
                        .map(|u| json!({ "url": u })),
                    _ => None,
                })
                .collect(),
        ),
        _ => Value::Array(Vec::new()),
    }
}

/// Record ids cannot be conjured from arbitrary data. Plain identifier
/// strings (single or comma-separated) and arrays of them pass; URLs
/// and empty values are excluded outright.
fn to_record_links(value: &Value) -> Coerced {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Coerced::Exclude("empty value for a linked-record field".into());
            }
            if is_url(trimmed) {
                return Coerced::Exclude("linked-record fields take record ids, not URLs".into());
            }
            let ids: Vec<Value> = trimmed
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| Value::String(id.to_string()))
                .collect();
            if ids.is_empty() {
                Coerced::Exclude("empty value for a linked-record field".into())
            } else {
                Coerced::Value(Value::Array(ids))
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                return Coerced::Exclude("empty value for a linked-record field".into());
            }
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                let id = stringify(item);
                if is_url(&id) {
                    return Coerced::Exclude(
                        "linked-record fields take record ids, not URLs".into(),
                    );
                }
                ids.push(Value::String(id));
            }
            Coerced::Value(Value::Array(ids))
        }
        _ => Coerced::Exclude("linked-record fields take an array of record ids".into()),
    }
}

fn to_multi_select(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_string()))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| Value::String(stringify(item)))
                .collect(),
        ),
        other => Value::Array(vec![Value::String(stringify(other))]),
    }
}

fn to_select_option(value: &Value) -> String {
    match value {
        Value::Array(items) => items.first().map(clean_text).unwrap_or_default(),
        other => clean_text(other),
    }
}

fn to_number(value: &Value) -> Coerced {
    if let Value::Number(n) = value {
        return Coerced::Value(Value::Number(n.clone()));
    }
    let text = stringify(value);
    match text.trim().parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Coerced::Value(Value::Number(n)),
        None => Coerced::Exclude(format!("\"{}\" is not numeric", preview(&text))),
    }
}

/// Lenient truthiness for checkbox columns: real booleans pass through,
/// the strings "true" and "1" count, non-zero numbers count, everything
/// else is false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "1",
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// With no schema to consult, the field name is the only signal:
/// picture-ish names keep their URL, tag-ish names with commas become
/// arrays. Everything else passes through untouched.
fn heuristic(name: &str, value: &Value) -> Coerced {
    let lower = name.to_lowercase();
    if let Value::String(s) = value {
        if is_url(s)
            && (lower.contains("picture")
                || lower.contains("photo")
                || lower.contains("image")
                || lower.contains("avatar"))
        {
            return Coerced::Value(value.clone());
        }
        if lower.contains("tag") || lower.contains("categor") {
            let parts: Vec<&str> = s
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect();
            if parts.len() > 1 {
                return Coerced::Value(Value::Array(
                    parts
                        .into_iter()
                        .map(|part| Value::String(part.to_string()))
                        .collect(),
                ));
            }
        }
    }
    Coerced::Value(value.clone())
}

fn is_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn preview(text: &str) -> String {
    if text.chars().count() <= 40 {
        text.to_string()
    } else {
        let cut: String = text.chars().take(40).collect();
        format!("{cut}...")
    }
}
