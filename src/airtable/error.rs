use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration incomplete: missing {0}")]
    ConfigIncomplete(String),
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected response shape: {0}")]
    Response(String),
    #[error("{}", .0.message)]
    Write(WriteFailure),
}

/// What went wrong with a write, coarse enough to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Auth,
    Permission,
    NotFound,
    RateLimited,
    UnknownField,
    TypeMismatch,
    OptionCreationDenied,
    InvalidRequest,
    Unknown,
}

impl FailureKind {
    /// Wire-format name, used for log rows as well as serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Auth => "auth",
            FailureKind::Permission => "permission",
            FailureKind::NotFound => "notFound",
            FailureKind::RateLimited => "rateLimited",
            FailureKind::UnknownField => "unknownField",
            FailureKind::TypeMismatch => "typeMismatch",
            FailureKind::OptionCreationDenied => "optionCreationDenied",
            FailureKind::InvalidRequest => "invalidRequest",
            FailureKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// A classified write rejection, carrying enough structure for the
/// caller to point at the offending fields instead of echoing raw API
/// noise.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    pub kind: FailureKind,
    pub message: String,
    pub unknown_fields: Vec<String>,
    pub field_errors: Vec<FieldError>,
}

impl WriteFailure {
    pub fn plain(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            unknown_fields: Vec::new(),
            field_errors: Vec::new(),
        }
    }
}

static DOUBLE_QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static SINGLE_QUOTED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']+)'").unwrap());

/// Turn a non-2xx response into a [`WriteFailure`]. The body is parsed
/// leniently: a non-JSON body is treated as an empty error object and
/// classification falls back to the HTTP status.
pub fn classify(status: u16, body: &str, sent: &BTreeMap<String, Value>) -> WriteFailure {
    let parsed: Value =
        serde_json::from_str(body).unwrap_or_else(|_| Value::Object(Default::default()));

    let (api_type, api_message) = match parsed.get("error") {
        Some(Value::String(s)) => (s.clone(), String::new()),
        Some(obj) => (
            obj.get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            obj.get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        None => (String::new(), String::new()),
    };

    match api_type.as_str() {
        "UNKNOWN_FIELD_NAME" => unknown_field(&api_message, sent),
        "INVALID_VALUE_FOR_COLUMN" => invalid_value(&api_message, sent),
        "INVALID_MULTIPLE_CHOICE_OPTIONS" => WriteFailure::plain(
            FailureKind::OptionCreationDenied,
            "The token is not allowed to create new select options. \
             Add the option in Airtable first, or grant the token schema editing rights.",
        ),
        "INVALID_PERMISSIONS_OR_MODEL_NOT_FOUND" => WriteFailure::plain(
            FailureKind::Permission,
            "Permission denied, or the base/table is not visible to this token.",
        ),
        "AUTHENTICATION_REQUIRED" | "UNAUTHORIZED" => auth_failure(),
        "NOT_FOUND" | "MODEL_ID_NOT_FOUND" | "TABLE_NOT_FOUND" => not_found(),
        t if t.starts_with("INVALID_REQUEST") => invalid_request(&api_message, sent),
        _ => from_status(status, &api_message),
    }
}

fn unknown_field(api_message: &str, sent: &BTreeMap<String, Value>) -> WriteFailure {
    let candidates = quoted_names(api_message);
    let field = candidates
        .iter()
        .find(|name| sent.contains_key(*name))
        .or(candidates.first())
        .cloned();

    match field {
        Some(name) => WriteFailure {
            kind: FailureKind::UnknownField,
            message: format!(
                "Unknown field name: \"{name}\". Create this field in the table \
                 or point the mapping at an existing one."
            ),
            unknown_fields: vec![name.clone()],
            field_errors: vec![FieldError {
                field: name,
                message: "does not exist in the target table".into(),
                hint: None,
            }],
        },
        None => WriteFailure::plain(
            FailureKind::UnknownField,
            "Airtable rejected a field name it does not know. \
             Check the field mappings against the table.",
        ),
    }
}

fn invalid_value(api_message: &str, sent: &BTreeMap<String, Value>) -> WriteFailure {
    let field = quoted_names(api_message)
        .into_iter()
        .find(|name| sent.contains_key(name));
    let lower = api_message.to_lowercase();

    let hint = if lower.contains("record id") {
        Some("this field links to records in another table and expects record ids, not text or URLs".to_string())
    } else if lower.contains("array") {
        Some("this field expects multiple values; send an array".to_string())
    } else if field
        .as_deref()
        .and_then(|f| sent.get(f))
        .is_some_and(value_looks_like_url)
    {
        Some("a URL was sent to a field whose type does not take one".to_string())
    } else {
        None
    };

    let base = match &field {
        Some(name) => format!("Airtable rejected the value sent to \"{name}\""),
        None => "Airtable rejected one of the field values".to_string(),
    };
    let message = match &hint {
        Some(h) => format!("{base}: {h}."),
        None if api_message.is_empty() => format!("{base}."),
        None => format!("{base}: {api_message}"),
    };

    WriteFailure {
        kind: FailureKind::TypeMismatch,
        message,
        unknown_fields: Vec::new(),
        field_errors: field
            .map(|name| {
                vec![FieldError {
                    field: name,
                    message: "value does not match the field's type".into(),
                    hint: hint.clone(),
                }]
            })
            .unwrap_or_default(),
    }
}

fn invalid_request(api_message: &str, sent: &BTreeMap<String, Value>) -> WriteFailure {
    let field = quoted_names(api_message)
        .into_iter()
        .find(|name| sent.contains_key(name));

    let message = match (&field, api_message.is_empty()) {
        (Some(name), _) => format!(
            "The request payload was not accepted; the field \"{name}\" looks involved. {api_message}"
        ),
        (None, false) => format!("The request payload was not accepted: {api_message}"),
        (None, true) => "The request payload was not accepted by Airtable.".to_string(),
    };

    WriteFailure {
        kind: FailureKind::InvalidRequest,
        message,
        unknown_fields: Vec::new(),
        field_errors: field
            .map(|name| {
                vec![FieldError {
                    field: name,
                    message: "rejected by Airtable".into(),
                    hint: None,
                }]
            })
            .unwrap_or_default(),
    }
}

fn from_status(status: u16, api_message: &str) -> WriteFailure {
    match status {
        401 => auth_failure(),
        403 => WriteFailure::plain(
            FailureKind::Permission,
            "Permission denied. The token lacks access to this base or table.",
        ),
        404 => not_found(),
        429 => WriteFailure::plain(
            FailureKind::RateLimited,
            "Airtable rate limit hit. Wait a moment and try again.",
        ),
        _ => {
            let message = if api_message.is_empty() {
                format!("Airtable request failed with status {status}.")
            } else {
                api_message.to_string()
            };
            WriteFailure::plain(FailureKind::Unknown, message)
        }
    }
}

fn auth_failure() -> WriteFailure {
    WriteFailure::plain(
        FailureKind::Auth,
        "Invalid API token. Check the token and make sure it has write access to records.",
    )
}

fn not_found() -> WriteFailure {
    WriteFailure::plain(
        FailureKind::NotFound,
        "Base or table not found. Check the base id and table id in the configuration.",
    )
}

fn quoted_names(message: &str) -> Vec<String> {
    DOUBLE_QUOTED_RE
        .captures_iter(message)
        .chain(SINGLE_QUOTED_RE.captures_iter(message))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn value_looks_like_url(value: &Value) -> bool {
    match value {
        Value::String(s) => s.starts_with("http://") || s.starts_with("https://"),
        Value::Array(items) => items.first().is_some_and(value_looks_like_url),
        _ => false,
    }
}
