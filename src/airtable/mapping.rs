use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::record::ProfileRecord;

/// Canonical extraction keys and the table columns they land in unless
/// the configuration says otherwise.
pub const DEFAULT_FIELD_MAPPINGS: [(&str, &str); 7] = [
    ("fullName", "Name"),
    ("jobTitle", "Job Title"),
    ("company", "Company"),
    ("location", "Location"),
    ("profileUrl", "Profile URL"),
    ("profilePicture", "Profile Picture"),
    ("scrapedAt", "Scraped At"),
];

/// Resolve the column a canonical key writes to. An override that is
/// present but empty counts as unset.
pub fn target_name<'a>(key: &str, overrides: &'a HashMap<String, String>) -> Option<&'a str> {
    overrides
        .get(key)
        .map(String::as_str)
        .filter(|name| !name.is_empty())
        .or_else(|| default_target(key))
}

fn default_target(key: &str) -> Option<&'static str> {
    DEFAULT_FIELD_MAPPINGS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| *v)
}

/// Build the outgoing field map for one record. Empty values are left
/// out entirely; absence is the signal, not an empty cell.
pub fn map_record(
    record: &ProfileRecord,
    overrides: &HashMap<String, String>,
) -> BTreeMap<String, Value> {
    let mut fields = BTreeMap::new();
    for (key, value) in record.canonical_fields() {
        if matches!(&value, Value::String(s) if s.is_empty()) {
            continue;
        }
        let Some(target) = target_name(key, overrides) else {
            continue;
        };
        fields.insert(target.to_string(), value);
    }
    debug!(count = fields.len(), "record mapped to table fields");
    fields
}
