pub mod client;
pub mod error;
pub mod mapping;
pub mod schema;
pub mod transform;
pub mod validate;

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::debug;

use crate::record::ProfileRecord;
use schema::RemoteSchema;
use transform::Coerced;
use validate::{ExcludedField, Validated};

pub struct PreparedFields {
    pub fields: BTreeMap<String, Value>,
    pub excluded: Vec<ExcludedField>,
}

/// Full field pipeline: rename per the mapping table, coerce each value
/// toward its column type, then drop whatever the schema cannot take.
/// Running it twice over the same record yields the same payload.
pub fn prepare_fields(
    record: &ProfileRecord,
    overrides: &HashMap<String, String>,
    schema: Option<&RemoteSchema>,
) -> PreparedFields {
    let mapped = mapping::map_record(record, overrides);

    let mut transformed = BTreeMap::new();
    let mut excluded = Vec::new();
    for (name, value) in mapped {
        let ft = schema.and_then(|s| s.field_type(&name));
        match transform::transform_field(&name, &value, ft) {
            Coerced::Value(v) => {
                transformed.insert(name, v);
            }
            Coerced::Exclude(reason) => {
                debug!(field = %name, %reason, "value not coercible");
                excluded.push(ExcludedField {
                    field: name,
                    reason,
                    expected_type: ft.map(|t| t.as_str().to_string()),
                    original_value: value,
                });
            }
        }
    }

    let Validated {
        valid,
        excluded: rejected,
    } = validate::validate_fields(transformed, schema);
    excluded.extend(rejected);

    PreparedFields {
        fields: valid,
        excluded,
    }
}
