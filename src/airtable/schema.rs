use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::error::SyncError;
use crate::db;

/// How long a fetched schema stays authoritative.
pub const SCHEMA_TTL_SECS: i64 = 300;

/// The Airtable field types this tool understands. Anything the API
/// reports outside this list (formula, rollup, whatever ships next)
/// lands on `Unknown` and is treated as text-like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    SingleLineText,
    MultilineText,
    RichText,
    Url,
    Email,
    PhoneNumber,
    SingleSelect,
    MultipleSelects,
    MultipleRecordLinks,
    MultipleAttachments,
    Number,
    Currency,
    Percent,
    Rating,
    Checkbox,
    Date,
    DateTime,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub const ALL: [FieldType; 18] = [
        FieldType::SingleLineText,
        FieldType::MultilineText,
        FieldType::RichText,
        FieldType::Url,
        FieldType::Email,
        FieldType::PhoneNumber,
        FieldType::SingleSelect,
        FieldType::MultipleSelects,
        FieldType::MultipleRecordLinks,
        FieldType::MultipleAttachments,
        FieldType::Number,
        FieldType::Currency,
        FieldType::Percent,
        FieldType::Rating,
        FieldType::Checkbox,
        FieldType::Date,
        FieldType::DateTime,
        FieldType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::SingleLineText => "singleLineText",
            FieldType::MultilineText => "multilineText",
            FieldType::RichText => "richText",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::PhoneNumber => "phoneNumber",
            FieldType::SingleSelect => "singleSelect",
            FieldType::MultipleSelects => "multipleSelects",
            FieldType::MultipleRecordLinks => "multipleRecordLinks",
            FieldType::MultipleAttachments => "multipleAttachments",
            FieldType::Number => "number",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Rating => "rating",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::Unknown => "unknown",
        }
    }

    /// Shape of the JSON value the write API accepts for this type, for
    /// validation messages.
    pub fn expects(&self) -> &'static str {
        match self {
            FieldType::MultipleRecordLinks => "an array of record ids",
            FieldType::MultipleSelects => "an array of option names",
            FieldType::MultipleAttachments => "an array of attachment objects with a url",
            FieldType::Number | FieldType::Currency | FieldType::Percent | FieldType::Rating => {
                "a number"
            }
            FieldType::Checkbox => "a boolean",
            _ => "a string",
        }
    }
}

/// Which table in which base, everywhere one is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableIdentity {
    pub base_id: String,
    pub table_id: String,
}

impl TableIdentity {
    pub fn new(base_id: impl Into<String>, table_id: impl Into<String>) -> Self {
        Self {
            base_id: base_id.into(),
            table_id: table_id.into(),
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.base_id, self.table_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

/// A table's fields as last seen on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSchema {
    fields: Vec<FieldInfo>,
}

impl RemoteSchema {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.field_type)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field_type(name).is_some()
    }

    pub fn type_map(&self) -> HashMap<String, FieldType> {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.field_type))
            .collect()
    }
}

#[allow(async_fn_in_trait)]
pub trait SchemaFetcher {
    async fn fetch_schema(&self, table: &TableIdentity) -> Result<RemoteSchema, SyncError>;
}

struct CacheEntry {
    schema: RemoteSchema,
    fetched_at: DateTime<Utc>,
}

/// In-memory schema cache with a durable copy behind it. Entries are
/// replaced whole (schema plus timestamp), never merged.
#[derive(Default)]
pub struct SchemaCache {
    entries: HashMap<String, CacheEntry>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a schema from the freshest source available: memory
    /// within TTL, then a live fetch, then the stale memory copy, then
    /// the durable copy. `None` means nothing is known about the table
    /// and schema validation is skipped entirely.
    pub async fn get<F: SchemaFetcher>(
        &mut self,
        table: &TableIdentity,
        now: DateTime<Utc>,
        fetcher: &F,
        store: Option<&Connection>,
    ) -> Option<RemoteSchema> {
        let key = table.cache_key();
        if let Some(entry) = self.entries.get(&key) {
            if (now - entry.fetched_at).num_seconds() < SCHEMA_TTL_SECS {
                debug!(table = %key, "schema cache hit");
                return Some(entry.schema.clone());
            }
        }

        match fetcher.fetch_schema(table).await {
            Ok(schema) => {
                if let Some(conn) = store {
                    if let Err(e) = db::save_schema_cache(conn, table, &schema, now) {
                        warn!(error = %e, "failed to persist schema cache");
                    }
                }
                self.entries.insert(
                    key,
                    CacheEntry {
                        schema: schema.clone(),
                        fetched_at: now,
                    },
                );
                Some(schema)
            }
            Err(e) => {
                warn!(error = %e, table = %key, "schema fetch failed, falling back");
                if let Some(entry) = self.entries.get(&key) {
                    return Some(entry.schema.clone());
                }
                if let Some(conn) = store {
                    match db::load_schema_cache(conn, table) {
                        Ok(Some((schema, fetched_at))) => {
                            self.entries.insert(
                                key,
                                CacheEntry {
                                    schema: schema.clone(),
                                    fetched_at,
                                },
                            );
                            return Some(schema);
                        }
                        Ok(None) => {}
                        Err(e) => warn!(error = %e, "failed to read durable schema cache"),
                    }
                }
                None
            }
        }
    }
}
