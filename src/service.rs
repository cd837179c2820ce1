use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::airtable::client::AirtableClient;
use crate::airtable::error::{FieldError, SyncError};
use crate::airtable::schema::{FieldType, SchemaCache};
use crate::airtable::validate::ExcludedField;
use crate::airtable::{mapping, prepare_fields, PreparedFields};
use crate::config::SyncConfig;
use crate::db::{self, NewSyncLog};
use crate::extract::orchestrator::{Clock, DocumentSource, Orchestrator, TriggerOutcome};
use crate::record::ProfileRecord;

// ── Response envelopes ──

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProfileRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded_fields: Vec<ExcludedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

impl SaveResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            record_id: None,
            message: None,
            excluded_fields: Vec::new(),
            error: Some(error),
            unknown_fields: Vec::new(),
            field_errors: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTestResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_errors: Vec<FieldError>,
}

impl MappingTestResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error),
            unknown_fields: Vec::new(),
            field_errors: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsResponse {
    pub success: bool,
    pub fields: Vec<FieldSummary>,
    pub field_types: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FieldsResponse {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            fields: Vec::new(),
            field_types: Vec::new(),
            error: Some(error),
        }
    }
}

// ── Operations ──

/// Run one supervised extraction pass over the source.
pub async fn extract_profile<S, C>(orch: &Orchestrator<S, C>) -> ExtractResponse
where
    S: DocumentSource,
    C: Clock,
{
    match orch.trigger().await {
        Ok(TriggerOutcome::Record(record)) => ExtractResponse {
            success: true,
            data: Some(record),
            error: None,
        },
        Ok(TriggerOutcome::AlreadyRunning) => ExtractResponse {
            success: false,
            data: None,
            error: Some("extraction already in progress".into()),
        },
        Err(e) => ExtractResponse {
            success: false,
            data: None,
            error: Some(e.to_string()),
        },
    }
}

/// Map, coerce, validate, then write one record. Failures come back in
/// the envelope; nothing here panics or retries on its own.
pub async fn save_to_airtable(
    record: &ProfileRecord,
    config: &SyncConfig,
    cache: &mut SchemaCache,
    store: Option<&Connection>,
) -> SaveResponse {
    if let Err(e) = config.ensure_complete() {
        return SaveResponse::failure(e.to_string());
    }
    let client = match AirtableClient::new(config.api_token.clone()) {
        Ok(client) => client,
        Err(e) => return SaveResponse::failure(e.to_string()),
    };
    let table = config.table_identity();
    let schema = cache.get(&table, Utc::now(), &client, store).await;
    let PreparedFields { fields, excluded } =
        prepare_fields(record, &config.field_mappings, schema.as_ref());

    if fields.is_empty() {
        let mut resp =
            SaveResponse::failure("no fields left to send after mapping and validation".into());
        resp.excluded_fields = excluded;
        return resp;
    }

    if config.prevent_duplicates && !record.profile_url.is_empty() {
        if let Some(url_field) = mapping::target_name("profileUrl", &config.field_mappings) {
            match client
                .find_record_by_field(&table, url_field, &record.profile_url)
                .await
            {
                Ok(Some(existing)) => {
                    info!(record = %existing, "duplicate found, skipping write");
                    log_outcome(store, record, Some(&existing), "duplicate", None, &excluded);
                    return SaveResponse {
                        success: true,
                        record_id: Some(existing),
                        message: Some(
                            "Profile already in the table; duplicate write prevented.".into(),
                        ),
                        excluded_fields: excluded,
                        error: None,
                        unknown_fields: Vec::new(),
                        field_errors: Vec::new(),
                    };
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "duplicate lookup failed, writing anyway"),
            }
        }
    }

    match client.create_record(&table, &fields).await {
        Ok(id) => {
            log_outcome(store, record, Some(&id), "saved", None, &excluded);
            SaveResponse {
                success: true,
                record_id: Some(id),
                message: Some(format!("Saved {} field(s).", fields.len())),
                excluded_fields: excluded,
                error: None,
                unknown_fields: Vec::new(),
                field_errors: Vec::new(),
            }
        }
        Err(SyncError::Write(failure)) => {
            let outcome = format!("failed:{}", failure.kind.as_str());
            log_outcome(
                store,
                record,
                None,
                &outcome,
                Some(&failure.message),
                &excluded,
            );
            SaveResponse {
                success: false,
                record_id: None,
                message: None,
                excluded_fields: excluded,
                error: Some(failure.message),
                unknown_fields: failure.unknown_fields,
                field_errors: failure.field_errors,
            }
        }
        Err(e) => {
            let detail = e.to_string();
            log_outcome(store, record, None, "failed", Some(&detail), &excluded);
            let mut resp = SaveResponse::failure(detail);
            resp.excluded_fields = excluded;
            resp
        }
    }
}

/// One cheap read against the table to prove the credentials work.
pub async fn test_airtable_connection(config: &SyncConfig) -> ConnectionResponse {
    if let Err(e) = config.ensure_complete() {
        return ConnectionResponse {
            success: false,
            message: None,
            error: Some(e.to_string()),
        };
    }
    let client = match AirtableClient::new(config.api_token.clone()) {
        Ok(client) => client,
        Err(e) => {
            return ConnectionResponse {
                success: false,
                message: None,
                error: Some(e.to_string()),
            }
        }
    };
    match client.test_connection(&config.table_identity()).await {
        Ok(()) => ConnectionResponse {
            success: true,
            message: Some("Connection to the table verified.".into()),
            error: None,
        },
        Err(e) => ConnectionResponse {
            success: false,
            message: None,
            error: Some(e.to_string()),
        },
    }
}

/// Write a throwaway record through the full pipeline, then delete it.
/// Cleanup is best effort; a failed delete is logged, never surfaced.
pub async fn test_field_mappings(
    record: &ProfileRecord,
    config: &SyncConfig,
    cache: &mut SchemaCache,
    store: Option<&Connection>,
) -> MappingTestResponse {
    if let Err(e) = config.ensure_complete() {
        return MappingTestResponse::failure(e.to_string());
    }
    let client = match AirtableClient::new(config.api_token.clone()) {
        Ok(client) => client,
        Err(e) => return MappingTestResponse::failure(e.to_string()),
    };
    let table = config.table_identity();
    let schema = cache.get(&table, Utc::now(), &client, store).await;
    let PreparedFields { fields, excluded } =
        prepare_fields(record, &config.field_mappings, schema.as_ref());
    if fields.is_empty() {
        return MappingTestResponse::failure("mapping produced no fields to test".into());
    }

    match client.create_record(&table, &fields).await {
        Ok(id) => {
            if let Err(e) = client.delete_record(&table, &id).await {
                warn!(record = %id, error = %e, "test record cleanup failed");
            }
            let mut message = format!("Mappings verified; {} field(s) accepted", fields.len());
            if !excluded.is_empty() {
                message.push_str(&format!(", {} excluded locally", excluded.len()));
            }
            message.push('.');
            MappingTestResponse {
                success: true,
                message: Some(message),
                error: None,
                unknown_fields: Vec::new(),
                field_errors: Vec::new(),
            }
        }
        Err(SyncError::Write(failure)) => MappingTestResponse {
            success: false,
            message: None,
            error: Some(failure.message),
            unknown_fields: failure.unknown_fields,
            field_errors: failure.field_errors,
        },
        Err(e) => MappingTestResponse::failure(e.to_string()),
    }
}

/// List the target table's columns straight from the meta API, keeping
/// the durable cache copy warm as a side effect.
pub async fn fetch_available_fields(
    config: &SyncConfig,
    store: Option<&Connection>,
) -> FieldsResponse {
    if let Err(e) = config.ensure_complete() {
        return FieldsResponse::failure(e.to_string());
    }
    let client = match AirtableClient::new(config.api_token.clone()) {
        Ok(client) => client,
        Err(e) => return FieldsResponse::failure(e.to_string()),
    };
    let table = config.table_identity();
    match client.fetch_table_schema(&table).await {
        Ok(schema) => {
            if let Some(conn) = store {
                if let Err(e) = db::save_schema_cache(conn, &table, &schema, Utc::now()) {
                    warn!(error = %e, "failed to persist schema cache");
                }
            }
            let fields = schema
                .fields()
                .iter()
                .map(|f| FieldSummary {
                    name: f.name.clone(),
                    field_type: f.field_type.as_str().to_string(),
                })
                .collect();
            FieldsResponse {
                success: true,
                fields,
                field_types: FieldType::ALL.iter().map(|t| t.as_str()).collect(),
                error: None,
            }
        }
        Err(e) => FieldsResponse::failure(e.to_string()),
    }
}

/// Stand-in record for mapping tests run without a captured page.
pub fn sample_record() -> ProfileRecord {
    ProfileRecord {
        full_name: "Test Contact".into(),
        job_title: "Connection Test".into(),
        company: "Example Co".into(),
        location: "Test City".into(),
        profile_url: "https://example.com/in/test-contact".into(),
        profile_picture: String::new(),
        scraped_at: Utc::now(),
    }
}

fn log_outcome(
    store: Option<&Connection>,
    record: &ProfileRecord,
    record_id: Option<&str>,
    outcome: &str,
    detail: Option<&str>,
    excluded: &[ExcludedField],
) {
    let Some(conn) = store else { return };
    let entry = NewSyncLog {
        profile_url: &record.profile_url,
        full_name: &record.full_name,
        record_id,
        outcome,
        detail,
        excluded_count: excluded.len(),
    };
    if let Err(e) = db::log_sync(conn, &entry) {
        warn!(error = %e, "failed to record sync history");
    }
}
