use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::error::{classify, FailureKind, SyncError, WriteFailure};
use super::schema::{FieldInfo, RemoteSchema, SchemaFetcher, TableIdentity};

pub const API_BASE: &str = "https://api.airtable.com/v0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static BASE_URL: LazyLock<Url> = LazyLock::new(|| Url::parse(API_BASE).expect("static base url"));

/// Thin wrapper over the REST endpoints this tool needs. All failures
/// come back as `SyncError`; non-2xx responses are classified before
/// being surfaced so callers never see raw status codes.
pub struct AirtableClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize)]
struct MetaTables {
    tables: Vec<MetaTable>,
}

#[derive(Deserialize)]
struct MetaTable {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<FieldInfo>,
}

impl AirtableClient {
    pub fn new(token: impl Into<String>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            token: token.into(),
        })
    }

    /// One cheap list call to prove the token, base, and table all line up.
    pub async fn test_connection(&self, table: &TableIdentity) -> Result<(), SyncError> {
        let mut url = table_url(table);
        url.query_pairs_mut().append_pair("maxRecords", "1");

        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(table = %table.cache_key(), "connection ok");
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::Write(classify(
            status.as_u16(),
            &body,
            &BTreeMap::new(),
        )))
    }

    /// Create one record. The `typecast` flag lets the server coerce
    /// near-miss values (select options, dates) instead of rejecting them.
    pub async fn create_record(
        &self,
        table: &TableIdentity,
        fields: &BTreeMap<String, Value>,
    ) -> Result<String, SyncError> {
        let mut url = table_url(table);
        url.query_pairs_mut().append_pair("typecast", "true");

        let body = json!({ "fields": fields });
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SyncError::Write(classify(status.as_u16(), &text, fields)));
        }

        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        match parsed.get("id").and_then(Value::as_str) {
            Some(id) => {
                info!(record = id, "record created");
                Ok(id.to_string())
            }
            None => Err(SyncError::Response(
                "create response carried no record id".into(),
            )),
        }
    }

    pub async fn delete_record(
        &self,
        table: &TableIdentity,
        record_id: &str,
    ) -> Result<(), SyncError> {
        let resp = self
            .http
            .delete(record_url(table, record_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::Write(classify(
            status.as_u16(),
            &body,
            &BTreeMap::new(),
        )))
    }

    /// Look up at most one record whose `field` equals `value` exactly.
    pub async fn find_record_by_field(
        &self,
        table: &TableIdentity,
        field: &str,
        value: &str,
    ) -> Result<Option<String>, SyncError> {
        let mut url = table_url(table);
        url.query_pairs_mut()
            .append_pair("filterByFormula", &equality_filter(field, value))
            .append_pair("maxRecords", "1");

        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SyncError::Write(classify(
                status.as_u16(),
                &text,
                &BTreeMap::new(),
            )));
        }

        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let id = parsed
            .get("records")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .and_then(|r| r.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(id)
    }

    /// Pull the base's table listing and return the fields of the one
    /// matching our table by id or by name.
    pub async fn fetch_table_schema(
        &self,
        table: &TableIdentity,
    ) -> Result<RemoteSchema, SyncError> {
        let resp = self
            .http
            .get(meta_url(&table.base_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(SyncError::Write(classify(
                status.as_u16(),
                &text,
                &BTreeMap::new(),
            )));
        }

        let listing: MetaTables = serde_json::from_str(&text)
            .map_err(|e| SyncError::Response(format!("unreadable schema listing: {e}")))?;
        let found = listing
            .tables
            .into_iter()
            .find(|t| t.id == table.table_id || t.name == table.table_id);
        match found {
            Some(t) => {
                debug!(table = %t.name, fields = t.fields.len(), "schema fetched");
                Ok(RemoteSchema::new(t.fields))
            }
            None => Err(SyncError::Write(WriteFailure::plain(
                FailureKind::NotFound,
                format!(
                    "table {} not found in base {}",
                    table.table_id, table.base_id
                ),
            ))),
        }
    }
}

impl SchemaFetcher for AirtableClient {
    async fn fetch_schema(&self, table: &TableIdentity) -> Result<RemoteSchema, SyncError> {
        self.fetch_table_schema(table).await
    }
}

fn table_url(table: &TableIdentity) -> Url {
    let mut url = BASE_URL.clone();
    url.path_segments_mut()
        .expect("static base url has a path")
        .push(&table.base_id)
        .push(&table.table_id);
    url
}

fn record_url(table: &TableIdentity, record_id: &str) -> Url {
    let mut url = table_url(table);
    url.path_segments_mut()
        .expect("static base url has a path")
        .push(record_id);
    url
}

fn meta_url(base_id: &str) -> Url {
    let mut url = BASE_URL.clone();
    url.path_segments_mut()
        .expect("static base url has a path")
        .extend(["meta", "bases", base_id, "tables"]);
    url
}

/// `{Field}='value'` with quotes and backslashes escaped so user data
/// cannot break out of the string literal.
fn equality_filter(field: &str, value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("{{{field}}}='{escaped}'")
}
