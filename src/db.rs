use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::airtable::schema::{FieldInfo, RemoteSchema, TableIdentity};

const DB_PATH: &str = "data/profile_sync.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_cache (
            cache_key     TEXT PRIMARY KEY,
            field_types   TEXT NOT NULL,
            field_details TEXT NOT NULL,
            fetched_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sync_log (
            id             INTEGER PRIMARY KEY,
            profile_url    TEXT NOT NULL,
            full_name      TEXT NOT NULL,
            record_id      TEXT,
            outcome        TEXT NOT NULL,
            detail         TEXT,
            excluded_count INTEGER NOT NULL DEFAULT 0,
            synced_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_sync_log_url ON sync_log(profile_url);
        ",
    )?;
    Ok(())
}

// ── Schema cache ──

pub fn save_schema_cache(
    conn: &Connection,
    table: &TableIdentity,
    schema: &RemoteSchema,
    fetched_at: DateTime<Utc>,
) -> Result<()> {
    let field_types = serde_json::to_string(&schema.type_map())?;
    let field_details = serde_json::to_string(schema.fields())?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_cache (cache_key, field_types, field_details, fetched_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            table.cache_key(),
            field_types,
            field_details,
            fetched_at.to_rfc3339()
        ],
    )?;
    Ok(())
}

pub fn load_schema_cache(
    conn: &Connection,
    table: &TableIdentity,
) -> Result<Option<(RemoteSchema, DateTime<Utc>)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT field_details, fetched_at FROM schema_cache WHERE cache_key = ?1",
            [table.cache_key()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((details, fetched_at)) = row else {
        return Ok(None);
    };

    let fields: Vec<FieldInfo> = serde_json::from_str(&details)
        .with_context(|| format!("corrupt schema cache for {}", table.cache_key()))?;
    let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
        .with_context(|| format!("bad schema cache timestamp for {}", table.cache_key()))?
        .with_timezone(&Utc);
    Ok(Some((RemoteSchema::new(fields), fetched_at)))
}

// ── Sync history ──

pub struct NewSyncLog<'a> {
    pub profile_url: &'a str,
    pub full_name: &'a str,
    pub record_id: Option<&'a str>,
    pub outcome: &'a str,
    pub detail: Option<&'a str>,
    pub excluded_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogRow {
    pub id: i64,
    pub profile_url: String,
    pub full_name: String,
    pub record_id: Option<String>,
    pub outcome: String,
    pub detail: Option<String>,
    pub excluded_count: i64,
    pub synced_at: String,
}

pub fn log_sync(conn: &Connection, entry: &NewSyncLog) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_log (profile_url, full_name, record_id, outcome, detail, excluded_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.profile_url,
            entry.full_name,
            entry.record_id,
            entry.outcome,
            entry.detail,
            entry.excluded_count as i64
        ],
    )?;
    Ok(())
}

pub fn fetch_history(conn: &Connection, limit: usize) -> Result<Vec<SyncLogRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, profile_url, full_name, record_id, outcome, detail, excluded_count, synced_at
         FROM sync_log ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |r| {
            Ok(SyncLogRow {
                id: r.get(0)?,
                profile_url: r.get(1)?,
                full_name: r.get(2)?,
                record_id: r.get(3)?,
                outcome: r.get(4)?,
                detail: r.get(5)?,
                excluded_count: r.get(6)?,
                synced_at: r.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::airtable::schema::FieldType;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn sample_schema() -> RemoteSchema {
        RemoteSchema::new(vec![FieldInfo {
            id: "fld001".into(),
            name: "Name".into(),
            field_type: FieldType::SingleLineText,
        }])
    }

    #[test]
    fn schema_cache_round_trips() {
        let conn = test_conn();
        let table = TableIdentity::new("appX", "tblY");
        let fetched_at = Utc::now();

        save_schema_cache(&conn, &table, &sample_schema(), fetched_at).unwrap();
        let (schema, stored_at) = load_schema_cache(&conn, &table).unwrap().unwrap();

        assert_eq!(schema.field_type("Name"), Some(FieldType::SingleLineText));
        assert_eq!(stored_at.timestamp(), fetched_at.timestamp());
    }

    #[test]
    fn schema_cache_replaces_whole_entry() {
        let conn = test_conn();
        let table = TableIdentity::new("appX", "tblY");

        save_schema_cache(&conn, &table, &sample_schema(), Utc::now()).unwrap();
        let newer = RemoteSchema::new(vec![FieldInfo {
            id: "fld002".into(),
            name: "Company".into(),
            field_type: FieldType::SingleLineText,
        }]);
        save_schema_cache(&conn, &table, &newer, Utc::now()).unwrap();

        let (schema, _) = load_schema_cache(&conn, &table).unwrap().unwrap();
        assert!(schema.contains("Company"));
        assert!(!schema.contains("Name"));
    }

    #[test]
    fn missing_cache_entry_is_none() {
        let conn = test_conn();
        let table = TableIdentity::new("appX", "tblNope");
        assert!(load_schema_cache(&conn, &table).unwrap().is_none());
    }

    #[test]
    fn corrupt_cache_entry_is_an_error() {
        let conn = test_conn();
        conn.execute(
            "INSERT INTO schema_cache (cache_key, field_types, field_details, fetched_at)
             VALUES ('appX:tblY', '{}', 'not json', '2026-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        let table = TableIdentity::new("appX", "tblY");
        assert!(load_schema_cache(&conn, &table).is_err());
    }

    #[test]
    fn sync_log_is_newest_first_and_limited() {
        let conn = test_conn();
        for i in 0..5 {
            log_sync(
                &conn,
                &NewSyncLog {
                    profile_url: "https://example.com/in/jane",
                    full_name: &format!("Person {i}"),
                    record_id: Some("rec123"),
                    outcome: "saved",
                    detail: None,
                    excluded_count: i,
                },
            )
            .unwrap();
        }

        let rows = fetch_history(&conn, 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].full_name, "Person 4");
        assert_eq!(rows[0].excluded_count, 4);
        assert_eq!(rows[2].full_name, "Person 2");
    }
}
