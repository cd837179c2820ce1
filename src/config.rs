use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::airtable::error::SyncError;
use crate::airtable::schema::TableIdentity;

pub const TOKEN_ENV: &str = "AIRTABLE_API_TOKEN";

/// Connection settings plus per-user mapping overrides, stored as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub api_token: String,
    pub base_id: String,
    pub table_id: String,
    pub prevent_duplicates: bool,
    pub field_mappings: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_id: String::new(),
            table_id: String::new(),
            prevent_duplicates: true,
            field_mappings: HashMap::new(),
        }
    }
}

impl SyncConfig {
    /// Read the JSON config file. A missing file is an empty config,
    /// not an error, so env-only setups work.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, starting empty");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// The environment wins over the file for the token, so the secret
    /// can stay out of the config on disk.
    pub fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            if !token.is_empty() {
                self.api_token = token;
            }
        }
    }

    /// Check the three connection fields before any network call.
    pub fn ensure_complete(&self) -> Result<(), SyncError> {
        let mut missing = Vec::new();
        if self.api_token.is_empty() {
            missing.push("apiToken");
        }
        if self.base_id.is_empty() {
            missing.push("baseId");
        }
        if self.table_id.is_empty() {
            missing.push("tableId");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConfigIncomplete(missing.join(", ")))
        }
    }

    pub fn table_identity(&self) -> TableIdentity {
        TableIdentity::new(self.base_id.clone(), self.table_id.clone())
    }
}
