//! Version store - the persisted ledger of applied migrations
//!
//! One row per applied version, primary key on the version column, nothing
//! else. The table is provisioned lazily on first use; once provisioning has
//! failed, every read and write short-circuits instead of erroring, so read
//! paths stay fail-soft.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::connection::{Connection, Params, Row};
use crate::definitions::{Dialect, Version};

pub struct VersionStore {
    connection: Arc<dyn Connection>,
    table: String,
    dialect: Dialect,
    provisioned: OnceCell<bool>,
}

impl VersionStore {
    pub fn new(connection: Arc<dyn Connection>, table: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            connection,
            table: table.into(),
            dialect,
            provisioned: OnceCell::new(),
        }
    }

    /// Probe the ledger table, provisioning it on a failed read. The outcome
    /// is cached for the store's lifetime.
    pub async fn ensure_table(&self) -> bool {
        if let Some(ready) = self.provisioned.get() {
            return *ready;
        }

        let probe = format!("SELECT version FROM {} LIMIT 1", self.table);
        let mut ready = self.connection.execute(&probe, None).await.ok;
        if !ready {
            debug!(table = %self.table, "version table missing, provisioning");
            let ddl = self.dialect.create_table_sql(&self.table);
            self.connection.execute(&ddl, None).await;
            ready = self.connection.execute(&probe, None).await.ok;
        }
        if !ready {
            warn!(table = %self.table, "could not provision version table");
        }

        *self.provisioned.get_or_init(|| ready)
    }

    pub async fn has_version(&self, version: Version) -> bool {
        if !self.ensure_table().await {
            return false;
        }
        let sql = format!("SELECT version FROM {} WHERE version = :version", self.table);
        let result = self.connection.execute(&sql, Some(&version_params(version))).await;
        result.ok && !result.rows.is_empty()
    }

    /// Mark a version applied. Idempotent: a version that is already present
    /// counts as success, no duplicate insert is attempted.
    pub async fn add_version(&self, version: Version) -> bool {
        if !self.ensure_table().await {
            return false;
        }
        if self.has_version(version).await {
            return true;
        }
        let sql = format!("INSERT INTO {} (version) VALUES (:version)", self.table);
        self.connection.execute(&sql, Some(&version_params(version))).await.ok
    }

    pub async fn remove_version(&self, version: Version) -> bool {
        if !self.ensure_table().await {
            return false;
        }
        let sql = format!("DELETE FROM {} WHERE version = :version", self.table);
        self.connection.execute(&sql, Some(&version_params(version))).await.ok
    }

    /// Highest applied version, if any.
    pub async fn latest_version(&self) -> Option<Version> {
        if !self.ensure_table().await {
            return None;
        }
        let sql = format!(
            "SELECT version FROM {} ORDER BY version DESC LIMIT 1",
            self.table
        );
        let result = self.connection.execute(&sql, None).await;
        result.rows.first().and_then(row_version)
    }

    /// All applied versions, ascending.
    pub async fn applied_versions(&self) -> Vec<Version> {
        if !self.ensure_table().await {
            return Vec::new();
        }
        let sql = format!("SELECT version FROM {} ORDER BY version ASC", self.table);
        let result = self.connection.execute(&sql, None).await;
        result.rows.iter().filter_map(row_version).collect()
    }
}

fn version_params(version: Version) -> Params {
    Params::from([("version".to_string(), json!(version.as_u64()))])
}

fn row_version(row: &Row) -> Option<Version> {
    match row.get("version")? {
        Value::Number(n) => n.as_u64().map(Version::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
