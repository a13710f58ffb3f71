//! Core definitions for the migration engine
//!
//! Version identifiers, run direction, SQL dialect selection, engine
//! configuration, and the result types the orchestrator reports outward.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;

use crate::error::MigrationError;

/// Opaque, numerically sortable version identifier.
///
/// In practice a 14-digit UTC timestamp (`YYYYMMDDHHMMSS`), so numeric order
/// equals creation order. Identifiers are expected to be globally unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Generate a fresh identifier from the current UTC time.
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        Self(stamp.parse().unwrap_or(0))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Version).map_err(|_| {
            MigrationError::Configuration(format!("invalid version identifier: {}", s))
        })
    }
}

/// Direction of a migration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply pending units, oldest first
    Up,
    /// Roll back applied units, newest first
    Down,
}

impl Direction {
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }
}

/// SQL dialect the version-table DDL is rendered for.
///
/// Parsing an unknown dialect string is the one failure the engine raises
/// loudly, at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    MySql,
    Sqlite,
    Postgres,
}

impl Dialect {
    /// DDL for the single-column version ledger: `version`, primary key,
    /// nothing else.
    pub fn create_table_sql(self, table: &str) -> String {
        match self {
            Dialect::MySql => format!(
                "CREATE TABLE {} (version BIGINT NOT NULL, PRIMARY KEY (version)) \
                 ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
                table
            ),
            Dialect::Sqlite => {
                format!("CREATE TABLE {} (version INTEGER NOT NULL PRIMARY KEY)", table)
            }
            Dialect::Postgres => {
                format!("CREATE TABLE {} (version BIGINT NOT NULL PRIMARY KEY)", table)
            }
        }
    }
}

impl FromStr for Dialect {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(MigrationError::Configuration(format!(
                "unrecognized dialect: {}",
                other
            ))),
        }
    }
}

/// Configuration for the migration engine
#[derive(Debug, Clone)]
pub struct MigratorConfig {
    /// Directory scanned for migration unit files
    pub migrations_dir: PathBuf,
    /// Name of the version ledger table
    pub versions_table: String,
    /// Dialect used when provisioning the ledger table
    pub dialect: Dialect,
    /// Fixed file-name prefix ahead of the numeric version
    pub file_prefix: String,
    /// Fixed file-name suffix after the numeric version
    pub file_suffix: String,
    /// Root path handed to every constructed unit
    pub project_root: PathBuf,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            versions_table: "schema_versions".to_string(),
            dialect: Dialect::Sqlite,
            file_prefix: "m".to_string(),
            file_suffix: ".rs".to_string(),
            project_root: PathBuf::from("."),
        }
    }
}

/// A discovered migration unit: version parsed, source file located.
#[derive(Debug, Clone, Serialize)]
pub struct UnitDescriptor {
    pub version: Version,
    pub path: PathBuf,
}

/// Aggregated outcome of one run, accumulated across one or more units.
///
/// Six ordered name lists: every executed operation lands in `successful` or
/// `failed`, and additionally in the query- or action-specific sub-list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub successful: Vec<String>,
    pub successful_queries: Vec<String>,
    pub successful_actions: Vec<String>,
    pub failed: Vec<String>,
    pub failed_queries: Vec<String>,
    pub failed_actions: Vec<String>,
}

impl ExecutionResult {
    /// Append another unit's lists onto this run-level accumulator.
    pub fn merge(&mut self, other: ExecutionResult) {
        self.successful.extend(other.successful);
        self.successful_queries.extend(other.successful_queries);
        self.successful_actions.extend(other.successful_actions);
        self.failed.extend(other.failed);
        self.failed_queries.extend(other.failed_queries);
        self.failed_actions.extend(other.failed_actions);
    }

    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Dry-run counts for one planned unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub queries: usize,
    pub actions: usize,
}

/// One catalog entry paired with its applied flag, for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub version: Version,
    pub applied: bool,
}
