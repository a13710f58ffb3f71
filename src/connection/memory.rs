//! In-memory connection for tests and offline experiments
//!
//! Understands the statement shapes the version store emits against its
//! ledger table and records everything else as opaque payload. Failures can
//! be scripted per statement substring.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{expand_array_params, Connection, Params, QueryResult, Row};

#[derive(Debug, Default)]
struct MemoryState {
    table_created: bool,
    versions: BTreeSet<i64>,
    statements: Vec<String>,
    fail_patterns: Vec<String>,
    refuse_ddl: bool,
}

/// Scripted stand-in for a relational connection.
///
/// Statements touching the configured ledger table are interpreted
/// (create/select/insert/delete against an in-memory version set); every
/// other statement is recorded and succeeds unless a failure pattern matches.
#[derive(Debug)]
pub struct MemoryConnection {
    ledger_table: String,
    state: Mutex<MemoryState>,
}

impl MemoryConnection {
    /// Connection interpreting ledger statements against `schema_versions`.
    pub fn new() -> Self {
        Self::with_table("schema_versions")
    }

    pub fn with_table(ledger_table: impl Into<String>) -> Self {
        Self {
            ledger_table: ledger_table.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Any statement containing `pattern` fails from now on.
    pub fn fail_when(&self, pattern: impl Into<String>) {
        self.lock().fail_patterns.push(pattern.into());
    }

    /// Refuse ledger DDL so provisioning can never succeed.
    pub fn refuse_ddl(&self) {
        self.lock().refuse_ddl = true;
    }

    /// Every statement seen so far, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Current ledger contents, ascending.
    pub fn versions(&self) -> Vec<i64> {
        self.lock().versions.iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryConnection {
    fn default() -> Self {
        Self::new()
    }
}

fn version_param(params: Option<&Params>) -> Option<i64> {
    params.and_then(|p| p.get("version")).and_then(|value| match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    })
}

fn version_row(version: i64) -> Row {
    Row::from([("version".to_string(), json!(version))])
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&self, query: &str, params: Option<&Params>) -> QueryResult {
        let (query, expanded) = match params {
            Some(p) => expand_array_params(query, p),
            None => (query.to_string(), Params::new()),
        };
        let params = if expanded.is_empty() { None } else { Some(&expanded) };

        let mut state = self.lock();
        state.statements.push(query.clone());

        for pattern in &state.fail_patterns {
            if query.contains(pattern.as_str()) {
                return QueryResult::failure(format!("forced failure: {}", pattern));
            }
        }

        if !query.contains(self.ledger_table.as_str()) {
            // Migration payload: record and succeed.
            return QueryResult::affected(0);
        }

        let upper = query.trim_start().to_uppercase();
        if upper.starts_with("CREATE TABLE") {
            if state.refuse_ddl {
                return QueryResult::failure("DDL refused");
            }
            state.table_created = true;
            return QueryResult::affected(0);
        }
        if !state.table_created {
            return QueryResult::failure(format!("no such table: {}", self.ledger_table));
        }
        if upper.starts_with("SELECT") {
            if upper.contains("WHERE VERSION") {
                return match version_param(params) {
                    Some(v) if state.versions.contains(&v) => {
                        QueryResult::success(vec![version_row(v)])
                    }
                    Some(_) => QueryResult::success(Vec::new()),
                    None => QueryResult::failure("missing version parameter"),
                };
            }
            if upper.contains("ORDER BY VERSION DESC") {
                let rows = state.versions.iter().rev().take(1).map(|v| version_row(*v)).collect();
                return QueryResult::success(rows);
            }
            let rows = state.versions.iter().map(|v| version_row(*v)).collect();
            return QueryResult::success(rows);
        }
        if upper.starts_with("INSERT INTO") {
            return match version_param(params) {
                Some(v) => {
                    state.versions.insert(v);
                    let mut result = QueryResult::affected(1);
                    result.insert_id = Some(v);
                    result
                }
                None => QueryResult::failure("missing version parameter"),
            };
        }
        if upper.starts_with("DELETE FROM") {
            return match version_param(params) {
                Some(v) => QueryResult::affected(state.versions.remove(&v) as u64),
                None => QueryResult::failure("missing version parameter"),
            };
        }

        QueryResult::affected(0)
    }
}
