//! Connection boundary of the migration engine
//!
//! The engine consumes a relational connection through a single `execute`
//! call and never owns transactions, pooling, or driver internals. Ordinary
//! query failures never cross the boundary as errors: they surface as
//! `ok: false` plus an error message on the returned [`QueryResult`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;

pub mod memory;
pub mod postgres;

/// Named query parameters
pub type Params = BTreeMap<String, Value>;

/// One result row, keyed by column name
pub type Row = BTreeMap<String, Value>;

/// Outcome of a single `execute` call
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub ok: bool,
    pub row_count: u64,
    pub rows: Vec<Row>,
    pub insert_id: Option<i64>,
    pub error_message: Option<String>,
}

impl QueryResult {
    pub fn success(rows: Vec<Row>) -> Self {
        Self {
            ok: true,
            row_count: rows.len() as u64,
            rows,
            insert_id: None,
            error_message: None,
        }
    }

    pub fn affected(row_count: u64) -> Self {
        Self {
            ok: true,
            row_count,
            rows: Vec::new(),
            insert_id: None,
            error_message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            row_count: 0,
            rows: Vec::new(),
            insert_id: None,
            error_message: Some(message.into()),
        }
    }
}

/// Relational connection contract consumed by the engine.
///
/// Implementations must support named-parameter binding (`:name`) and should
/// run array-valued parameters through [`expand_array_params`] so a single
/// placeholder can bind an `IN (...)` list.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, query: &str, params: Option<&Params>) -> QueryResult;
}

/// Expand every array-valued parameter into per-element synthetic names and
/// rewrite its placeholder into a comma-separated list, e.g. `:ids` with
/// `[1, 2]` becomes `:ids_0, :ids_1`. An empty array renders as `NULL` so the
/// surrounding `IN (...)` stays valid SQL. Scalar parameters pass through
/// untouched. Parameter names must not be prefixes of one another.
pub fn expand_array_params(query: &str, params: &Params) -> (String, Params) {
    let mut sql = query.to_string();
    let mut expanded = Params::new();

    for (key, value) in params {
        match value {
            Value::Array(items) => {
                let mut placeholders = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let synthetic = format!("{}_{}", key, index);
                    placeholders.push(format!(":{}", synthetic));
                    expanded.insert(synthetic, item.clone());
                }
                let list = if placeholders.is_empty() {
                    "NULL".to_string()
                } else {
                    placeholders.join(", ")
                };
                sql = sql.replace(&format!(":{}", key), &list);
            }
            scalar => {
                expanded.insert(key.clone(), scalar.clone());
            }
        }
    }

    (sql, expanded)
}
