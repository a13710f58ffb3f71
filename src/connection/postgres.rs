//! sqlx-backed PostgreSQL adapter for the [`Connection`] contract
//!
//! Translates named `:name` placeholders into positional `$n` binds and
//! flattens result rows into dialect-neutral JSON values. Query failures are
//! reported through [`QueryResult`], never raised.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _};

use super::{expand_array_params, Connection, Params, QueryResult, Row};
use crate::error::{MigrationError, MigrationResult};

pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> MigrationResult<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            MigrationError::Connection(format!("failed to connect to database: {}", e))
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Rewrite `:name` placeholders to `$n` binds in first-appearance order.
/// Repeated names reuse the same ordinal; `::` casts are left alone.
fn positional(query: &str, params: &Params) -> Result<(String, Vec<Value>), String> {
    let mut sql = String::with_capacity(query.len());
    let mut ordered: Vec<Value> = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(c) = chars.next() {
        let starts_name = c == ':'
            && !sql.ends_with(':')
            && matches!(chars.peek(), Some(n) if n.is_ascii_alphabetic() || *n == '_');
        if !starts_name {
            sql.push(c);
            continue;
        }

        let mut name = String::new();
        while let Some(n) = chars.peek() {
            if n.is_ascii_alphanumeric() || *n == '_' {
                name.push(*n);
                chars.next();
            } else {
                break;
            }
        }

        let index = match seen.iter().position(|s| s == &name) {
            Some(index) => index,
            None => {
                let value = params
                    .get(&name)
                    .ok_or_else(|| format!("missing parameter: {}", name))?;
                seen.push(name.clone());
                ordered.push(value.clone());
                seen.len() - 1
            }
        };
        sql.push('$');
        sql.push_str(&(index + 1).to_string());
    }

    Ok((sql, ordered))
}

fn bind_value<'a>(query: Query<'a, Postgres, PgArguments>, value: &Value) -> Query<'a, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => query.bind(s.clone()),
        // Arrays are expanded before binding; anything left binds as JSONB.
        other => query.bind(other.clone()),
    }
}

fn convert_row(row: &sqlx::postgres::PgRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(index) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        out.insert(column.name().to_string(), value);
    }
    out
}

#[async_trait]
impl Connection for PostgresConnection {
    async fn execute(&self, query: &str, params: Option<&Params>) -> QueryResult {
        let (query, params) = match params {
            Some(p) => expand_array_params(query, p),
            None => (query.to_string(), Params::new()),
        };
        let (sql, ordered) = match positional(&query, &params) {
            Ok(rewritten) => rewritten,
            Err(message) => return QueryResult::failure(message),
        };

        let is_read = sql
            .trim_start()
            .get(..6)
            .map_or(false, |prefix| prefix.eq_ignore_ascii_case("SELECT"));

        let mut prepared = sqlx::query(&sql);
        for value in &ordered {
            prepared = bind_value(prepared, value);
        }

        if is_read {
            match prepared.fetch_all(&self.pool).await {
                Ok(rows) => QueryResult::success(rows.iter().map(convert_row).collect()),
                Err(e) => QueryResult::failure(e.to_string()),
            }
        } else {
            match prepared.execute(&self.pool).await {
                Ok(done) => QueryResult::affected(done.rows_affected()),
                Err(e) => QueryResult::failure(e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn named_placeholders_become_positional() {
        let params = Params::from([
            ("version".to_string(), json!(100)),
            ("name".to_string(), json!("init")),
        ]);
        let (sql, ordered) = positional(
            "INSERT INTO t (version, name) VALUES (:version, :name)",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "INSERT INTO t (version, name) VALUES ($1, $2)");
        assert_eq!(ordered, vec![json!(100), json!("init")]);
    }

    #[test]
    fn repeated_names_share_one_ordinal() {
        let params = Params::from([("version".to_string(), json!(100))]);
        let (sql, ordered) = positional(
            "SELECT * FROM t WHERE low = :version OR high = :version",
            &params,
        )
        .unwrap();
        assert_eq!(sql, "SELECT * FROM t WHERE low = $1 OR high = $1");
        assert_eq!(ordered.len(), 1);
    }

    #[test]
    fn casts_are_not_mistaken_for_placeholders() {
        let (sql, ordered) = positional("SELECT version::text FROM t", &Params::new()).unwrap();
        assert_eq!(sql, "SELECT version::text FROM t");
        assert!(ordered.is_empty());
    }

    #[test]
    fn missing_parameter_is_reported() {
        let err = positional("SELECT :absent", &Params::new()).unwrap_err();
        assert!(err.contains("absent"));
    }
}
