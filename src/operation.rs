//! Operations - the smallest unit of migration work
//!
//! An operation is either a parameterized statement or a named side-effecting
//! action. Operations are immutable once constructed and report success as a
//! plain boolean; error details stay on the connection side.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::connection::{Connection, Params};

/// Side-effecting step that is not expressible as a single statement.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, connection: &dyn Connection, context: &Value) -> bool;
}

/// Adapter turning a plain closure over the context value into an
/// [`ActionHandler`].
pub struct FnAction<F>(pub F);

#[async_trait]
impl<F> ActionHandler for FnAction<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    async fn run(&self, _connection: &dyn Connection, context: &Value) -> bool {
        (self.0)(context)
    }
}

/// A single executable step in a migration plan
#[derive(Clone)]
pub enum Operation {
    Query {
        text: String,
        params: Option<Params>,
        name: String,
    },
    Action {
        handler: Arc<dyn ActionHandler>,
        context: Value,
        name: String,
    },
}

impl Operation {
    /// Parameterized statement. Without an explicit name a content-derived
    /// identifier is assigned.
    pub fn query(text: impl Into<String>, params: Option<Params>, name: Option<String>) -> Self {
        let text = text.into();
        let name = name.unwrap_or_else(|| {
            derived_name("query", &text, params.as_ref().map_or(0, |p| p.len()))
        });
        Operation::Query { text, params, name }
    }

    /// Named side-effecting action. Callers normally supply the name; the
    /// derived fallback exists only so anonymous actions stay reportable.
    pub fn action(handler: Arc<dyn ActionHandler>, context: Value, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| derived_name("action", "", 0));
        Operation::Action { handler, context, name }
    }

    pub fn name(&self) -> &str {
        match self {
            Operation::Query { name, .. } => name,
            Operation::Action { name, .. } => name,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Operation::Query { .. })
    }

    /// Execute against the connection. Success is the connection's `ok` flag
    /// for queries, the handler's return value for actions.
    pub async fn run(&self, connection: &dyn Connection) -> bool {
        match self {
            Operation::Query { text, params, .. } => {
                connection.execute(text, params.as_ref()).await.ok
            }
            Operation::Action { handler, context, .. } => {
                handler.run(connection, context).await
            }
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Query { text, name, .. } => f
                .debug_struct("Query")
                .field("name", name)
                .field("text", text)
                .finish_non_exhaustive(),
            Operation::Action { name, .. } => {
                f.debug_struct("Action").field("name", name).finish_non_exhaustive()
            }
        }
    }
}

/// Content-derived fallback name: hash of the statement text, the parameter
/// count, and the planning timestamp.
fn derived_name(kind: &str, text: &str, param_count: usize) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    param_count.hash(&mut hasher);
    Utc::now().timestamp_micros().hash(&mut hasher);
    format!("{}-{:016x}", kind, hasher.finish())
}
