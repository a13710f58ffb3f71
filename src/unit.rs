//! Migration units and their per-build operation plans

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::connection::{Connection, Params};
use crate::operation::{ActionHandler, Operation};

/// One versioned schema change.
///
/// `up` and `down` describe the change by appending operations to the plan
/// they are handed; they must not execute anything themselves. A fresh plan
/// is built for every planning pass, so implementations can assume an empty
/// list and zeroed counters on entry.
pub trait Migration: Send + Sync {
    fn up(&self, plan: &mut MigrationPlan);
    fn down(&self, plan: &mut MigrationPlan);
}

/// Everything a unit constructor gets to work with.
#[derive(Clone)]
pub struct UnitContext {
    pub connection: Arc<dyn Connection>,
    pub project_root: PathBuf,
}

/// Ordered, append-only operation list for one planning pass.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    operations: Vec<Operation>,
    query_count: usize,
    action_count: usize,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_query(
        &mut self,
        text: impl Into<String>,
        params: Option<Params>,
        name: Option<String>,
    ) {
        self.operations.push(Operation::query(text, params, name));
        self.query_count += 1;
    }

    pub fn add_action(
        &mut self,
        handler: Arc<dyn ActionHandler>,
        context: Value,
        name: Option<String>,
    ) {
        self.operations.push(Operation::action(handler, context, name));
        self.action_count += 1;
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn query_count(&self) -> usize {
        self.query_count
    }

    pub fn action_count(&self) -> usize {
        self.action_count
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
