//! Migrator - the orchestrating state machine
//!
//! Composes registry, version store, and connection: computes the pending set
//! for a direction, executes units in order, records version changes, and
//! aggregates results. Execution is strictly sequential; no transactions wrap
//! a unit, so a mid-unit failure leaves partial state behind with the version
//! unrecorded, and the next run picks the unit up again.
//!
//! Running two migrators against the same ledger concurrently is not
//! supported; callers needing that must hold an external advisory lock.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::definitions::{
    Direction, ExecutionResult, MigratorConfig, PlanCounts, UnitDescriptor, UnitStatus, Version,
};
use crate::factory::UnitFactory;
use crate::operation::Operation;
use crate::registry::Registry;
use crate::store::VersionStore;
use crate::unit::{MigrationPlan, UnitContext};

pub struct Migrator {
    connection: Arc<dyn Connection>,
    registry: Registry,
    store: VersionStore,
}

impl Migrator {
    pub fn new(
        connection: Arc<dyn Connection>,
        factory: Arc<dyn UnitFactory>,
        config: MigratorConfig,
    ) -> Self {
        let context = UnitContext {
            connection: connection.clone(),
            project_root: config.project_root.clone(),
        };
        let store = VersionStore::new(
            connection.clone(),
            config.versions_table.clone(),
            config.dialect,
        );
        let registry = Registry::new(config, factory, context);
        Self {
            connection,
            registry,
            store,
        }
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    pub async fn ensure_version_table(&self) -> bool {
        self.store.ensure_table().await
    }

    /// Pending units for an up run, oldest first. Walks the descending
    /// catalog, stops at the highest applied version, skips anything newer
    /// than `to_version`, and keeps what the ledger does not know yet.
    pub async fn pending_up(&self, to_version: Option<Version>) -> Vec<UnitDescriptor> {
        if !self.store.ensure_table().await {
            return Vec::new();
        }
        let last = self.store.latest_version().await;

        let mut pending = Vec::new();
        for entry in self.registry.catalog() {
            let version = entry.descriptor.version;
            if last == Some(version) {
                // Everything at or before the highest applied version is
                // presumed handled.
                break;
            }
            if let Some(limit) = to_version {
                if version > limit {
                    continue;
                }
            }
            if !self.store.has_version(version).await {
                pending.push(entry.descriptor.clone());
            }
        }
        pending.reverse();
        pending
    }

    /// Pending units for a down run, newest first. The target version itself
    /// is rolled back: `to_version` names the oldest version the run takes
    /// down, not the version it stops above.
    pub async fn pending_down(&self, to_version: Option<Version>) -> Vec<UnitDescriptor> {
        if !self.store.ensure_table().await {
            return Vec::new();
        }
        let last = self.store.latest_version().await;

        let mut pending = Vec::new();
        for entry in self.registry.catalog().iter().rev() {
            let version = entry.descriptor.version;
            let in_range = to_version.map_or(true, |limit| version >= limit);
            if in_range && self.store.has_version(version).await {
                pending.push(entry.descriptor.clone());
            }
            if last == Some(version) {
                break;
            }
        }
        pending.reverse();
        pending
    }

    /// Run every pending unit for the direction. With `stop_on_first_failure`
    /// the first failed unit aborts the rest of the batch; without it the run
    /// continues and the failures accumulate in the result.
    pub async fn run_direction(
        &self,
        direction: Direction,
        to_version: Option<Version>,
        stop_on_first_failure: bool,
    ) -> ExecutionResult {
        let mut run = ExecutionResult::default();
        if !self.store.ensure_table().await {
            return run;
        }

        let pending = match direction {
            Direction::Up => self.pending_up(to_version).await,
            Direction::Down => self.pending_down(to_version).await,
        };
        info!(count = pending.len(), ?direction, "starting migration run");

        for descriptor in pending {
            if stop_on_first_failure && run.has_failures() {
                warn!(version = %descriptor.version, "aborting run after earlier failure");
                break;
            }
            if let Some(result) = self.execute(descriptor.version, direction).await {
                run.merge(result);
            }
        }
        run
    }

    /// Execute one unit. `None` means the version resolves to no registered
    /// unit. An up on an already-applied version is a sentinel success that
    /// skips planning entirely. The version is recorded (up) or erased (down)
    /// only when the unit ran without a single failure.
    pub async fn execute(&self, version: Version, direction: Direction) -> Option<ExecutionResult> {
        let Some(unit) = self.registry.resolve(version) else {
            warn!(%version, "requested version has no resolvable unit");
            return None;
        };

        if direction.is_up() && self.store.has_version(version).await {
            debug!(%version, "already applied, skipping");
            let mut result = ExecutionResult::default();
            result.successful.push(format!("{} (already applied)", version));
            return Some(result);
        }

        let mut plan = MigrationPlan::new();
        match direction {
            Direction::Up => unit.up(&mut plan),
            Direction::Down => unit.down(&mut plan),
        }
        info!(
            %version,
            ?direction,
            queries = plan.query_count(),
            actions = plan.action_count(),
            "executing migration unit"
        );

        let result = self.run_stack(plan.operations()).await;
        if result.has_failures() {
            warn!(%version, failed = result.failed.len(), "unit failed, version left unrecorded");
        } else {
            match direction {
                Direction::Up => {
                    self.store.add_version(version).await;
                }
                Direction::Down => {
                    self.store.remove_version(version).await;
                }
            }
        }
        Some(result)
    }

    /// Run operations in list order, halting after the first failure.
    pub async fn run_stack(&self, operations: &[Operation]) -> ExecutionResult {
        let mut result = ExecutionResult::default();
        for operation in operations {
            if result.has_failures() {
                break;
            }
            let ok = operation.run(self.connection.as_ref()).await;
            let name = operation.name().to_string();
            match (ok, operation.is_query()) {
                (true, true) => {
                    result.successful_queries.push(name.clone());
                    result.successful.push(name);
                }
                (true, false) => {
                    result.successful_actions.push(name.clone());
                    result.successful.push(name);
                }
                (false, true) => {
                    warn!(operation = %name, "query failed");
                    result.failed_queries.push(name.clone());
                    result.failed.push(name);
                }
                (false, false) => {
                    warn!(operation = %name, "action failed");
                    result.failed_actions.push(name.clone());
                    result.failed.push(name);
                }
            }
        }
        result
    }

    /// Plan a unit without executing it and report its operation counts.
    /// Nothing here touches the ledger; the plan is discarded afterwards.
    pub fn count_plan(&self, version: Version, direction: Direction) -> Option<PlanCounts> {
        let unit = self.registry.resolve(version)?;
        let mut plan = MigrationPlan::new();
        match direction {
            Direction::Up => unit.up(&mut plan),
            Direction::Down => unit.down(&mut plan),
        }
        Some(PlanCounts {
            queries: plan.query_count(),
            actions: plan.action_count(),
        })
    }

    pub async fn has_version(&self, version: Version) -> bool {
        self.store.has_version(version).await
    }

    pub async fn add_version(&self, version: Version) -> bool {
        self.store.add_version(version).await
    }

    pub async fn remove_version(&self, version: Version) -> bool {
        self.store.remove_version(version).await
    }

    /// Every catalog entry paired with its applied flag, ascending.
    pub async fn status(&self) -> Vec<UnitStatus> {
        if !self.store.ensure_table().await {
            return Vec::new();
        }
        let mut statuses = Vec::new();
        for entry in self.registry.catalog().iter().rev() {
            let version = entry.descriptor.version;
            let applied = self.store.has_version(version).await;
            statuses.push(UnitStatus { version, applied });
        }
        statuses
    }
}
