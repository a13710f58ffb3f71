//! End-to-end tests of the orchestration state machine over the in-memory
//! connection.

use std::fs;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use stratum::connection::memory::MemoryConnection;
use stratum::{
    Direction, FnAction, Migration, MigrationPlan, Migrator, MigratorConfig, PlanCounts,
    StaticUnitFactory, UnitContext, Version,
};

/// Plans one create/drop pair named after its version.
struct ScriptedUnit {
    version: u64,
}

impl Migration for ScriptedUnit {
    fn up(&self, plan: &mut MigrationPlan) {
        plan.add_query(
            format!("CREATE TABLE t{} (id BIGINT)", self.version),
            None,
            Some(format!("up-{}", self.version)),
        );
    }

    fn down(&self, plan: &mut MigrationPlan) {
        plan.add_query(
            format!("DROP TABLE t{}", self.version),
            None,
            Some(format!("down-{}", self.version)),
        );
    }
}

/// Up plan is [ok, boom, ok]; the middle statement can be failed by pattern.
struct FlakyUnit;

impl Migration for FlakyUnit {
    fn up(&self, plan: &mut MigrationPlan) {
        plan.add_query("CREATE TABLE flaky (id BIGINT)", None, Some("first".to_string()));
        plan.add_query("INSERT INTO flaky VALUES (boom)", None, Some("second".to_string()));
        plan.add_query("CREATE INDEX idx_flaky ON flaky (id)", None, Some("third".to_string()));
    }

    fn down(&self, plan: &mut MigrationPlan) {
        plan.add_query("DROP TABLE flaky", None, Some("undo".to_string()));
    }
}

/// One query plus one action, for mixed-kind reporting.
struct MixedUnit;

impl Migration for MixedUnit {
    fn up(&self, plan: &mut MigrationPlan) {
        plan.add_query("CREATE TABLE mixed (id BIGINT)", None, Some("mixed-query".to_string()));
        plan.add_action(
            Arc::new(FnAction(|context: &Value| context["ok"] == json!(true))),
            json!({"ok": true}),
            Some("mixed-action".to_string()),
        );
    }

    fn down(&self, plan: &mut MigrationPlan) {
        plan.add_query("DROP TABLE mixed", None, Some("mixed-undo".to_string()));
    }
}

fn fixture(versions: &[u64]) -> (Arc<MemoryConnection>, Migrator, TempDir) {
    fixture_with(versions, |factory| {
        for version in versions {
            let version = *version;
            factory.register(version, move |_ctx: &UnitContext| {
                Arc::new(ScriptedUnit { version }) as Arc<dyn Migration>
            });
        }
    })
}

fn fixture_with(
    versions: &[u64],
    register: impl FnOnce(&mut StaticUnitFactory),
) -> (Arc<MemoryConnection>, Migrator, TempDir) {
    let dir = TempDir::new().unwrap();
    for version in versions {
        fs::write(dir.path().join(format!("m{}.rs", version)), "").unwrap();
    }
    let mut factory = StaticUnitFactory::new();
    register(&mut factory);

    let connection = Arc::new(MemoryConnection::new());
    let config = MigratorConfig {
        migrations_dir: dir.path().to_path_buf(),
        project_root: dir.path().to_path_buf(),
        ..Default::default()
    };
    let migrator = Migrator::new(connection.clone(), Arc::new(factory), config);
    (connection, migrator, dir)
}

fn versions_of(descriptors: &[stratum::UnitDescriptor]) -> Vec<u64> {
    descriptors.iter().map(|d| d.version.as_u64()).collect()
}

#[tokio::test]
async fn pending_up_is_ascending_regardless_of_discovery_order() {
    let (_conn, migrator, _dir) = fixture(&[300, 100, 200]);
    assert_eq!(versions_of(&migrator.pending_up(None).await), vec![100, 200, 300]);
}

#[tokio::test]
async fn pending_down_is_descending_over_applied_units() {
    let (_conn, migrator, _dir) = fixture(&[300, 100, 200]);
    migrator.run_direction(Direction::Up, None, true).await;
    assert_eq!(versions_of(&migrator.pending_down(None).await), vec![300, 200, 100]);
}

#[tokio::test]
async fn up_run_is_idempotent() {
    let (conn, migrator, _dir) = fixture(&[100, 200, 300]);

    let first = migrator.run_direction(Direction::Up, None, true).await;
    assert_eq!(first.successful, vec!["up-100", "up-200", "up-300"]);
    assert!(!first.has_failures());
    assert_eq!(conn.versions(), vec![100, 200, 300]);

    let second = migrator.run_direction(Direction::Up, None, true).await;
    assert!(second.is_empty());
}

#[tokio::test]
async fn add_version_is_idempotent() {
    let (conn, migrator, _dir) = fixture(&[100]);
    assert!(migrator.add_version(Version::from(100)).await);
    assert!(migrator.add_version(Version::from(100)).await);
    assert_eq!(conn.versions(), vec![100]);
}

#[tokio::test]
async fn first_failing_operation_aborts_the_unit_and_leaves_it_unrecorded() {
    let (conn, migrator, _dir) = fixture_with(&[100], |factory| {
        factory.register(100u64, |_ctx: &UnitContext| Arc::new(FlakyUnit) as Arc<dyn Migration>);
    });
    conn.fail_when("boom");

    let result = migrator.execute(Version::from(100), Direction::Up).await.unwrap();
    assert_eq!(result.successful, vec!["first"]);
    assert_eq!(result.failed, vec!["second"]);
    assert_eq!(result.failed_queries, vec!["second"]);
    assert!(!migrator.has_version(Version::from(100)).await);

    // The third operation never reached the connection.
    assert!(!conn.statements().iter().any(|s| s.contains("idx_flaky")));
}

#[tokio::test]
async fn failed_unit_aborts_the_rest_of_the_batch() {
    let (conn, migrator, _dir) = fixture_with(&[100, 200], |factory| {
        factory.register(100u64, |_ctx: &UnitContext| Arc::new(FlakyUnit) as Arc<dyn Migration>);
        factory.register(200u64, |_ctx: &UnitContext| {
            Arc::new(ScriptedUnit { version: 200 }) as Arc<dyn Migration>
        });
    });
    conn.fail_when("boom");

    let run = migrator.run_direction(Direction::Up, None, true).await;
    assert_eq!(run.failed, vec!["second"]);
    assert!(!run.successful.contains(&"up-200".to_string()));
    assert!(conn.versions().is_empty());
}

#[tokio::test]
async fn without_stop_on_first_failure_the_batch_continues() {
    let (conn, migrator, _dir) = fixture_with(&[100, 200], |factory| {
        factory.register(100u64, |_ctx: &UnitContext| Arc::new(FlakyUnit) as Arc<dyn Migration>);
        factory.register(200u64, |_ctx: &UnitContext| {
            Arc::new(ScriptedUnit { version: 200 }) as Arc<dyn Migration>
        });
    });
    conn.fail_when("boom");

    let run = migrator.run_direction(Direction::Up, None, false).await;
    assert_eq!(run.failed, vec!["second"]);
    assert!(run.successful.contains(&"up-200".to_string()));
    assert_eq!(conn.versions(), vec![200]);
}

#[tokio::test]
async fn down_reverses_up() {
    let (conn, migrator, _dir) = fixture(&[100, 200, 300]);
    migrator.run_direction(Direction::Up, None, true).await;

    let down = migrator.run_direction(Direction::Down, None, true).await;
    assert_eq!(down.successful, vec!["down-300", "down-200", "down-100"]);
    assert!(conn.versions().is_empty());
}

#[tokio::test]
async fn count_plan_reports_counts_without_mutating_anything() {
    let (conn, migrator, _dir) = fixture_with(&[100], |factory| {
        factory.register(100u64, |_ctx: &UnitContext| Arc::new(MixedUnit) as Arc<dyn Migration>);
    });

    for _ in 0..3 {
        let counts = migrator.count_plan(Version::from(100), Direction::Up).unwrap();
        assert_eq!(counts, PlanCounts { queries: 1, actions: 1 });
    }
    let down = migrator.count_plan(Version::from(100), Direction::Down).unwrap();
    assert_eq!(down, PlanCounts { queries: 1, actions: 0 });

    assert!(conn.versions().is_empty());
    // Planning never reaches the connection.
    assert!(!conn.statements().iter().any(|s| s.contains("mixed")));
}

#[tokio::test]
async fn action_outcomes_land_in_the_action_sub_lists() {
    let (_conn, migrator, _dir) = fixture_with(&[100], |factory| {
        factory.register(100u64, |_ctx: &UnitContext| Arc::new(MixedUnit) as Arc<dyn Migration>);
    });

    let result = migrator.run_direction(Direction::Up, None, true).await;
    assert_eq!(result.successful, vec!["mixed-query", "mixed-action"]);
    assert_eq!(result.successful_queries, vec!["mixed-query"]);
    assert_eq!(result.successful_actions, vec!["mixed-action"]);
}

#[tokio::test]
async fn unresolved_versions_execute_as_no_ops() {
    let (_conn, migrator, _dir) = fixture(&[100]);
    assert!(migrator.execute(Version::from(999), Direction::Up).await.is_none());
    assert!(migrator.count_plan(Version::from(999), Direction::Up).is_none());
}

#[tokio::test]
async fn up_on_an_applied_version_is_a_sentinel_success() {
    let (conn, migrator, _dir) = fixture(&[100]);
    migrator.run_direction(Direction::Up, None, true).await;
    let statements_before = conn.statements().len();

    let result = migrator.execute(Version::from(100), Direction::Up).await.unwrap();
    assert_eq!(result.successful, vec!["100 (already applied)"]);
    assert!(result.successful_queries.is_empty());

    // Planning and execution were skipped; only the applied check ran.
    let new_statements: Vec<String> = conn.statements()[statements_before..].to_vec();
    assert!(new_statements.iter().all(|s| s.contains("schema_versions")));
}

#[tokio::test]
async fn failed_provisioning_short_circuits_every_operation() {
    let (conn, migrator, _dir) = fixture(&[100, 200]);
    conn.refuse_ddl();

    assert!(!migrator.ensure_version_table().await);
    assert!(migrator.pending_up(None).await.is_empty());
    assert!(migrator.pending_down(None).await.is_empty());
    assert!(migrator.run_direction(Direction::Up, None, true).await.is_empty());
    assert!(migrator.status().await.is_empty());
    assert!(!migrator.add_version(Version::from(100)).await);
}

#[tokio::test]
async fn targeted_up_then_targeted_down_scenario() {
    // Catalog {100, 200, 300}, empty ledger.
    let (conn, migrator, _dir) = fixture(&[100, 200, 300]);
    assert_eq!(versions_of(&migrator.pending_up(None).await), vec![100, 200, 300]);

    // Up to 200 executes 100 then 200.
    let up = migrator
        .run_direction(Direction::Up, Some(Version::from(200)), true)
        .await;
    assert_eq!(up.successful, vec!["up-100", "up-200"]);
    assert_eq!(conn.versions(), vec![100, 200]);
    assert_eq!(versions_of(&migrator.pending_up(None).await), vec![300]);

    // Down to 100 rolls back 200 and the target itself, newest first.
    assert_eq!(
        versions_of(&migrator.pending_down(Some(Version::from(100))).await),
        vec![200, 100]
    );
    let down = migrator
        .run_direction(Direction::Down, Some(Version::from(100)), true)
        .await;
    assert_eq!(down.successful, vec!["down-200", "down-100"]);
    assert!(conn.versions().is_empty());
}

#[tokio::test]
async fn status_reports_applied_flags_ascending() {
    let (_conn, migrator, _dir) = fixture(&[100, 200, 300]);
    migrator
        .run_direction(Direction::Up, Some(Version::from(200)), true)
        .await;

    let status = migrator.status().await;
    let flags: Vec<(u64, bool)> = status.iter().map(|s| (s.version.as_u64(), s.applied)).collect();
    assert_eq!(flags, vec![(100, true), (200, true), (300, false)]);
}
