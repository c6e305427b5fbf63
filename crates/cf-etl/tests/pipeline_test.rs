//! End-to-end runs against an in-memory DuckDB warehouse

mod common;

use cf_core::{resolve, ErrorKind, SkipReason, Stage, TableName, TableState};
use cf_db::Warehouse;
use cf_etl::EtlError;
use common::{catalog, FailingWarehouse, Project};
use std::sync::Arc;
use std::time::Duration;

fn names(tables: &[&str]) -> Vec<TableName> {
    tables.iter().map(|t| t.parse().unwrap()).collect()
}

#[test]
fn test_tiers_follow_foreign_keys() {
    let catalog = catalog();
    let tiers = resolve(
        &catalog,
        &names(&["condition_occurrence", "visit_occurrence", "person"])
            .into_iter()
            .collect(),
    )
    .unwrap();
    let tiers: Vec<Vec<TableName>> = tiers.iter().map(|t| t.tables().to_vec()).collect();
    assert_eq!(
        tiers,
        vec![
            names(&["person"]),
            names(&["visit_occurrence"]),
            names(&["condition_occurrence"]),
        ]
    );
}

#[tokio::test]
async fn test_full_run_loads_every_table() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project.write_gender_mapping(&[("M", "Male", 8507), ("F", "Female", 8532)]);

    let report = project.pipeline().run(None, false).await.unwrap();

    assert!(!report.has_failures(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.tiers[0], names(&["location", "vocabulary"]));
    assert_eq!(report.tiers[1], names(&["person"]));
    assert_eq!(report.outcome("person").unwrap().stage, Stage::Done);

    assert_eq!(project.count("SELECT * FROM omop.location").await, 2);
    assert_eq!(project.count("SELECT * FROM omop.person").await, 3);
    assert_eq!(project.count("SELECT * FROM omop.visit_occurrence").await, 2);
    assert_eq!(project.count("SELECT * FROM omop.condition_occurrence").await, 2);

    // surrogate keys follow the source keys in order
    assert_eq!(
        project
            .scalar("SELECT person_id FROM omop.person WHERE person_source_value = 'p10'")
            .await,
        Some(1)
    );
    assert_eq!(
        project
            .scalar("SELECT person_id FROM omop.person WHERE person_source_value = 'p3'")
            .await,
        Some(3)
    );

    // mapped through the Usagi file, unmapped codes become 0
    assert_eq!(
        project
            .scalar("SELECT gender_concept_id FROM omop.person WHERE person_source_value = 'p2'")
            .await,
        Some(8532)
    );
    assert_eq!(
        project
            .scalar("SELECT gender_concept_id FROM omop.person WHERE person_source_value = 'p3'")
            .await,
        Some(0)
    );
    assert_eq!(
        project
            .count("SELECT * FROM omop.person WHERE gender_source_concept_id IS NOT NULL")
            .await,
        0
    );

    // references resolve to the referenced table's surrogate keys
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.condition_occurrence c
                 JOIN omop.person p ON p.person_id = c.person_id
                 JOIN omop.visit_occurrence v ON v.visit_occurrence_id = c.visit_occurrence_id
                 WHERE v.person_id = p.person_id"
            )
            .await,
        2
    );
    assert_eq!(
        project
            .scalar("SELECT MIN(visit_concept_id) FROM omop.visit_occurrence")
            .await,
        Some(9202)
    );
}

#[tokio::test]
async fn test_rerun_keeps_surrogate_keys() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project.write_gender_mapping(&[("M", "Male", 8507)]);

    project.pipeline().run(None, false).await.unwrap();
    let before = project
        .scalar("SELECT person_id FROM omop.person WHERE person_source_value = 'p2'")
        .await;

    project
        .warehouse
        .execute("INSERT INTO raw.patients VALUES ('p1', 'F', 2001, 'Ghent')")
        .await
        .unwrap();
    let report = project.pipeline().run(None, false).await.unwrap();
    assert!(!report.has_failures());

    assert_eq!(project.count("SELECT * FROM omop.person").await, 4);
    assert_eq!(
        project
            .scalar("SELECT person_id FROM omop.person WHERE person_source_value = 'p2'")
            .await,
        before
    );
    // new source keys are numbered after the existing ones
    assert_eq!(
        project
            .scalar("SELECT person_id FROM omop.person WHERE person_source_value = 'p1'")
            .await,
        Some(4)
    );
    assert_eq!(project.count("SELECT * FROM work.person_id_swap").await, 4);
}

#[tokio::test]
async fn test_dangling_reference_is_kept_as_null() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project
        .warehouse
        .execute("INSERT INTO raw.visits VALUES ('v3', 'p99', DATE '2024-03-01')")
        .await
        .unwrap();

    let report = project.pipeline().run(None, false).await.unwrap();

    assert!(!report.has_failures());
    assert_eq!(project.count("SELECT * FROM omop.visit_occurrence").await, 3);
    assert_eq!(
        project
            .count("SELECT * FROM omop.visit_occurrence WHERE person_id IS NULL")
            .await,
        1
    );

    let dangling: Vec<_> = report.dangling_references().collect();
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].table, "visit_occurrence");
    assert_eq!(dangling[0].column, "person_id");
    assert_eq!(dangling[0].referenced_table, "person");
    assert_eq!(dangling[0].query_file, "visits.sql.jinja");
    assert_eq!(dangling[0].rows, 1);
}

#[tokio::test]
async fn test_failure_skips_later_tiers() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();

    let warehouse = Arc::new(FailingWarehouse {
        inner: project.warehouse.clone(),
        marker: "location__cities".to_string(),
    });
    let report = project
        .pipeline_with(warehouse, project.options())
        .run(None, false)
        .await
        .unwrap();

    let location = report.outcome("location").unwrap();
    assert_eq!(location.state, TableState::Failed);
    assert_eq!(location.stage, Stage::StageQuery);
    assert_eq!(location.errors[0].kind, ErrorKind::ExecutorError);
    assert_eq!(
        report.outcome("vocabulary").unwrap().state,
        TableState::Done
    );

    for table in ["person", "visit_occurrence", "condition_occurrence", "observation"] {
        let outcome = report.outcome(table).unwrap();
        assert_eq!(outcome.state, TableState::Skipped, "{table}");
        assert_eq!(outcome.skip_reason, Some(SkipReason::UpstreamTierFailed));
    }
    assert_eq!(report.count(TableState::Failed), 1);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(project.count("SELECT * FROM omop.person").await, 0);
    // invalidation still runs after a full run
    assert_eq!(report.stale_mappings_invalidated, Some(0));
}

#[tokio::test]
async fn test_single_table_run() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();

    let pipeline = project.pipeline();
    let location: TableName = "location".parse().unwrap();
    let report = pipeline.run(Some(&location), false).await.unwrap();

    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.outcome("location").unwrap().state, TableState::Done);
    assert_eq!(report.stale_mappings_invalidated, None);
    assert_eq!(project.count("SELECT * FROM omop.location").await, 2);
    assert_eq!(project.count("SELECT * FROM omop.person").await, 0);
}

#[tokio::test]
async fn test_unknown_table_is_rejected() {
    let project = Project::new();
    project.setup().await;

    let table: TableName = "concept".parse().unwrap();
    let err = project.pipeline().run(Some(&table), false).await.unwrap_err();
    assert!(matches!(err, EtlError::Core(_)), "{err}");
}

#[tokio::test]
async fn test_query_without_primary_key_fails_table() {
    let project = Project::new();
    project.setup().await;
    project.write(
        "location/cities.sql",
        "SELECT DISTINCT city FROM raw.patients",
    );

    let report = project.pipeline().run(None, false).await.unwrap();

    let location = report.outcome("location").unwrap();
    assert_eq!(location.state, TableState::Failed);
    assert_eq!(location.errors[0].kind, ErrorKind::SchemaInconsistency);
}

#[tokio::test]
async fn test_polymorphic_event_reference() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project.write(
        "observation/visit_observations_visit_occurrence.sql",
        "SELECT 'o-' || visit_id AS observation_id, patient_id AS person_id, 4000 AS observation_concept_id,
                visit_date AS observation_date, visit_id AS observation_event_id
         FROM raw.visits",
    );

    let report = project.pipeline().run(None, false).await.unwrap();
    assert!(!report.has_failures());

    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.observation o
                 JOIN work.visit_occurrence_id_swap s ON s.surrogate_id = o.observation_event_id
                 WHERE s.source_id = 'v1'"
            )
            .await,
        1
    );
    assert_eq!(
        project
            .count("SELECT * FROM omop.observation WHERE visit_occurrence_id IS NOT NULL")
            .await,
        0
    );
}

#[tokio::test]
async fn test_stage_timeout_fails_table() {
    let project = Project::new();
    project.setup().await;
    project.write(
        "location/slow.sql",
        "SELECT 1 AS location_id, CAST(SUM(a.range * b.range) AS VARCHAR) AS city
         FROM range(20000) a, range(20000) b",
    );

    let mut options = project.options();
    options.stage_timeout = Some(Duration::from_millis(50));
    let report = project
        .pipeline_with(project.warehouse.clone(), options)
        .run(None, true)
        .await
        .unwrap();

    let location = report.outcome("location").unwrap();
    assert_eq!(location.state, TableState::Failed);
    assert_eq!(location.errors[0].kind, ErrorKind::StageTimeout);
    assert!(location.errors[0].message.contains("after 50ms"));
    assert_eq!(location.stage, Stage::StageQuery);
    // skipping mappings skips invalidation
    assert_eq!(report.stale_mappings_invalidated, None);
}

#[tokio::test]
async fn test_cancelled_run_starts_no_table() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let report = project
        .pipeline()
        .run_with_cancellation(None, false, cancel)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.count(TableState::Skipped), report.tables.len());
    assert!(report
        .tables
        .iter()
        .all(|t| t.skip_reason == Some(SkipReason::Cancelled)));
    // cancellation is a skip, never a table error
    assert!(report.tables.iter().all(|t| t.errors.is_empty()));
    assert!(!report.has_failures());
    assert_eq!(report.stale_mappings_invalidated, None);
}
