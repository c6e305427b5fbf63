//! Custom concepts, Usagi mappings and the source to concept map

mod common;

use cf_core::{ErrorKind, Stage, TableName, TableState};
use cf_db::Warehouse;
use cf_etl::CUSTOM_CONCEPT_ID_FLOOR;
use common::{Project, SlowWarehouse};
use std::sync::Arc;
use std::time::Duration;

const LOCAL_CONCEPTS: &str = "\
concept_id,concept_name,domain_id,vocabulary_id,concept_class_id,standard_concept,concept_code,valid_start_date,valid_end_date,invalid_reason
LOC1,Local disease one,Condition,Local,Clinical Finding,S,LOC1,2020-01-01,2099-12-31,
LOC2,Local disease two,Condition,Local,Clinical Finding,S,LOC2,2020-01-01,2099-12-31,
";

const LOCAL_USAGI: &str = "\
sourceCode,sourceName,mappingStatus,conceptId,conceptName,domainId
D1,Disease one,UNCHECKED,LOC1,Local disease one,Condition
D2,Disease two,UNCHECKED,LOC2,Local disease two,Condition
";

fn write_local_concepts(project: &Project) {
    project.write(
        "condition_occurrence/condition_concept_id/custom/local_concept.csv",
        LOCAL_CONCEPTS,
    );
    project.write(
        "condition_occurrence/condition_concept_id/local_usagi.csv",
        LOCAL_USAGI,
    );
}

#[tokio::test]
async fn test_custom_concepts_get_ids_above_floor() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    write_local_concepts(&project);

    let report = project.pipeline().run(None, false).await.unwrap();
    assert!(!report.has_failures(), "{:?}", report.failures().collect::<Vec<_>>());

    assert_eq!(project.count("SELECT * FROM work.concept_id_swap").await, 2);
    assert_eq!(
        project
            .count("SELECT DISTINCT concept_id FROM work.concept_id_swap")
            .await,
        2
    );
    assert_eq!(
        project
            .scalar("SELECT MIN(concept_id) FROM work.concept_id_swap")
            .await,
        Some(CUSTOM_CONCEPT_ID_FLOOR + 1)
    );

    // the uploaded mapping points at the custom ids and counts as approved
    let mapping = "work.condition_occurrence__condition_concept_id_usagi";
    assert_eq!(
        project
            .count(&format!(
                "SELECT * FROM {mapping} WHERE mapping_status = 'APPROVED' AND is_custom"
            ))
            .await,
        2
    );
    assert_eq!(
        project
            .count(&format!(
                "SELECT * FROM {mapping} WHERE concept_id <= {CUSTOM_CONCEPT_ID_FLOOR}"
            ))
            .await,
        0
    );

    assert_eq!(
        project
            .count(&format!(
                "SELECT * FROM omop.concept WHERE concept_id > {CUSTOM_CONCEPT_ID_FLOOR}"
            ))
            .await,
        2
    );
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.source_to_concept_map
                 WHERE source_vocabulary_id = 'condition_occurrence__condition_concept_id'
                   AND target_vocabulary_id = 'Local'
                   AND invalid_reason IS NULL"
            )
            .await,
        2
    );

    // condition rows carry the custom concept of their source code
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.condition_occurrence c
                 JOIN omop.concept k ON k.concept_id = c.condition_concept_id
                 WHERE c.condition_source_value = 'D1' AND k.concept_code = 'LOC1'"
            )
            .await,
        1
    );
}

#[tokio::test]
async fn test_rerun_keeps_concept_ids_and_mappings() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    write_local_concepts(&project);

    project.pipeline().run(None, false).await.unwrap();
    let first = project
        .scalar("SELECT concept_id FROM work.concept_id_swap WHERE source_concept_id = 'LOC2'")
        .await;

    let report = project.pipeline().run(None, false).await.unwrap();
    assert!(!report.has_failures());

    assert_eq!(
        project
            .scalar("SELECT concept_id FROM work.concept_id_swap WHERE source_concept_id = 'LOC2'")
            .await,
        first
    );
    assert_eq!(project.count("SELECT * FROM work.concept_id_swap").await, 2);
    assert_eq!(
        project
            .count(&format!(
                "SELECT * FROM omop.concept WHERE concept_id > {CUSTOM_CONCEPT_ID_FLOOR}"
            ))
            .await,
        2
    );
    assert_eq!(
        project.count("SELECT * FROM omop.source_to_concept_map").await,
        2
    );
    assert_eq!(report.stale_mappings_invalidated, Some(0));
}

#[tokio::test]
async fn test_concurrent_columns_get_distinct_ids() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    write_local_concepts(&project);
    project.write(
        "observation/notes.sql",
        "SELECT diag_id AS observation_id, patient_id AS person_id, code AS observation_concept_id,
                diag_date AS observation_date
         FROM raw.diagnoses",
    );
    project.write(
        "observation/observation_concept_id/custom/notes_concept.csv",
        "\
concept_id,concept_name,domain_id,vocabulary_id,concept_class_id,standard_concept,concept_code,valid_start_date,valid_end_date,invalid_reason
OBS1,Local finding one,Observation,Local,Clinical Finding,S,OBS1,2020-01-01,2099-12-31,
OBS2,Local finding two,Observation,Local,Clinical Finding,S,OBS2,2020-01-01,2099-12-31,
LOC1,Same code other domain,Observation,Local,Clinical Finding,S,LOC1,2020-01-01,2099-12-31,
",
    );

    let report = project.pipeline().run(None, false).await.unwrap();
    assert!(!report.has_failures(), "{:?}", report.failures().collect::<Vec<_>>());
    assert_eq!(
        report.outcome("observation").unwrap().tier,
        report.outcome("condition_occurrence").unwrap().tier
    );

    assert_eq!(project.count("SELECT * FROM work.concept_id_swap").await, 5);
    assert_eq!(
        project
            .count("SELECT DISTINCT concept_id FROM work.concept_id_swap")
            .await,
        5
    );
    assert_eq!(
        project
            .scalar(&format!(
                "SELECT MIN(concept_id) - {CUSTOM_CONCEPT_ID_FLOOR} FROM work.concept_id_swap"
            ))
            .await,
        Some(1)
    );
    assert_eq!(
        project
            .scalar(&format!(
                "SELECT MAX(concept_id) - {CUSTOM_CONCEPT_ID_FLOOR} FROM work.concept_id_swap"
            ))
            .await,
        Some(5)
    );
}

#[tokio::test]
async fn test_timed_out_assignment_does_not_reuse_ids() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    write_local_concepts(&project);
    project.write(
        "observation/notes.sql",
        "SELECT diag_id AS observation_id, patient_id AS person_id, code AS observation_concept_id,
                diag_date AS observation_date
         FROM raw.diagnoses",
    );
    project.write(
        "observation/observation_concept_id/custom/notes_concept.csv",
        "\
concept_id,concept_name,domain_id,vocabulary_id,concept_class_id,standard_concept,concept_code,valid_start_date,valid_end_date,invalid_reason
OBS1,Local finding one,Observation,Local,Clinical Finding,S,OBS1,2020-01-01,2099-12-31,
OBS2,Local finding two,Observation,Local,Clinical Finding,S,OBS2,2020-01-01,2099-12-31,
",
    );

    // the condition id assignment outlives its stage and commits later
    let slow = Arc::new(SlowWarehouse::new(
        project.warehouse.clone(),
        "condition_occurrence__condition_concept_id_concept",
        Duration::from_secs(3),
    ));
    let mut options = project.options();
    options.stage_timeout = Some(Duration::from_secs(1));
    let pipeline = project.pipeline_with(slow.clone(), options);

    let condition: TableName = "condition_occurrence".parse().unwrap();
    let report = pipeline.run(Some(&condition), false).await.unwrap();
    let outcome = report.outcome("condition_occurrence").unwrap();
    assert_eq!(outcome.state, TableState::Failed);
    assert_eq!(outcome.stage, Stage::LoadConcepts);
    assert_eq!(outcome.errors[0].kind, ErrorKind::StageTimeout);

    let observation: TableName = "observation".parse().unwrap();
    pipeline.run(Some(&observation), false).await.unwrap();
    slow.wait_finished(1).await;

    assert_eq!(project.count("SELECT * FROM work.concept_id_swap").await, 4);
    assert_eq!(
        project
            .count("SELECT DISTINCT concept_id FROM work.concept_id_swap")
            .await,
        4
    );
    assert_eq!(
        project
            .scalar(&format!(
                "SELECT MAX(concept_id) - {CUSTOM_CONCEPT_ID_FLOOR} FROM work.concept_id_swap
                 WHERE domain_id = 'Observation'"
            ))
            .await,
        Some(2)
    );
    assert_eq!(
        project
            .scalar(&format!(
                "SELECT MIN(concept_id) - {CUSTOM_CONCEPT_ID_FLOOR} FROM work.concept_id_swap
                 WHERE domain_id = 'Condition'"
            ))
            .await,
        Some(3)
    );
}

#[tokio::test]
async fn test_concept_id_swap_rejects_duplicate_ids() {
    let project = Project::new();
    project.setup().await;

    project
        .warehouse
        .execute(
            "INSERT INTO work.concept_id_swap VALUES ('LOC1', 'Condition', 2000000001)",
        )
        .await
        .unwrap();
    let duplicate = project
        .warehouse
        .execute(
            "INSERT INTO work.concept_id_swap VALUES ('OBS1', 'Observation', 2000000001)",
        )
        .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_stale_mappings_are_invalidated() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project.write_gender_mapping(&[("M", "Male", 8507), ("F", "Female", 8532)]);

    project.pipeline().run(None, false).await.unwrap();
    // pretend the mappings were loaded by an earlier run
    project
        .warehouse
        .execute("UPDATE omop.source_to_concept_map SET valid_start_date = DATE '2020-01-01'")
        .await
        .unwrap();

    project.write_gender_mapping(&[("M", "Male", 8507)]);
    let report = project.pipeline().run(None, false).await.unwrap();

    assert_eq!(report.stale_mappings_invalidated, Some(1));
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.source_to_concept_map
                 WHERE source_code = 'F' AND invalid_reason = 'D'"
            )
            .await,
        1
    );
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.source_to_concept_map
                 WHERE source_code = 'M' AND invalid_reason IS NULL
                   AND valid_start_date > DATE '2020-01-01'"
            )
            .await,
        1
    );
    // the withdrawn mapping no longer applies
    assert_eq!(
        project
            .scalar("SELECT gender_concept_id FROM omop.person WHERE person_source_value = 'p2'")
            .await,
        Some(0)
    );
}

#[tokio::test]
async fn test_skip_mappings_leaves_vocabulary_untouched() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    write_local_concepts(&project);

    let report = project.pipeline().run(None, true).await.unwrap();

    assert_eq!(report.count(TableState::Failed), 0);
    assert_eq!(project.count("SELECT * FROM work.concept_id_swap").await, 0);
    assert_eq!(project.count("SELECT * FROM omop.source_to_concept_map").await, 0);
    assert_eq!(report.stale_mappings_invalidated, None);
}

#[tokio::test]
async fn test_malformed_mapping_file_fails_table() {
    let project = Project::new();
    project.setup().await;
    project.write_queries();
    project.write(
        "person/gender_concept_id/gender_usagi.csv",
        "sourceCode,sourceName\nM,Male\n",
    );

    let report = project.pipeline().run(None, false).await.unwrap();

    let person = report.outcome("person").unwrap();
    assert_eq!(person.state, TableState::Failed);
    assert_eq!(
        person.errors[0].kind,
        cf_core::ErrorKind::MappingFileMalformed
    );
    assert!(person.errors[0]
        .path
        .as_deref()
        .unwrap()
        .ends_with("gender_usagi.csv"));
}
