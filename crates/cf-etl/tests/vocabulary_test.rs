mod common;

use cf_core::TableName;
use cf_db::Warehouse;
use cf_etl::VOCABULARY_SNAPSHOT_TABLES;
use common::Project;
use std::io::Write;
use std::path::Path;
use zip::write::SimpleFileOptions;

const CONCEPT_HEADER: &str = "concept_id\tconcept_name\tdomain_id\tvocabulary_id\tconcept_class_id\tstandard_concept\tconcept_code\tvalid_start_date\tvalid_end_date\tinvalid_reason";

fn write_archive(path: &Path, files: &[(&str, String)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_import_replaces_standard_rows_and_keeps_custom_ones() {
    let project = Project::new();
    project.setup().await;
    project
        .warehouse
        .execute_batch(
            "INSERT INTO omop.concept VALUES
             (1, 'Outdated', 'Gender', 'Gender', 'Gender', 'S', 'OLD', DATE '1970-01-01', DATE '2099-12-31', NULL),
             (2000000001, 'Local', 'Condition', 'Local', 'Clinical Finding', 'S', 'LOC1', DATE '2020-01-01', DATE '2099-12-31', NULL);",
        )
        .await
        .unwrap();

    let archive = project.dir.path().join("vocabulary.zip");
    write_archive(
        &archive,
        &[
            (
                "CONCEPT.csv",
                format!(
                    "{CONCEPT_HEADER}\n\
                     8507\tMALE\tGender\tGender\tGender\tS\tM\t19700101\t20991231\t\n\
                     8532\tFEMALE \"F\"\tGender\tGender\tGender\tS\tF\t19700101\t20991231\t\n"
                ),
            ),
            (
                "vocab/VOCABULARY.csv",
                "vocabulary_id\tvocabulary_name\tvocabulary_reference\tvocabulary_version\tvocabulary_concept_id\n\
                 Gender\tOMOP Gender\tOMOP generated\t\t44819134\n"
                    .to_string(),
            ),
        ],
    );

    let mut seen: Vec<TableName> = Vec::new();
    let import = project
        .pipeline()
        .import_vocabulary_snapshot(&archive, |table| seen.push(table.clone()))
        .await
        .unwrap();

    assert_eq!(seen.len(), VOCABULARY_SNAPSHOT_TABLES.len());
    let loaded: Vec<(String, usize)> = import
        .loaded
        .iter()
        .map(|(t, rows)| (t.to_string(), *rows))
        .collect();
    assert_eq!(
        loaded,
        vec![("concept".to_string(), 2), ("vocabulary".to_string(), 1)]
    );
    assert_eq!(import.skipped.len(), VOCABULARY_SNAPSHOT_TABLES.len() - 2);

    assert_eq!(project.count("SELECT * FROM omop.concept").await, 3);
    assert_eq!(
        project
            .count("SELECT * FROM omop.concept WHERE concept_id = 1")
            .await,
        0
    );
    assert_eq!(
        project
            .count("SELECT * FROM omop.concept WHERE concept_id = 2000000001")
            .await,
        1
    );
    // quotes are data in Athena files, dates are compact
    assert_eq!(
        project
            .count(
                "SELECT * FROM omop.concept
                 WHERE concept_name = 'FEMALE \"F\"' AND valid_start_date = DATE '1970-01-01'"
            )
            .await,
        1
    );
    assert_eq!(project.count("SELECT * FROM omop.vocabulary").await, 1);
}

#[tokio::test]
async fn test_import_rejects_broken_archive() {
    let project = Project::new();
    project.setup().await;
    let archive = project.dir.path().join("broken.zip");
    std::fs::write(&archive, "not a zip").unwrap();

    let err = project
        .pipeline()
        .import_vocabulary_snapshot(&archive, |_| {})
        .await
        .unwrap_err();
    assert_eq!(err.path().as_deref(), Some(archive.display().to_string().as_str()));
}
