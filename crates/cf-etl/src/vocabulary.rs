//! Import of an Athena vocabulary snapshot

use crate::context::EtlContext;
use crate::error::{EtlError, EtlResult};
use crate::loader::load_files;
use crate::work_tables::CUSTOM_CONCEPT_ID_FLOOR;
use cf_core::TableName;
use cf_db::{CsvFormat, TypedColumn};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Vocabulary tables shipped in an Athena download, in load order
pub const VOCABULARY_SNAPSHOT_TABLES: [&str; 9] = [
    "concept",
    "concept_ancestor",
    "concept_class",
    "concept_relationship",
    "concept_synonym",
    "domain",
    "drug_strength",
    "relationship",
    "vocabulary",
];

/// Outcome of a vocabulary import
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularyImport {
    /// Tables replaced, with the number of rows loaded
    pub loaded: Vec<(TableName, usize)>,
    /// Tables whose file was missing from the archive
    pub skipped: Vec<TableName>,
}

/// Rows that survive a snapshot import because they involve custom concepts
fn custom_rows_filter(table: &str) -> Option<String> {
    let floor = CUSTOM_CONCEPT_ID_FLOOR;
    match table {
        "concept" | "concept_synonym" => Some(format!("concept_id >= {}", floor)),
        "concept_relationship" => Some(format!(
            "concept_id_1 >= {floor} OR concept_id_2 >= {floor}"
        )),
        "concept_ancestor" => Some(format!(
            "ancestor_concept_id >= {floor} OR descendant_concept_id >= {floor}"
        )),
        _ => None,
    }
}

/// Extract `archive` into a fresh temporary directory
pub(crate) async fn extract_archive(archive: &Path) -> EtlResult<tempfile::TempDir> {
    let path = archive.to_path_buf();
    let archive_error = |message: String| EtlError::Archive {
        path: archive.display().to_string(),
        message,
    };

    let dir = tempfile::Builder::new()
        .prefix("cdmflow-vocabulary-")
        .tempdir()
        .map_err(|e| archive_error(e.to_string()))?;
    let target = dir.path().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<(), String> {
        let file = std::fs::File::open(&path).map_err(|e| e.to_string())?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
        zip.extract(&target).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| EtlError::Task(e.to_string()))?
    .map_err(archive_error)?;

    Ok(dir)
}

/// Find `<TABLE>.csv` in the extracted archive, at the top level or one
/// folder down
fn find_snapshot_file(dir: &Path, table: &str) -> Option<PathBuf> {
    let wanted = format!("{}.csv", table);
    let matches = |path: &Path| {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.eq_ignore_ascii_case(&wanted))
    };

    let entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    if let Some(found) = entries.iter().find(|p| p.is_file() && matches(p)) {
        return Some(found.clone());
    }
    entries
        .iter()
        .filter(|p| p.is_dir())
        .filter_map(|sub| std::fs::read_dir(sub).ok())
        .flat_map(|rd| rd.filter_map(|e| e.ok().map(|e| e.path())))
        .find(|p| p.is_file() && matches(p))
}

#[derive(Serialize)]
struct ReplaceContext<'a> {
    target: &'a str,
    upload: &'a str,
    keep: Option<String>,
}

/// Replace one vocabulary table with the rows of its snapshot file
async fn import_table(ctx: &EtlContext, dir: &Path, table: &TableName) -> EtlResult<Option<usize>> {
    let Some(file) = find_snapshot_file(dir, table) else {
        log::warn!(
            "{}.csv not found in the vocabulary archive, {} left unchanged",
            table.to_ascii_uppercase(),
            table
        );
        return Ok(None);
    };

    let spec = ctx.catalog.table(table)?;
    let columns: Vec<TypedColumn> = spec
        .columns
        .iter()
        .map(|c| TypedColumn::new(c.name.as_str(), c.data_type))
        .collect();
    let upload = ctx.tables.vocabulary_upload(table);
    let rows = load_files(
        ctx,
        &[file],
        &columns,
        &CsvFormat::athena(),
        &upload,
        &format!("vocabulary/{}", table),
    )
    .await?;

    let sql = ctx.renderer.render(
        "vocabulary_replace",
        ReplaceContext {
            target: &ctx.tables.omop(table),
            upload: &upload,
            keep: custom_rows_filter(table),
        },
    )?;
    {
        let _guard = ctx.catalog_writes.lock().await;
        ctx.warehouse.execute_atomic(&sql).await?;
    }
    log::info!("Vocabulary table {} replaced with {} rows", table, rows);
    Ok(Some(rows))
}

/// Import every vocabulary file of an Athena archive.
///
/// `on_table` is called before each table is imported.
pub(crate) async fn import_vocabulary_snapshot(
    ctx: &EtlContext,
    archive: &Path,
    mut on_table: impl FnMut(&TableName),
) -> EtlResult<VocabularyImport> {
    let dir = extract_archive(archive).await?;
    let mut summary = VocabularyImport::default();

    for name in VOCABULARY_SNAPSHOT_TABLES {
        let table: TableName = name.parse()?;
        on_table(&table);
        match import_table(ctx, dir.path(), &table).await? {
            Some(rows) => summary.loaded.push((table, rows)),
            None => summary.skipped.push(table),
        }
    }
    Ok(summary)
}
