//! Moves local delimited files into warehouse tables
//!
//! Each file is converted to Parquet by the tabular reader, uploaded to the
//! object store and bulk loaded. The first file replaces the destination
//! table and the rest are appended to it.

use crate::context::EtlContext;
use crate::error::EtlResult;
use cf_db::{CsvFormat, TypedColumn, WriteMode};
use std::path::{Path, PathBuf};

/// Load `files` into `destination`, returns the total row count
pub(crate) async fn load_files(
    ctx: &EtlContext,
    files: &[PathBuf],
    columns: &[TypedColumn],
    format: &CsvFormat,
    destination: &str,
    bucket_prefix: &str,
) -> EtlResult<usize> {
    let mut total = 0;
    for (index, file) in files.iter().enumerate() {
        let stem = file_stem(file);
        let parquet = ctx
            .staging
            .path()
            .join(format!("{}__{}.parquet", bucket_prefix.replace('/', "__"), stem));

        let rows = ctx.reader.read_typed(file, columns, format, &parquet).await?;
        let uri = ctx
            .object_store
            .upload(&parquet, &format!("{}/{}.parquet", bucket_prefix, stem))
            .await?;
        if let Err(e) = tokio::fs::remove_file(&parquet).await {
            log::debug!("Could not remove {}: {}", parquet.display(), e);
        }

        let mode = if index == 0 {
            WriteMode::Truncate
        } else {
            WriteMode::Append
        };
        ctx.warehouse.bulk_load(&uri, destination, mode).await?;
        log::info!("Loaded {} rows from {} into {}", rows, file.display(), destination);
        total += rows;
    }
    Ok(total)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
