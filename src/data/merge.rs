use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::loader::{is_supported, load_bytes};
use super::model::{CellValue, Column, Table};
use crate::error::{ColumnRole, EngineError, Result};

/// How columns of unequal length are combined into one ranked table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LengthPolicy {
    /// Pad shorter columns with missing cells.
    #[default]
    Pad,
    /// Refuse with [`EngineError::RowCountMismatch`].
    Strict,
}

/// The loadable files of `directory`, sorted by name.
pub fn scan_directory(directory: &Path) -> Result<Vec<String>> {
    let name = directory.display().to_string();
    let entries = std::fs::read_dir(directory).map_err(|e| EngineError::format(name.clone(), e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::format(name.clone(), e))?;
        let path = entry.path();
        if path.is_file() && is_supported(&path) {
            files.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    files.sort();
    debug!("found {} loadable files in '{name}'", files.len());
    Ok(files)
}

/// Column name a file contributes: its name up to the first `.`.
pub fn base_name(file: &str) -> &str {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    name.split_once('.').map_or(name, |(stem, _)| stem)
}

/// Build one ranked table per metric from the files in `directory`, padding
/// columns of unequal length.
pub fn merge_ranked<F, M>(files: &[F], directory: &Path, metrics: &[M]) -> Result<Vec<Table>>
where
    F: AsRef<str>,
    M: AsRef<str>,
{
    merge_ranked_with(files, directory, metrics, LengthPolicy::Pad)
}

pub fn merge_ranked_with<F, M>(
    files: &[F],
    directory: &Path,
    metrics: &[M],
    policy: LengthPolicy,
) -> Result<Vec<Table>>
where
    F: AsRef<str>,
    M: AsRef<str>,
{
    // Each file is parsed once, in full, and shared by every metric; only
    // the metric columns are read from it afterwards.
    let sources = files
        .iter()
        .map(|file| {
            let file = file.as_ref();
            let path = directory.join(file);
            let content = std::fs::read(&path).map_err(|e| EngineError::format(file, e))?;
            Ok((file.to_string(), load_bytes(&content, file)?))
        })
        .collect::<Result<Vec<_>>>()?;

    rank_tables(&sources, metrics, policy)
}

/// Rank already loaded `(file name, table)` pairs, one output table per
/// metric in `metrics` order.
pub fn rank_tables<M: AsRef<str>>(
    sources: &[(String, Table)],
    metrics: &[M],
    policy: LengthPolicy,
) -> Result<Vec<Table>> {
    metrics
        .iter()
        .map(|metric| {
            let metric = metric.as_ref();
            let columns = sources
                .iter()
                .map(|(file, table)| {
                    ranked_column(table, metric, base_name(file)).map_err(|e| e.in_file(file))
                })
                .collect::<Result<Vec<_>>>()?;
            let ranked = align(columns, policy)?;
            info!(
                "ranked '{metric}' across {} files ({} ranks)",
                ranked.num_columns(),
                ranked.num_rows()
            );
            Ok(ranked)
        })
        .collect()
}

/// One file's metric, sorted descending with missing cells last.
fn ranked_column(table: &Table, metric: &str, name: &str) -> Result<Column> {
    let mut values = table
        .require(metric, ColumnRole::Metric)?
        .optional_numeric_values()?;
    values.sort_by(|a, b| match (a, b) {
        (Some(x), Some(y)) => y.total_cmp(x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    let cells = values
        .into_iter()
        .map(|v| v.map_or(CellValue::Null, CellValue::Float))
        .collect();
    Ok(Column::new(name, cells))
}

/// Concatenate columns by position.
fn align(mut columns: Vec<Column>, policy: LengthPolicy) -> Result<Table> {
    let Some(longest) = columns.iter().map(Column::len).max() else {
        return Ok(Table::empty());
    };

    if let Some(short) = columns.iter().find(|c| c.len() != longest) {
        match policy {
            LengthPolicy::Strict => {
                return Err(EngineError::RowCountMismatch {
                    column: short.name.clone(),
                    expected: longest,
                    actual: short.len(),
                })
            }
            LengthPolicy::Pad => {
                for col in columns.iter_mut().filter(|c| c.len() < longest) {
                    warn!(
                        "padding '{}' from {} to {longest} ranks",
                        col.name,
                        col.len()
                    );
                    col.values.resize(longest, CellValue::Null);
                }
            }
        }
    }

    Table::from_columns(columns)
}
