use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{Column, Table};
use crate::error::{ColumnRole, EngineError, Result};

// ---------------------------------------------------------------------------
// Filter mode: which side of the baseline survives
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum FilterMode {
    /// Keep columns whose median is at or above the baseline mean.
    AboveBaseline,
    /// Keep columns whose median is below the baseline mean.
    BelowBaseline,
    /// Keep everything.
    #[default]
    Reset,
}

/// Mean of the present cells of `baseline` in `table`.
pub fn baseline_mean(table: &Table, baseline: &str) -> Result<f64> {
    let col = table.require(baseline, ColumnRole::Baseline)?;
    let present = present_values(col)?;
    if present.is_empty() {
        return Err(EngineError::type_error(baseline, "has no values to average"));
    }
    Ok(present.iter().sum::<f64>() / present.len() as f64)
}

/// Median of the present cells, `None` for a column with no values.
pub fn median(col: &Column) -> Result<Option<f64>> {
    let mut values = present_values(col)?;
    if values.is_empty() {
        return Ok(None);
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Ok(Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }))
}

fn present_values(col: &Column) -> Result<Vec<f64>> {
    Ok(col.optional_numeric_values()?.into_iter().flatten().collect())
}

/// One entry per column of `table`: `true` when the column's median is at
/// or above the baseline mean.  A column without values is never above.
///
/// The baseline column compares its own median with its own mean, so it
/// lands on whichever side its distribution puts it.
pub fn baseline_mask(table: &Table, baseline: &str) -> Result<Vec<bool>> {
    let mean = baseline_mean(table, baseline)?;
    table
        .columns()
        .iter()
        .map(|col| Ok(median(col)?.is_some_and(|m| m >= mean)))
        .collect()
}

/// Keep the columns of a ranked table on the `mode` side of the baseline.
///
/// `AboveBaseline` and `BelowBaseline` partition the columns: every column
/// appears in exactly one of the two results.
pub fn filter_by_baseline(table: &Table, baseline: &str, mode: FilterMode) -> Result<Table> {
    table.require(baseline, ColumnRole::Baseline)?;

    let mask = match mode {
        FilterMode::Reset => return Ok(table.clone()),
        FilterMode::AboveBaseline => baseline_mask(table, baseline)?,
        FilterMode::BelowBaseline => baseline_mask(table, baseline)?
            .into_iter()
            .map(|above| !above)
            .collect(),
    };

    let kept = table.retain_columns(&mask);
    debug!(
        "{mode:?} kept {} of {} columns against '{baseline}'",
        kept.num_columns(),
        table.num_columns()
    );
    Ok(kept)
}
