use log::debug;

use super::model::{CellValue, Column, Table};
use crate::config::NetProfitPredicate;
use crate::error::{ColumnRole, Result};

/// Return `table` with a boolean column `flag_name` appended, where each row
/// holds `source > threshold`.  An existing column called `flag_name` is
/// replaced in place.
///
/// The source column is validated as a whole before any flag is computed:
/// a string, boolean or missing cell is a type error.
pub fn derive_flag(table: &Table, source: &str, threshold: f64, flag_name: &str) -> Result<Table> {
    let values = table.require(source, ColumnRole::Source)?.numeric_values()?;

    let flags = values
        .into_iter()
        .map(|v| CellValue::Bool(v > threshold))
        .collect();

    let mut out = table.clone();
    out.upsert_column(Column::new(flag_name, flags))?;
    debug!("derived '{flag_name}' from '{source}' > {threshold}");
    Ok(out)
}

/// Derive the net-profit flag selected by `predicate` (`NP` for the zero
/// threshold, `NP_1` for a chosen threshold).
pub fn derive_net_profit_flag(
    table: &Table,
    net_profit_column: &str,
    predicate: NetProfitPredicate,
) -> Result<Table> {
    derive_flag(
        table,
        net_profit_column,
        predicate.threshold(),
        predicate.flag_name(),
    )
}
