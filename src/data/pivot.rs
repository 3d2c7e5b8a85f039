use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use serde::{Deserialize, Serialize};

use super::model::{CellValue, Column, ColumnKind, Table};
use crate::error::{ColumnRole, EngineError, Result};

// ---------------------------------------------------------------------------
// Aggregation functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Sum,
    Mean,
    Count,
}

impl Aggregate {
    /// Reduce a group.  An empty group yields 0 so the table stays rectangular.
    pub fn apply(self, values: &[f64]) -> f64 {
        match self {
            Aggregate::Sum => values.iter().sum(),
            Aggregate::Mean if values.is_empty() => 0.0,
            Aggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregate::Count => values.len() as f64,
        }
    }

    /// How margins combine cells of this aggregate: counts add up, sums add
    /// up, means average.
    pub fn margin(self) -> Aggregate {
        match self {
            Aggregate::Sum | Aggregate::Count => Aggregate::Sum,
            Aggregate::Mean => Aggregate::Mean,
        }
    }
}

/// Which synthetic totals a pivot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MarginStyle {
    /// A total row under the rows and a total column right of the columns.
    #[default]
    Both,
    /// Only the total row; columns are still ordered by it.
    RowOnly,
}

// ---------------------------------------------------------------------------
// PivotSpec – the column roles of one pivot, checked against a table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PivotSpec {
    pub value: String,
    pub row_key: String,
    pub column_key: String,
    pub aggregate: Aggregate,
    pub margin_aggregate: Aggregate,
    pub margins: MarginStyle,
    pub margin_label: String,
    /// Boolean column; only rows where it is `true` are pivoted.
    pub row_filter: Option<String>,
    /// Round cells (and then totals) to this many decimals.
    pub decimals: Option<u32>,
}

/// The columns of a table bound to their roles in a [`PivotSpec`].
struct Resolved<'a> {
    values: Vec<Option<f64>>,
    rows: &'a Column,
    columns: &'a Column,
    keep: Option<Vec<bool>>,
}

impl PivotSpec {
    pub fn new(
        value: impl Into<String>,
        row_key: impl Into<String>,
        column_key: impl Into<String>,
        aggregate: Aggregate,
    ) -> Self {
        PivotSpec {
            value: value.into(),
            row_key: row_key.into(),
            column_key: column_key.into(),
            aggregate,
            margin_aggregate: aggregate.margin(),
            margins: MarginStyle::Both,
            margin_label: "Grand Total".to_string(),
            row_filter: None,
            decimals: None,
        }
    }

    pub fn with_margins(mut self, style: MarginStyle, label: impl Into<String>, aggregate: Aggregate) -> Self {
        self.margins = style;
        self.margin_label = label.into();
        self.margin_aggregate = aggregate;
        self
    }

    pub fn with_row_filter(mut self, flag_column: impl Into<String>) -> Self {
        self.row_filter = Some(flag_column.into());
        self
    }

    pub fn rounded(mut self, decimals: u32) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Check every role against `table` before anything is aggregated.
    fn resolve<'a>(&self, table: &'a Table) -> Result<Resolved<'a>> {
        let value_col = table.require(&self.value, ColumnRole::Value)?;
        let rows = table.require(&self.row_key, ColumnRole::RowKey)?;
        let columns = table.require(&self.column_key, ColumnRole::ColumnKey)?;

        let keep = match &self.row_filter {
            Some(name) => {
                let flag = table.require(name, ColumnRole::RowFilter)?;
                let mask = flag
                    .values
                    .iter()
                    .map(|v| match v {
                        CellValue::Bool(b) => Ok(*b),
                        CellValue::Null => Ok(false),
                        other => Err(EngineError::type_error(
                            name,
                            format!("row filter holds '{other}', expected a boolean"),
                        )),
                    })
                    .collect::<Result<Vec<bool>>>()?;
                Some(mask)
            }
            None => None,
        };

        let values = pivot_values(value_col)?;
        Ok(Resolved {
            values,
            rows,
            columns,
            keep,
        })
    }
}

/// Value cells as numbers, booleans counting as 1/0.  Missing cells are only
/// allowed under `Count`, where they are skipped.
fn pivot_values(col: &Column) -> Result<Vec<Option<f64>>> {
    if col.kind() == ColumnKind::String {
        return Err(EngineError::type_error(&col.name, "holds text"));
    }
    Ok(col
        .values
        .iter()
        .map(|v| match v {
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            other => other.as_f64(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// PivotTable
// ---------------------------------------------------------------------------

/// Cross-tabulated aggregates with their margins.  Column labels are kept in
/// display order: descending total, margin column excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTable {
    pub row_key: String,
    pub margins: MarginStyle,
    pub margin_label: String,
    rows: Vec<CellValue>,
    columns: Vec<String>,
    /// `cells[row][column]`, margins excluded.
    cells: Vec<Vec<f64>>,
    /// Margin column, one entry per row.
    row_totals: Vec<f64>,
    /// Margin row, one entry per column.
    column_totals: Vec<f64>,
    grand_total: f64,
}

impl PivotTable {
    /// Row labels in ascending order, margin row excluded.
    pub fn row_labels(&self) -> &[CellValue] {
        &self.rows
    }

    /// Column labels in display order, margin column excluded.
    pub fn column_labels(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty()
    }

    pub fn value(&self, row: &CellValue, column: &str) -> Option<f64> {
        let r = self.rows.iter().position(|l| l == row)?;
        let c = self.columns.iter().position(|l| l == column)?;
        Some(self.cells[r][c])
    }

    /// Margin column entry for `row`.
    pub fn row_total(&self, row: &CellValue) -> Option<f64> {
        let r = self.rows.iter().position(|l| l == row)?;
        Some(self.row_totals[r])
    }

    /// Margin row entry for `column`.
    pub fn column_total(&self, column: &str) -> Option<f64> {
        let c = self.columns.iter().position(|l| l == column)?;
        Some(self.column_totals[c])
    }

    pub fn grand_total(&self) -> f64 {
        self.grand_total
    }

    /// Flatten into a plain table: the row key becomes the leading column,
    /// the margin row is last and (with [`MarginStyle::Both`]) the margin
    /// column is rightmost.
    pub fn to_table(&self) -> Result<Table> {
        let mut labels: Vec<CellValue> = self.rows.clone();
        labels.push(CellValue::String(self.margin_label.clone()));
        let mut key = Column::new(self.row_key.clone(), labels);
        key.normalize();

        let mut columns = vec![key];
        for (c, name) in self.columns.iter().enumerate() {
            let mut values: Vec<CellValue> = self.cells.iter().map(|row| row[c].into()).collect();
            values.push(self.column_totals[c].into());
            columns.push(Column::new(name.clone(), values));
        }
        if self.margins == MarginStyle::Both {
            let mut values: Vec<CellValue> = self.row_totals.iter().map(|&v| v.into()).collect();
            values.push(self.grand_total.into());
            columns.push(Column::new(self.margin_label.clone(), values));
        }
        Table::from_columns(columns)
    }
}

// ---------------------------------------------------------------------------
// Pivot
// ---------------------------------------------------------------------------

/// Sum/mean/count `value_column` per (`row_key`, `column_key`) pair with a
/// "Grand Total" row and column.
pub fn pivot(
    table: &Table,
    value_column: &str,
    row_key: &str,
    column_key: &str,
    aggregate: Aggregate,
) -> Result<PivotTable> {
    pivot_with(table, &PivotSpec::new(value_column, row_key, column_key, aggregate))
}

/// Pivot with full control over margins, filtering and rounding.
pub fn pivot_with(table: &Table, spec: &PivotSpec) -> Result<PivotTable> {
    if table.num_columns() == 0 {
        return Ok(assemble(spec, Vec::new(), Vec::new(), Vec::new()));
    }
    let resolved = spec.resolve(table)?;

    let mut groups: BTreeMap<(CellValue, CellValue), Vec<f64>> = BTreeMap::new();
    let mut row_keys = BTreeSet::new();
    let mut col_keys = BTreeSet::new();

    for (i, value) in resolved.values.iter().enumerate() {
        if resolved.keep.as_ref().is_some_and(|mask| !mask[i]) {
            continue;
        }
        let row = &resolved.rows.values[i];
        let col = &resolved.columns.values[i];
        if row.is_null() || col.is_null() {
            continue;
        }
        let entry = groups.entry((row.clone(), col.clone())).or_default();
        match value {
            Some(v) => entry.push(*v),
            None if spec.aggregate == Aggregate::Count => {}
            None => {
                return Err(EngineError::type_error(
                    &spec.value,
                    format!("row {i} is missing"),
                ))
            }
        }
        row_keys.insert(row.clone());
        col_keys.insert(col.clone());
    }

    let rows: Vec<CellValue> = row_keys.into_iter().collect();
    let columns: Vec<CellValue> = col_keys.into_iter().collect();
    let cells: Vec<Vec<f64>> = rows
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| {
                    let cell = groups
                        .get(&(r.clone(), c.clone()))
                        .map_or(0.0, |vals| spec.aggregate.apply(vals));
                    round_to(cell, spec.decimals)
                })
                .collect()
        })
        .collect();

    let labels: Vec<String> = columns.iter().map(CellValue::to_string).collect();
    check_labels(spec, &labels)?;
    let out = assemble(spec, rows, labels, cells);
    debug!(
        "pivoted '{}' into {} rows x {} columns",
        spec.value,
        out.rows.len(),
        out.columns.len()
    );
    Ok(out)
}

/// Column labels must not collide with the columns `to_table` adds.
fn check_labels(spec: &PivotSpec, labels: &[String]) -> Result<()> {
    for label in labels {
        let clash = if *label == spec.row_key {
            "row key"
        } else if spec.margins == MarginStyle::Both && *label == spec.margin_label {
            "margin"
        } else {
            continue;
        };
        return Err(EngineError::format(
            &spec.column_key,
            format!("value '{label}' clashes with the {clash} column"),
        ));
    }
    Ok(())
}

/// Compute margins and put the columns in display order.
fn assemble(spec: &PivotSpec, rows: Vec<CellValue>, columns: Vec<String>, cells: Vec<Vec<f64>>) -> PivotTable {
    let margin = spec.margin_aggregate;
    let row_totals: Vec<f64> = cells
        .iter()
        .map(|row| round_to(margin.apply(row), spec.decimals))
        .collect();
    let column_totals: Vec<f64> = (0..columns.len())
        .map(|c| {
            let column: Vec<f64> = cells.iter().map(|row| row[c]).collect();
            round_to(margin.apply(&column), spec.decimals)
        })
        .collect();
    let everything: Vec<f64> = cells.iter().flatten().copied().collect();
    let grand_total = round_to(margin.apply(&everything), spec.decimals);

    // Stable sort: equal totals keep their ascending-label order.
    let mut order: Vec<usize> = (0..columns.len()).collect();
    order.sort_by(|&a, &b| column_totals[b].total_cmp(&column_totals[a]));

    PivotTable {
        row_key: spec.row_key.clone(),
        margins: spec.margins,
        margin_label: spec.margin_label.clone(),
        columns: order.iter().map(|&c| columns[c].clone()).collect(),
        cells: cells
            .iter()
            .map(|row| order.iter().map(|&c| row[c]).collect())
            .collect(),
        column_totals: order.iter().map(|&c| column_totals[c]).collect(),
        rows,
        row_totals,
        grand_total,
    }
}

fn round_to(value: f64, decimals: Option<u32>) -> f64 {
    match decimals {
        Some(d) => {
            let factor = 10f64.powi(d as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}
