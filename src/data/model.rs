use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::error::{ColumnRole, EngineError, Result};

// ---------------------------------------------------------------------------
// CellValue – a single cell of a table
// ---------------------------------------------------------------------------

/// A dynamically-typed cell mirroring the common Pandas dtypes.
/// `Null` doubles as the "missing" marker used when padding ranked columns.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

// -- Manual Eq/Ord so we can use CellValue as a grouping key --

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::String(s) => s.hash(state),
            CellValue::Integer(i) => i.hash(state),
            CellValue::Float(f) => f.to_bits().hash(state),
            CellValue::Bool(b) => b.hash(state),
            CellValue::Null => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::String(s) => write!(f, "{s}"),
            CellValue::Integer(i) => write!(f, "{i}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Null => write!(f, "<null>"),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl CellValue {
    /// Interpret the value as an `f64` when it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

// ---------------------------------------------------------------------------
// Column – a named, homogeneous vector of cells
// ---------------------------------------------------------------------------

/// The single type shared by all non-null cells of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every cell is `Null` (or the column is empty).
    Null,
    Integer,
    Float,
    Bool,
    String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        Column {
            name: name.into(),
            values,
        }
    }

    /// Build a float column, handy for tests and derived tables.
    pub fn from_f64(name: impl Into<String>, values: &[f64]) -> Self {
        Column::new(name, values.iter().map(|&v| CellValue::Float(v)).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The type shared by the non-null cells; `String` for a mixed column.
    pub fn kind(&self) -> ColumnKind {
        let mut kind = ColumnKind::Null;
        for value in &self.values {
            let cell_kind = match value {
                CellValue::Null => continue,
                CellValue::Integer(_) => ColumnKind::Integer,
                CellValue::Float(_) => ColumnKind::Float,
                CellValue::Bool(_) => ColumnKind::Bool,
                CellValue::String(_) => ColumnKind::String,
            };
            kind = match (kind, cell_kind) {
                (ColumnKind::Null, k) => k,
                (a, b) if a == b => a,
                (ColumnKind::Integer, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Integer) => {
                    ColumnKind::Float
                }
                _ => ColumnKind::String,
            };
        }
        kind
    }

    /// Make the column homogeneous: integers mixed with floats become floats,
    /// and any other mix falls back to strings.
    pub fn normalize(&mut self) {
        match self.kind() {
            ColumnKind::Float => {
                for value in &mut self.values {
                    if let CellValue::Integer(i) = value {
                        *value = CellValue::Float(*i as f64);
                    }
                }
            }
            ColumnKind::String => {
                for value in &mut self.values {
                    if !value.is_null() && !matches!(value, CellValue::String(_)) {
                        *value = CellValue::String(value.to_string());
                    }
                }
            }
            _ => {}
        }
    }

    /// All cells as numbers.  Fails on the first non-numeric or missing cell
    /// so callers never see a partially converted column.
    pub fn numeric_values(&self) -> Result<Vec<f64>> {
        self.values
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                CellValue::Null => Err(EngineError::type_error(
                    &self.name,
                    format!("row {row} is missing"),
                )),
                other => other.as_f64().ok_or_else(|| {
                    EngineError::type_error(&self.name, format!("row {row} holds '{other}'"))
                }),
            })
            .collect()
    }

    /// Numeric cells with missing cells kept as `None`.
    pub fn optional_numeric_values(&self) -> Result<Vec<Option<f64>>> {
        self.values
            .iter()
            .enumerate()
            .map(|(row, v)| match v {
                CellValue::Null => Ok(None),
                other => other.as_f64().map(Some).ok_or_else(|| {
                    EngineError::type_error(&self.name, format!("row {row} holds '{other}'"))
                }),
            })
            .collect()
    }

    fn to_arrow(&self) -> (Field, ArrayRef) {
        let array: ArrayRef = match self.kind() {
            ColumnKind::Integer => Arc::new(
                self.values
                    .iter()
                    .map(|v| match v {
                        CellValue::Integer(i) => Some(*i),
                        _ => None,
                    })
                    .collect::<Int64Array>(),
            ),
            ColumnKind::Float => Arc::new(
                self.values
                    .iter()
                    .map(CellValue::as_f64)
                    .collect::<Float64Array>(),
            ),
            ColumnKind::Bool => Arc::new(
                self.values
                    .iter()
                    .map(|v| match v {
                        CellValue::Bool(b) => Some(*b),
                        _ => None,
                    })
                    .collect::<BooleanArray>(),
            ),
            ColumnKind::String | ColumnKind::Null => Arc::new(
                self.values
                    .iter()
                    .map(|v| match v {
                        CellValue::Null => None,
                        other => Some(other.to_string()),
                    })
                    .collect::<StringArray>(),
            ),
        };
        let data_type: DataType = array.data_type().clone();
        (Field::new(&self.name, data_type, true), array)
    }
}

// ---------------------------------------------------------------------------
// Table – the loaded record table, stored column-major
// ---------------------------------------------------------------------------

/// An ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking that names are unique and lengths agree.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(EngineError::format(
                    col.name.clone(),
                    "duplicate column name",
                ));
            }
        }
        if let Some(first) = columns.first() {
            let expected = first.len();
            if let Some(bad) = columns.iter().find(|c| c.len() != expected) {
                return Err(EngineError::RowCountMismatch {
                    column: bad.name.clone(),
                    expected,
                    actual: bad.len(),
                });
            }
        }
        Ok(Table { columns })
    }

    pub fn empty() -> Self {
        Table::default()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column that an operation cannot proceed without.
    pub fn require(&self, name: &str, role: ColumnRole) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| EngineError::missing(role, name))
    }

    /// Append a column, or replace the column of the same name in place.
    pub fn upsert_column(&mut self, column: Column) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(EngineError::RowCountMismatch {
                expected: self.num_rows(),
                actual: column.len(),
                column: column.name,
            });
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    /// Project onto the named columns, in the requested order.
    pub fn select(&self, names: &[&str]) -> Result<Table> {
        let columns = names
            .iter()
            .map(|n| self.require(n, ColumnRole::Projection).cloned())
            .collect::<Result<Vec<_>>>()?;
        Table::from_columns(columns)
    }

    /// Keep the columns whose mask entry is `true`.
    pub fn retain_columns(&self, mask: &[bool]) -> Table {
        let columns = self
            .columns
            .iter()
            .zip(mask)
            .filter(|(_, keep)| **keep)
            .map(|(c, _)| c.clone())
            .collect();
        Table { columns }
    }

    /// One row as `(column name, value)` pairs in column order.
    pub fn row(&self, index: usize) -> Vec<(&str, &CellValue)> {
        self.columns
            .iter()
            .filter_map(|c| c.values.get(index).map(|v| (c.name.as_str(), v)))
            .collect()
    }

    /// Convert to an Arrow record batch for printing or writing.
    pub fn to_record_batch(&self) -> std::result::Result<RecordBatch, ArrowError> {
        let (fields, arrays): (Vec<Field>, Vec<ArrayRef>) =
            self.columns.iter().map(Column::to_arrow).unzip();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)
    }
}
