use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Column roles – which part of an operation a column name was supplied for
// ---------------------------------------------------------------------------

/// The role a column plays in an engine operation.  Carried in
/// [`EngineError::ColumnNotFound`] so a misconfigured name points at the
/// setting that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Numeric column aggregated into pivot cells.
    Value,
    /// Categorical column grouped into pivot rows (the interval).
    RowKey,
    /// Categorical column spread into pivot columns (the instrument).
    ColumnKey,
    /// Reference column of a ranked table.
    Baseline,
    /// Numeric column a flag is derived from.
    Source,
    /// Metric column read from each file during a merge.
    Metric,
    /// Boolean column used to select rows before pivoting.
    RowFilter,
    /// Column requested by an explicit projection.
    Projection,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnRole::Value => "value",
            ColumnRole::RowKey => "row key",
            ColumnRole::ColumnKey => "column key",
            ColumnRole::Baseline => "baseline",
            ColumnRole::Source => "source",
            ColumnRole::Metric => "metric",
            ColumnRole::RowFilter => "row filter",
            ColumnRole::Projection => "projected",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unreadable input '{source_name}': {reason}")]
    Format { source_name: String, reason: String },

    #[error("{role} column '{column}' not found{}", in_source(.source_name))]
    ColumnNotFound {
        role: ColumnRole,
        column: String,
        source_name: Option<String>,
    },

    #[error("Column '{column}' must be numeric: {reason}")]
    Type { column: String, reason: String },

    #[error("Column '{column}' has {actual} rows but {expected} were expected")]
    RowCountMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
}

fn in_source(source_name: &Option<String>) -> String {
    match source_name {
        Some(name) => format!(" in '{name}'"),
        None => String::new(),
    }
}

impl EngineError {
    pub(crate) fn format(source_name: impl Into<String>, reason: impl fmt::Display) -> Self {
        EngineError::Format {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn missing(role: ColumnRole, column: &str) -> Self {
        EngineError::ColumnNotFound {
            role,
            column: column.to_string(),
            source_name: None,
        }
    }

    pub(crate) fn type_error(column: &str, reason: impl Into<String>) -> Self {
        EngineError::Type {
            column: column.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the originating file to a column-level error.
    pub(crate) fn in_file(self, file: &str) -> Self {
        match self {
            EngineError::ColumnNotFound { role, column, .. } => EngineError::ColumnNotFound {
                role,
                column,
                source_name: Some(file.to_string()),
            },
            EngineError::Type { column, reason } => EngineError::Type {
                column,
                reason: format!("{reason} (in '{file}')"),
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
