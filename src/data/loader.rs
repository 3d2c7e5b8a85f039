use std::io::Cursor;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use bytes::Bytes;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::{Map, Value as JsonValue};

use super::model::{CellValue, Column, Table};
use crate::error::{EngineError, Result};

/// Extensions [`load_bytes`] knows how to parse.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "csv", "txt", "json", "parquet", "pq", "xls", "xlsx", "xlsm", "xlsb", "ods",
];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a record table from a file on disk.  The handle is dropped before
/// parsing starts, whatever the outcome.
pub fn load_file(path: &Path) -> Result<Table> {
    let name = path.display().to_string();
    let content = std::fs::read(path).map_err(|e| EngineError::format(name.clone(), e))?;
    load_bytes(&content, &name)
}

/// Parse raw content into a record table.  Dispatch by the extension of
/// `filename`.
///
/// Supported formats:
/// * `.csv` / `.txt` – comma separated, header row first
/// * `.json`         – records (`[{..}, ..]`) or split (`{"columns", "data"}`) orient
/// * `.parquet`      – any flat schema of ints, floats, bools and strings
/// * `.xls[x|m|b]` / `.ods` – first worksheet, header row first
pub fn load_bytes(content: &[u8], filename: &str) -> Result<Table> {
    let ext = extension(filename);
    debug!("loading '{filename}' ({} bytes) as .{ext}", content.len());

    match ext.as_str() {
        "csv" | "txt" => load_csv(content, filename),
        "json" => load_json(content, filename),
        "parquet" | "pq" => load_parquet(content, filename),
        "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => load_excel(content, filename),
        other => Err(EngineError::format(
            filename,
            format!("unsupported file extension: .{other}"),
        )),
    }
}

/// Parse `content` and keep only `columns`, in that order.  A missing column
/// is reported against `filename`.
pub fn load_columns(content: &[u8], filename: &str, columns: &[&str]) -> Result<Table> {
    load_bytes(content, filename)?
        .select(columns)
        .map_err(|e| e.in_file(filename))
}

/// Whether `path` carries an extension [`load_bytes`] understands.
pub fn is_supported(path: &Path) -> bool {
    let name = path.to_string_lossy();
    SUPPORTED_EXTENSIONS.contains(&extension(&name).as_str())
}

fn extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

// ---------------------------------------------------------------------------
// Shared row → column assembly
// ---------------------------------------------------------------------------

/// Transpose parsed rows into normalized columns.  Blank headers (a saved
/// index column, an unlabelled spreadsheet column) are named `Unnamed: {pos}`.
fn build_table(source: &str, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Result<Table> {
    let mut columns: Vec<Column> = headers
        .into_iter()
        .enumerate()
        .map(|(pos, h)| {
            let name = if h.trim().is_empty() {
                debug!("'{source}': naming blank header {pos}");
                format!("Unnamed: {pos}")
            } else {
                h
            };
            Column::new(name, Vec::with_capacity(rows.len()))
        })
        .collect();

    for (row_no, row) in rows.into_iter().enumerate() {
        if row.len() != columns.len() {
            return Err(EngineError::format(
                source,
                format!(
                    "row {row_no} has {} fields but the header has {}",
                    row.len(),
                    columns.len()
                ),
            ));
        }
        for (col, value) in columns.iter_mut().zip(row) {
            col.values.push(value);
        }
    }

    for col in &mut columns {
        col.normalize();
    }

    Table::from_columns(columns).map_err(|e| match e {
        EngineError::Format { reason, source_name } => {
            EngineError::format(source, format!("{source_name}: {reason}"))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one record per line.
fn load_csv(content: &[u8], source: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| EngineError::format(source, format!("reading CSV headers: {e}")))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record =
            result.map_err(|e| EngineError::format(source, format!("CSV row {row_no}: {e}")))?;
        rows.push(record.iter().map(guess_cell_type).collect());
    }

    build_table(source, headers, rows)
}

fn guess_cell_type(s: &str) -> CellValue {
    let s = s.trim();
    if s.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return CellValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        if f.is_nan() {
            return CellValue::Null;
        }
        return CellValue::Float(f);
    }
    match s {
        "true" | "True" | "TRUE" => CellValue::Bool(true),
        "false" | "False" | "FALSE" => CellValue::Bool(false),
        _ => CellValue::String(s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Records orient (the default `df.to_json(orient='records')`):
///
/// ```json
/// [ { "Ins": "ES", "All: Net Profit": 1250.0 }, ... ]
/// ```
///
/// Split orient (`df.to_json(orient='split')`):
///
/// ```json
/// { "columns": ["Ins", "All: Net Profit"], "index": [0], "data": [["ES", 1250.0]] }
/// ```
fn load_json(content: &[u8], source: &str) -> Result<Table> {
    let root: JsonValue = serde_json::from_slice(content)
        .map_err(|e| EngineError::format(source, format!("parsing JSON: {e}")))?;

    match root {
        JsonValue::Array(records) => load_json_records(&records, source),
        JsonValue::Object(obj) => load_json_split(&obj, source),
        _ => Err(EngineError::format(
            source,
            "expected a top-level JSON array or split-orient object",
        )),
    }
}

fn load_json_records(records: &[JsonValue], source: &str) -> Result<Table> {
    let mut headers: Vec<String> = Vec::new();
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| EngineError::format(source, format!("row {i} is not a JSON object")))?;
        for key in obj.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    // Keys absent from a record become missing cells, as in Pandas.
    let rows = records
        .iter()
        .filter_map(JsonValue::as_object)
        .map(|obj| {
            headers
                .iter()
                .map(|h| obj.get(h).map_or(CellValue::Null, json_to_cell))
                .collect()
        })
        .collect();

    build_table(source, headers, rows)
}

fn load_json_split(obj: &Map<String, JsonValue>, source: &str) -> Result<Table> {
    let headers: Vec<String> = obj
        .get("columns")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| EngineError::format(source, "split orient needs a 'columns' array"))?
        .iter()
        .map(|c| match c {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    let data = obj
        .get("data")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| EngineError::format(source, "split orient needs a 'data' array"))?;

    let rows = data
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.as_array()
                .map(|cells| cells.iter().map(json_to_cell).collect())
                .ok_or_else(|| EngineError::format(source, format!("data row {i} is not an array")))
        })
        .collect::<Result<Vec<Vec<CellValue>>>>()?;

    build_table(source, headers, rows)
}

fn json_to_cell(val: &JsonValue) -> CellValue {
    match val {
        JsonValue::String(s) => CellValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                CellValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                CellValue::Float(f)
            } else {
                CellValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => CellValue::Bool(*b),
        JsonValue::Null => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a flat Parquet table.  Works with files written by both **Pandas**
/// (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn load_parquet(content: &[u8], source: &str) -> Result<Table> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::copy_from_slice(content))
        .map_err(|e| EngineError::format(source, format!("reading parquet metadata: {e}")))?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder
        .build()
        .map_err(|e| EngineError::format(source, format!("building parquet reader: {e}")))?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| EngineError::format(source, format!("reading parquet batch: {e}")))?;
        for row in 0..batch.num_rows() {
            let cells = batch
                .columns()
                .iter()
                .map(|col| extract_cell(col, row))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EngineError::format(source, format!("row {row}: {e}")))?;
            rows.push(cells);
        }
    }

    build_table(source, headers, rows)
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_cell(col: &ArrayRef, row: usize) -> std::result::Result<CellValue, arrow::error::ArrowError> {
    if col.is_null(row) {
        return Ok(CellValue::Null);
    }
    let cell = match col.data_type() {
        DataType::Utf8 => CellValue::String(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => CellValue::String(col.as_string::<i64>().value(row).to_string()),
        DataType::Boolean => CellValue::Bool(col.as_boolean().value(row)),
        DataType::Int8 => CellValue::Integer(col.as_primitive::<Int8Type>().value(row) as i64),
        DataType::Int16 => CellValue::Integer(col.as_primitive::<Int16Type>().value(row) as i64),
        DataType::Int32 => CellValue::Integer(col.as_primitive::<Int32Type>().value(row) as i64),
        DataType::Int64 => CellValue::Integer(col.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => CellValue::Integer(col.as_primitive::<UInt8Type>().value(row) as i64),
        DataType::UInt16 => CellValue::Integer(col.as_primitive::<UInt16Type>().value(row) as i64),
        DataType::UInt32 => CellValue::Integer(col.as_primitive::<UInt32Type>().value(row) as i64),
        DataType::UInt64 => {
            let v = col.as_primitive::<UInt64Type>().value(row);
            i64::try_from(v).map_or(CellValue::Float(v as f64), CellValue::Integer)
        }
        DataType::Float32 => float_cell(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => float_cell(col.as_primitive::<Float64Type>().value(row)),
        // Dictionaries (Pandas categoricals), dates and the rest print as text.
        _ => CellValue::String(array_value_to_string(col.as_ref(), row)?),
    };
    Ok(cell)
}

fn float_cell(v: f64) -> CellValue {
    if v.is_nan() {
        CellValue::Null
    } else {
        CellValue::Float(v)
    }
}

// ---------------------------------------------------------------------------
// Excel loader
// ---------------------------------------------------------------------------

/// First worksheet only; the first row holds the column names.
fn load_excel(content: &[u8], source: &str) -> Result<Table> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))
        .map_err(|e| EngineError::format(source, format!("Excel: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| EngineError::format(source, "Excel file has no worksheets"))?
        .map_err(|e| EngineError::format(source, format!("Excel: {e}")))?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Ok(Table::empty());
    };
    let headers: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
    let rows = sheet_rows
        .map(|r| r.iter().map(excel_to_cell).collect())
        .collect();

    build_table(source, headers, rows)
}

/// Spreadsheets store every number as a float; whole ones come back as
/// integers.
fn excel_to_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Integer(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => CellValue::Integer(*f as i64),
        Data::Float(f) => float_cell(*f),
        Data::String(s) => guess_cell_type(s),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::Empty | Data::Error(_) => CellValue::Null,
        other => CellValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;

    use super::*;
    use crate::data::model::ColumnKind;
    use crate::error::ColumnRole;

    const SUMMARY_CSV: &str = "\
Ins,Data1: Interval,All: Net Profit,All: Total Trades
ES,5 min,1250.5,40
NQ,5 min,-300,12
ES,15 min,45000,8
";

    #[test]
    fn csv_columns_are_typed() {
        let table = load_bytes(SUMMARY_CSV.as_bytes(), "upload.csv").unwrap();
        assert_eq!(table.num_rows(), 3);
        assert_eq!(
            table.column_names(),
            vec!["Ins", "Data1: Interval", "All: Net Profit", "All: Total Trades"]
        );
        assert_eq!(table.column("Ins").unwrap().kind(), ColumnKind::String);
        assert_eq!(table.column("All: Net Profit").unwrap().kind(), ColumnKind::Float);
        assert_eq!(table.column("All: Total Trades").unwrap().kind(), ColumnKind::Integer);
        assert_eq!(
            table.column("All: Net Profit").unwrap().values[1],
            CellValue::Float(-300.0)
        );
    }

    #[test]
    fn txt_exports_parse_as_csv() {
        let table = load_bytes(b"All: Net Profit\n1\n2\n", "ES.txt").unwrap();
        assert_eq!(table.num_rows(), 2);
    }

    #[test]
    fn ragged_csv_is_a_format_error() {
        let err = load_bytes(b"a,b\n1,2\n3\n", "bad.csv").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn duplicate_headers_are_a_format_error() {
        let err = load_bytes(b"a,a\n1,2\n", "dup.csv").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn unknown_extension_is_a_format_error() {
        let err = load_bytes(b"whatever", "notes.docx").unwrap_err();
        match err {
            EngineError::Format { source_name, reason } => {
                assert_eq!(source_name, "notes.docx");
                assert!(reason.contains(".docx"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn json_records_fill_missing_keys() {
        let json = br#"[{"Ins": "ES", "All: Net Profit": 10}, {"Ins": "NQ"}]"#;
        let table = load_bytes(json, "upload.json").unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.column("All: Net Profit").unwrap().values,
            vec![CellValue::Integer(10), CellValue::Null]
        );
    }

    #[test]
    fn json_split_orient() {
        let json = br#"{"columns": ["Ins", "NP"], "index": [0, 1], "data": [["ES", true], ["NQ", false]]}"#;
        let table = load_bytes(json, "state.json").unwrap();
        assert_eq!(table.column_names(), vec!["Ins", "NP"]);
        assert_eq!(table.column("NP").unwrap().kind(), ColumnKind::Bool);
    }

    #[test]
    fn malformed_json_fails_atomically() {
        let err = load_bytes(br#"[{"a": 1}, "#, "upload.json").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn parquet_upload() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Ins", DataType::Utf8, false),
            Field::new("All: Net Profit", DataType::Float64, true),
            Field::new("All: Total Trades", DataType::Int32, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["ES", "NQ"])),
                Arc::new(Float64Array::from(vec![Some(10.5), None])),
                Arc::new(Int32Array::from(vec![3, 4])),
            ],
        )
        .unwrap();
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let table = load_bytes(&buf, "upload.parquet").unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(
            table.column("All: Net Profit").unwrap().values,
            vec![CellValue::Float(10.5), CellValue::Null]
        );
        assert_eq!(
            table.column("All: Total Trades").unwrap().values,
            vec![CellValue::Integer(3), CellValue::Integer(4)]
        );
    }

    #[test]
    fn garbage_parquet_is_a_format_error() {
        let err = load_bytes(b"not parquet at all", "upload.parquet").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn garbage_excel_is_a_format_error() {
        let err = load_bytes(b"not a workbook", "upload.xlsx").unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    fn workbook(fill: impl FnOnce(&mut rust_xlsxwriter::Worksheet)) -> Vec<u8> {
        let mut book = rust_xlsxwriter::Workbook::new();
        fill(book.add_worksheet());
        book.save_to_buffer().unwrap()
    }

    #[test]
    fn excel_first_sheet_is_typed() {
        let content = workbook(|sheet| {
            for (c, name) in ["Ins", "Data1: Interval", "All: Net Profit", "All: Total Trades", "NP"]
                .into_iter()
                .enumerate()
            {
                sheet.write_string(0, c as u16, name).unwrap();
            }
            sheet.write_string(1, 0, "ES").unwrap();
            sheet.write_string(1, 1, "5 min").unwrap();
            sheet.write_number(1, 2, 1250.5).unwrap();
            sheet.write_number(1, 3, 40.0).unwrap();
            sheet.write_boolean(1, 4, true).unwrap();
            sheet.write_string(2, 0, "NQ").unwrap();
            sheet.write_string(2, 1, "15 min").unwrap();
            sheet.write_number(2, 3, 12.0).unwrap();
            sheet.write_boolean(2, 4, false).unwrap();
        });

        let table = load_bytes(&content, "upload.xlsx").unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Ins", "Data1: Interval", "All: Net Profit", "All: Total Trades", "NP"]
        );
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column("Ins").unwrap().kind(), ColumnKind::String);
        assert_eq!(
            table.column("All: Net Profit").unwrap().values,
            vec![CellValue::Float(1250.5), CellValue::Null]
        );
        assert_eq!(
            table.column("All: Total Trades").unwrap().values,
            vec![CellValue::Integer(40), CellValue::Integer(12)]
        );
        assert_eq!(
            table.column("NP").unwrap().values,
            vec![CellValue::Bool(true), CellValue::Bool(false)]
        );
    }

    #[test]
    fn empty_excel_sheet_is_an_empty_table() {
        let content = workbook(|_| {});
        let table = load_bytes(&content, "upload.xlsx").unwrap();
        assert_eq!(table.num_columns(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn blank_headers_are_named_by_position() {
        let csv = ",Ins,Data1: Interval,All: Net Profit\n0,ES,5 min,10\n1,NQ,5 min,-3\n";
        let table = load_bytes(csv.as_bytes(), "upload.csv").unwrap();
        assert_eq!(
            table.column_names(),
            vec!["Unnamed: 0", "Ins", "Data1: Interval", "All: Net Profit"]
        );
        assert_eq!(
            table.column("Unnamed: 0").unwrap().values,
            vec![CellValue::Integer(0), CellValue::Integer(1)]
        );

        let content = workbook(|sheet| {
            sheet.write_string(0, 0, "Ins").unwrap();
            sheet.write_string(0, 2, "Qty").unwrap();
            sheet.write_string(1, 0, "ES").unwrap();
            sheet.write_number(1, 1, 2.5).unwrap();
            sheet.write_number(1, 2, 4.0).unwrap();
        });
        let table = load_bytes(&content, "upload.xlsx").unwrap();
        assert_eq!(table.column_names(), vec!["Ins", "Unnamed: 1", "Qty"]);
        assert_eq!(table.column("Unnamed: 1").unwrap().values, vec![CellValue::Float(2.5)]);
    }

    #[test]
    fn load_columns_names_the_file() {
        let err = load_columns(SUMMARY_CSV.as_bytes(), "ES.txt", &["All: TS Index"]).unwrap_err();
        match err {
            EngineError::ColumnNotFound { column, source_name, role } => {
                assert_eq!(column, "All: TS Index");
                assert_eq!(role, ColumnRole::Projection);
                assert_eq!(source_name.as_deref(), Some("ES.txt"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.csv");
        std::fs::write(&path, SUMMARY_CSV).unwrap();
        assert_eq!(load_file(&path).unwrap().num_rows(), 3);

        let err = load_file(&dir.path().join("missing.csv")).unwrap_err();
        assert!(matches!(err, EngineError::Format { .. }));
    }

    #[test]
    fn supported_extensions() {
        assert!(is_supported(Path::new("runs/ES.TXT")));
        assert!(is_supported(Path::new("upload.xlsx")));
        assert!(!is_supported(Path::new("README.md")));
    }
}
