use std::fs;
use std::path::Path;

use parquet::arrow::ArrowWriter;
use tempfile::tempdir;

use pivot_panda::config::{EngineConfig, NetProfitPredicate, ThresholdOption};
use pivot_panda::data::filter::FilterMode;
use pivot_panda::data::loader::load_bytes;
use pivot_panda::data::merge::LengthPolicy;
use pivot_panda::data::model::CellValue;
use pivot_panda::report::{summarize, summarize_upload, ComparisonSet};
use pivot_panda::EngineError;

const UPLOAD: &str = "\
Ins,Data1: Interval,All: Net Profit,All: Total Trades
ES,5 min,42000,31
ES,5 min,21000,40
ES,15 min,36000,12
NQ,5 min,51000,18
NQ,15 min,-4000,70
CL,60 min,25000,5
";

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

fn run_file(profits: &[i64]) -> String {
    let mut body = String::from("All: Net Profit,All: ProfitFactor,All: TS Index\n");
    for (i, p) in profits.iter().enumerate() {
        body.push_str(&format!("{p},1.{i},{}\n", p / 10));
    }
    body
}

#[test]
fn threshold_summary_counts_and_averages() {
    let config = EngineConfig::default();
    let predicate = NetProfitPredicate::AboveThreshold(ThresholdOption::Above30000);
    let summary = summarize_upload(UPLOAD.as_bytes(), "upload.csv", &config, predicate).unwrap();

    let np = summary.net_profit.to_table().unwrap();
    assert_eq!(
        np.column_names(),
        vec!["Data1: Interval", "ES", "NQ", "CL", "Grand Total"]
    );
    // Rows: 15 min, 5 min, 60 min, then the margin row.
    assert_eq!(
        np.column("Grand Total").unwrap().values,
        vec![
            CellValue::Float(1.0),
            CellValue::Float(2.0),
            CellValue::Float(0.0),
            CellValue::Float(3.0)
        ]
    );

    let trades = &summary.total_trades;
    assert_eq!(trades.column_labels(), &["ES", "NQ"].map(String::from));
    assert_eq!(trades.value(&"5 min".into(), "ES"), Some(31.0));
    assert_eq!(trades.column_total("ES"), Some(43.0));
}

#[test]
fn upload_formats_agree() {
    let config = EngineConfig::default();
    let from_csv = load_bytes(UPLOAD.as_bytes(), "upload.csv").unwrap();

    let batch = from_csv.to_record_batch().unwrap();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
    let from_parquet = load_bytes(&buf, "upload.parquet").unwrap();
    assert_eq!(from_parquet, from_csv);

    let a = summarize(&from_csv, &config, NetProfitPredicate::AboveZero).unwrap();
    let b = summarize(&from_parquet, &config, NetProfitPredicate::AboveZero).unwrap();
    assert_eq!(a.net_profit, b.net_profit);
    assert_eq!(a.total_trades, b.total_trades);
}

#[test]
fn summary_failures_are_returned() {
    let config = EngineConfig::default();
    let err = summarize_upload(b"\x00\x01", "upload.pdf", &config, NetProfitPredicate::AboveZero)
        .unwrap_err();
    assert!(matches!(err, EngineError::Format { .. }));

    let text_profit = "Ins,Data1: Interval,All: Net Profit,All: Total Trades\nES,5 min,n/a,3\n";
    let err = summarize_upload(
        text_profit.as_bytes(),
        "upload.csv",
        &config,
        NetProfitPredicate::AboveZero,
    )
    .unwrap_err();
    assert!(matches!(err, EngineError::Type { .. }));
}

#[test]
fn directory_comparison() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Base.txt", &run_file(&[100, 300, 200]));
    write(dir.path(), "ES.txt", &run_file(&[500, 250, 400]));
    write(dir.path(), "NQ.txt", &run_file(&[50, 10, 900]));
    write(dir.path(), "README.md", "not a run export");

    let config = EngineConfig::default();
    let set = ComparisonSet::load(dir.path(), &config).unwrap();
    assert_eq!(set.tables.len(), 3);

    let ranked = set.ranked("All: Net Profit").unwrap();
    assert_eq!(ranked.column_names(), vec!["Base", "ES", "NQ"]);
    for col in ranked.columns() {
        let values = col.numeric_values().unwrap();
        assert!(values.windows(2).all(|w| w[0] >= w[1]), "{} not descending", col.name);
    }

    // mean(Base) = 200; medians: Base 200, ES 400, NQ 50.
    let above = set.view("All: Net Profit", FilterMode::AboveBaseline).unwrap();
    assert_eq!(above.column_names(), vec!["Base", "ES"]);
    let below = set.view("All: Net Profit", FilterMode::BelowBaseline).unwrap();
    assert_eq!(below.column_names(), vec!["NQ"]);
    let all = set.view("All: Net Profit", FilterMode::Reset).unwrap();
    assert_eq!(&all, ranked);
}

#[test]
fn strict_policy_rejects_short_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Base.txt", &run_file(&[1, 2, 3]));
    write(dir.path(), "ES.txt", &run_file(&[4]));

    let padded = ComparisonSet::load(dir.path(), &EngineConfig::default()).unwrap();
    let es = padded.ranked("All: TS Index").unwrap().column("ES").unwrap();
    assert_eq!(es.values[1], CellValue::Null);

    let strict = EngineConfig {
        length_policy: LengthPolicy::Strict,
        ..EngineConfig::default()
    };
    let err = ComparisonSet::load(dir.path(), &strict).unwrap_err();
    assert!(matches!(err, EngineError::RowCountMismatch { .. }));
}

#[test]
fn comparison_names_the_file_missing_a_metric() {
    let dir = tempdir().unwrap();
    write(dir.path(), "Base.txt", &run_file(&[1, 2]));
    write(dir.path(), "GC.txt", "All: Net Profit\n1\n2\n");

    let err = ComparisonSet::load(dir.path(), &EngineConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "metric column 'All: ProfitFactor' not found in 'GC.txt'"
    );
}
