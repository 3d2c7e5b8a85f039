use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::data::merge::LengthPolicy;
use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Net-profit predicate
// ---------------------------------------------------------------------------

/// The thresholds offered for the "profit greater than the given value" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ThresholdOption {
    #[value(name = "20000")]
    #[serde(rename = "20000")]
    Above20000,
    #[default]
    #[value(name = "30000")]
    #[serde(rename = "30000")]
    Above30000,
    #[value(name = "40000")]
    #[serde(rename = "40000")]
    Above40000,
}

impl ThresholdOption {
    pub const ALL: [ThresholdOption; 3] = [
        ThresholdOption::Above20000,
        ThresholdOption::Above30000,
        ThresholdOption::Above40000,
    ];

    pub fn value(self) -> f64 {
        match self {
            ThresholdOption::Above20000 => 20_000.0,
            ThresholdOption::Above30000 => 30_000.0,
            ThresholdOption::Above40000 => 40_000.0,
        }
    }
}

/// Which rows count as profitable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NetProfitPredicate {
    /// Net profit greater than zero (`NP`).
    #[default]
    AboveZero,
    /// Net profit greater than one of the offered thresholds (`NP_1`).
    AboveThreshold(ThresholdOption),
}

impl NetProfitPredicate {
    pub fn threshold(self) -> f64 {
        match self {
            NetProfitPredicate::AboveZero => 0.0,
            NetProfitPredicate::AboveThreshold(option) => option.value(),
        }
    }

    /// Name of the flag column this predicate produces.
    pub fn flag_name(self) -> &'static str {
        match self {
            NetProfitPredicate::AboveZero => "NP",
            NetProfitPredicate::AboveThreshold(_) => "NP_1",
        }
    }

    /// Human readable condition, e.g. "Net Profit greater than 30000".
    pub fn describe(self) -> String {
        format!("Net Profit greater than {}", self.threshold())
    }
}

/// Which pivot of an uploaded summary to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum ReportMetric {
    /// Both pivots.
    #[default]
    All,
    /// Count of profitable runs per interval and instrument.
    NetProfit,
    /// Average total trades of the profitable runs.
    TotalTrades,
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Names of the columns the summary pipeline reads from an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryColumns {
    pub net_profit: String,
    pub total_trades: String,
    pub interval: String,
    pub instrument: String,
}

impl Default for SummaryColumns {
    fn default() -> Self {
        Self {
            net_profit: "All: Net Profit".to_string(),
            total_trades: "All: Total Trades".to_string(),
            interval: "Data1: Interval".to_string(),
            instrument: "Ins".to_string(),
        }
    }
}

/// Everything the pipelines need to know about the shape of their input.
/// Every field has a default matching the strategy-report exports, so a
/// config file only needs to list what differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub columns: SummaryColumns,
    /// Metric columns compared across per-instrument files, in display order.
    pub metrics: Vec<String>,
    /// Column (file base name) the ranked comparisons are measured against.
    pub baseline: String,
    pub grand_total_label: String,
    pub total_label: String,
    /// Decimals kept in the total-trades pivot.
    pub trades_decimals: u32,
    pub length_policy: LengthPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            columns: SummaryColumns::default(),
            metrics: vec![
                "All: Net Profit".to_string(),
                "All: ProfitFactor".to_string(),
                "All: TS Index".to_string(),
            ],
            baseline: "Base".to_string(),
            grand_total_label: "Grand Total".to_string(),
            total_label: "Total".to_string(),
            trades_decimals: 1,
            length_policy: LengthPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::format(name.clone(), e))?;
        Self::from_json(&text).map_err(|e| match e {
            EngineError::Format { reason, .. } => EngineError::Format {
                source_name: name,
                reason,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::format("config", e))
    }

    /// Resolve a metric given either its full column name or its short label
    /// (`"TS Index"` for `"All: TS Index"`).
    pub fn find_metric(&self, name: &str) -> Option<&str> {
        self.metrics
            .iter()
            .find(|m| m.as_str() == name || metric_label(m).eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

/// Short label of a metric column: the text after the `"All: "` style prefix.
pub fn metric_label(column: &str) -> &str {
    column.split_once(": ").map_or(column, |(_, label)| label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_report_exports() {
        let config = EngineConfig::default();
        assert_eq!(config.columns.instrument, "Ins");
        assert_eq!(config.columns.interval, "Data1: Interval");
        assert_eq!(config.metrics.len(), 3);
        assert_eq!(config.baseline, "Base");
        assert_eq!(config.length_policy, LengthPolicy::Pad);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "baseline": "SPY", "columns": { "instrument": "Symbol" }, "length_policy": "Strict" }"#,
        )
        .unwrap();
        assert_eq!(config.baseline, "SPY");
        assert_eq!(config.columns.instrument, "Symbol");
        assert_eq!(config.columns.net_profit, "All: Net Profit");
        assert_eq!(config.length_policy, LengthPolicy::Strict);
        assert_eq!(config.grand_total_label, "Grand Total");
    }

    #[test]
    fn bad_json_is_a_format_error() {
        assert!(matches!(
            EngineConfig::from_json("{ baseline: "),
            Err(EngineError::Format { .. })
        ));
    }

    #[test]
    fn metrics_resolve_by_label() {
        let config = EngineConfig::default();
        assert_eq!(config.find_metric("TS Index"), Some("All: TS Index"));
        assert_eq!(config.find_metric("profitfactor"), Some("All: ProfitFactor"));
        assert_eq!(config.find_metric("All: Net Profit"), Some("All: Net Profit"));
        assert_eq!(config.find_metric("Sharpe"), None);
    }

    #[test]
    fn predicate_thresholds() {
        assert_eq!(NetProfitPredicate::AboveZero.threshold(), 0.0);
        assert_eq!(
            NetProfitPredicate::AboveThreshold(ThresholdOption::Above20000).threshold(),
            20_000.0
        );
        assert_eq!(
            NetProfitPredicate::AboveThreshold(ThresholdOption::default()).flag_name(),
            "NP_1"
        );
        assert_eq!(
            ThresholdOption::ALL.map(ThresholdOption::value),
            [20_000.0, 30_000.0, 40_000.0]
        );
    }
}
