//! The two pipelines the presentation layer drives:
//!
//! * **summary** – one uploaded run summary → profit flag → net-profit and
//!   total-trades pivots
//! * **comparison** – a directory of per-instrument runs → ranked tables per
//!   metric → baseline filter

use std::path::Path;

use log::info;

use crate::config::{EngineConfig, NetProfitPredicate};
use crate::data::filter::{filter_by_baseline, FilterMode};
use crate::data::flags::derive_net_profit_flag;
use crate::data::loader::load_bytes;
use crate::data::merge::{merge_ranked_with, scan_directory};
use crate::data::model::Table;
use crate::data::pivot::{pivot_with, Aggregate, MarginStyle, PivotSpec, PivotTable};
use crate::error::{ColumnRole, EngineError, Result};

// ---------------------------------------------------------------------------
// Summary pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Summary {
    pub predicate: NetProfitPredicate,
    /// Number of profitable runs per interval and instrument, with grand totals.
    pub net_profit: PivotTable,
    /// Average total trades of the profitable runs, with a total row.
    pub total_trades: PivotTable,
}

impl Summary {
    pub fn net_profit_title(&self) -> String {
        format!("Pivot table for {}", self.predicate.describe())
    }

    pub fn total_trades_title(&self) -> String {
        format!(
            "Pivot table for the average of total trades for NP greater than {}",
            self.predicate.threshold()
        )
    }
}

/// Parse an upload and summarize it.
pub fn summarize_upload(
    content: &[u8],
    filename: &str,
    config: &EngineConfig,
    predicate: NetProfitPredicate,
) -> Result<Summary> {
    let table = load_bytes(content, filename)?;
    summarize(&table, config, predicate)
}

pub fn summarize(table: &Table, config: &EngineConfig, predicate: NetProfitPredicate) -> Result<Summary> {
    let cols = &config.columns;
    let flagged = derive_net_profit_flag(table, &cols.net_profit, predicate)?;
    let flag = predicate.flag_name();

    let net_profit_spec = PivotSpec::new(flag, &cols.interval, &cols.instrument, Aggregate::Sum)
        .with_margins(MarginStyle::Both, &config.grand_total_label, Aggregate::Sum);
    let net_profit = pivot_with(&flagged, &net_profit_spec)?;

    let trades_spec = PivotSpec::new(&cols.total_trades, &cols.interval, &cols.instrument, Aggregate::Mean)
        .with_row_filter(flag)
        .with_margins(MarginStyle::RowOnly, &config.total_label, Aggregate::Sum)
        .rounded(config.trades_decimals);
    let total_trades = pivot_with(&flagged, &trades_spec)?;

    info!(
        "summarized {} runs: {} profitable ({})",
        table.num_rows(),
        net_profit.grand_total(),
        predicate.describe()
    );
    Ok(Summary {
        predicate,
        net_profit,
        total_trades,
    })
}

// ---------------------------------------------------------------------------
// Comparison pipeline
// ---------------------------------------------------------------------------

/// Ranked tables for every configured metric, loaded once and filtered on
/// demand.
#[derive(Debug, Clone)]
pub struct ComparisonSet {
    pub metrics: Vec<String>,
    pub tables: Vec<Table>,
    pub baseline: String,
}

impl ComparisonSet {
    /// Rank every loadable file of `directory` for each configured metric.
    pub fn load(directory: &Path, config: &EngineConfig) -> Result<Self> {
        let files = scan_directory(directory)?;
        let tables = merge_ranked_with(
            files.as_slice(),
            directory,
            config.metrics.as_slice(),
            config.length_policy,
        )?;
        info!(
            "compared {} files from '{}' on {} metrics",
            files.len(),
            directory.display(),
            config.metrics.len()
        );
        Ok(ComparisonSet {
            metrics: config.metrics.clone(),
            tables,
            baseline: config.baseline.clone(),
        })
    }

    pub fn ranked(&self, metric: &str) -> Result<&Table> {
        self.metrics
            .iter()
            .position(|m| m == metric)
            .and_then(|i| self.tables.get(i))
            .ok_or_else(|| EngineError::missing(ColumnRole::Metric, metric))
    }

    /// The ranked table of `metric` with `mode` applied against the baseline.
    pub fn view(&self, metric: &str, mode: FilterMode) -> Result<Table> {
        filter_by_baseline(self.ranked(metric)?, &self.baseline, mode)
    }
}
