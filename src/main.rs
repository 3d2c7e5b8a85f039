use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use clap::{Parser, Subcommand};

use pivot_panda::config::{metric_label, EngineConfig, NetProfitPredicate, ReportMetric, ThresholdOption};
use pivot_panda::data::filter::FilterMode;
use pivot_panda::data::model::Table;
use pivot_panda::report::{summarize_upload, ComparisonSet};

#[derive(Parser)]
#[command(name = "pivot-panda", version, about = "Pivot and compare trading-performance exports")]
struct Cli {
    /// JSON file overriding column names, metrics and labels.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pivot an uploaded run summary by interval and instrument.
    Summarize {
        file: PathBuf,
        /// Count runs with net profit above this value instead of above zero.
        #[arg(long, value_enum)]
        threshold: Option<ThresholdOption>,
        #[arg(long, value_enum, default_value_t = ReportMetric::All)]
        report: ReportMetric,
    },
    /// Rank the per-instrument runs of a directory against the baseline file.
    Compare {
        directory: PathBuf,
        /// Metric column or its short label, e.g. "TS Index".
        #[arg(long)]
        metric: Option<String>,
        #[arg(long, value_enum, default_value_t = FilterMode::Reset)]
        mode: FilterMode,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Summarize {
            file,
            threshold,
            report,
        } => summarize(&config, &file, threshold, report),
        Command::Compare {
            directory,
            metric,
            mode,
        } => compare(&config, &directory, metric.as_deref(), mode),
    }
}

fn summarize(
    config: &EngineConfig,
    file: &Path,
    threshold: Option<ThresholdOption>,
    report: ReportMetric,
) -> Result<()> {
    let predicate = threshold.map_or(NetProfitPredicate::AboveZero, NetProfitPredicate::AboveThreshold);
    let content = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let summary = summarize_upload(&content, &file.to_string_lossy(), config, predicate)?;

    if report != ReportMetric::TotalTrades {
        print_table(&summary.net_profit_title(), &summary.net_profit.to_table()?)?;
    }
    if report != ReportMetric::NetProfit {
        print_table(&summary.total_trades_title(), &summary.total_trades.to_table()?)?;
    }
    Ok(())
}

fn compare(
    config: &EngineConfig,
    directory: &Path,
    metric: Option<&str>,
    mode: FilterMode,
) -> Result<()> {
    let metric = match metric {
        Some(name) => match config.find_metric(name) {
            Some(m) => m,
            None => bail!("unknown metric '{name}', expected one of {:?}", config.metrics),
        },
        None => config
            .metrics
            .first()
            .map(String::as_str)
            .context("no metrics configured")?,
    };

    let set = ComparisonSet::load(directory, config)?;
    let view = set.view(metric, mode)?;
    print_table(&format!("{} ({mode:?})", metric_label(metric)), &view)
}

fn print_table(title: &str, table: &Table) -> Result<()> {
    let batch = table.to_record_batch()?;
    println!("{title}");
    println!("{}", pretty_format_batches(&[batch])?);
    Ok(())
}
