use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parquet::arrow::ArrowWriter;

use pivot_panda::data::model::{CellValue, Column, Table};

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// (instrument, mean net profit, mean total trades)
const INSTRUMENTS: [(&str, f64, f64); 5] = [
    ("ES", 25_000.0, 60.0),
    ("NQ", 32_000.0, 45.0),
    ("CL", 8_000.0, 80.0),
    ("GC", 15_000.0, 30.0),
    ("YM", -2_000.0, 55.0),
];

const INTERVALS: [&str; 4] = ["1 min", "5 min", "15 min", "60 min"];

const RUNS_PER_CELL: usize = 6;
const RANKS_PER_FILE: usize = 200;

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// One row per optimisation run, the layout of a strategy-report export.
fn summary_table(rng: &mut SimpleRng) -> Result<Table> {
    let mut ins = Vec::new();
    let mut interval = Vec::new();
    let mut profit = Vec::new();
    let mut trades = Vec::new();

    for &(name, mean_profit, mean_trades) in &INSTRUMENTS {
        for (i, &iv) in INTERVALS.iter().enumerate() {
            // Faster bars trade more often.
            let scale = 1.0 + (INTERVALS.len() - i) as f64 * 0.5;
            for _ in 0..RUNS_PER_CELL {
                ins.push(CellValue::from(name));
                interval.push(CellValue::from(iv));
                profit.push(CellValue::Float(round2(rng.gauss(mean_profit, 20_000.0))));
                let n = rng.gauss(mean_trades * scale, 10.0).max(1.0).round() as i64;
                trades.push(CellValue::Integer(n));
            }
        }
    }

    Ok(Table::from_columns(vec![
        Column::new("Ins", ins),
        Column::new("Data1: Interval", interval),
        Column::new("All: Net Profit", profit),
        Column::new("All: Total Trades", trades),
    ])?)
}

/// Per-instrument run exports, plus the `Base` reference series.
fn run_table(rng: &mut SimpleRng, mean_profit: f64) -> Result<Table> {
    let mut profit = Vec::with_capacity(RANKS_PER_FILE);
    let mut factor = Vec::with_capacity(RANKS_PER_FILE);
    let mut index = Vec::with_capacity(RANKS_PER_FILE);
    for _ in 0..RANKS_PER_FILE {
        let p = rng.gauss(mean_profit, 15_000.0);
        profit.push(round2(p));
        factor.push(round2((1.0 + p / 50_000.0 + rng.gauss(0.0, 0.1)).max(0.0)));
        index.push(round2(p / 1_000.0 + rng.gauss(0.0, 5.0)));
    }
    Ok(Table::from_columns(vec![
        Column::from_f64("All: Net Profit", &profit),
        Column::from_f64("All: ProfitFactor", &factor),
        Column::from_f64("All: TS Index", &index),
    ])?)
}

fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(table.column_names())?;
    for row in 0..table.num_rows() {
        writer.write_record(table.row(row).iter().map(|(_, v)| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_parquet(table: &Table, path: &Path) -> Result<()> {
    let batch = table.to_record_batch()?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let out_dir = std::env::args().nth(1).map_or_else(|| PathBuf::from("."), PathBuf::from);
    let mut rng = SimpleRng::new(42);

    let summary = summary_table(&mut rng)?;
    write_csv(&summary, &out_dir.join("sample_summary.csv"))?;
    write_parquet(&summary, &out_dir.join("sample_summary.parquet"))?;
    println!(
        "Wrote {} runs to {}/sample_summary.{{csv,parquet}}",
        summary.num_rows(),
        out_dir.display()
    );

    let runs_dir = out_dir.join("sample_runs");
    std::fs::create_dir_all(&runs_dir).context("creating sample_runs")?;
    let base = [("Base", 12_000.0)];
    let per_instrument = INSTRUMENTS.iter().map(|&(name, profit, _)| (name, profit));
    for (name, mean_profit) in base.into_iter().chain(per_instrument) {
        let table = run_table(&mut rng, mean_profit)?;
        write_csv(&table, &runs_dir.join(format!("{name}.txt")))?;
    }
    println!(
        "Wrote {} run files ({RANKS_PER_FILE} runs each) to {}",
        INSTRUMENTS.len() + 1,
        runs_dir.display()
    );
    Ok(())
}
