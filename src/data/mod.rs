/// Data layer: core types, loading, and the table transforms.
///
/// Architecture:
/// ```text
///  .csv / .txt / .json / .parquet / .xlsx              directory of runs
///        │                                                   │
///        ▼                                                   ▼
///   ┌──────────┐                                       ┌──────────┐
///   │  loader   │  parse bytes → Table                 │  merge    │  one ranked table per metric
///   └──────────┘                                       └──────────┘
///        │                                                   │
///        ▼                                                   ▼
///   ┌──────────┐                                       ┌──────────┐
///   │  flags    │  value > threshold → bool column     │  filter   │  median vs. baseline mean
///   └──────────┘                                       └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  pivot    │  interval × instrument, totals, sorted columns
///   └──────────┘
/// ```

pub mod filter;
pub mod flags;
pub mod loader;
pub mod merge;
pub mod model;
pub mod pivot;
