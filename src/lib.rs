//! # tw-screener
//!
//! A daily equity-screening engine for the Taiwan stock market (TWSE main
//! board and the OTC/TPEx board). Two independent filter chains narrow the
//! listed universe down to a handful of candidates each morning:
//!
//! * the **left** chain — fundamentals, technical structure, volume/price
//!   health, and institutional accumulation, run in series, each stage
//!   eliminating rows that fail its predicate;
//! * the **right** chain — an intraday momentum scan (price change,
//!   volume surge, relative strength, intraday high) that ranks rather
//!   than merely filters its survivors.
//!
//! Around the two chains sit a market monitor (index MA alignment via a
//! proxy ETF), a foreign-sentiment analyzer (TWSE spot flow + futures open
//! interest), a bullish-pool membership tracker, and an institutional-flow
//! tracker — each persisting its own history across runs.
//!
//! ## Quick start
//!
//! ```no_run
//! use tw_screener::orchestrator::{self, Mode, RunOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! orchestrator::run(RunOptions {
//!     force: true,
//!     mode: Mode::Left,
//!     run_pool: false,
//!     run_institutional: false,
//!     pool_only: false,
//!     institutional_only: false,
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

/// HTTP client, error type, and small shared conversions (Minguo dates).
pub mod core;
/// Core data model: rows, batches, market status, sentiment, and accumulation types.
pub mod model;
/// Environment-sourced config and the per-stage threshold tables.
pub mod config;
/// Pure numeric building blocks: moving averages, Wilder RSI, pivots.
pub mod analysis;
/// Data-access providers: quote snapshots, OHLCV history, reference data, derived queries.
pub mod providers;
/// The two filter/rank chains and the stage abstraction they share.
pub mod pipeline;
/// Index MA-alignment monitor and the foreign-sentiment analyzer.
pub mod market;
/// Bullish-pool membership and institutional-flow history trackers.
pub mod trackers;
/// Terminal display, CSV export, and webhook notification.
pub mod output;
/// Top-level run orchestration: calendar gate, pipeline dispatch, output fan-out.
pub mod orchestrator;

pub use core::{HttpClient, ScreenError};
pub use model::{Batch, Row, Venue};
pub use orchestrator::{Mode, RunOptions};
