//! Top-level run orchestration: calendar gate, market context, pipeline
//! dispatch, enrichment, and output fan-out.

use crate::config::{Config, ScreeningParams};
use crate::core::HttpClient;
use crate::market;
use crate::model::Venue;
use crate::output::{display, export, notify};
use crate::pipeline::{self, left, right, Runner, StageContext};
use crate::providers::{DerivedQueries, HistoryStore, QuoteSource, ReferenceData};
use crate::trackers::{bullish_pool, institutional};
use chrono::{Datelike, NaiveTime, Timelike, Weekday};
use std::path::PathBuf;
use tracing::{info, warn};

pub const OUTPUT_ROOT: &str = "data/output";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Left,
    Right,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Left => "left",
            Mode::Right => "right",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub force: bool,
    pub mode: Mode,
    pub run_pool: bool,
    pub run_institutional: bool,
    pub pool_only: bool,
    pub institutional_only: bool,
}

/// `true` between Monday and Friday, within `[screen_start, market_close]`
/// Taipei local time, unless `force` bypasses the gate.
fn within_trading_window(force: bool) -> bool {
    if force {
        return true;
    }
    let now = chrono::Utc::now().with_timezone(&chrono_tz::Asia::Taipei);
    if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    let screen_start = NaiveTime::from_hms_opt(8, 30, 0).unwrap();
    let market_close = NaiveTime::from_hms_opt(13, 30, 0).unwrap();
    let current = NaiveTime::from_hms_opt(now.hour(), now.minute(), now.second()).unwrap();
    current >= screen_start && current <= market_close
}

pub async fn run(opts: RunOptions) -> Result<(), crate::core::ScreenError> {
    if !within_trading_window(opts.force) {
        warn!("outside trading window and not forced, exiting without running the pipeline");
        return Ok(());
    }

    let config = Config::from_env();
    let http = HttpClient::default();
    let history = HistoryStore::new(http.clone(), config.finmind_api_token.clone());
    let reference = ReferenceData::new(http.clone(), config.finmind_api_token.clone());
    let derived = DerivedQueries::new(http.clone(), config.finmind_api_token.clone());
    let quote_source = QuoteSource::new(http.clone());

    let out_root = PathBuf::from(OUTPUT_ROOT);
    let today = chrono::Local::now().date_naive();
    export::purge_old_runs(&out_root, today);

    let sentiment = market::analyze_sentiment(&http, &derived).await;
    display::print_sentiment(&sentiment);

    let main_status = market::check_market_status(&history, Venue::Main).await;
    let otc_status = market::check_market_status(&history, Venue::Otc).await;
    display::print_market_status(&main_status);
    display::print_market_status(&otc_status);

    if !opts.pool_only && !opts.institutional_only {
        let benchmark_change_pct = main_status.as_ref().map(|s| s.change_pct());
        run_pipeline(&opts, &out_root, today, &history, &reference, &derived, &quote_source, benchmark_change_pct).await?;
    }

    if opts.run_pool || opts.pool_only {
        run_pool_scan(&out_root, today, &history, &quote_source).await;
    }
    if opts.run_institutional || opts.institutional_only {
        run_institutional_scan(&out_root, today, &derived, &quote_source).await;
    }

    Ok(())
}

async fn run_pipeline(
    opts: &RunOptions,
    out_root: &std::path::Path,
    today: chrono::NaiveDate,
    history: &HistoryStore,
    reference: &ReferenceData,
    derived: &DerivedQueries,
    quote_source: &QuoteSource,
    benchmark_change_pct: Option<f64>,
) -> Result<(), crate::core::ScreenError> {
    let mut batch = quote_source.snapshot().await;
    if batch.is_empty() {
        return Err(crate::core::ScreenError::Fatal("quote source returned no rows for either venue".into()));
    }
    info!(count = batch.len(), "quote snapshot fetched");

    let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
    let industries = pipeline::runner::fan_out(&ids, pipeline::runner::FAN_OUT_CONCURRENCY, |id| async move {
        reference.industry(&id).await
    })
    .await;
    for row in &mut batch {
        if let Some(industry) = industries.get(&row.id) {
            row.industry = industry.clone();
        }
    }

    let params = ScreeningParams::default();
    let ctx = StageContext { history, reference, derived, params: &params, benchmark_change_pct };

    let stages = match opts.mode {
        Mode::Left => left::chain(),
        Mode::Right => right::chain(),
    };
    let runner = Runner::new(stages);
    let outcome = runner.run(batch, &ctx).await;

    let final_batch = if opts.mode == Mode::Right { right::rank(outcome.final_batch) } else { outcome.final_batch };

    let ids: Vec<String> = final_batch.iter().map(|r| r.id.clone()).collect();
    let flows = pipeline::runner::fan_out(&ids, pipeline::runner::FAN_OUT_CONCURRENCY, |id| async move {
        derived.institutional_flows(&id, 5).await
    })
    .await;
    let mut final_batch = final_batch;
    for row in &mut final_batch {
        if let Some(days) = flows.get(&row.id) {
            let foreign_5d: f64 = days.iter().map(|d| d.foreign_net).sum();
            let trust_5d: f64 = days.iter().map(|d| d.trust_net).sum();
            row.set("foreign_net_5d", crate::model::Column::Num(foreign_5d));
            row.set("trust_net_5d", crate::model::Column::Num(trust_5d));
        }
    }

    display::print_stage_funnel(&outcome.stats);
    display::print_final_table(&final_batch);

    let stamp = chrono::Local::now().format("%H%M%S").to_string();
    export::export_final_batch(out_root, today, opts.mode.as_str(), &stamp, &final_batch);
    export::export_step_snapshots(out_root, today, opts.mode.as_str(), &stamp, &outcome.snapshots);

    let webhook_config = crate::config::Config::from_env();
    if let Err(e) = notify::notify(&HttpClient::default(), webhook_config.webhook_url.as_deref(), opts.mode.as_str(), &final_batch).await {
        warn!(error = %e, "webhook notification failed");
    }

    Ok(())
}

async fn run_pool_scan(
    out_root: &std::path::Path,
    today: chrono::NaiveDate,
    history: &HistoryStore,
    quote_source: &QuoteSource,
) {
    let batch = quote_source.snapshot().await;
    let pool = bullish_pool::current_pool(&batch, history).await;
    let result = bullish_pool::update(out_root, today, &pool);

    let records: Vec<export::PoolRecord> = result
        .snapshot
        .stocks
        .iter()
        .map(|(id, entry)| export::PoolRecord { id: id.clone(), name: entry.name.clone(), consecutive_days: entry.consecutive_days })
        .collect();
    export::export_bullish_pool(out_root, today, &records);
    info!(new = result.new_entries.len(), removed = result.removed.len(), "bullish pool scan complete");
}

async fn run_institutional_scan(
    out_root: &std::path::Path,
    today: chrono::NaiveDate,
    derived: &DerivedQueries,
    quote_source: &QuoteSource,
) {
    let batch = quote_source.snapshot().await;
    let ids: Vec<String> = batch.iter().map(|r| r.id.clone()).collect();
    let qualifying = institutional::scan(out_root, derived, &ids, 3, today).await;

    let records: Vec<export::InstitutionalRecord> = qualifying
        .iter()
        .map(|(id, a)| export::InstitutionalRecord {
            id: id.clone(),
            foreign_consecutive_buy: a.foreign_consecutive_buy,
            trust_consecutive_buy: a.trust_consecutive_buy,
            foreign_20d_sum: a.foreign_20d_sum,
            trust_20d_sum: a.trust_20d_sum,
        })
        .collect();
    export::export_institutional(out_root, today, &records);
    info!(qualifying = qualifying.len(), "institutional tracker scan complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_run_bypasses_the_calendar_gate() {
        assert!(within_trading_window(true));
    }
}
