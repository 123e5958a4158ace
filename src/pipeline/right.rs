//! The six-stage "right-side" momentum chain, plus the final rank
//! assignment (sort by `change_pct` descending, stable).

use super::runner::fan_out;
use super::stage::{Stage, StageContext, StageMeta};
use crate::analysis::moving_average;
use crate::model::{Batch, Column};
use chrono::Timelike;
use futures::future::BoxFuture;
use futures::FutureExt;

pub fn chain() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(MarketCap),
        Box::new(PriceChange),
        Box::new(VolumeRatio),
        Box::new(MovingAverage),
        Box::new(RelativeStrength),
        Box::new(IntradayHigh),
    ]
}

fn ids_of(batch: &Batch) -> Vec<String> {
    batch.iter().map(|r| r.id.clone()).collect()
}

/// Shared first stage of both chains: identical semantics to
/// `left::MarketCap`, kept as its own type here so each chain's
/// `StageMeta::step_number` counts from 1 independently.
struct MarketCap;
impl Stage for MarketCap {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 1, name: "MarketCap" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let ids = ids_of(batch);
            let has_data = ctx.reference.has_market_cap_data().await;
            let caps = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, |id| async move {
                ctx.reference.market_cap(&id).await
            })
            .await;

            let p = &ctx.params.market_cap;
            batch
                .iter()
                .filter_map(|row| {
                    let mut row = row.clone();
                    if has_data {
                        let cap = caps.get(&row.id).copied().flatten()?;
                        if cap < p.min || cap > p.max {
                            return None;
                        }
                        row.set("market_cap", Column::Num(cap));
                    } else {
                        let trade_value = row.volume * row.price * 0.1;
                        let min_trade_value = p.min * 0.1;
                        if trade_value < min_trade_value {
                            return None;
                        }
                        row.set("market_cap", Column::Null);
                    }
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct PriceChange;
impl Stage for PriceChange {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 2, name: "PriceChange" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.price_change;
            batch
                .iter()
                .filter(|row| row.change_pct >= p.min && row.change_pct <= p.max)
                .cloned()
                .collect()
        }
        .boxed()
    }
}

/// Fraction of the 270-minute trading day elapsed, floored at
/// `time_floor` so a run right at the open doesn't divide the day's
/// average volume by (almost) zero.
fn time_fraction(trading_minutes: f64, time_floor: f64) -> f64 {
    let now = chrono::Utc::now().with_timezone(&chrono_tz::Asia::Taipei);
    let minutes_since_midnight = now.hour() as f64 * 60.0 + now.minute() as f64;
    let open_minutes = 9.0 * 60.0;
    let elapsed = (minutes_since_midnight - open_minutes).clamp(0.0, trading_minutes);
    (elapsed / trading_minutes).clamp(time_floor, 1.0)
}

struct VolumeRatio;
impl Stage for VolumeRatio {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 3, name: "VolumeRatio" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.volume_ratio;
            let fraction = time_fraction(p.trading_minutes, p.time_floor);
            let ids = ids_of(batch);
            let venues: std::collections::HashMap<String, crate::model::Venue> =
                batch.iter().map(|r| (r.id.clone(), r.venue)).collect();
            let today_volume: std::collections::HashMap<String, f64> =
                batch.iter().map(|r| (r.id.clone(), r.volume * 1000.0)).collect();

            let ratios = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let venue = venues[&id];
                let today = today_volume[&id];
                async move {
                    let candles = ctx.history.history(&id, venue, p.avg_days as u32).await;
                    if candles.is_empty() {
                        return None;
                    }
                    let avg = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
                    if avg <= 0.0 {
                        return None;
                    }
                    Some(today / (avg * fraction))
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let ratio = ratios.get(&row.id).cloned().flatten()?;
                    if ratio <= p.min {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("volume_ratio", Column::Num(ratio));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct MovingAverage;
impl Stage for MovingAverage {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 4, name: "MovingAverage" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.moving_average;
            let ids = ids_of(batch);
            let prices: std::collections::HashMap<String, (f64, crate::model::Venue)> =
                batch.iter().map(|r| (r.id.clone(), (r.price, r.venue))).collect();

            let results = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let (price, venue) = prices[&id];
                async move {
                    let needed = 60 + p.slope_recent_days + p.slope_prior_days;
                    let candles = ctx.history.history(&id, venue, needed as u32).await;
                    if candles.len() < 60 {
                        return None;
                    }
                    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

                    let ma5 = moving_average(&closes, 5)?;
                    let ma10 = moving_average(&closes, 10)?;
                    let ma20 = moving_average(&closes, 20)?;
                    let ma60 = moving_average(&closes, 60)?;
                    let aligned = price > ma5 && ma5 > ma10 && ma10 > ma20 && ma20 > ma60;
                    if !aligned {
                        return None;
                    }

                    if closes.len() < 60 + p.slope_recent_days + p.slope_prior_days {
                        // Not enough history to judge the MA60 slope: default to
                        // bullish (matches the short-history default documented
                        // for the bullish pool's own MA60 slope check).
                        return Some((ma60, true));
                    }

                    let recent_ma60: Vec<f64> = (0..p.slope_recent_days)
                        .filter_map(|i| {
                            let end = closes.len() - i;
                            moving_average(&closes[..end], 60)
                        })
                        .collect();
                    let prior_ma60: Vec<f64> = (0..p.slope_prior_days)
                        .filter_map(|i| {
                            let end = closes.len() - p.slope_recent_days - i;
                            moving_average(&closes[..end], 60)
                        })
                        .collect();
                    if recent_ma60.is_empty() || prior_ma60.is_empty() {
                        return Some((ma60, true));
                    }
                    let recent_avg = recent_ma60.iter().sum::<f64>() / recent_ma60.len() as f64;
                    let prior_avg = prior_ma60.iter().sum::<f64>() / prior_ma60.len() as f64;
                    Some((ma60, recent_avg >= prior_avg))
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let (ma60, slope_up) = results.get(&row.id).cloned().flatten()?;
                    if !slope_up {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("ma60", Column::Num(ma60));
                    row.set("bullish_alignment", Column::Bool(true));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct RelativeStrength;
impl Stage for RelativeStrength {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 5, name: "RelativeStrength" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let benchmark = ctx.benchmark_change_pct.unwrap_or(0.0);
            batch
                .iter()
                .filter_map(|row| {
                    if row.change_pct <= benchmark {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("relative_strength", Column::Num(row.change_pct - benchmark));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct IntradayHigh;
impl Stage for IntradayHigh {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 6, name: "IntradayHigh" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let threshold = ctx.params.intraday_high.threshold;
            batch
                .iter()
                .filter(|row| row.high > 0.0 && row.price >= threshold * row.high && row.price > row.open)
                .cloned()
                .collect()
        }
        .boxed()
    }
}

/// Sorts the final batch by `change_pct` descending, stable on ties
/// (preserves quote-source order), and stamps a `rank` column.
pub fn rank(mut batch: Batch) -> Batch {
    batch.sort_by(|a, b| b.change_pct.partial_cmp(&a.change_pct).unwrap_or(std::cmp::Ordering::Equal));
    for (i, row) in batch.iter_mut().enumerate() {
        row.set("rank", Column::Num((i + 1) as f64));
    }
    batch
}
