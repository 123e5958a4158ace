//! The eleven-stage "left-side" accumulation chain.

use super::runner::fan_out;
use super::stage::{Stage, StageContext, StageMeta};
use crate::analysis::{increasing_within_tolerance, local_minima, moving_average, rsi_wilder};
use crate::model::{Batch, Column, Row};
use futures::future::BoxFuture;
use futures::FutureExt;

pub fn chain() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(MarketCap),
        Box::new(RevenueGrowth),
        Box::new(PeRatio),
        Box::new(HigherLows),
        Box::new(Pullback),
        Box::new(VolumePriceHealth),
        Box::new(VolumeShrink),
        Box::new(RsiOversold),
        Box::new(TurnoverRate),
        Box::new(MajorHolder),
        Box::new(QuietAccumulation),
    ]
}

fn ids_of(batch: &Batch) -> Vec<String> {
    batch.iter().map(|r| r.id.clone()).collect()
}

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

struct RevenueGrowth;
impl Stage for RevenueGrowth {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 2, name: "RevenueGrowth" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let ids = ids_of(batch);
            let revenues = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, |id| async move {
                ctx.derived.monthly_revenue(&id).await
            })
            .await;

            let p = &ctx.params.revenue_growth;
            batch
                .iter()
                .filter_map(|row| {
                    let mut row = row.clone();
                    let months = revenues.get(&row.id).cloned().unwrap_or_default();
                    if months.is_empty() {
                        row.set("revenue_status", Column::Text("insufficient-data".into()));
                        return Some(row);
                    }
                    let mut sorted = months;
                    sorted.sort_by_key(|m| m.year_month);

                    let latest_yoy = sorted.last().map(|m| m.yoy_pct).unwrap_or(0.0);
                    let consecutive_positive = sorted
                        .iter()
                        .rev()
                        .take_while(|m| m.yoy_pct > 0.0)
                        .count() as u32;

                    row.set("revenue_yoy_pct", Column::Num(latest_yoy));
                    row.set("revenue_consecutive_positive_months", Column::Num(f64::from(consecutive_positive)));

                    if latest_yoy >= p.yoy_min_pct && consecutive_positive >= p.consecutive_months_min {
                        Some(row)
                    } else {
                        None
                    }
                })
                .collect()
        }
        .boxed()
    }
}

struct PeRatio;
impl Stage for PeRatio {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 3, name: "PERatio" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let ids = ids_of(batch);
            let eps_sums = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, |id| async move {
                let quarters = ctx.derived.quarterly_eps(&id).await;
                quarters.iter().rev().take(4).map(|q| q.eps).sum::<f64>()
            })
            .await;

            let max_pe = ctx.params.pe_ratio.max;
            batch
                .iter()
                .filter_map(|row| {
                    let mut row = row.clone();
                    let eps = *eps_sums.get(&row.id).unwrap_or(&0.0);
                    if eps <= 0.0 {
                        return None;
                    }
                    let pe = row.price / eps;
                    row.set("pe_ratio", Column::Num(pe));
                    if pe > 0.0 && pe <= max_pe {
                        Some(row)
                    } else {
                        None
                    }
                })
                .collect()
        }
        .boxed()
    }
}

struct HigherLows;
impl Stage for HigherLows {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 4, name: "HigherLows" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.higher_lows;
            let ids = ids_of(batch);
            let venues: std::collections::HashMap<String, crate::model::Venue> =
                batch.iter().map(|r| (r.id.clone(), r.venue)).collect();

            let confirmations = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let venue = venues[&id];
                async move {
                    let candles = ctx.history.history(&id, venue, p.lookback_days as u32).await;
                    let minima_idx = local_minima(&candles, p.pivot_window);
                    if minima_idx.len() < 2 {
                        return 0u32;
                    }
                    let mut count = 0u32;
                    for w in minima_idx.windows(2) {
                        let a = candles[w[0]].low;
                        let b = candles[w[1]].low;
                        if b > a || increasing_within_tolerance(a, b, p.tolerance_pct) {
                            count += 1;
                        }
                    }
                    count
                }
            })
            .await;

            batch
                .iter()
                .filter(|row| confirmations.get(&row.id).copied().unwrap_or(0) >= p.confirmations_min)
                .cloned()
                .collect()
        }
        .boxed()
    }
}

struct Pullback;
impl Stage for Pullback {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 5, name: "Pullback" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.pullback.clone();
            let ids = ids_of(batch);
            let prices: std::collections::HashMap<String, (f64, crate::model::Venue)> =
                batch.iter().map(|r| (r.id.clone(), (r.price, r.venue))).collect();

            let p2 = p.clone();
            let results = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let (price, venue) = prices[&id];
                let p = p2.clone();
                async move {
                    let days = p.high_lookback_days.max(p.long_ma.iter().copied().max().unwrap_or(0) as usize)
                        + p.slope_lookback_days
                        + 5;
                    let candles = ctx.history.history(&id, venue, days as u32).await;
                    if candles.is_empty() {
                        return None;
                    }
                    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                    let window_high = candles
                        .iter()
                        .rev()
                        .take(p.high_lookback_days)
                        .map(|c| c.high)
                        .fold(f64::MIN, f64::max);
                    if window_high <= 0.0 {
                        return None;
                    }
                    let pullback_pct = (window_high - price) / window_high * 100.0;
                    if pullback_pct < p.min_pct || pullback_pct > p.max_pct {
                        return None;
                    }

                    let below_short = p
                        .short_ma
                        .iter()
                        .any(|period| moving_average(&closes, *period as usize).is_some_and(|ma| price < ma));
                    if !below_short {
                        return None;
                    }

                    for &long_period in &p.long_ma {
                        let period = long_period as usize;
                        let Some(ma_today) = moving_average(&closes, period) else { continue };
                        if price <= ma_today {
                            continue;
                        }
                        if closes.len() < period + p.slope_lookback_days {
                            continue;
                        }
                        let prior_closes = &closes[..closes.len() - p.slope_lookback_days];
                        let Some(ma_prior) = moving_average(prior_closes, period) else { continue };
                        let slope_ok = ma_today >= ma_prior * (1.0 - p.slope_tolerance / 100.0);
                        if slope_ok {
                            return Some((pullback_pct, format!("MA{long_period}")));
                        }
                    }
                    None
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let (pullback_pct, tag) = results.get(&row.id).cloned().flatten()?;
                    let mut row = row.clone();
                    row.set("pullback_pct", Column::Num(pullback_pct));
                    row.set("pullback_tag", Column::Text(tag));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct VolumePriceHealth;
impl Stage for VolumePriceHealth {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 6, name: "VolumePriceHealth" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.volume_price_health;
            let ids = ids_of(batch);
            let rows_by_id: std::collections::HashMap<String, Row> =
                batch.iter().map(|r| (r.id.clone(), r.clone())).collect();

            let classifications = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let row = rows_by_id[&id].clone();
                async move {
                    let candles = ctx.history.history(&id, row.venue, p.avg_days as u32).await;
                    if candles.is_empty() {
                        return None;
                    }
                    let avg_volume = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
                    let window_high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
                    let window_max_volume = candles.iter().map(|c| c.volume).fold(f64::MIN, f64::max);
                    let today_volume_shares = row.volume * 1000.0;

                    if today_volume_shares >= window_max_volume && row.change_pct >= p.exhaustion_change_pct_min {
                        return Some("exhaustion".to_string());
                    }
                    if row.price >= window_high && today_volume_shares <= p.healthy_ratio * avg_volume {
                        return Some("healthy".to_string());
                    }
                    if today_volume_shares >= p.turnover_min * avg_volume
                        && today_volume_shares <= p.turnover_max * avg_volume
                    {
                        return Some("turnover".to_string());
                    }
                    Some("other".to_string())
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let class = classifications.get(&row.id).cloned().flatten()?;
                    if class == "exhaustion" || class == "other" {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("volume_price_health", Column::Text(class));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct VolumeShrink;
impl Stage for VolumeShrink {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 7, name: "VolumeShrink" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.volume_shrink;
            let ids = ids_of(batch);
            let venues: std::collections::HashMap<String, crate::model::Venue> =
                batch.iter().map(|r| (r.id.clone(), r.venue)).collect();

            let passes = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let venue = venues[&id];
                async move {
                    let days = p.avg_days.max(p.consecutive_days_min as usize + 1);
                    let candles = ctx.history.history(&id, venue, days as u32).await;
                    if candles.len() < 2 {
                        return false;
                    }
                    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

                    let mut consecutive = 0u32;
                    for w in volumes.windows(2).rev() {
                        let (prev, cur) = (w[0], w[1]);
                        if cur <= prev * p.wobble_tolerance {
                            consecutive += 1;
                        } else {
                            break;
                        }
                    }
                    let by_run = consecutive >= p.consecutive_days_min;

                    let avg = volumes.iter().rev().take(p.avg_days).sum::<f64>()
                        / volumes.iter().rev().take(p.avg_days).count().max(1) as f64;
                    let today = *volumes.last().unwrap_or(&0.0);
                    let by_shrink = today < p.shrink_threshold * avg;

                    by_run || by_shrink
                }
            })
            .await;

            batch
                .iter()
                .filter(|row| passes.get(&row.id).copied().unwrap_or(false))
                .cloned()
                .collect()
        }
        .boxed()
    }
}

struct RsiOversold;
impl Stage for RsiOversold {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 8, name: "RSIOversold" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.rsi_oversold;
            let ids = ids_of(batch);
            let rows_by_id: std::collections::HashMap<String, Row> =
                batch.iter().map(|r| (r.id.clone(), r.clone())).collect();

            let results = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let row = rows_by_id[&id].clone();
                async move {
                    let days = p.period as u32 + 10;
                    let candles = ctx.history.history(&id, row.venue, days).await;
                    if candles.len() < p.period + 2 {
                        return None;
                    }
                    let mut closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
                    closes.push(row.price);
                    let rsi_series = rsi_wilder(&closes, p.period);
                    if rsi_series.len() < 2 {
                        return None;
                    }
                    let rsi_today = *rsi_series.last().unwrap();
                    let rsi_yesterday = rsi_series[rsi_series.len() - 2];

                    if rsi_today > p.oversold_threshold {
                        return None;
                    }
                    if p.require_upturn && !(rsi_today > rsi_yesterday) {
                        return None;
                    }
                    if p.require_price_above_ma5 {
                        let ma5 = moving_average(&closes, 5)?;
                        if row.price <= ma5 {
                            return None;
                        }
                    }
                    Some(rsi_today)
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let rsi = results.get(&row.id).cloned().flatten()?;
                    let mut row = row.clone();
                    row.set("rsi", Column::Num(rsi));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct TurnoverRate;
impl Stage for TurnoverRate {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 9, name: "TurnoverRate" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.turnover_rate;
            let ids = ids_of(batch);
            let rows_by_id: std::collections::HashMap<String, Row> =
                batch.iter().map(|r| (r.id.clone(), r.clone())).collect();

            let rates = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, move |id| {
                let row = rows_by_id[&id].clone();
                async move {
                    let shares = ctx.reference.shares_outstanding(&id).await;
                    let volume_shares = row.volume * 1000.0;
                    if let Some(shares) = shares.filter(|s| *s > 0.0) {
                        return volume_shares / shares * 100.0;
                    }
                    let candles = ctx.history.history(&id, row.venue, p.avg_days as u32).await;
                    if candles.is_empty() {
                        return 0.0;
                    }
                    let avg = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
                    if avg <= 0.0 {
                        return 0.0;
                    }
                    (volume_shares / avg * 1.0).min(20.0)
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let rate = *rates.get(&row.id)?;
                    if rate < p.min || rate > p.max {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("turnover_rate", Column::Num(rate));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct MajorHolder;
impl Stage for MajorHolder {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 10, name: "MajorHolder" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.major_holder;
            let ids = ids_of(batch);

            let results = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, |id| async move {
                let mut weeks = ctx.derived.shareholding_distribution(&id).await;
                weeks.sort_by_key(|w| w.date);
                if weeks.is_empty() {
                    return None;
                }
                let latest = weeks.last().unwrap();
                if latest.major_holder_pct < p.min_pct {
                    return None;
                }
                let run = weeks
                    .iter()
                    .rev()
                    .collect::<Vec<_>>()
                    .windows(2)
                    .take_while(|w| w[0].major_holder_pct > w[1].major_holder_pct)
                    .count() as u32
                    + 1;
                if run >= p.consecutive_weeks_min {
                    Some(latest.major_holder_pct)
                } else {
                    None
                }
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let pct = results.get(&row.id).cloned().flatten()?;
                    let mut row = row.clone();
                    row.set("major_holder_pct", Column::Num(pct));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}

struct QuietAccumulation;
impl Stage for QuietAccumulation {
    fn meta(&self) -> StageMeta {
        StageMeta { step_number: 11, name: "QuietAccumulation" }
    }
    fn screen<'a>(&'a self, batch: &'a Batch, ctx: &'a StageContext<'a>) -> BoxFuture<'a, Batch> {
        async move {
            let p = ctx.params.quiet_accumulation;
            let ids = ids_of(batch);

            let analyses = fan_out(&ids, super::runner::FAN_OUT_CONCURRENCY, |id| async move {
                crate::pipeline::accumulation::analyze(ctx.derived, &id, 20).await
            })
            .await;

            batch
                .iter()
                .filter_map(|row| {
                    let analysis = analyses.get(&row.id)?.clone();
                    let foreign_ok = analysis.foreign_consecutive_buy >= p.min_days
                        && analysis.foreign_stability < p.max_stability
                        && analysis.foreign_20d_sum > 0.0;
                    let trust_ok = analysis.trust_consecutive_buy >= p.min_days
                        && analysis.trust_stability < p.max_stability
                        && analysis.trust_20d_sum > 0.0;
                    if !(foreign_ok || trust_ok) {
                        return None;
                    }
                    let mut row = row.clone();
                    row.set("foreign_consecutive_buy", Column::Num(f64::from(analysis.foreign_consecutive_buy)));
                    row.set("trust_consecutive_buy", Column::Num(f64::from(analysis.trust_consecutive_buy)));
                    row.set("is_quietly_buying", Column::Bool(true));
                    Some(row)
                })
                .collect()
        }
        .boxed()
    }
}
