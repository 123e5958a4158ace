//! Shared "quiet accumulation" diagnostics, used by the QuietAccumulation
//! stage and by the institutional tracker. Pulls a 20-day institutional
//! flow window and reduces it to 5/10/20-day sums, consecutive-buy-day
//! streaks and a stability score per participant category.

use crate::analysis::stability;
use crate::model::AccumulationAnalysis;
use crate::providers::DerivedQueries;

/// Thresholds for `is_quietly_buying`, applied here rather than threaded
/// in from `ScreeningParams` since this function is also called from the
/// institutional tracker, which carries no per-run threshold config.
/// Matches `QuietAccumulationParams::default()`.
const QUIET_MIN_DAYS: u32 = 5;
const QUIET_MAX_STABILITY: f64 = 2.0;

pub async fn analyze(derived: &DerivedQueries, id: &str, days: i64) -> AccumulationAnalysis {
    let mut flows = derived.institutional_flows(id, days).await;
    flows.sort_by_key(|f| f.date);

    let foreign_net: Vec<f64> = flows.iter().map(|f| f.foreign_net).collect();
    let trust_net: Vec<f64> = flows.iter().map(|f| f.trust_net).collect();

    let sum_tail = |v: &[f64], n: usize| v.iter().rev().take(n).sum::<f64>();
    let consecutive_buy = |v: &[f64]| v.iter().rev().take_while(|x| **x > 0.0).count() as u32;

    let foreign_consecutive_buy = consecutive_buy(&foreign_net);
    let trust_consecutive_buy = consecutive_buy(&trust_net);
    let foreign_20d_sum = sum_tail(&foreign_net, 20);
    let trust_20d_sum = sum_tail(&trust_net, 20);
    let foreign_stability = stability(&foreign_net);
    let trust_stability = stability(&trust_net);

    let foreign_quiet =
        foreign_consecutive_buy >= QUIET_MIN_DAYS && foreign_stability < QUIET_MAX_STABILITY && foreign_20d_sum > 0.0;
    let trust_quiet =
        trust_consecutive_buy >= QUIET_MIN_DAYS && trust_stability < QUIET_MAX_STABILITY && trust_20d_sum > 0.0;

    AccumulationAnalysis {
        foreign_consecutive_buy,
        trust_consecutive_buy,
        foreign_5d_sum: sum_tail(&foreign_net, 5),
        foreign_10d_sum: sum_tail(&foreign_net, 10),
        foreign_20d_sum,
        trust_5d_sum: sum_tail(&trust_net, 5),
        trust_10d_sum: sum_tail(&trust_net, 10),
        trust_20d_sum,
        foreign_stability,
        trust_stability,
        is_quietly_buying: foreign_quiet || trust_quiet,
    }
}
