//! Sanity checks on the shipped default threshold tables: every min/max
//! pair must be non-degenerate.

use tw_screener::config::ScreeningParams;

#[test]
fn market_cap_band_is_non_degenerate() {
    let p = ScreeningParams::default();
    assert!(p.market_cap.min < p.market_cap.max);
}

#[test]
fn pullback_band_is_non_degenerate() {
    let p = ScreeningParams::default();
    assert!(p.pullback.min_pct < p.pullback.max_pct);
}

#[test]
fn turnover_band_is_non_degenerate() {
    let p = ScreeningParams::default();
    assert!(p.turnover_rate.min < p.turnover_rate.max);
}

#[test]
fn volume_ratio_time_floor_is_a_fraction() {
    let p = ScreeningParams::default();
    assert!(p.volume_ratio.time_floor > 0.0 && p.volume_ratio.time_floor < 1.0);
}

#[test]
fn major_holder_threshold_is_a_plausible_percentage() {
    let p = ScreeningParams::default();
    assert!(p.major_holder.min_pct > 0.0 && p.major_holder.min_pct < 100.0);
}
