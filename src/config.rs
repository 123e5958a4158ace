//! Runtime configuration: environment-sourced credentials plus the
//! per-stage threshold tables ("screening parameters").
//!
//! Mirrors the shape of a client builder: one fallible constructor,
//! explicit fields, documented defaults, no ambient global state beyond
//! the logger that `orchestrator::init_logging` installs once at entry.

use std::env;

/// Credentials and feature toggles read from the environment. Both are
/// optional: an absent primary-provider token only reduces quota, and an
/// absent webhook URL disables the notifier (§6/§7 "config error").
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub finmind_api_token: Option<String>,
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            finmind_api_token: env::var("FINMIND_API_TOKEN").ok().filter(|s| !s.is_empty()),
            webhook_url: env::var("SCREENER_WEBHOOK_URL").ok().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MarketCapParams {
    /// Hundred-millions (10^8) of TWD.
    pub min: f64,
    pub max: f64,
}

impl Default for MarketCapParams {
    fn default() -> Self {
        Self { min: 50.0, max: 50_000.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RevenueGrowthParams {
    pub yoy_min_pct: f64,
    pub consecutive_months_min: u32,
}

impl Default for RevenueGrowthParams {
    fn default() -> Self {
        Self { yoy_min_pct: 0.0, consecutive_months_min: 2 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PeRatioParams {
    pub max: f64,
}

impl Default for PeRatioParams {
    fn default() -> Self {
        Self { max: 20.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HigherLowsParams {
    pub lookback_days: usize,
    pub pivot_window: usize,
    pub confirmations_min: u32,
    pub tolerance_pct: f64,
}

impl Default for HigherLowsParams {
    fn default() -> Self {
        Self {
            lookback_days: 60,
            pivot_window: 5,
            confirmations_min: 2,
            tolerance_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PullbackParams {
    pub min_pct: f64,
    pub max_pct: f64,
    pub high_lookback_days: usize,
    pub short_ma: Vec<u32>,
    pub long_ma: Vec<u32>,
    pub slope_lookback_days: usize,
    pub slope_tolerance: f64,
}

impl Default for PullbackParams {
    fn default() -> Self {
        Self {
            min_pct: 5.0,
            max_pct: 20.0,
            high_lookback_days: 20,
            short_ma: vec![5, 10],
            long_ma: vec![20, 60],
            slope_lookback_days: 5,
            slope_tolerance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumePriceHealthParams {
    pub avg_days: usize,
    pub exhaustion_change_pct_min: f64,
    pub healthy_ratio: f64,
    pub turnover_min: f64,
    pub turnover_max: f64,
}

impl Default for VolumePriceHealthParams {
    fn default() -> Self {
        Self {
            avg_days: 20,
            exhaustion_change_pct_min: 5.0,
            healthy_ratio: 1.5,
            turnover_min: 1.5,
            turnover_max: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeShrinkParams {
    pub consecutive_days_min: u32,
    pub shrink_threshold: f64,
    pub avg_days: usize,
    /// Asymmetric with the momentum chain's historical 0.95 "increasing
    /// volume" tolerance; preserved literally rather than unified.
    pub wobble_tolerance: f64,
}

impl Default for VolumeShrinkParams {
    fn default() -> Self {
        Self {
            consecutive_days_min: 3,
            shrink_threshold: 0.7,
            avg_days: 20,
            wobble_tolerance: 1.05,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RsiOversoldParams {
    pub period: usize,
    pub oversold_threshold: f64,
    pub require_upturn: bool,
    pub require_price_above_ma5: bool,
}

impl Default for RsiOversoldParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold_threshold: 35.0,
            require_upturn: true,
            require_price_above_ma5: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TurnoverRateParams {
    pub min: f64,
    pub max: f64,
    pub avg_days: usize,
}

impl Default for TurnoverRateParams {
    fn default() -> Self {
        Self { min: 0.5, max: 20.0, avg_days: 20 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MajorHolderParams {
    pub min_pct: f64,
    pub consecutive_weeks_min: u32,
}

impl Default for MajorHolderParams {
    fn default() -> Self {
        Self { min_pct: 30.0, consecutive_weeks_min: 1 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuietAccumulationParams {
    pub min_days: u32,
    pub max_stability: f64,
}

impl Default for QuietAccumulationParams {
    fn default() -> Self {
        Self { min_days: 5, max_stability: 2.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriceChangeParams {
    pub min: f64,
    pub max: f64,
}

impl Default for PriceChangeParams {
    fn default() -> Self {
        Self { min: 3.0, max: 10.0 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VolumeRatioParams {
    pub min: f64,
    pub avg_days: usize,
    pub trading_minutes: f64,
    pub time_floor: f64,
}

impl Default for VolumeRatioParams {
    fn default() -> Self {
        Self {
            min: 2.0,
            avg_days: 5,
            trading_minutes: 270.0,
            time_floor: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MovingAverageParams {
    pub slope_recent_days: usize,
    pub slope_prior_days: usize,
}

impl Default for MovingAverageParams {
    fn default() -> Self {
        Self { slope_recent_days: 5, slope_prior_days: 10 }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntradayHighParams {
    pub threshold: f64,
}

impl Default for IntradayHighParams {
    fn default() -> Self {
        Self { threshold: 0.98 }
    }
}

/// All per-stage thresholds for both chains. Older parameter sets are
/// not authoritative and are only reachable through `#[cfg(test)]`
/// fixtures, never here.
#[derive(Debug, Clone, Default)]
pub struct ScreeningParams {
    pub market_cap: MarketCapParams,
    pub revenue_growth: RevenueGrowthParams,
    pub pe_ratio: PeRatioParams,
    pub higher_lows: HigherLowsParams,
    pub pullback: PullbackParams,
    pub volume_price_health: VolumePriceHealthParams,
    pub volume_shrink: VolumeShrinkParams,
    pub rsi_oversold: RsiOversoldParams,
    pub turnover_rate: TurnoverRateParams,
    pub major_holder: MajorHolderParams,
    pub quiet_accumulation: QuietAccumulationParams,
    pub price_change: PriceChangeParams,
    pub volume_ratio: VolumeRatioParams,
    pub moving_average: MovingAverageParams,
    pub intraday_high: IntradayHighParams,
}

#[cfg(test)]
pub mod fixtures {
    //! Older parameter sets, kept only as test fixtures: the historical
    //! config revision used a looser pullback band and a stricter RSI
    //! oversold cutoff than the current defaults.
    use super::*;

    pub fn legacy_pullback() -> PullbackParams {
        PullbackParams {
            min_pct: 5.0,
            max_pct: 20.0,
            high_lookback_days: 20,
            short_ma: vec![5, 10],
            long_ma: vec![20, 60],
            slope_lookback_days: 5,
            slope_tolerance: 0.0,
        }
    }

    pub fn legacy_rsi_oversold() -> RsiOversoldParams {
        RsiOversoldParams {
            period: 14,
            oversold_threshold: 35.0,
            require_upturn: false,
            require_price_above_ma5: false,
        }
    }
}
