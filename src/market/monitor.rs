//! Index MA-alignment status, via a proxy ETF (0050 for the weighted
//! index, 006201 for the OTC index) since the exchanges don't publish
//! index-level OHLCV history directly.

use crate::analysis::moving_average;
use crate::model::{MarketStatus, Venue};
use crate::providers::HistoryStore;
use std::collections::BTreeMap;
use tracing::warn;

const MA_PERIODS: [u32; 4] = [5, 10, 20, 60];

fn proxy_symbol(venue: Venue) -> &'static str {
    match venue {
        Venue::Main => "0050",
        Venue::Otc => "006201",
    }
}

/// `None` if the proxy instrument's history is unavailable.
pub async fn check_market_status(history: &HistoryStore, venue: Venue) -> Option<MarketStatus> {
    let symbol = proxy_symbol(venue);
    let candles = history.history(symbol, venue, 70).await;
    if candles.is_empty() {
        warn!(venue = venue.as_str(), "market monitor: proxy instrument history unavailable");
        return None;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let current = *closes.last()?;
    let prev_close = if closes.len() >= 2 { closes[closes.len() - 2] } else { current };

    let mut ma_values = BTreeMap::new();
    let mut above_ma = BTreeMap::new();
    let mut broken_ma = Vec::new();
    for period in MA_PERIODS {
        let Some(ma) = moving_average(&closes, period as usize) else {
            continue;
        };
        let above = current >= ma;
        ma_values.insert(period, ma);
        above_ma.insert(period, above);
        if !above {
            broken_ma.push(period);
            warn!(venue = venue.as_str(), period, ma, current, "index below moving average");
        }
    }

    let is_bullish = MA_PERIODS
        .windows(2)
        .all(|w| matches!((ma_values.get(&w[0]), ma_values.get(&w[1])), (Some(a), Some(b)) if a > b));

    Some(MarketStatus { venue, current_price: current, prev_close, ma_values, above_ma, is_bullish, broken_ma })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_symbols_match_the_documented_etfs() {
        assert_eq!(proxy_symbol(Venue::Main), "0050");
        assert_eq!(proxy_symbol(Venue::Otc), "006201");
    }

    #[test]
    fn bullish_alignment_requires_every_shorter_ma_above_the_next() {
        let closes: Vec<f64> = (0..70).map(|i| 50.0 + i as f64 * 0.2).collect();
        let current = *closes.last().unwrap();
        let mut ma_values = BTreeMap::new();
        for period in MA_PERIODS {
            ma_values.insert(period, moving_average(&closes, period as usize).unwrap());
        }
        let is_bullish = MA_PERIODS
            .windows(2)
            .all(|w| matches!((ma_values.get(&w[0]), ma_values.get(&w[1])), (Some(a), Some(b)) if a > b));
        assert!(is_bullish);
        assert!(current >= *ma_values.get(&5).unwrap());
    }
}
