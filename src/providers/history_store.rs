//! Historical OHLCV retrieval with a primary/fallback provider latch.
//!
//! The primary provider (FinMind's `TaiwanStockPrice` dataset) is tried
//! first; on a quota-exhausted response or three consecutive failures the
//! store latches into fallback-only mode for the remainder of the run.
//! The fallback queries TWSE/TPEx month-by-month and merges the results.

use crate::core::{minguo_date_to_iso, HttpClient};
use crate::model::{Candle, Venue};
use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProviderState {
    PrimaryActive { consecutive_failures: u32 },
    FallbackOnly,
}

const MAX_CONSECUTIVE_FAILURES: u32 = 3;

pub struct HistoryStore {
    http: HttpClient,
    api_token: Option<String>,
    state: Mutex<ProviderState>,
    cache: AsyncMutex<HashMap<(String, u32), Vec<Candle>>>,
}

impl HistoryStore {
    pub fn new(http: HttpClient, api_token: Option<String>) -> Self {
        Self {
            http,
            api_token,
            state: Mutex::new(ProviderState::PrimaryActive { consecutive_failures: 0 }),
            cache: AsyncMutex::new(HashMap::new()),
        }
    }

    pub fn is_fallback_only(&self) -> bool {
        matches!(*self.state.lock().expect("lock poisoned"), ProviderState::FallbackOnly)
    }

    /// Ascending OHLCV sequence, length <= `days`. Never errors: an
    /// unreachable provider yields an empty sequence.
    pub async fn history(&self, id: &str, venue: Venue, days: u32) -> Vec<Candle> {
        let key = (id.to_string(), days);
        if let Some(hit) = self.cache.lock().await.get(&key).cloned() {
            return hit;
        }

        let candles = if self.is_fallback_only() {
            self.fetch_fallback(id, venue, days).await
        } else {
            match self.fetch_primary(id, days).await {
                Ok(candles) if !candles.is_empty() => {
                    self.record_success();
                    candles
                }
                Ok(_) => {
                    self.record_failure();
                    self.fetch_fallback(id, venue, days).await
                }
                Err(PrimaryError::QuotaExhausted) => {
                    self.latch_fallback();
                    self.fetch_fallback(id, venue, days).await
                }
                Err(PrimaryError::Other) => {
                    self.record_failure();
                    self.fetch_fallback(id, venue, days).await
                }
            }
        };

        self.cache.lock().await.insert(key, candles.clone());
        candles
    }

    fn record_success(&self) {
        *self.state.lock().expect("lock poisoned") = ProviderState::PrimaryActive { consecutive_failures: 0 };
    }

    fn record_failure(&self) {
        let mut guard = self.state.lock().expect("lock poisoned");
        if let ProviderState::PrimaryActive { consecutive_failures } = *guard {
            let failures = consecutive_failures + 1;
            if failures >= MAX_CONSECUTIVE_FAILURES {
                warn!("history primary provider latched to fallback after {failures} consecutive failures");
                *guard = ProviderState::FallbackOnly;
            } else {
                *guard = ProviderState::PrimaryActive { consecutive_failures: failures };
            }
        }
    }

    fn latch_fallback(&self) {
        let mut guard = self.state.lock().expect("lock poisoned");
        if !matches!(*guard, ProviderState::FallbackOnly) {
            warn!("history primary provider quota exhausted, latching to fallback for the rest of the run");
        }
        *guard = ProviderState::FallbackOnly;
    }

    async fn fetch_primary(&self, id: &str, days: u32) -> Result<Vec<Candle>, PrimaryError> {
        let end = chrono::Local::now().date_naive();
        let start = end - chrono::Duration::days(i64::from(days) * 2);
        let mut query = vec![
            ("dataset".to_string(), "TaiwanStockPrice".to_string()),
            ("data_id".to_string(), id.to_string()),
            ("start_date".to_string(), start.format("%Y-%m-%d").to_string()),
            ("end_date".to_string(), end.format("%Y-%m-%d").to_string()),
        ];
        if let Some(token) = &self.api_token {
            query.push(("token".to_string(), token.clone()));
        }
        let url = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query)
            .map_err(|_| PrimaryError::Other)?;

        let body = self.http.get_text(url).await.map_err(|e| match e {
            crate::core::ScreenError::Status { status: 402, .. } => PrimaryError::QuotaExhausted,
            _ => PrimaryError::Other,
        })?;

        let parsed: FinMindResponse = serde_json::from_str(&body).map_err(|_| PrimaryError::Other)?;
        if parsed.status == 402 {
            return Err(PrimaryError::QuotaExhausted);
        }
        if parsed.status != 200 {
            return Err(PrimaryError::Other);
        }

        let mut candles: Vec<Candle> = parsed
            .data
            .into_iter()
            .filter_map(|r| {
                let date = NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok()?;
                Some(Candle {
                    date,
                    open: r.open,
                    high: r.max,
                    low: r.min,
                    close: r.close,
                    volume: r.trading_volume,
                })
            })
            .collect();
        dedup_sort_tail(&mut candles, days);
        Ok(candles)
    }

    async fn fetch_fallback(&self, id: &str, venue: Venue, days: u32) -> Vec<Candle> {
        let months_needed = (days / 20 + 1).max(2);
        let today = chrono::Local::now().date_naive();
        let mut all = Vec::new();

        for i in 0..months_needed {
            let target = today - chrono::Duration::days(i64::from(i) * 30);
            let (year, month) = (target.year(), target.month());
            let mut monthly = self.fetch_twse_monthly(id, year, month).await;
            if monthly.is_empty() {
                monthly = self.fetch_tpex_monthly(id, year, month).await;
            }
            all.extend(monthly);
            let _ = venue;
        }

        dedup_sort_tail(&mut all, days);
        all
    }

    async fn fetch_twse_monthly(&self, id: &str, year: i32, month: u32) -> Vec<Candle> {
        let date_str = format!("{year}{month:02}01");
        let Ok(url) = Url::parse_with_params(
            "https://www.twse.com.tw/exchangeReport/STOCK_DAY",
            &[("response", "json"), ("date", date_str.as_str()), ("stockNo", id)],
        ) else {
            return Vec::new();
        };
        let Ok(body) = self.http.get_text(url).await else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return Vec::new();
        };
        let Some(rows) = value.get("data").and_then(Value::as_array) else {
            return Vec::new();
        };

        // TWSE STOCK_DAY columns: 0:date(CC/MM/DD),1:volume(shares),
        // 2:value,3:open,4:high,5:low,6:close,7:change,8:count.
        rows.iter()
            .filter_map(|row| {
                let date_cell = row.get(0)?.as_str()?;
                let date = minguo_date_to_iso(date_cell)?;
                let volume = parse_numeric_cell(row.get(1)?)?;
                let open = parse_numeric_cell(row.get(3)?)?;
                let high = parse_numeric_cell(row.get(4)?)?;
                let low = parse_numeric_cell(row.get(5)?)?;
                let close = parse_numeric_cell(row.get(6)?)?;
                Some(Candle { date, open, high, low, close, volume })
            })
            .collect()
    }

    async fn fetch_tpex_monthly(&self, id: &str, year: i32, month: u32) -> Vec<Candle> {
        let roc_year = crate::core::civil_to_minguo_year(year);
        let date_str = format!("{roc_year}/{month:02}");
        let Ok(url) = Url::parse_with_params(
            "https://www.tpex.org.tw/web/stock/aftertrading/daily_trading_info/st43_result.php",
            &[("l", "zh-tw"), ("d", date_str.as_str()), ("stkno", id)],
        ) else {
            return Vec::new();
        };
        let Ok(body) = self.http.get_text(url).await else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return Vec::new();
        };
        let Some(rows) = value.get("aaData").and_then(Value::as_array) else {
            return Vec::new();
        };

        // TPEx daily-trading-info columns mirror TWSE's STOCK_DAY order.
        rows.iter()
            .filter_map(|row| {
                let date_cell = row.get(0)?.as_str()?;
                let date = minguo_date_to_iso(date_cell)?;
                let volume = parse_numeric_cell(row.get(1)?)?;
                let open = parse_numeric_cell(row.get(3)?)?;
                let high = parse_numeric_cell(row.get(4)?)?;
                let low = parse_numeric_cell(row.get(5)?)?;
                let close = parse_numeric_cell(row.get(6)?)?;
                Some(Candle { date, open, high, low, close, volume })
            })
            .collect()
    }
}

enum PrimaryError {
    QuotaExhausted,
    Other,
}

#[derive(Debug, Deserialize)]
struct FinMindResponse {
    status: i64,
    #[serde(default)]
    data: Vec<FinMindRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindRow {
    date: String,
    open: f64,
    max: f64,
    min: f64,
    close: f64,
    #[serde(rename = "Trading_Volume")]
    trading_volume: f64,
}

fn parse_numeric_cell(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.replace(',', "");
            let s = s.trim();
            if s.is_empty() || s == "--" {
                None
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Sort ascending, drop duplicate dates (P9), tail to `days`.
fn dedup_sort_tail(candles: &mut Vec<Candle>, days: u32) {
    candles.sort_by_key(|c| c.date);
    candles.dedup_by_key(|c| c.date);
    let len = candles.len();
    if len > days as usize {
        candles.drain(0..len - days as usize);
    }
    let _ = debug!(count = candles.len(), "history merged");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(date: &str, close: f64) -> Candle {
        Candle {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn dedup_sort_tail_keeps_unique_ascending_tail() {
        let mut candles = vec![
            candle("2024-01-03", 3.0),
            candle("2024-01-01", 1.0),
            candle("2024-01-02", 2.0),
            candle("2024-01-02", 2.5),
        ];
        dedup_sort_tail(&mut candles, 2);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].date, NaiveDate::parse_from_str("2024-01-02", "%Y-%m-%d").unwrap());
        assert_eq!(candles[1].date, NaiveDate::parse_from_str("2024-01-03", "%Y-%m-%d").unwrap());
    }

    #[tokio::test]
    async fn latches_to_fallback_after_three_failures() {
        let store = HistoryStore::new(HttpClient::default(), None);
        assert!(!store.is_fallback_only());
        store.record_failure();
        store.record_failure();
        assert!(!store.is_fallback_only());
        store.record_failure();
        assert!(store.is_fallback_only());
    }

    #[tokio::test]
    async fn latches_immediately_on_quota_exhausted() {
        let store = HistoryStore::new(HttpClient::default(), None);
        store.latch_fallback();
        assert!(store.is_fallback_only());
    }
}
