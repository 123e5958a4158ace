//! Daily quote snapshot for both venues: intraday-first, post-close
//! fallback, schema-probing across the old/new wire variants.

use crate::core::HttpClient;
use crate::model::{Batch, Row, Venue};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const BATCH_SIZE: usize = 50;
const INTER_BATCH_SLEEP: Duration = Duration::from_millis(200);
const INTER_VENUE_SLEEP: Duration = Duration::from_millis(500);

pub struct QuoteSource {
    http: HttpClient,
}

impl QuoteSource {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Fetch a full snapshot for both venues, concatenated. An empty
    /// result from one venue is tolerated; both empty means the wider
    /// `Fatal` condition described in the error-handling design, which
    /// callers (the orchestrator) are responsible for surfacing.
    pub async fn snapshot(&self) -> Batch {
        let mut out = self.fetch_venue(Venue::Main).await;
        tokio::time::sleep(INTER_VENUE_SLEEP).await;
        out.extend(self.fetch_venue(Venue::Otc).await);
        out
    }

    async fn fetch_venue(&self, venue: Venue) -> Batch {
        let intraday = self.fetch_intraday(venue).await;
        if !intraday.is_empty() {
            return intraday;
        }
        debug!(venue = venue.as_str(), "intraday empty, falling back to post-close");
        self.fetch_postclose(venue).await
    }

    async fn fetch_intraday(&self, venue: Venue) -> Batch {
        let ids = match self.fetch_symbol_list(venue).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(venue = venue.as_str(), error = %e, "symbol list fetch failed");
                return Vec::new();
            }
        };
        if ids.is_empty() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for (i, chunk) in ids.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(INTER_BATCH_SLEEP).await;
            }
            match self.fetch_intraday_batch(venue, chunk).await {
                Ok(rows) => out.extend(rows),
                Err(e) => warn!(venue = venue.as_str(), error = %e, "intraday batch failed"),
            }
        }
        out
    }

    async fn fetch_symbol_list(&self, venue: Venue) -> Result<Vec<String>, crate::core::ScreenError> {
        let url = Url::parse_with_params(
            "https://www.twse.com.tw/rwd/zh/afterTrading/MI_INDEX",
            &[("response", "json"), ("type", "ALLBUT0999")],
        )?;
        let body = self.http.get_text(url.clone()).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| crate::core::ScreenError::Data(format!("symbol list json: {e}")))?;
        let rows = probe_table_rows(&value);
        let prefix = match venue {
            Venue::Main => "tse",
            Venue::Otc => "otc",
        };
        let mut ids = Vec::new();
        for row in rows {
            if let Some(id) = row.first().and_then(Value::as_str)
                && is_four_digit_id(id.trim())
            {
                ids.push(format!("{prefix}_{}.tw", id.trim()));
            }
        }
        Ok(ids)
    }

    async fn fetch_intraday_batch(
        &self,
        venue: Venue,
        ex_ch: &[String],
    ) -> Result<Batch, crate::core::ScreenError> {
        let joined = ex_ch.join("|");
        let url = Url::parse_with_params(
            "https://mis.twse.com.tw/stock/api/getStockInfo.jsp",
            &[("ex_ch", joined.as_str())],
        )?;
        let body = self.http.get_text(url).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| crate::core::ScreenError::Data(format!("intraday json: {e}")))?;
        let Some(arr) = value.get("msgArray").and_then(Value::as_array) else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for item in arr {
            let Some(id) = item.get("c").and_then(Value::as_str) else {
                continue;
            };
            if !is_four_digit_id(id) {
                continue;
            }
            let price_str = item.get("z").and_then(Value::as_str).unwrap_or("-");
            let price = if price_str == "-" || price_str.is_empty() {
                let bid = item
                    .get("b")
                    .and_then(Value::as_str)
                    .and_then(|s| s.split('_').next())
                    .unwrap_or("");
                parse_sentinel(bid).or_else(|| parse_sentinel(item.get("y").and_then(Value::as_str).unwrap_or("0")))
            } else {
                parse_sentinel(price_str)
            };
            let Some(price) = price.filter(|p| *p > 0.0) else {
                continue;
            };
            let prev_close = parse_sentinel(item.get("y").and_then(Value::as_str).unwrap_or("0")).unwrap_or(0.0);
            let open = parse_sentinel(item.get("o").and_then(Value::as_str).unwrap_or("0")).unwrap_or(price);
            let high = parse_sentinel(item.get("h").and_then(Value::as_str).unwrap_or("0")).unwrap_or(price);
            let low = parse_sentinel(item.get("l").and_then(Value::as_str).unwrap_or("0")).unwrap_or(price);
            let volume = parse_sentinel(item.get("v").and_then(Value::as_str).unwrap_or("0")).unwrap_or(0.0);
            let name = item.get("n").and_then(Value::as_str).unwrap_or("").to_string();

            let mut row = Row::new(id, name, venue);
            row.price = price;
            row.open = if open == 0.0 { price } else { open };
            row.high = if high == 0.0 { price } else { high };
            row.low = if low == 0.0 { price } else { low };
            row.prev_close = prev_close;
            row.volume = volume;
            row.recompute_change_pct();
            out.push(row);
        }
        Ok(out)
    }

    async fn fetch_postclose(&self, venue: Venue) -> Batch {
        match venue {
            Venue::Main => self.fetch_postclose_twse().await,
            Venue::Otc => self.fetch_postclose_tpex().await,
        }
    }

    async fn fetch_postclose_twse(&self) -> Batch {
        let today = chrono::Local::now().format("%Y%m%d").to_string();
        let Ok(url) = Url::parse_with_params(
            "https://www.twse.com.tw/exchangeReport/MI_INDEX",
            &[("response", "json"), ("date", today.as_str()), ("type", "ALLBUT0999")],
        ) else {
            return Vec::new();
        };
        let Ok(body) = self.http.get_text(url).await else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return Vec::new();
        };
        let rows = probe_table_rows(&value);

        let mut out = Vec::new();
        for item in rows {
            let Some(row) = parse_twse_postclose_row(&item) else {
                continue;
            };
            out.push(row);
        }
        out
    }

    async fn fetch_postclose_tpex(&self) -> Batch {
        let now = chrono::Local::now();
        let roc_year = crate::core::civil_to_minguo_year(now.year());
        let date_str = format!("{roc_year}/{}", now.format("%m/%d"));
        let ts = chrono::Local::now().timestamp_millis().to_string();
        let Ok(url) = Url::parse_with_params(
            "https://www.tpex.org.tw/web/stock/aftertrading/otc_quotes_no1430/stk_wn1430_result.php",
            &[
                ("l", "zh-tw"),
                ("d", date_str.as_str()),
                ("se", "EW"),
                ("_", ts.as_str()),
            ],
        ) else {
            return Vec::new();
        };
        let Ok(body) = self.http.get_text(url).await else {
            return Vec::new();
        };
        let Ok(value) = serde_json::from_str::<Value>(&body) else {
            return Vec::new();
        };
        let rows = probe_table_rows_tpex(&value);

        let mut out = Vec::new();
        for item in rows {
            let Some(row) = parse_tpex_postclose_row(&item) else {
                continue;
            };
            out.push(row);
        }
        out
    }
}

use chrono::Datelike;

fn is_four_digit_id(s: &str) -> bool {
    s.len() == 4 && s.chars().all(|c| c.is_ascii_digit())
}

/// Strip thousands separators and parse the TWSE/TPEx sentinel ("--" or
/// empty) as missing.
fn parse_sentinel(s: &str) -> Option<f64> {
    let s = s.replace(',', "");
    let s = s.trim();
    if s.is_empty() || s == "--" || s == "-" {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Probe `tables[8].data` (new schema) then `data9` (legacy) for the TWSE
/// all-stocks table.
fn probe_table_rows(value: &Value) -> Vec<Value> {
    if let Some(tables) = value.get("tables").and_then(Value::as_array)
        && let Some(t8) = tables.get(8)
        && let Some(data) = t8.get("data").and_then(Value::as_array)
    {
        return data.clone();
    }
    if let Some(data) = value.get("data9").and_then(Value::as_array) {
        return data.clone();
    }
    Vec::new()
}

/// Probe `tables[0].data` then `aaData` for the TPEx all-stocks table.
fn probe_table_rows_tpex(value: &Value) -> Vec<Value> {
    if let Some(tables) = value.get("tables").and_then(Value::as_array)
        && let Some(t0) = tables.first()
        && let Some(data) = t0.get("data").and_then(Value::as_array)
    {
        return data.clone();
    }
    if let Some(data) = value.get("aaData").and_then(Value::as_array) {
        return data.clone();
    }
    Vec::new()
}

fn cell_str(row: &Value, idx: usize) -> Option<String> {
    row.get(idx).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// TWSE post-close column order: 0:id,1:name,2:volume(shares),3:count,
/// 4:value,5:open,6:high,7:low,8:close,9:change-sign,10:change-value.
fn parse_twse_postclose_row(item: &Value) -> Option<Row> {
    let id = cell_str(item, 0)?;
    if !is_four_digit_id(&id) {
        return None;
    }
    let name = cell_str(item, 1).unwrap_or_default();
    let price = parse_sentinel(&cell_str(item, 8)?)?;

    let change_sign = cell_str(item, 9).unwrap_or_default();
    let mut change_val = cell_str(item, 10).and_then(|s| parse_sentinel(&s)).unwrap_or(0.0);
    if change_sign.contains('-') || change_sign.to_lowercase().contains("green") {
        change_val = -change_val.abs();
    }
    let prev_close = price - change_val;

    let open = cell_str(item, 5).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let high = cell_str(item, 6).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let low = cell_str(item, 7).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let volume_shares = cell_str(item, 2).and_then(|s| parse_sentinel(&s)).unwrap_or(0.0);

    let mut row = Row::new(id, name, Venue::Main);
    row.price = price;
    row.open = open;
    row.high = high;
    row.low = low;
    row.prev_close = prev_close;
    row.volume = (volume_shares / 1000.0).trunc();
    row.recompute_change_pct();
    Some(row)
}

/// TPEx post-close column order: 0:id,1:name,2:close,3:change,4:open,
/// 5:high,6:low,7:volume(shares).
fn parse_tpex_postclose_row(item: &Value) -> Option<Row> {
    let id = cell_str(item, 0)?;
    if !is_four_digit_id(&id) {
        return None;
    }
    let name = cell_str(item, 1).unwrap_or_default();
    let price = parse_sentinel(&cell_str(item, 2)?)?;
    let change_val = cell_str(item, 3).and_then(|s| parse_sentinel(&s)).unwrap_or(0.0);
    let prev_close = price - change_val;

    let open = cell_str(item, 4).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let high = cell_str(item, 5).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let low = cell_str(item, 6).and_then(|s| parse_sentinel(&s)).unwrap_or(price);
    let volume_shares = cell_str(item, 7).and_then(|s| parse_sentinel(&s)).unwrap_or(0.0);

    let mut row = Row::new(id, name, Venue::Otc);
    row.price = price;
    row.open = open;
    row.high = high;
    row.low = low;
    row.prev_close = prev_close;
    row.volume = (volume_shares / 1000.0).trunc();
    row.recompute_change_pct();
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sentinel_dashes_as_missing() {
        assert_eq!(parse_sentinel("--"), None);
        assert_eq!(parse_sentinel(""), None);
        assert_eq!(parse_sentinel("1,234.5"), Some(1234.5));
    }

    #[test]
    fn drops_non_four_digit_ids() {
        assert!(!is_four_digit_id("110"));
        assert!(!is_four_digit_id("11011"));
        assert!(!is_four_digit_id("AAAA"));
        assert!(is_four_digit_id("1101"));
    }

    #[test]
    fn twse_postclose_row_infers_sign_from_token() {
        let item = serde_json::json!(["1101", "台泥", "1,200,000", "500", "12,000,000",
            "38.5", "40.5", "38.4", "40.0", "green", "2.0"]);
        let row = parse_twse_postclose_row(&item).unwrap();
        assert_eq!(row.prev_close, 38.0);
        assert!((row.change_pct - (40.0 - 38.0) / 38.0 * 100.0).abs() < 1e-9);
        assert_eq!(row.volume, 1200.0);
    }

    #[test]
    fn twse_postclose_row_drops_sentinel_price() {
        let item = serde_json::json!(["1101", "台泥", "0", "0", "0", "--", "--", "--", "--", "", "0"]);
        assert!(parse_twse_postclose_row(&item).is_none());
    }
}
