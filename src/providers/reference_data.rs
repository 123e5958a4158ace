//! Market cap, shares outstanding, and industry classification. All three
//! are cached for the life of the run.

use crate::core::HttpClient;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::warn;
use url::Url;

pub struct ReferenceData {
    http: HttpClient,
    api_token: Option<String>,
    market_cap: Mutex<Option<HashMap<String, f64>>>,
    shares_outstanding: Mutex<Option<HashMap<String, f64>>>,
    industry: Mutex<Option<HashMap<String, String>>>,
}

impl ReferenceData {
    pub fn new(http: HttpClient, api_token: Option<String>) -> Self {
        Self {
            http,
            api_token,
            market_cap: Mutex::new(None),
            shares_outstanding: Mutex::new(None),
            industry: Mutex::new(None),
        }
    }

    /// Market cap in hundred-millions (10^8) of TWD, latest date only.
    /// `None` (empty cache) signals callers to fall back to the
    /// traded-value proxy rather than drop the row.
    pub async fn market_cap(&self, id: &str) -> Option<f64> {
        self.load_market_cap().await;
        self.market_cap.lock().await.as_ref()?.get(id).copied()
    }

    pub async fn has_market_cap_data(&self) -> bool {
        self.load_market_cap().await;
        self.market_cap.lock().await.as_ref().is_some_and(|m| !m.is_empty())
    }

    pub async fn shares_outstanding(&self, id: &str) -> Option<f64> {
        self.load_shares_outstanding().await;
        self.shares_outstanding.lock().await.as_ref()?.get(id).copied()
    }

    pub async fn industry(&self, id: &str) -> String {
        self.load_industry().await;
        self.industry
            .lock()
            .await
            .as_ref()
            .and_then(|m| m.get(id).cloned())
            .unwrap_or_else(|| "UNCLASSIFIED".to_string())
    }

    async fn load_market_cap(&self) {
        let mut guard = self.market_cap.lock().await;
        if guard.is_some() {
            return;
        }
        let mut query = vec![("dataset".to_string(), "TaiwanStockMarketValue".to_string())];
        if let Some(token) = &self.api_token {
            query.push(("token".to_string(), token.clone()));
        }
        let map = match Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) {
            Ok(url) => match self.http.get_json::<FinMindValueResponse>(url).await {
                Ok(resp) => latest_by_id(resp.data, |r| (r.stock_id, r.market_value / 100_000_000.0)),
                Err(e) => {
                    warn!(error = %e, "market cap fetch failed");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        *guard = Some(map);
    }

    async fn load_shares_outstanding(&self) {
        let mut guard = self.shares_outstanding.lock().await;
        if guard.is_some() {
            return;
        }
        let mut query = vec![("dataset".to_string(), "TaiwanStockShareholding".to_string())];
        if let Some(token) = &self.api_token {
            query.push(("token".to_string(), token.clone()));
        }
        let map = match Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) {
            Ok(url) => match self.http.get_json::<FinMindSharesResponse>(url).await {
                Ok(resp) => latest_by_id(resp.data, |r| (r.stock_id, r.number_of_shares_issued)),
                Err(e) => {
                    warn!(error = %e, "shares outstanding fetch failed");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        *guard = Some(map);
    }

    async fn load_industry(&self) {
        let mut guard = self.industry.lock().await;
        if guard.is_some() {
            return;
        }
        let mut map = HashMap::new();
        for mode in [2, 4] {
            if let Ok(url) = Url::parse_with_params(
                "https://isin.twse.com.tw/isin/C_public.jsp",
                &[("strMode", mode.to_string())],
            ) {
                match self.http.get_bytes(url).await {
                    Ok(bytes) => {
                        let (text, _, _) = encoding_rs::BIG5.decode(&bytes);
                        parse_industry_page(&text, &mut map);
                    }
                    Err(e) => warn!(error = %e, mode, "industry page fetch failed"),
                }
            }
        }
        *guard = Some(map);
    }
}

fn latest_by_id<T, F>(rows: Vec<T>, extract: F) -> HashMap<String, f64>
where
    T: HasDate,
    F: Fn(T) -> (String, f64),
{
    let latest_date = rows.iter().map(HasDate::date).max();
    let Some(latest_date) = latest_date else {
        return HashMap::new();
    };
    rows.into_iter()
        .filter(|r| r.date() == latest_date)
        .map(extract)
        .collect()
}

trait HasDate {
    fn date(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct FinMindValueResponse {
    #[serde(default)]
    data: Vec<FinMindValueRow>,
}

#[derive(Debug, Deserialize, Clone)]
struct FinMindValueRow {
    date: String,
    stock_id: String,
    market_value: f64,
}

impl HasDate for FinMindValueRow {
    fn date(&self) -> &str {
        &self.date
    }
}

#[derive(Debug, Deserialize)]
struct FinMindSharesResponse {
    #[serde(default)]
    data: Vec<FinMindSharesRow>,
}

#[derive(Debug, Deserialize, Clone)]
struct FinMindSharesRow {
    date: String,
    stock_id: String,
    #[serde(rename = "NumberOfSharesIssued")]
    number_of_shares_issued: f64,
}

impl HasDate for FinMindSharesRow {
    fn date(&self) -> &str {
        &self.date
    }
}

fn id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})\s").expect("valid regex"))
}

/// Registry page rows have a 4-digit id + name in the first cell and the
/// industry label in the fifth; everything else is ignored.
fn parse_industry_page(html: &str, out: &mut HashMap<String, String>) {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("tr").expect("valid selector");
    let cell_sel = Selector::parse("td").expect("valid selector");

    for row in document.select(&row_sel) {
        let cells: Vec<String> = row
            .select(&cell_sel)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect();
        if cells.len() < 5 {
            continue;
        }
        let Some(caps) = id_regex().captures(&cells[0]) else {
            continue;
        };
        let industry = cells[4].clone();
        if industry.is_empty() {
            continue;
        }
        out.insert(caps[1].to_string(), industry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_industry_rows_by_code_and_fifth_cell() {
        let html = r"
            <table>
              <tr><td>1101　台泥</td><td>x</td><td>x</td><td>x</td><td>水泥工業</td></tr>
              <tr><td>header only</td></tr>
            </table>
        ";
        let mut map = HashMap::new();
        parse_industry_page(html, &mut map);
        assert_eq!(map.get("1101").map(String::as_str), Some("水泥工業"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn latest_by_id_keeps_only_the_max_date() {
        let rows = vec![
            FinMindValueRow { date: "2024-01-01".into(), stock_id: "1101".into(), market_value: 1.0 },
            FinMindValueRow { date: "2024-01-02".into(), stock_id: "1101".into(), market_value: 2.0 },
        ];
        let map = latest_by_id(rows, |r| (r.stock_id, r.market_value));
        assert_eq!(map.get("1101"), Some(&2.0));
    }
}
