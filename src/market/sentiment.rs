//! Foreign-investor sentiment: spot net buy/sell crossed with futures
//! open-interest change, yielding one of four labels.

use crate::core::HttpClient;
use crate::model::{Direction, ForeignSentiment, SentimentLabel};
use crate::providers::DerivedQueries;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

struct SpotNet {
    net_billion: f64,
    date: NaiveDate,
}

struct FuturesOi {
    oi_change: f64,
}

pub async fn analyze_sentiment(http: &HttpClient, derived: &DerivedQueries) -> ForeignSentiment {
    let spot = fetch_spot(http).await;
    let futures = fetch_futures(http, derived).await;

    let date = spot.as_ref().map(|s| s.date).unwrap_or_else(|| chrono::Local::now().date_naive());

    match (spot, futures) {
        (Some(spot), Some(futures)) => {
            let spot_buy = spot.net_billion > 0.0;
            let futures_long = futures.oi_change > 0.0;
            let label = match (spot_buy, futures_long) {
                (true, true) => SentimentLabel::Bullish,
                (true, false) => SentimentLabel::Hedge,
                (false, false) => SentimentLabel::Bearish,
                (false, true) => SentimentLabel::Bottom,
            };
            let detail = format!(
                "spot {} {:.1} billion / futures {} {:.0} contracts",
                if spot_buy { "net buy" } else { "net sell" },
                spot.net_billion.abs(),
                if futures_long { "long OI up" } else { "short OI up" },
                futures.oi_change.abs(),
            );
            ForeignSentiment {
                label,
                spot_net_billion: Some(spot.net_billion),
                spot_direction: Some(if spot_buy { Direction::Up } else { Direction::Down }),
                futures_oi_change: Some(futures.oi_change),
                futures_direction: Some(if futures_long { Direction::Up } else { Direction::Down }),
                date,
                detail,
            }
        }
        (Some(spot), None) => {
            let spot_buy = spot.net_billion > 0.0;
            ForeignSentiment {
                label: SentimentLabel::Unknown,
                spot_net_billion: Some(spot.net_billion),
                spot_direction: Some(if spot_buy { Direction::Up } else { Direction::Down }),
                futures_oi_change: None,
                futures_direction: None,
                date,
                detail: format!(
                    "spot {} {:.1} billion (futures data unavailable)",
                    if spot_buy { "net buy" } else { "net sell" },
                    spot.net_billion.abs()
                ),
            }
        }
        (None, Some(futures)) => {
            let futures_long = futures.oi_change > 0.0;
            ForeignSentiment {
                label: SentimentLabel::Unknown,
                spot_net_billion: None,
                spot_direction: None,
                futures_oi_change: Some(futures.oi_change),
                futures_direction: Some(if futures_long { Direction::Up } else { Direction::Down }),
                date,
                detail: format!(
                    "futures {} {:.0} contracts (spot data unavailable)",
                    if futures_long { "long OI up" } else { "short OI up" },
                    futures.oi_change.abs()
                ),
            }
        }
        (None, None) => {
            warn!("foreign sentiment: both spot and futures data unavailable");
            ForeignSentiment {
                label: SentimentLabel::Unknown,
                spot_net_billion: None,
                spot_direction: None,
                futures_oi_change: None,
                futures_direction: None,
                date,
                detail: "no data available".to_string(),
            }
        }
    }
}

async fn fetch_spot(http: &HttpClient) -> Option<SpotNet> {
    let url = Url::parse_with_params("https://www.twse.com.tw/rwd/zh/fund/BFI82U", &[("response", "json")]).ok()?;
    let body = http.get_text(url).await.ok()?;
    let value: Value = serde_json::from_str(&body).ok()?;
    if value.get("stat").and_then(Value::as_str) != Some("OK") {
        return None;
    }
    let date = value
        .get("date")
        .and_then(Value::as_str)
        .filter(|s| s.len() == 8)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y%m%d").ok())
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    let rows = value.get("data").and_then(Value::as_array)?;
    for row in rows {
        let cols = row.as_array()?;
        let name = cols.first()?.as_str()?.trim();
        // TWSE's institutional-summary table carries both "foreign and
        // mainland (ex. foreign proprietary)" and a separate
        // "foreign proprietary" row; only the former counts here.
        if name.contains("外資及陸資") || name == "外資(不含外資自營商)" {
            let buy = parse_amount(cols.get(1)?.as_str()?)?;
            let sell = parse_amount(cols.get(2)?.as_str()?)?;
            let net = buy - sell;
            return Some(SpotNet { net_billion: net / 100_000_000.0, date });
        }
    }
    None
}

fn parse_amount(s: &str) -> Option<f64> {
    s.replace(',', "").trim().parse().ok()
}

async fn fetch_futures(http: &HttpClient, derived: &DerivedQueries) -> Option<FuturesOi> {
    let days = derived.futures_open_interest().await;
    match days.len() {
        0 => fetch_futures_taifex(http).await,
        1 => Some(FuturesOi { oi_change: days[0].net_oi }),
        _ => {
            let latest = days[days.len() - 1].net_oi;
            let prior = days[days.len() - 2].net_oi;
            Some(FuturesOi { oi_change: latest - prior })
        }
    }
}

/// HTML fallback: the exchange's "three major institutional investors by
/// futures contract" page, locating the row for Taiwan-index futures
/// (`臺股期貨`) under the foreign-investor (`外資`) category.
async fn fetch_futures_taifex(http: &HttpClient) -> Option<FuturesOi> {
    let mut records: Vec<(NaiveDate, f64)> = Vec::new();
    let today = chrono::Local::now().date_naive();

    for days_ago in 0..5 {
        let target = today - chrono::Duration::days(days_ago);
        let date_str = target.format("%Y/%m/%d").to_string();
        let url = Url::parse_with_params(
            "https://www.taifex.com.tw/cht/3/futContractsDate",
            &[
                ("queryType", "1"),
                ("doQuery", "1"),
                ("queryDate", date_str.as_str()),
                ("commodityId", "TXF"),
            ],
        )
        .ok()?;

        let Ok(html) = http.get_text(url).await else { continue };
        if let Some(net) = parse_taifex_foreign_oi(&html) {
            records.push((target, net));
        }
        if records.len() >= 2 {
            break;
        }
    }

    if records.is_empty() {
        return None;
    }
    let oi_change = if records.len() >= 2 { records[0].1 - records[1].1 } else { records[0].1 };
    debug!(oi_change, "taifex futures OI fallback used");
    Some(FuturesOi { oi_change })
}

fn parse_taifex_foreign_oi(html: &str) -> Option<f64> {
    use scraper::{Html, Selector};
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("tr").ok()?;
    let cell_sel = Selector::parse("td").ok()?;

    for row in document.select(&row_sel) {
        let cells: Vec<String> = row.select(&cell_sel).map(|c| c.text().collect::<String>().trim().to_string()).collect();
        if cells.len() < 14 {
            continue;
        }
        if cells[1].contains("臺股期貨") && cells[2].contains("外資") {
            let long_oi = parse_amount(&cells[9])?;
            let short_oi = parse_amount(&cells[11])?;
            return Some(long_oi - short_oi);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_strips_thousands_separators() {
        assert_eq!(parse_amount("1,234,567"), Some(1_234_567.0));
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn parse_taifex_foreign_oi_locates_the_right_row() {
        let html = r#"
            <table>
              <tr><td>1</td><td>臺股期貨</td><td>外資</td><td>a</td><td>b</td><td>c</td>
                  <td>d</td><td>e</td><td>f</td><td>50000</td><td>g</td><td>30000</td>
                  <td>h</td><td>20000</td></tr>
            </table>
        "#;
        assert_eq!(parse_taifex_foreign_oi(html), Some(20000.0));
    }
}
