//! Derived queries: institutional buy/sell flows, shareholding
//! distribution, monthly revenue, quarterly EPS, and foreign futures open
//! interest. All go through the primary provider's `/api/v4/data` REST
//! endpoint, one dataset per query.

use crate::core::HttpClient;
use serde::Deserialize;
use url::Url;

pub struct DerivedQueries {
    http: HttpClient,
    api_token: Option<String>,
}

/// One day's net institutional flow for one ticker, in lots.
#[derive(Debug, Clone, Copy)]
pub struct InstitutionalDayFlow {
    pub date: chrono::NaiveDate,
    pub foreign_net: f64,
    pub trust_net: f64,
    pub dealer_net: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct RevenueMonth {
    pub year_month: (i32, u32),
    pub revenue: f64,
    pub yoy_pct: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct EpsQuarter {
    pub eps: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct HolderWeek {
    pub date: chrono::NaiveDate,
    /// Percent of shares held by accounts holding >= 1,000 lots.
    pub major_holder_pct: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FuturesDayOi {
    pub date: chrono::NaiveDate,
    pub net_oi: f64,
}

impl DerivedQueries {
    pub fn new(http: HttpClient, api_token: Option<String>) -> Self {
        Self { http, api_token }
    }

    fn query(&self, dataset: &str, id: Option<&str>, start: Option<&str>) -> Vec<(String, String)> {
        let mut q = vec![("dataset".to_string(), dataset.to_string())];
        if let Some(id) = id {
            q.push(("data_id".to_string(), id.to_string()));
        }
        if let Some(start) = start {
            q.push(("start_date".to_string(), start.to_string()));
        }
        if let Some(token) = &self.api_token {
            q.push(("token".to_string(), token.clone()));
        }
        q
    }

    /// Net buy/sell by participant category over the last `days` trading
    /// days, converted shares -> lots by integer division by 1000.
    pub async fn institutional_flows(&self, id: &str, days: i64) -> Vec<InstitutionalDayFlow> {
        let start = (chrono::Local::now().date_naive() - chrono::Duration::days(days * 2))
            .format("%Y-%m-%d")
            .to_string();
        let query = self.query("TaiwanStockInstitutionalInvestorsBuySell", Some(id), Some(&start));
        let Ok(url) = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) else {
            return Vec::new();
        };
        let Ok(resp) = self.http.get_json::<FinMindFlowResponse>(url).await else {
            return Vec::new();
        };

        let mut by_date: std::collections::BTreeMap<chrono::NaiveDate, InstitutionalDayFlow> =
            std::collections::BTreeMap::new();
        for row in resp.data {
            let Ok(date) = chrono::NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") else {
                continue;
            };
            let entry = by_date.entry(date).or_insert(InstitutionalDayFlow {
                date,
                foreign_net: 0.0,
                trust_net: 0.0,
                dealer_net: 0.0,
            });
            let net_lots = (row.buy - row.sell) / 1000.0;
            match row.name.as_str() {
                "Foreign_Investor" | "Foreign_Dealer_Self" => entry.foreign_net += net_lots,
                "Investment_Trust" => entry.trust_net += net_lots,
                "Dealer_self" | "Dealer_Hedging" => entry.dealer_net += net_lots,
                _ => {}
            }
        }

        let mut out: Vec<_> = by_date.into_values().collect();
        let len = out.len();
        if len as i64 > days {
            out.drain(0..(len - days as usize));
        }
        out
    }

    pub async fn monthly_revenue(&self, id: &str) -> Vec<RevenueMonth> {
        let query = self.query("TaiwanStockMonthRevenue", Some(id), None);
        let Ok(url) = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) else {
            return Vec::new();
        };
        let Ok(resp) = self.http.get_json::<FinMindRevenueResponse>(url).await else {
            return Vec::new();
        };
        resp.data
            .into_iter()
            .map(|r| RevenueMonth {
                year_month: (r.revenue_year, r.revenue_month),
                revenue: r.revenue,
                yoy_pct: r.revenue_yoy_ratio.unwrap_or(0.0),
            })
            .collect()
    }

    /// Trailing four quarters of EPS, most recent last.
    pub async fn quarterly_eps(&self, id: &str) -> Vec<EpsQuarter> {
        let query = self.query("TaiwanStockFinancialStatements", Some(id), None);
        let Ok(url) = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) else {
            return Vec::new();
        };
        let Ok(resp) = self.http.get_json::<FinMindStatementsResponse>(url).await else {
            return Vec::new();
        };
        resp.data
            .into_iter()
            .filter(|r| r.type_field == "EPS")
            .map(|r| EpsQuarter { eps: r.value })
            .collect()
    }

    pub async fn shareholding_distribution(&self, id: &str) -> Vec<HolderWeek> {
        let query = self.query("TaiwanStockShareholding", Some(id), None);
        let Ok(url) = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) else {
            return Vec::new();
        };
        let Ok(resp) = self.http.get_json::<FinMindHoldingResponse>(url).await else {
            return Vec::new();
        };
        resp.data
            .into_iter()
            .filter_map(|r| {
                let date = chrono::NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").ok()?;
                Some(HolderWeek { date, major_holder_pct: r.percent })
            })
            .collect()
    }

    /// Two most recent days' net OI for foreign investors' futures
    /// position (Taiwan-index futures, `TX`). Falls back to the HTML
    /// table feed when the primary path returns nothing (see
    /// `market::sentiment`, which owns that fallback).
    pub async fn futures_open_interest(&self) -> Vec<FuturesDayOi> {
        let query = self.query("TaiwanFuturesInstitutionalInvestors", None, None);
        let Ok(url) = Url::parse_with_params("https://api.finmindtrade.com/api/v4/data", &query) else {
            return Vec::new();
        };
        let Ok(resp) = self.http.get_json::<FinMindFuturesResponse>(url).await else {
            return Vec::new();
        };

        let mut by_date: std::collections::BTreeMap<chrono::NaiveDate, (f64, f64)> =
            std::collections::BTreeMap::new();
        for row in resp.data {
            if !row.name.contains("Foreign") || row.futures_id != "TX" {
                continue;
            }
            let Ok(date) = chrono::NaiveDate::parse_from_str(&row.date, "%Y-%m-%d") else {
                continue;
            };
            let entry = by_date.entry(date).or_insert((0.0, 0.0));
            entry.0 += row.long_oi;
            entry.1 += row.short_oi;
        }

        let mut out: Vec<_> = by_date
            .into_iter()
            .map(|(date, (long, short))| FuturesDayOi { date, net_oi: long - short })
            .collect();
        let len = out.len();
        if len > 2 {
            out.drain(0..len - 2);
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct FinMindFlowResponse {
    #[serde(default)]
    data: Vec<FinMindFlowRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindFlowRow {
    date: String,
    name: String,
    buy: f64,
    sell: f64,
}

#[derive(Debug, Deserialize)]
struct FinMindRevenueResponse {
    #[serde(default)]
    data: Vec<FinMindRevenueRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindRevenueRow {
    revenue_year: i32,
    revenue_month: u32,
    revenue: f64,
    #[serde(rename = "revenue_YoY_ratio", default)]
    revenue_yoy_ratio: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FinMindStatementsResponse {
    #[serde(default)]
    data: Vec<FinMindStatementsRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindStatementsRow {
    #[serde(rename = "type")]
    type_field: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct FinMindHoldingResponse {
    #[serde(default)]
    data: Vec<FinMindHoldingRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindHoldingRow {
    date: String,
    percent: f64,
}

#[derive(Debug, Deserialize)]
struct FinMindFuturesResponse {
    #[serde(default)]
    data: Vec<FinMindFuturesRow>,
}

#[derive(Debug, Deserialize)]
struct FinMindFuturesRow {
    date: String,
    name: String,
    #[serde(rename = "futures_id")]
    futures_id: String,
    #[serde(rename = "long_open_interest_volume")]
    long_oi: f64,
    #[serde(rename = "short_open_interest_volume")]
    short_oi: f64,
}
