//! Core data model: the types that flow through the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The two venues of the Taiwan equity market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Main,
    Otc,
}

impl Venue {
    pub fn as_str(self) -> &'static str {
        match self {
            Venue::Main => "MAIN",
            Venue::Otc => "OTC",
        }
    }
}

/// A loose scalar for dynamically-added stage columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Column {
    Num(f64),
    Bool(bool),
    Text(String),
    Null,
}

impl Column {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Column::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Column::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Column::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// A single candidate ticker's quote for the run, plus whatever columns
/// stages have attached so far. `id`/`name`/`venue`/`industry` and the raw
/// quote fields are the fixed core every stage may read; `columns` is the
/// open map stages add to. Stages must never remove a key already present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub name: String,
    pub venue: Venue,
    pub industry: String,

    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    /// Volume in lots (1,000 shares).
    pub volume: f64,
    pub change_pct: f64,

    #[serde(default)]
    pub columns: BTreeMap<String, Column>,
}

impl Row {
    pub fn new(id: impl Into<String>, name: impl Into<String>, venue: Venue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            venue,
            industry: "UNCLASSIFIED".to_string(),
            price: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            prev_close: 0.0,
            volume: 0.0,
            change_pct: 0.0,
            columns: BTreeMap::new(),
        }
    }

    /// `id` is exactly four decimal digits.
    pub fn has_well_formed_id(&self) -> bool {
        self.id.len() == 4 && self.id.chars().all(|c| c.is_ascii_digit())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Column) {
        self.columns.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Column> {
        self.columns.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.columns.get(key).and_then(Column::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.columns.get(key).and_then(Column::as_bool)
    }

    /// Recompute `change_pct` locally rather than trust the wire value.
    pub fn recompute_change_pct(&mut self) {
        if self.prev_close > 0.0 {
            self.change_pct = (self.price - self.prev_close) / self.prev_close * 100.0;
        }
    }
}

/// One OHLCV bar. `volume` here is in shares (unlike `Row::volume`, which
/// is in lots) — history providers return shares.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub date: chrono::NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An ordered collection of rows flowing through the pipeline.
pub type Batch = Vec<Row>;

/// Per-stage input/output counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageStat {
    pub step_number: u32,
    pub name: String,
    pub input_count: usize,
    pub output_count: usize,
}

impl StageStat {
    pub fn pass_rate(&self) -> f64 {
        if self.input_count == 0 {
            0.0
        } else {
            self.output_count as f64 / self.input_count as f64
        }
    }
}

/// The batch exactly as handed to the next stage, captured for export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSnapshot {
    pub step_number: u32,
    pub name: String,
    pub batch: Batch,
}

/// Index MA alignment summary for one venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketStatus {
    pub venue: Venue,
    pub current_price: f64,
    pub prev_close: f64,
    pub ma_values: BTreeMap<u32, f64>,
    pub above_ma: BTreeMap<u32, bool>,
    pub is_bullish: bool,
    pub broken_ma: Vec<u32>,
}

impl MarketStatus {
    /// Daily change percent of the proxy instrument, used as the
    /// benchmark for the momentum chain's relative-strength stage.
    pub fn change_pct(&self) -> f64 {
        if self.prev_close > 0.0 {
            (self.current_price - self.prev_close) / self.prev_close * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentLabel {
    Bullish,
    Hedge,
    Bearish,
    Bottom,
    Unknown,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Bullish => "BULLISH",
            SentimentLabel::Hedge => "HEDGE",
            SentimentLabel::Bearish => "BEARISH",
            SentimentLabel::Bottom => "BOTTOM",
            SentimentLabel::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignSentiment {
    pub label: SentimentLabel,
    pub spot_net_billion: Option<f64>,
    pub spot_direction: Option<Direction>,
    pub futures_oi_change: Option<f64>,
    pub futures_direction: Option<Direction>,
    pub date: chrono::NaiveDate,
    pub detail: String,
}

/// Per-ticker quiet-accumulation diagnostics over a 20-day window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccumulationAnalysis {
    pub foreign_consecutive_buy: u32,
    pub trust_consecutive_buy: u32,
    pub foreign_5d_sum: f64,
    pub foreign_10d_sum: f64,
    pub foreign_20d_sum: f64,
    pub trust_5d_sum: f64,
    pub trust_10d_sum: f64,
    pub trust_20d_sum: f64,
    pub foreign_stability: f64,
    pub trust_stability: f64,
    pub is_quietly_buying: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_status_change_pct_is_a_percentage_not_a_price() {
        let status = MarketStatus {
            venue: Venue::Main,
            current_price: 172.5,
            prev_close: 170.0,
            ma_values: BTreeMap::new(),
            above_ma: BTreeMap::new(),
            is_bullish: true,
            broken_ma: Vec::new(),
        };
        let pct = status.change_pct();
        assert!((pct - 1.470588).abs() < 1e-4, "expected ~1.47%, got {pct}");
    }

    #[test]
    fn market_status_change_pct_is_zero_when_prev_close_unknown() {
        let status = MarketStatus {
            venue: Venue::Main,
            current_price: 172.5,
            prev_close: 0.0,
            ma_values: BTreeMap::new(),
            above_ma: BTreeMap::new(),
            is_bullish: false,
            broken_ma: Vec::new(),
        };
        assert_eq!(status.change_pct(), 0.0);
    }
}
