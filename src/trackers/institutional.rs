//! Long-run institutional-flow tracking: per ticker, persists a rolling
//! history of `AccumulationAnalysis` snapshots (capped at 30 entries) so
//! "quietly buying" trends can be read back across runs.

use crate::model::AccumulationAnalysis;
use crate::pipeline::accumulation;
use crate::providers::DerivedQueries;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

const MAX_HISTORY_ENTRIES: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub foreign_consecutive_buy: u32,
    pub trust_consecutive_buy: u32,
    pub foreign_20d_sum: f64,
    pub trust_20d_sum: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerTrack {
    pub first_tracked: NaiveDate,
    pub tracking_days: u32,
    pub last_update: NaiveDate,
    pub history: Vec<HistoryPoint>,
}

pub type TrackerHistory = BTreeMap<String, TickerTrack>;

fn tracker_dir(out_root: &Path) -> PathBuf {
    out_root.join("institutional_tracker")
}

fn history_file(out_root: &Path) -> PathBuf {
    tracker_dir(out_root).join("history.json")
}

pub fn load_history(out_root: &Path) -> TrackerHistory {
    std::fs::read_to_string(history_file(out_root))
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn save_history(out_root: &Path, history: &TrackerHistory) {
    let path = history_file(out_root);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(&path, serde_json::to_string_pretty(history).unwrap_or_default()) {
        warn!(error = %e, "failed to persist institutional tracker history");
    }
}

/// Scans `ids`, analyzes each against the min-consecutive-day threshold,
/// updates the on-disk rolling history, and returns the per-ticker
/// analyses for the qualifying subset.
pub async fn scan(
    out_root: &Path,
    derived: &DerivedQueries,
    ids: &[String],
    min_consecutive_days: u32,
    today: NaiveDate,
) -> Vec<(String, AccumulationAnalysis)> {
    let mut history = load_history(out_root);
    let mut qualifying = Vec::new();

    for id in ids {
        let analysis = accumulation::analyze(derived, id, 20).await;
        let point = HistoryPoint {
            date: today,
            foreign_consecutive_buy: analysis.foreign_consecutive_buy,
            trust_consecutive_buy: analysis.trust_consecutive_buy,
            foreign_20d_sum: analysis.foreign_20d_sum,
            trust_20d_sum: analysis.trust_20d_sum,
        };

        let entry = history.entry(id.clone()).or_insert_with(|| TickerTrack {
            first_tracked: today,
            tracking_days: 0,
            last_update: today,
            history: Vec::new(),
        });
        entry.tracking_days += 1;
        entry.last_update = today;
        entry.history.push(point);
        if entry.history.len() > MAX_HISTORY_ENTRIES {
            let overflow = entry.history.len() - MAX_HISTORY_ENTRIES;
            entry.history.drain(0..overflow);
        }

        if analysis.foreign_consecutive_buy >= min_consecutive_days
            || analysis.trust_consecutive_buy >= min_consecutive_days
        {
            qualifying.push((id.clone(), analysis));
        }
    }

    save_history(out_root, &history);
    qualifying
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_caps_at_thirty_entries() {
        let mut entry = TickerTrack {
            first_tracked: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            tracking_days: 0,
            last_update: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            history: Vec::new(),
        };
        for i in 0..35 {
            entry.history.push(HistoryPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i),
                foreign_consecutive_buy: 0,
                trust_consecutive_buy: 0,
                foreign_20d_sum: 0.0,
                trust_20d_sum: 0.0,
            });
            if entry.history.len() > MAX_HISTORY_ENTRIES {
                let overflow = entry.history.len() - MAX_HISTORY_ENTRIES;
                entry.history.drain(0..overflow);
            }
        }
        assert_eq!(entry.history.len(), MAX_HISTORY_ENTRIES);
        assert_eq!(entry.history.first().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 6).unwrap());
    }
}
