//! Daily bullish-pool membership tracking: persists today's pool
//! snapshot plus a cumulative `id -> {first_date, consecutive_days,
//! last_date, removed_date?}` history map.

use crate::analysis::moving_average;
use crate::model::Batch;
use crate::providers::HistoryStore;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHistoryEntry {
    pub first_date: NaiveDate,
    pub consecutive_days: u32,
    pub last_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_date: Option<NaiveDate>,
}

pub type PoolHistory = BTreeMap<String, PoolHistoryEntry>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub date: NaiveDate,
    pub stocks: BTreeMap<String, PoolStockEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStockEntry {
    pub name: String,
    pub consecutive_days: u32,
}

pub struct UpdateResult {
    pub new_entries: Vec<String>,
    pub removed: Vec<String>,
    pub continued: Vec<String>,
    pub snapshot: PoolSnapshot,
}

fn pool_dir(out_root: &Path) -> PathBuf {
    out_root.join("bullish_pool")
}

fn pool_file(out_root: &Path, date: NaiveDate) -> PathBuf {
    pool_dir(out_root).join(format!("pool_{}.json", date.format("%Y%m%d")))
}

fn history_file(out_root: &Path) -> PathBuf {
    pool_dir(out_root).join("history.json")
}

fn load_history(out_root: &Path) -> PoolHistory {
    let path = history_file(out_root);
    std::fs::read_to_string(&path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value).unwrap_or_default();
    std::fs::write(path, body)
}

/// Today's bullish pool: tickers with `price` above every one of
/// MA5/10/20/60, the MAs themselves strictly descending-aligned, and
/// MA60 higher than MA60 five days ago.
pub async fn current_pool(batch: &Batch, history: &HistoryStore) -> HashSet<(String, String)> {
    let mut pool = HashSet::new();
    for row in batch {
        let candles = history.history(&row.id, row.venue, 70).await;
        if candles.len() < 65 {
            continue;
        }
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let Some(ma5) = moving_average(&closes, 5) else { continue };
        let Some(ma10) = moving_average(&closes, 10) else { continue };
        let Some(ma20) = moving_average(&closes, 20) else { continue };
        let Some(ma60) = moving_average(&closes, 60) else { continue };
        let aligned = row.price > ma5 && ma5 > ma10 && ma10 > ma20 && ma20 > ma60;
        if !aligned {
            continue;
        }
        let five_days_ago = &closes[..closes.len() - 5];
        let Some(ma60_prior) = moving_average(five_days_ago, 60) else { continue };
        if ma60 > ma60_prior {
            pool.insert((row.id.clone(), row.name.clone()));
        }
    }
    pool
}

pub fn update(out_root: &Path, today: NaiveDate, pool: &HashSet<(String, String)>) -> UpdateResult {
    let mut history = load_history(out_root);
    let today_ids: HashSet<&str> = pool.iter().map(|(id, _)| id.as_str()).collect();
    let yesterday_ids: HashSet<String> = history
        .iter()
        .filter(|(_, e)| e.removed_date.is_none())
        .map(|(id, _)| id.clone())
        .collect();

    let mut new_entries = Vec::new();
    let mut continued = Vec::new();
    for id in &today_ids {
        if yesterday_ids.contains(*id) {
            continued.push((*id).to_string());
            if let Some(entry) = history.get_mut(*id) {
                entry.consecutive_days += 1;
                entry.last_date = today;
                entry.removed_date = None;
            }
        } else {
            new_entries.push((*id).to_string());
            history.insert(
                (*id).to_string(),
                PoolHistoryEntry { first_date: today, consecutive_days: 1, last_date: today, removed_date: None },
            );
        }
    }

    let mut removed = Vec::new();
    for id in &yesterday_ids {
        if !today_ids.contains(id.as_str())
            && let Some(entry) = history.get_mut(id)
        {
            entry.removed_date = Some(today);
            removed.push(id.clone());
        }
    }

    let stocks: BTreeMap<String, PoolStockEntry> = pool
        .iter()
        .map(|(id, name)| {
            let days = history.get(id).map(|e| e.consecutive_days).unwrap_or(1);
            (id.clone(), PoolStockEntry { name: name.clone(), consecutive_days: days })
        })
        .collect();
    let snapshot = PoolSnapshot { date: today, stocks };

    if let Err(e) = save_json(&pool_file(out_root, today), &snapshot) {
        warn!(error = %e, "failed to persist today's pool snapshot");
    }
    if let Err(e) = save_json(&history_file(out_root), &history) {
        warn!(error = %e, "failed to persist pool history");
    }
    info!(new = new_entries.len(), removed = removed.len(), continued = continued.len(), "bullish pool updated");

    UpdateResult { new_entries, removed, continued, snapshot }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn new_membership_starts_at_one_consecutive_day() {
        let dir = std::env::temp_dir().join(format!("pool-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut pool = HashSet::new();
        pool.insert(("1101".to_string(), "Taiwan Cement".to_string()));
        let result = update(&dir, date("2024-01-01"), &pool);
        assert_eq!(result.new_entries, vec!["1101".to_string()]);
        assert_eq!(result.snapshot.stocks["1101"].consecutive_days, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn continued_membership_increments_and_removed_is_stamped() {
        let dir = std::env::temp_dir().join(format!("pool-test2-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let mut pool = HashSet::new();
        pool.insert(("1101".to_string(), "Taiwan Cement".to_string()));
        update(&dir, date("2024-01-01"), &pool);
        let result = update(&dir, date("2024-01-02"), &pool);
        assert_eq!(result.continued, vec!["1101".to_string()]);
        assert_eq!(result.snapshot.stocks["1101"].consecutive_days, 2);

        let empty = HashSet::new();
        let result = update(&dir, date("2024-01-03"), &empty);
        assert_eq!(result.removed, vec!["1101".to_string()]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
