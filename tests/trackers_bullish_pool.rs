//! Integration coverage for the bullish-pool membership lifecycle across
//! several simulated trading days.

use chrono::NaiveDate;
use std::collections::HashSet;
use tw_screener::trackers::bullish_pool;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn scratch_dir(label: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("tw-screener-pool-{label}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn membership_survives_a_gap_then_reenters_at_one_consecutive_day() {
    let dir = scratch_dir("lifecycle");

    let mut pool = HashSet::new();
    pool.insert(("2330".to_string(), "TSMC".to_string()));
    let day1 = bullish_pool::update(&dir, date("2024-03-01"), &pool);
    assert_eq!(day1.new_entries, vec!["2330".to_string()]);

    let day2 = bullish_pool::update(&dir, date("2024-03-04"), &pool);
    assert_eq!(day2.continued, vec!["2330".to_string()]);
    assert_eq!(day2.snapshot.stocks["2330"].consecutive_days, 2);

    let empty = HashSet::new();
    let day3 = bullish_pool::update(&dir, date("2024-03-05"), &empty);
    assert_eq!(day3.removed, vec!["2330".to_string()]);
    assert!(day3.snapshot.stocks.is_empty());

    let day4 = bullish_pool::update(&dir, date("2024-03-06"), &pool);
    assert_eq!(day4.new_entries, vec!["2330".to_string()]);
    assert_eq!(day4.snapshot.stocks["2330"].consecutive_days, 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn multiple_tickers_track_independently() {
    let dir = scratch_dir("multi");

    let mut pool = HashSet::new();
    pool.insert(("2330".to_string(), "TSMC".to_string()));
    pool.insert(("2317".to_string(), "Hon Hai".to_string()));
    bullish_pool::update(&dir, date("2024-05-01"), &pool);

    pool.remove(&("2317".to_string(), "Hon Hai".to_string()));
    let result = bullish_pool::update(&dir, date("2024-05-02"), &pool);
    assert_eq!(result.continued, vec!["2330".to_string()]);
    assert_eq!(result.removed, vec!["2317".to_string()]);
    assert_eq!(result.snapshot.stocks.len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}
