//! Integration coverage for the right-chain's final ranking step.

use tw_screener::model::{Row, Venue};
use tw_screener::pipeline::right;

fn row(id: &str, change_pct: f64) -> Row {
    let mut r = Row::new(id, format!("Stock {id}"), Venue::Main);
    r.change_pct = change_pct;
    r
}

#[test]
fn rank_orders_descending_by_change_pct() {
    let batch = vec![row("2330", 3.5), row("2317", 8.1), row("1101", 4.9)];
    let ranked = right::rank(batch);
    let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2317", "1101", "2330"]);
}

#[test]
fn rank_is_stable_for_equal_change_pct() {
    let batch = vec![row("a", 5.0), row("b", 5.0), row("c", 5.0)];
    let ranked = right::rank(batch);
    let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn rank_stamps_a_rank_column_starting_at_one() {
    let batch = vec![row("2330", 1.0), row("2317", 2.0)];
    let ranked = right::rank(batch);
    assert_eq!(ranked[0].get_f64("rank"), Some(1.0));
    assert_eq!(ranked[1].get_f64("rank"), Some(2.0));
}
