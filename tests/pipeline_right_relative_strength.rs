//! Regression coverage: the right chain's `RelativeStrength` stage must
//! compare each row's `change_pct` against a benchmark that is itself a
//! percentage (the proxy index's daily change), not a raw price level.

use tw_screener::config::ScreeningParams;
use tw_screener::core::HttpClient;
use tw_screener::model::{Row, Venue};
use tw_screener::pipeline::right;
use tw_screener::pipeline::{Stage, StageContext};
use tw_screener::providers::{DerivedQueries, HistoryStore, ReferenceData};

fn row(id: &str, change_pct: f64) -> Row {
    let mut r = Row::new(id, format!("Stock {id}"), Venue::Main);
    r.change_pct = change_pct;
    r
}

#[tokio::test]
async fn survivors_exist_when_benchmark_is_a_plausible_percentage() {
    let http = HttpClient::default();
    let history = HistoryStore::new(http.clone(), None);
    let reference = ReferenceData::new(http.clone(), None);
    let derived = DerivedQueries::new(http, None);
    let params = ScreeningParams::default();

    // A proxy ETF closing up 1.47% for the day, not its raw ~170 price.
    let ctx = StageContext {
        history: &history,
        reference: &reference,
        derived: &derived,
        params: &params,
        benchmark_change_pct: Some(1.47),
    };

    let stage = right::chain().into_iter().nth(4).expect("RelativeStrength is the 5th right-chain stage");
    assert_eq!(stage.meta().name, "RelativeStrength");

    let batch = vec![row("2330", 3.0), row("2317", 0.5)];
    let survivors = stage.screen(&batch, &ctx).await;

    let ids: Vec<&str> = survivors.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["2330"], "only the row beating the benchmark should survive");
}
