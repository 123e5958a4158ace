//! Terminal summary: per-stage funnel, final ranked table, market
//! status, and foreign sentiment.

use crate::model::{Batch, ForeignSentiment, MarketStatus, StageStat};

pub fn print_stage_funnel(stats: &[StageStat]) {
    println!("\n== Stage funnel ==");
    for stat in stats {
        println!(
            "  {:>2}. {:<20} {:>6} -> {:<6} ({:.0}% pass)",
            stat.step_number,
            stat.name,
            stat.input_count,
            stat.output_count,
            stat.pass_rate() * 100.0
        );
    }
}

pub fn print_final_table(batch: &Batch) {
    println!("\n== Candidates ==");
    println!("{:<6} {:<16} {:<6} {:>10} {:>8}", "ID", "NAME", "VENUE", "PRICE", "CHG%");
    for row in batch {
        println!(
            "{:<6} {:<16} {:<6} {:>10.2} {:>8.2}",
            row.id, row.name, row.venue.as_str(), row.price, row.change_pct
        );
    }
    println!("{} candidates", batch.len());
}

pub fn print_market_status(status: &Option<MarketStatus>) {
    let Some(status) = status else {
        println!("\n== Market status ==\n  unavailable (proxy instrument history missing)");
        return;
    };
    println!("\n== Market status ({}) ==", status.venue.as_str());
    println!(
        "  current: {:.2} ({:+.2}%)  bullish-aligned: {}",
        status.current_price,
        status.change_pct(),
        status.is_bullish
    );
    for (period, ma) in &status.ma_values {
        let above = status.above_ma.get(period).copied().unwrap_or(false);
        println!("  MA{period}: {ma:.2} ({})", if above { "above" } else { "below" });
    }
    if !status.broken_ma.is_empty() {
        println!("  broken: {:?}", status.broken_ma);
    }
}

pub fn print_sentiment(sentiment: &ForeignSentiment) {
    println!("\n== Foreign sentiment ==");
    println!("  {} ({})", sentiment.label.as_str(), sentiment.date);
    println!("  {}", sentiment.detail);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StageStat;

    #[test]
    fn pass_rate_renders_without_panicking_on_zero_input() {
        let stat = StageStat { step_number: 1, name: "MarketCap".into(), input_count: 0, output_count: 0 };
        print_stage_funnel(std::slice::from_ref(&stat));
    }
}
