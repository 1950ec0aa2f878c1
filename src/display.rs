//! Terminal rendering of combined per-venue statistics
//!
//! Product output on stdout; diagnostics stay on tracing. A pure
//! consumer of [`Stats`] values.

use rust_decimal::Decimal;

use crate::orderbook::Stats;

const COLOR_RESET: &str = "\x1b[0m";
const COLOR_YELLOW: &str = "\x1b[33m";
const COLOR_GREEN: &str = "\x1b[32m";
const COLOR_RED: &str = "\x1b[31m";
const COLOR_MAGENTA: &str = "\x1b[35m";
const COLOR_BOLD: &str = "\x1b[1m";

fn delta_color(delta: Decimal) -> &'static str {
    if delta > Decimal::ZERO {
        COLOR_GREEN
    } else if delta < Decimal::ZERO {
        COLOR_RED
    } else {
        COLOR_YELLOW
    }
}

fn fixed(value: Option<Decimal>, places: usize) -> String {
    match value {
        Some(v) => format!("{v:.places$}"),
        None => "-".to_string(),
    }
}

/// Print the combined stats table for all initialized books
pub fn print_combined_stats(entries: &[(String, Stats)]) {
    if entries.is_empty() {
        return;
    }

    println!();
    for (i, (name, stats)) in entries.iter().enumerate() {
        println!("{COLOR_BOLD}{name}{COLOR_RESET}");
        println!(
            "  Mid: {COLOR_YELLOW}{:>10}{COLOR_RESET} \u{2502} Spread: {COLOR_MAGENTA}{:>8}{COLOR_RESET} | BB: {COLOR_GREEN}{:>10}{COLOR_RESET} \u{2502} BA: {COLOR_RED}{:>10}{COLOR_RESET}",
            fixed(stats.mid, 2),
            fixed(stats.spread, 4),
            fixed(stats.best_bid, 2),
            fixed(stats.best_ask, 2),
        );
        print_band(
            "DEPTH 0.5%",
            stats.bid_liquidity_05_pct,
            stats.ask_liquidity_05_pct,
            stats.delta_liquidity_05_pct,
        );
        print_band(
            "DEPTH 2%: ",
            stats.bid_liquidity_2_pct,
            stats.ask_liquidity_2_pct,
            stats.delta_liquidity_2_pct,
        );
        print_band(
            "DEPTH 10% ",
            stats.bid_liquidity_10_pct,
            stats.ask_liquidity_10_pct,
            stats.delta_liquidity_10_pct,
        );
        println!(
            "  TOTAL QTY: Bids: {COLOR_GREEN}{:>9.2}{COLOR_RESET} \u{2502} Asks: {COLOR_RED}{:>9.2}{COLOR_RESET}",
            stats.total_bids_qty, stats.total_asks_qty,
        );

        if i < entries.len() - 1 {
            println!();
        }
    }
}

fn print_band(label: &str, bids: Decimal, asks: Decimal, delta: Decimal) {
    println!(
        "  {label} Bids: {COLOR_GREEN}{bids:>9.2}{COLOR_RESET} \u{2502} Asks: {COLOR_RED}{asks:>9.2}{COLOR_RESET} \u{2502} \u{0394}: {}{delta:>10.2}{COLOR_RESET}",
        delta_color(delta),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_delta_color_by_sign() {
        assert_eq!(delta_color(dec!(1)), COLOR_GREEN);
        assert_eq!(delta_color(dec!(-1)), COLOR_RED);
        assert_eq!(delta_color(Decimal::ZERO), COLOR_YELLOW);
    }

    #[test]
    fn test_fixed_formats_missing_values_as_dash() {
        assert_eq!(fixed(None, 2), "-");
        assert_eq!(fixed(Some(dec!(100.5)), 2), "100.50");
    }
}
