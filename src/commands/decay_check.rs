//! Decay-check command: read-only decay scoring for one or more symbols
//! (spec §4.K decay detector half). Never touches a strategy profile.

use tradecore::evolution::{detect_decay, DecayStatus, DecayThresholds};

use super::CliError;

pub fn run(symbols: String, min_trades: u64, winrate_threshold_pct: f64, dd_threshold_pct: f64, lookback_days: i64) -> Result<(), CliError> {
    let thresholds = DecayThresholds {
        min_trades,
        winrate_threshold_pct,
        dd_threshold_pct,
        lookback_days,
    };

    println!("{:<12} {:<10} {:>10} {:>10} {:>10} {:>10}", "SYMBOL", "STATUS", "WINRATE%", "BEST%", "DD%", "BESTDD%");

    let mut any_degraded = false;
    for symbol in symbols.split(',').map(|s| s.trim()) {
        let report = detect_decay(std::path::Path::new("."), symbol, thresholds)?;
        if report.status == DecayStatus::Degraded {
            any_degraded = true;
        }
        println!(
            "{:<12} {:<10?} {:>10.2} {:>10} {:>10.2} {:>10}",
            report.symbol,
            report.status,
            report.current_winrate_pct,
            report.best_winrate_pct.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into()),
            report.current_dd_pct,
            report.best_dd_pct.map(|v| format!("{v:.2}")).unwrap_or_else(|| "-".into()),
        );
    }

    if any_degraded {
        println!("\nat least one symbol is degraded; consider running `evolve`");
    }
    Ok(())
}
