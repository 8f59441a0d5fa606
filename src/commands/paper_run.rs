//! Paper-run command: repeatedly drives the same A-F pipeline the backtest
//! runner uses, but over a rolling recent window instead of one fixed
//! historical range — the forward-looking paper/dry-run loop (spec §5's
//! "suspension points only at data fetch / file IO / cycle boundaries").
//! Mode (monitor/paper/dry_run/live) comes entirely from config; this
//! command never forces one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use tradecore::analyzer;
use tradecore::backtest::{BacktestRequest, BacktestRunner};
use tradecore::data::CachingHistoricalDataProvider;
use tradecore::types::Symbol;

use super::{enforce_live_gate, load_config, CliError};

#[allow(clippy::too_many_arguments)]
pub fn run(
    config_path: String,
    symbols: Option<String>,
    interval: String,
    lookback_hours: i64,
    cycle_seconds: u64,
    cycles: u64,
    cache_dir: String,
) -> Result<(), CliError> {
    info!("starting paper-run loop");

    let config = load_config(&config_path)?;
    enforce_live_gate(&config)?;

    let symbols: Vec<Symbol> = symbols
        .unwrap_or_else(|| "BTCUSDT".to_string())
        .split(',')
        .map(|s| Symbol::new(s.trim().to_uppercase()))
        .collect();

    let provider = Arc::new(CachingHistoricalDataProvider::new(cache_dir));
    let runner = BacktestRunner::new(provider, config);

    let rt = tokio::runtime::Runtime::new().map_err(|e| CliError::Config(anyhow::anyhow!(e)))?;

    let mut cycle_count = 0u64;
    loop {
        cycle_count += 1;
        let end = Utc::now();
        let start = end - chrono::Duration::hours(lookback_hours);
        let request = BacktestRequest {
            symbols: symbols.clone(),
            interval: interval.clone(),
            start,
            end,
        };

        let result = rt.block_on(runner.run(&request)).map_err(CliError::from)?;
        println!(
            "cycle {cycle_count}: balance={:.2} equity={:.2} trades={} halted={}",
            result.final_balance, result.final_equity, result.total_trades, result.halted
        );

        if let Some(path) = &result.trade_log_path {
            let entries = analyzer::load_trade_log(path).map_err(CliError::from)?;
            analyzer::verify_invariants(&entries).map_err(CliError::from)?;
        }

        if result.halted {
            warn!("safety monitor halted trading, stopping paper-run loop");
            break;
        }
        if cycles != 0 && cycle_count >= cycles {
            break;
        }
        rt.block_on(tokio::time::sleep(Duration::from_secs(cycle_seconds)));
    }

    info!("paper-run loop completed after {cycle_count} cycle(s)");
    Ok(())
}
