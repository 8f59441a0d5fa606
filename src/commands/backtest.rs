//! Backtest command: run the backtest runner (G) over one config + window,
//! verify the resulting trade log with the analyzer (H), and print a
//! summary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

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
    start: String,
    end: String,
    cache_dir: String,
) -> Result<(), CliError> {
    info!("starting backtest");

    let config = load_config(&config_path)?;
    enforce_live_gate(&config)?;

    let symbols: Vec<Symbol> = symbols
        .unwrap_or_else(|| "BTCUSDT".to_string())
        .split(',')
        .map(|s| Symbol::new(s.trim().to_uppercase()))
        .collect();

    let start: DateTime<Utc> = DateTime::parse_from_rfc3339(&start)
        .map_err(|e| CliError::Config(anyhow::anyhow!("bad --start: {e}")))?
        .with_timezone(&Utc);
    let end: DateTime<Utc> = DateTime::parse_from_rfc3339(&end)
        .map_err(|e| CliError::Config(anyhow::anyhow!("bad --end: {e}")))?
        .with_timezone(&Utc);

    let provider = Arc::new(CachingHistoricalDataProvider::new(cache_dir));
    let runner = BacktestRunner::new(provider, config);
    let request = BacktestRequest {
        symbols,
        interval,
        start,
        end,
    };

    let rt = tokio::runtime::Runtime::new().map_err(|e| CliError::Config(anyhow::anyhow!(e)))?;
    let result = rt.block_on(runner.run(&request)).map_err(CliError::from)?;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Start:              {}", request.start);
    println!("End:                {}", request.end);
    println!("Final balance:      {:.2}", result.final_balance);
    println!("Final equity:       {:.2}", result.final_equity);
    println!("Peak equity:        {:.2}", result.peak_equity);
    println!("Total trades:       {}", result.total_trades);
    println!("Win rate:           {:.2}%", result.win_rate);
    println!("Halted by safety:   {}", result.halted);

    if let Some(path) = &result.trade_log_path {
        println!("Trade log:          {}", path.display());
        let entries = analyzer::load_trade_log(path).map_err(CliError::from)?;
        analyzer::verify_invariants(&entries).map_err(CliError::from)?;
        let metrics = analyzer::compute_metrics(&entries);
        println!("{}", "-".repeat(60));
        println!("Total PnL:          {:.2} ({:.2}%)", metrics.total_pnl, metrics.total_pnl_pct);
        println!("Max drawdown:       {:.2}%", metrics.max_drawdown_pct);
        println!("Avg R multiple:     {:.2}", metrics.avg_r_multiple);
        println!("Largest win:        {:.2}", metrics.largest_win);
        println!("Largest loss:       {:.2}", metrics.largest_loss);
    }
    println!("{}", "=".repeat(60));

    info!("backtest completed");
    Ok(())
}
