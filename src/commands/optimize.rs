//! Optimize command: cartesian-grid parameter search (component I) over a
//! config's `grid` section, ranked CSV output, optional history append.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use tradecore::config::Config;
use tradecore::data::CachingHistoricalDataProvider;
use tradecore::history::{self, PerformanceHistoryEntry, ProfileMetrics, ProfileRunEntry, WindowSpec};
use tradecore::optimizer::{self, OptimizeRequest, Optimizer};
use tradecore::backtest::BacktestRequest;
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
    top: usize,
    sequential: bool,
    max_runs: Option<usize>,
    output: String,
    append_history: bool,
) -> Result<(), CliError> {
    info!("starting optimizer");

    let config = load_config(&config_path)?;
    enforce_live_gate(&config)?;

    let grid = config.grid.clone().ok_or_else(|| {
        CliError::Config(anyhow::anyhow!("config has no 'grid' section to optimize over"))
    })?;

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
    let tmp_dir = std::env::temp_dir().join("tradecore_optimizer_scoped_configs");
    let strategy_name = config.strategy_name.clone();
    let optimizer_engine = Optimizer::new(provider, config, &tmp_dir);

    let request = OptimizeRequest {
        backtest: BacktestRequest {
            symbols: symbols.clone(),
            interval: interval.clone(),
            start,
            end,
        },
        param_grid: grid,
        max_runs,
    };

    info!("running {} grid combinations (sequential={sequential})", request.param_grid.len());

    let mut results = if sequential {
        optimizer_engine.optimize_sequential(&request)
    } else {
        optimizer_engine.optimize(&request)
    };

    optimizer::sort_results(&mut results);
    optimizer::write_ranked_csv(std::path::Path::new(&output), &results).map_err(CliError::from)?;

    println!("\n{}", "=".repeat(100));
    println!("TOP {} OPTIMIZATION RESULTS", top.min(results.len()));
    println!("{}", "=".repeat(100));
    println!(
        "{:<4} {:>10} {:>10} {:>8} {:>7} | params",
        "Rank", "Return%", "MaxDD%", "WinR%", "Trades"
    );
    println!("{}", "-".repeat(100));
    for (i, r) in results.iter().take(top).enumerate() {
        println!(
            "{:<4} {:>10.2} {:>10.2} {:>8.2} {:>7} | {}",
            i + 1,
            r.total_return_pct,
            r.max_drawdown_pct,
            r.win_rate_pct,
            r.total_trades,
            r.params
        );
    }
    println!("{}", "=".repeat(100));
    println!("Ranked results written to {output}");

    if append_history {
        let failed = results.iter().filter(|r| r.reason.is_some()).count();
        if failed > 0 {
            info!("{failed} run(s) failed and are excluded from the history entry");
        }
        let profiles: Vec<ProfileRunEntry> = results
            .iter()
            .filter(|r| r.reason.is_none())
            .enumerate()
            .flat_map(|(i, r)| {
                symbols.iter().map(move |s| ProfileRunEntry {
                    symbol: s.as_str().to_string(),
                    params: r.params.clone(),
                    metrics: ProfileMetrics {
                        trades: r.total_trades,
                        win_rate_pct: r.win_rate_pct,
                        total_return_pct: r.total_return_pct,
                        max_drawdown_pct: r.max_drawdown_pct,
                        avg_r_multiple: 0.0,
                        sample_period_days: (end - start).num_days() as f64,
                    },
                    ranked_position: i + 1,
                    selected_for_live: i == 0,
                })
            })
            .collect();

        let entry = PerformanceHistoryEntry {
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            strategy: strategy_name,
            symbols: symbols.iter().map(|s| s.as_str().to_string()).collect(),
            window: WindowSpec { start, end, interval },
            risk_config_snapshot: serde_json::json!({}),
            trailing_stop: None,
            profiles,
        };
        history::append_history_entry(std::path::Path::new("."), &entry).map_err(CliError::from)?;
        println!("Appended run to {}", history::HISTORY_PATH);
    }

    info!("optimizer completed");
    Ok(())
}
