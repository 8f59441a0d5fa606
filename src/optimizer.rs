//! Parameter Search / Optimizer (component I). Cartesian-products a
//! strategy param grid, runs the backtest runner (G) once per combination
//! against its own temporary, never-persisted config override, and scores
//! each run by `(total_return_pct, -max_drawdown_pct)`. Grounded on the
//! teacher's `Optimizer` (rayon `par_iter`, metric-name-string sort) with
//! the per-run execution swapped for the new `BacktestRunner`/`Analyzer`
//! pipeline; a failed run is isolated with a `-inf` score rather than
//! aborting the sweep.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::analyzer::{self, PerformanceMetrics};
use crate::backtest::{BacktestRequest, BacktestRunner};
use crate::config::Config;
use crate::data::HistoricalDataProvider;
use crate::types::TradeError;

#[derive(Debug, Clone)]
pub struct OptimizeRequest {
    pub backtest: BacktestRequest,
    /// Strategy param name -> candidate values.
    pub param_grid: std::collections::HashMap<String, Vec<Value>>,
    pub max_runs: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationOutcome {
    pub params: Value,
    pub total_trades: u64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl OptimizationOutcome {
    fn failed(params: Value, reason: String) -> Self {
        Self {
            params,
            total_trades: 0,
            total_return_pct: f64::NEG_INFINITY,
            max_drawdown_pct: f64::INFINITY,
            win_rate_pct: 0.0,
            reason: Some(reason),
        }
    }

    fn sort_key(&self) -> (f64, f64) {
        (self.total_return_pct, -self.max_drawdown_pct)
    }
}

/// Build every combination in the cartesian product of `grid`, as
/// `{name: value}` JSON objects, truncated to `max_runs` if given.
fn build_combinations(grid: &std::collections::HashMap<String, Vec<Value>>, max_runs: Option<usize>) -> Vec<Value> {
    if grid.is_empty() {
        return vec![serde_json::json!({})];
    }
    let names: Vec<&String> = grid.keys().collect();
    let value_lists: Vec<&Vec<Value>> = names.iter().map(|n| &grid[*n]).collect();

    let mut combos: Vec<Value> = value_lists
        .into_iter()
        .multi_cartesian_product()
        .map(|combo| {
            let mut obj = serde_json::Map::new();
            for (name, value) in names.iter().zip(combo.into_iter()) {
                obj.insert((*name).clone(), value.clone());
            }
            Value::Object(obj)
        })
        .collect();

    if let Some(max) = max_runs {
        combos.truncate(max);
    }
    combos
}

/// Removes its temp config file on drop, regardless of which path the
/// caller returned through — the scoped-acquisition guarantee spec §4.I /
/// §5 requires ("delete the temporary config file afterwards unconditionally").
struct TempConfigGuard(PathBuf);

impl Drop for TempConfigGuard {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_file(&self.0) {
                warn!(path = %self.0.display(), error = %e, "failed to delete scoped temp config");
            }
        }
    }
}

pub struct Optimizer<P: HistoricalDataProvider> {
    provider: Arc<P>,
    base_config: Config,
    tmp_dir: PathBuf,
}

impl<P: HistoricalDataProvider + 'static> Optimizer<P> {
    pub fn new(provider: Arc<P>, base_config: Config, tmp_dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            base_config,
            tmp_dir: tmp_dir.into(),
        }
    }

    /// Run the whole grid. Each combination runs in its own rayon task with
    /// its own `BacktestRunner`/temp config/trade log — no shared mutable
    /// state crosses runs except the read-only historical data provider.
    pub fn optimize(&self, request: &OptimizeRequest) -> Vec<OptimizationOutcome> {
        let combos = build_combinations(&request.param_grid, request.max_runs);
        let pb = progress_bar(combos.len());
        let results = combos.par_iter().map(|combo| self.run_one(request, combo, &pb)).collect();
        pb.finish_and_clear();
        results
    }

    /// Sequential variant (teacher's `optimize_sequential`), used when the
    /// caller disables parallelism (e.g. to keep a progress bar orderly).
    pub fn optimize_sequential(&self, request: &OptimizeRequest) -> Vec<OptimizationOutcome> {
        let combos = build_combinations(&request.param_grid, request.max_runs);
        let pb = progress_bar(combos.len());
        let results = combos.iter().map(|combo| self.run_one(request, combo, &pb)).collect();
        pb.finish_and_clear();
        results
    }

    fn run_one(&self, request: &OptimizeRequest, combo: &Value, pb: &ProgressBar) -> OptimizationOutcome {
        let outcome = match self.run_one_inner(request, combo) {
            Ok(outcome) => outcome,
            Err(e) => OptimizationOutcome::failed(combo.clone(), e.to_string()),
        };
        pb.inc(1);
        outcome
    }

    fn run_one_inner(&self, request: &OptimizeRequest, combo: &Value) -> Result<OptimizationOutcome, TradeError> {
        let temp_path = self
            .base_config
            .write_scoped_override(combo, &self.tmp_dir)
            .map_err(|e| TradeError::IoFailure { why: e.to_string() })?;
        let _guard = TempConfigGuard(temp_path.clone());

        let scoped_config = Config::from_file(&temp_path).map_err(|e| TradeError::IoFailure { why: e.to_string() })?;
        let runner = BacktestRunner::new(Arc::clone(&self.provider), scoped_config);

        let rt = tokio::runtime::Runtime::new().map_err(|e| TradeError::IoFailure {
            why: format!("spawn optimizer worker runtime: {e}"),
        })?;
        let result = rt.block_on(runner.run(&request.backtest))?;

        let log_path = result.trade_log_path.ok_or_else(|| TradeError::DataQuality {
            why: "backtest run produced no trade log".to_string(),
        })?;
        let entries = analyzer::load_trade_log(&log_path)?;
        analyzer::verify_invariants(&entries)?;
        let metrics: PerformanceMetrics = analyzer::compute_metrics(&entries);

        Ok(OptimizationOutcome {
            params: combo.clone(),
            total_trades: metrics.total_trades as u64,
            total_return_pct: metrics.total_pnl_pct,
            max_drawdown_pct: metrics.max_drawdown_pct,
            win_rate_pct: metrics.win_rate_pct,
            reason: None,
        })
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}/s]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█░ "),
    );
    pb
}

/// Rank descending by `(total_return_pct, -max_drawdown_pct)` (spec §4.I).
pub fn sort_results(results: &mut [OptimizationOutcome]) {
    results.sort_by(|a, b| b.sort_key().partial_cmp(&a.sort_key()).unwrap_or(std::cmp::Ordering::Equal));
}

/// Emit the ranked CSV spec §4.I calls for.
pub fn write_ranked_csv(path: &Path, results: &[OptimizationOutcome]) -> Result<(), TradeError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| TradeError::IoFailure {
            why: format!("create optimizer output dir {parent:?}: {e}"),
        })?;
    }
    let mut writer = csv::Writer::from_path(path).map_err(|e| TradeError::IoFailure {
        why: format!("open optimizer output {path:?}: {e}"),
    })?;
    writer
        .write_record(["rank", "params", "total_trades", "total_return_pct", "max_drawdown_pct", "win_rate_pct", "reason"])
        .map_err(|e| TradeError::IoFailure { why: format!("write optimizer csv header: {e}") })?;
    for (i, r) in results.iter().enumerate() {
        writer
            .write_record([
                (i + 1).to_string(),
                r.params.to_string(),
                r.total_trades.to_string(),
                format!("{:.4}", r.total_return_pct),
                format!("{:.4}", r.max_drawdown_pct),
                format!("{:.4}", r.win_rate_pct),
                r.reason.clone().unwrap_or_default(),
            ])
            .map_err(|e| TradeError::IoFailure { why: format!("write optimizer csv row: {e}") })?;
    }
    writer.flush().map_err(|e| TradeError::IoFailure { why: format!("flush optimizer csv: {e}") })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionModeSetting;
    use crate::data::synthetic_fallback;
    use crate::types::{Candle, Symbol};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tempfile::tempdir;

    struct FixedProvider;

    #[async_trait]
    impl HistoricalDataProvider for FixedProvider {
        async fn fetch(&self, symbol: &Symbol, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Candle>, TradeError> {
            Ok(synthetic_fallback(symbol, interval, start, end))
        }
    }

    fn sample_request() -> OptimizeRequest {
        let start = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z").unwrap().with_timezone(&Utc);
        let mut grid = std::collections::HashMap::new();
        grid.insert("ema_fast".to_string(), vec![serde_json::json!(5), serde_json::json!(9)]);
        grid.insert("ema_slow".to_string(), vec![serde_json::json!(21)]);

        OptimizeRequest {
            backtest: BacktestRequest {
                symbols: vec![Symbol::new("BTCUSDT")],
                interval: "1h".to_string(),
                start,
                end: start + Duration::hours(150),
            },
            param_grid: grid,
            max_runs: None,
        }
    }

    #[test]
    fn build_combinations_covers_the_full_grid() {
        let mut grid = std::collections::HashMap::new();
        grid.insert("a".to_string(), vec![serde_json::json!(1), serde_json::json!(2)]);
        grid.insert("b".to_string(), vec![serde_json::json!("x"), serde_json::json!("y")]);
        let combos = build_combinations(&grid, None);
        assert_eq!(combos.len(), 4);
    }

    #[test]
    fn build_combinations_respects_max_runs() {
        let mut grid = std::collections::HashMap::new();
        grid.insert("a".to_string(), vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(3)]);
        let combos = build_combinations(&grid, Some(2));
        assert_eq!(combos.len(), 2);
    }

    #[test]
    fn optimize_runs_every_combination_and_cleans_up_temp_configs() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.trading.mode = ExecutionModeSetting::Paper;
        config.log_dir = Some(dir.path().join("trade_logs").to_string_lossy().to_string());

        let tmp_dir = dir.path().join("scoped_configs");
        let optimizer = Optimizer::new(Arc::new(FixedProvider), config, &tmp_dir);
        let request = sample_request();

        let results = optimizer.optimize_sequential(&request);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.reason.is_none()));

        let remaining: Vec<_> = std::fs::read_dir(&tmp_dir).map(|it| it.collect::<Vec<_>>()).unwrap_or_default();
        assert!(remaining.is_empty(), "scoped temp configs must be deleted unconditionally");
    }

    #[test]
    fn sort_results_ranks_by_return_then_drawdown() {
        let mut results = vec![
            OptimizationOutcome { params: serde_json::json!({}), total_trades: 5, total_return_pct: 10.0, max_drawdown_pct: 8.0, win_rate_pct: 50.0, reason: None },
            OptimizationOutcome { params: serde_json::json!({}), total_trades: 5, total_return_pct: 10.0, max_drawdown_pct: 2.0, win_rate_pct: 50.0, reason: None },
            OptimizationOutcome { params: serde_json::json!({}), total_trades: 5, total_return_pct: 20.0, max_drawdown_pct: 15.0, win_rate_pct: 50.0, reason: None },
        ];
        sort_results(&mut results);
        assert!((results[0].total_return_pct - 20.0).abs() < 1e-9);
        assert!((results[1].max_drawdown_pct - 2.0).abs() < 1e-9);
    }
}
