//! Backtest Runner (component G). Merges multi-symbol historical candles
//! into one chronological event stream, drives the strategy -> risk ->
//! execution -> accounting pipeline per event, and flattens every open
//! position at end-of-stream using the last observed close.
//!
//! Given the same cached candles and the same config, two runs produce
//! byte-identical trade logs: the pipeline itself performs no I/O besides
//! the trade log and touches no wall-clock-derived state.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{Config, ExecutionModeSetting};
use crate::data::{HistoricalDataProvider, DEFAULT_FETCH_TIMEOUT};
use crate::oms::accounting::{AccountingConfig, PaperAccount, TrailingStopConfig};
use crate::oms::execution::{ExecutionEngine, Mode};
use crate::oms::risk::{RiskConfig, RiskEngine, RiskOutcome};
use crate::oms::safety::{SafetyConfig, SafetyMonitor};
use crate::oms::types::{OrderKind, OrderRequest};
use crate::strategies::{create_strategy, Strategy};
use crate::types::{Candle, Signal, Symbol, TradeError};

/// One backtest request: the symbol set and the historical window to drive
/// the pipeline over.
#[derive(Debug, Clone)]
pub struct BacktestRequest {
    pub symbols: Vec<Symbol>,
    pub interval: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub trade_log_path: Option<PathBuf>,
    pub total_trades: u64,
    pub win_rate: f64,
    pub final_balance: f64,
    pub final_equity: f64,
    pub peak_equity: f64,
    pub halted: bool,
}

fn mode_from_setting(setting: ExecutionModeSetting) -> Mode {
    match setting {
        ExecutionModeSetting::Monitor => Mode::Monitor,
        ExecutionModeSetting::Paper => Mode::Paper,
        ExecutionModeSetting::DryRun => Mode::DryRun,
        ExecutionModeSetting::Live => Mode::Live,
    }
}

/// Deterministic tag derived from everything about `config` that can change
/// the resulting trade log, so distinct optimizer runs over the same symbols
/// and window never collide on one file (spec §5 per-run isolation).
fn config_tag(config: &Config) -> String {
    let mut hasher = DefaultHasher::new();
    config.strategy_name.hash(&mut hasher);
    serde_json::to_string(&config.strategy).unwrap_or_default().hash(&mut hasher);
    config.commission_rate.to_bits().hash(&mut hasher);
    config.risk.default_slippage.to_bits().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn log_path_for(config: &Config, request: &BacktestRequest) -> PathBuf {
    let dir = config.log_dir.clone().unwrap_or_else(|| "logs/trade_logs".to_string());
    let symbols_tag = request
        .symbols
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join("-");
    PathBuf::from(dir).join(format!(
        "backtest_{}_{}_{}_{}_{}.csv",
        symbols_tag,
        request.interval,
        request.start.timestamp(),
        request.end.timestamp(),
        config_tag(config)
    ))
}

/// Drives A-F over a merged candle stream for one request and produces a
/// `BacktestResult`. Single-threaded cooperative: all mutation happens on
/// this one call stack, which is what makes determinism trivial to prove.
pub struct BacktestRunner<P: HistoricalDataProvider> {
    provider: P,
    config: Config,
}

impl<P: HistoricalDataProvider> BacktestRunner<P> {
    pub fn new(provider: P, config: Config) -> Self {
        Self { provider, config }
    }

    fn accounting_config(&self, log_path: Option<PathBuf>) -> AccountingConfig {
        AccountingConfig {
            starting_balance: self.config.risk.base_account_size,
            slippage_rate: self.config.risk.default_slippage,
            commission_rate: self.config.commission_rate,
            allow_shorting: self.config.allow_shorting,
            trailing_stop: TrailingStopConfig {
                enabled: self.config.risk.enable_trailing_stop,
                pct: self.config.risk.trailing_stop_pct,
            },
            log_path,
        }
    }

    fn safety_config(&self) -> SafetyConfig {
        SafetyConfig {
            max_daily_loss_pct: self.config.trading.max_daily_loss_pct,
            max_risk_per_trade_pct: self.config.trading.max_risk_per_trade_pct,
            max_exposure_pct: self.config.trading.max_exposure_pct,
            max_open_trades: self.config.trading.max_open_trades,
            kill_switch_env_var: self.config.trading.kill_switch_env_var.clone(),
        }
    }

    fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            risk_per_trade_pct: self.config.risk.default_risk_per_trade,
            max_exposure_pct: self.config.risk.max_exposure,
            min_position_usd: self.config.risk.min_position_size_usd,
            default_slippage: self.config.risk.default_slippage,
            default_atr_stop_multiple: 2.0,
        }
    }

    /// Fetch, validate (warn-only), and return per-symbol candle series for
    /// the requested window. An empty series after fetch is dropped with a
    /// warning rather than aborting the whole request.
    async fn acquire(&self, request: &BacktestRequest) -> HashMap<Symbol, Vec<Candle>> {
        let mut per_symbol = HashMap::new();
        for symbol in &request.symbols {
            let fetch = self.provider.fetch(symbol, &request.interval, request.start, request.end);
            match tokio::time::timeout(DEFAULT_FETCH_TIMEOUT, fetch).await {
                Ok(Ok(candles)) if candles.is_empty() => {
                    warn!(symbol = %symbol, "empty candle series, dropping from backtest");
                }
                Ok(Ok(candles)) => {
                    per_symbol.insert(symbol.clone(), candles);
                }
                Ok(Err(e)) => {
                    warn!(symbol = %symbol, error = %e, "failed to acquire historical candles");
                }
                Err(_) => {
                    warn!(symbol = %symbol, timeout = ?DEFAULT_FETCH_TIMEOUT, "candle fetch timed out, dropping from backtest");
                }
            }
        }
        per_symbol
    }

    pub async fn run(&self, request: &BacktestRequest) -> Result<BacktestResult, TradeError> {
        let per_symbol = self.acquire(request).await;
        if per_symbol.is_empty() {
            return Err(TradeError::DataQuality {
                why: "no candle data available for any requested symbol".into(),
            });
        }

        let mut events: Vec<(DateTime<Utc>, Symbol, usize)> = Vec::new();
        for (symbol, candles) in &per_symbol {
            for (i, c) in candles.iter().enumerate() {
                events.push((c.timestamp, symbol.clone(), i));
            }
        }
        events.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let log_path = log_path_for(&self.config, request);
        let account = PaperAccount::new(self.accounting_config(Some(log_path.clone())), request.start)?;
        let starting_equity = self.config.risk.base_account_size;
        let safety = SafetyMonitor::new(self.safety_config(), starting_equity);
        let mode = mode_from_setting(self.config.trading.mode);
        let mut engine = ExecutionEngine::new(mode, account, safety);

        let risk_engine = RiskEngine::new(self.risk_config());
        let strategy = create_strategy(&self.config.strategy_name)?;

        let mut history: HashMap<Symbol, Vec<Candle>> = HashMap::new();
        let mut last_close: HashMap<Symbol, f64> = HashMap::new();

        for (_, symbol, idx) in &events {
            let candle = per_symbol[symbol][*idx];
            last_close.insert(symbol.clone(), candle.close);

            let mut price_map = HashMap::new();
            price_map.insert(symbol.clone(), candle.close);

            // a. mark prices, then close anything that touched its stop/target.
            engine.venue_mut().update_prices(&price_map);
            let exits = engine.venue().check_exits(&price_map);
            for exit_symbol in exits {
                let Some(position) = engine.venue().position(&exit_symbol).cloned() else {
                    continue;
                };
                let close_side = position.side.opposite();
                let order = OrderRequest::new(
                    exit_symbol.clone(),
                    close_side,
                    OrderKind::Market,
                    position.quantity,
                    None,
                    None,
                    None,
                    Some(format!("{}:exit", strategy.name())),
                )?;
                self.dispatch(&mut engine, &order, candle.close, 0.0, candle.timestamp);
            }

            // b. feed the strategy this symbol's rolling history.
            let hist = history.entry(symbol.clone()).or_default();
            hist.push(candle);
            let output = strategy.evaluate(hist, &self.config.strategy);

            // c. size and submit a new entry only when flat on this symbol.
            if output.signal != Signal::Flat && engine.venue().position(symbol).is_none() {
                let equity = engine.venue().equity();
                let entry_price = output.metadata.entry_price.unwrap_or(candle.close);
                let stop_loss_price = output.metadata.sl_distance.map(|d| match output.signal {
                    Signal::Long => entry_price - d,
                    Signal::Short => entry_price + d,
                    Signal::Flat => entry_price,
                });
                let take_profit_price = output.metadata.tp_distance.map(|d| match output.signal {
                    Signal::Long => entry_price + d,
                    Signal::Short => entry_price - d,
                    Signal::Flat => entry_price,
                });

                let outcome = risk_engine.size(
                    output.signal,
                    symbol,
                    equity,
                    entry_price,
                    stop_loss_price,
                    take_profit_price,
                    None,
                );

                match outcome {
                    RiskOutcome::Sized(sized) => {
                        let risk_amount = sized.risk_usd;
                        let order =
                            ExecutionEngine::<PaperAccount>::create_order_from_risk(&sized, Some(strategy.name().to_string()))?;
                        self.dispatch(&mut engine, &order, candle.close, risk_amount, candle.timestamp);
                    }
                    RiskOutcome::Skip { reason } => {
                        debug!(symbol = %symbol, reason, "risk engine skipped signal");
                    }
                }
            }
        }

        let flatten_timestamp = events.last().map(|e| e.0).unwrap_or(request.start);
        engine.venue_mut().flatten_all(flatten_timestamp, |s| last_close.get(s).copied())?;

        let account = engine.venue();
        Ok(BacktestResult {
            trade_log_path: Some(log_path),
            total_trades: account.total_trades(),
            win_rate: account.win_rate(),
            final_balance: account.balance(),
            final_equity: account.equity(),
            peak_equity: account.peak_equity(),
            halted: engine.safety().halted(),
        })
    }

    /// Compute exposure-after for `order` and route it through the execution
    /// engine, keeping the safety monitor's exposure/position-count bookkeeping
    /// current before every submission.
    fn dispatch(
        &self,
        engine: &mut ExecutionEngine<PaperAccount>,
        order: &OrderRequest,
        current_price: f64,
        risk_amount: f64,
        as_of: DateTime<Utc>,
    ) {
        let existing_exposure: f64 = engine
            .venue()
            .positions()
            .filter(|p| p.symbol != order.symbol)
            .map(|p| p.quantity * p.entry_price)
            .sum();
        let exposure_after = existing_exposure + order.quantity * current_price;

        engine.safety_mut().set_open_positions_count(engine_open_count(engine, &order.symbol));
        engine.safety_mut().set_total_exposure(exposure_after);

        match engine.submit(order, current_price, risk_amount, exposure_after, as_of) {
            Ok(result) => {
                if !result.is_accepted() {
                    debug!(symbol = %order.symbol, ?result, "order not accepted");
                }
            }
            Err(e) => warn!(symbol = %order.symbol, error = %e, "order submission failed"),
        }
    }
}

/// Open-position count the safety monitor should see for this submission:
/// existing positions, excluding the symbol being acted on (a close
/// shouldn't count against its own max-open-trades check).
fn engine_open_count(engine: &ExecutionEngine<PaperAccount>, symbol: &Symbol) -> usize {
    engine
        .venue()
        .positions()
        .filter(|p| &p.symbol != symbol)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic_fallback;
    use async_trait::async_trait;
    use chrono::Duration;

    struct FixedProvider;

    #[async_trait]
    impl HistoricalDataProvider for FixedProvider {
        async fn fetch(
            &self,
            symbol: &Symbol,
            interval: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<Candle>, TradeError> {
            Ok(synthetic_fallback(symbol, interval, start, end))
        }
    }

    #[tokio::test]
    async fn run_produces_a_result_and_flattens_positions() {
        let mut config = Config::default();
        config.trading.mode = ExecutionModeSetting::Paper;
        let runner = BacktestRunner::new(FixedProvider, config);

        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = BacktestRequest {
            symbols: vec![Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")],
            interval: "1h".to_string(),
            start,
            end: start + Duration::hours(200),
        };

        let result = runner.run(&request).await.unwrap();
        assert!(result.trade_log_path.is_some());
        // every run must end fully flat: no open exposure survives shutdown.
        assert!((result.final_balance - result.final_equity).abs() < 1e-6);
    }

    #[tokio::test]
    async fn identical_inputs_produce_identical_summaries() {
        let mut config = Config::default();
        config.trading.mode = ExecutionModeSetting::Paper;
        config.log_dir = Some(std::env::temp_dir().join("tradecore_determinism_test").to_string_lossy().to_string());

        let start = DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let request = BacktestRequest {
            symbols: vec![Symbol::new("BTCUSDT")],
            interval: "1h".to_string(),
            start,
            end: start + Duration::hours(120),
        };

        let runner_a = BacktestRunner::new(FixedProvider, config.clone());
        let runner_b = BacktestRunner::new(FixedProvider, config);
        let a = runner_a.run(&request).await.unwrap();
        let b = runner_b.run(&request).await.unwrap();

        assert_eq!(a.total_trades, b.total_trades);
        assert!((a.final_balance - b.final_balance).abs() < 1e-9);
        assert!((a.final_equity - b.final_equity).abs() < 1e-9);
    }
}
