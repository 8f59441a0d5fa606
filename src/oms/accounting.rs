//! Paper Accounting Engine — exclusive owner of cash balance, open positions,
//! session statistics, and the trade log. Cash is cash; `equity = balance +
//! unrealized PnL`. State and log writes are kept atomic: if a row cannot be
//! appended, the in-memory mutation that produced it is rolled back.

use crate::money::apply_trade_result;
use crate::oms::types::{ExecutionResult, OrderFill, OrderKind, OrderRequest, Position, RejectKind};
use crate::types::{Side, Symbol, TradeError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Trailing-stop configuration. Only ever tightens a LONG stop; SHORT
/// positions never trail in this core (spec §9 open question, preserved).
#[derive(Debug, Clone, Copy)]
pub struct TrailingStopConfig {
    pub enabled: bool,
    pub pct: f64,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pct: 0.02,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccountingConfig {
    pub starting_balance: f64,
    pub slippage_rate: f64,
    pub commission_rate: f64,
    pub allow_shorting: bool,
    pub trailing_stop: TrailingStopConfig,
    pub log_path: Option<PathBuf>,
}

impl Default for AccountingConfig {
    fn default() -> Self {
        Self {
            starting_balance: 10_000.0,
            slippage_rate: 0.0005,
            commission_rate: 0.0005,
            allow_shorting: true,
            trailing_stop: TrailingStopConfig::default(),
            log_path: None,
        }
    }
}

/// One row of the trade log, in the exact external CSV column order.
#[derive(Debug, Clone)]
pub struct TradeLogRow {
    pub timestamp: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub order_id: String,
    pub symbol: String,
    pub action: &'static str,
    pub side: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub fill_price: f64,
    pub fill_value: f64,
    pub commission: f64,
    pub slippage: f64,
    pub realized_pnl: f64,
    pub pnl_pct: f64,
    pub balance: f64,
    pub equity: f64,
    pub open_positions: usize,
}

fn fmt_qty(v: f64) -> String {
    format!("{:.8}", v)
}
fn fmt_price(v: f64) -> String {
    format!("{:.4}", v)
}
fn fmt_currency(v: f64) -> String {
    format!("{:.2}", v)
}

impl TradeLogRow {
    fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}\n",
            self.timestamp.to_rfc3339(),
            self.session_start.to_rfc3339(),
            self.order_id,
            self.symbol,
            self.action,
            self.side,
            fmt_qty(self.quantity),
            fmt_price(self.entry_price),
            fmt_price(self.fill_price),
            fmt_currency(self.fill_value),
            fmt_currency(self.commission),
            fmt_currency(self.slippage),
            fmt_currency(self.realized_pnl),
            fmt_price(self.pnl_pct),
            fmt_currency(self.balance),
            fmt_currency(self.equity),
            self.open_positions,
        )
    }
}

const CSV_HEADER: &str = "timestamp,session_start,order_id,symbol,action,side,quantity,entry_price,fill_price,fill_value,commission,slippage,realized_pnl,pnl_pct,balance,equity,open_positions\n";

/// Append-only trade log writer. Buffers nothing: every `append` is an
/// immediate write so a crash never loses a row the engine believes it wrote.
struct TradeLogWriter {
    path: Option<PathBuf>,
    rows: Vec<TradeLogRow>,
}

impl TradeLogWriter {
    fn new(path: Option<PathBuf>) -> Result<Self, TradeError> {
        if let Some(p) = &path {
            if let Some(parent) = p.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TradeError::IoFailure {
                    why: format!("create log dir {parent:?}: {e}"),
                })?;
            }
            let is_new = !p.exists();
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(p)
                .map_err(|e| TradeError::IoFailure {
                    why: format!("open trade log {p:?}: {e}"),
                })?;
            if is_new {
                f.write_all(CSV_HEADER.as_bytes())
                    .map_err(|e| TradeError::IoFailure {
                        why: format!("write trade log header: {e}"),
                    })?;
            }
        }
        Ok(Self {
            path,
            rows: Vec::new(),
        })
    }

    fn append(&mut self, row: TradeLogRow) -> Result<(), TradeError> {
        if let Some(p) = &self.path {
            write_row(p, &row)?;
        }
        self.rows.push(row);
        Ok(())
    }
}

fn write_row(path: &Path, row: &TradeLogRow) -> Result<(), TradeError> {
    let mut f: File = OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| TradeError::IoFailure {
            why: format!("open trade log {path:?} for append: {e}"),
        })?;
    f.write_all(row.to_csv_line().as_bytes())
        .map_err(|e| TradeError::IoFailure {
            why: format!("append trade log row: {e}"),
        })
}

/// The paper accounting engine. At most one open position per symbol.
pub struct PaperAccount {
    config: AccountingConfig,
    balance: f64,
    peak_equity: f64,
    session_start: DateTime<Utc>,
    positions: HashMap<Symbol, Position>,
    log: TradeLogWriter,
    total_trades: u64,
    wins: u64,
    losses: u64,
    next_order_seq: u64,
}

impl PaperAccount {
    /// `session_start` is the caller's clock reading, not ours — a backtest
    /// passes its request's `start` so the same request always produces the
    /// same `session_start` column (spec §4.G determinism).
    pub fn new(config: AccountingConfig, session_start: DateTime<Utc>) -> Result<Self, TradeError> {
        let mut log = TradeLogWriter::new(config.log_path.clone())?;
        let init_row = TradeLogRow {
            timestamp: session_start,
            session_start,
            order_id: String::new(),
            symbol: String::new(),
            action: "INIT",
            side: String::new(),
            quantity: 0.0,
            entry_price: 0.0,
            fill_price: 0.0,
            fill_value: 0.0,
            commission: 0.0,
            slippage: 0.0,
            realized_pnl: 0.0,
            pnl_pct: 0.0,
            balance: config.starting_balance,
            equity: config.starting_balance,
            open_positions: 0,
        };
        log.append(init_row)?;
        Ok(Self {
            balance: config.starting_balance,
            peak_equity: config.starting_balance,
            session_start,
            positions: HashMap::new(),
            log,
            total_trades: 0,
            wins: 0,
            losses: 0,
            next_order_seq: 0,
            config,
        })
    }

    /// Next deterministic order id: a zero-padded sequence counter tagged
    /// with the order's strategy tag, if any, so FLATTEN closes are
    /// distinguishable from strategy-driven ones without mutating the order.
    fn next_order_id(&mut self, order: &OrderRequest) -> String {
        let seq = self.next_order_seq;
        self.next_order_seq += 1;
        match &order.strategy_tag {
            Some(tag) => format!("{tag}-{seq:010}"),
            None => format!("ORD-{seq:010}"),
        }
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn equity(&self) -> f64 {
        self.balance + self.positions.values().map(|p| p.unrealized_pnl()).sum::<f64>()
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn open_positions_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn total_trades(&self) -> u64 {
        self.total_trades
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64
        }
    }

    fn update_peak(&mut self) {
        let eq = self.equity();
        if eq > self.peak_equity {
            self.peak_equity = eq;
        }
    }

    /// Submit an order against the current price. Opens a new position if the
    /// symbol has none; closes it if the incoming side is the opposite of the
    /// held side; rejects a same-side duplicate.
    pub fn submit(
        &mut self,
        order: &OrderRequest,
        current_price: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        if !order.symbol.is_valid() {
            return Err(TradeError::InvalidSymbol {
                why: format!("symbol '{}' is empty or UNKNOWN", order.symbol),
            });
        }
        if order.side.is_short_family() && !self.config.allow_shorting {
            return Ok(ExecutionResult::Rejected {
                kind: RejectKind::ShortingDisabled,
                reason: "shorting disabled by accounting config".into(),
            });
        }

        let side_sign = order.side.sign();
        let fill_price = current_price * (1.0 + side_sign * self.config.slippage_rate);
        let fill_value = order.quantity * fill_price;
        let commission = fill_value * self.config.commission_rate;

        match self.positions.get(&order.symbol) {
            None => self.open(order, fill_price, commission, as_of),
            Some(pos) => {
                if pos.side.is_long_family() == order.side.is_long_family() {
                    Ok(ExecutionResult::Rejected {
                        kind: RejectKind::DuplicatePosition,
                        reason: format!("position already open for {}", order.symbol),
                    })
                } else {
                    self.close(order, fill_price, as_of)
                }
            }
        }
    }

    fn open(
        &mut self,
        order: &OrderRequest,
        fill_price: f64,
        commission: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        if order.side.is_long_family() {
            let required = fill_price * order.quantity + commission;
            if required > self.balance {
                return Ok(ExecutionResult::Rejected {
                    kind: RejectKind::InsufficientBalance,
                    reason: format!(
                        "balance {:.2} insufficient for open requiring {:.2}",
                        self.balance, required
                    ),
                });
            }
        }

        let order_id = self.next_order_id(order);
        let fill = OrderFill::new(
            order_id,
            order.symbol.clone(),
            order.side,
            order.quantity,
            fill_price,
            commission,
            0.0,
            as_of,
        );

        let position = Position::new(
            order.symbol.clone(),
            order.side,
            order.quantity,
            fill_price,
            commission,
            order.stop_loss,
            order.take_profit,
            fill.timestamp,
        );

        let row = TradeLogRow {
            timestamp: fill.timestamp,
            session_start: self.session_start,
            order_id: fill.order_id.clone(),
            symbol: order.symbol.to_string(),
            action: "OPEN",
            side: order.side.csv_token().to_string(),
            quantity: fill.quantity,
            entry_price: fill.fill_price,
            fill_price: fill.fill_price,
            fill_value: fill.fill_value,
            commission: fill.commission,
            slippage: 0.0,
            realized_pnl: 0.0,
            pnl_pct: 0.0,
            balance: self.balance,
            equity: self.balance,
            open_positions: self.positions.len() + 1,
        };

        self.log.append(row)?;
        self.positions.insert(order.symbol.clone(), position);
        self.update_peak();
        info!(symbol = %order.symbol, side = ?order.side, qty = order.quantity, price = fill_price, "position opened");
        Ok(ExecutionResult::Accepted(fill))
    }

    fn close(
        &mut self,
        order: &OrderRequest,
        fill_price: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        let position = self
            .positions
            .get(&order.symbol)
            .expect("close called with no existing position")
            .clone();

        let realized_pnl = position.realized_pnl_at(fill_price);
        let new_balance = apply_trade_result(self.balance, realized_pnl, position.commission, 0.0);
        let pnl_pct = if position.entry_price * position.quantity != 0.0 {
            realized_pnl / (position.entry_price * position.quantity)
        } else {
            0.0
        };

        let order_id = self.next_order_id(order);
        let fill = OrderFill::new(
            order_id,
            order.symbol.clone(),
            order.side,
            order.quantity,
            fill_price,
            0.0,
            0.0,
            as_of,
        );

        let remaining_positions = self.positions.len().saturating_sub(1);
        let row = TradeLogRow {
            timestamp: fill.timestamp,
            session_start: self.session_start,
            order_id: fill.order_id.clone(),
            symbol: order.symbol.to_string(),
            action: "CLOSE",
            side: order.side.csv_token().to_string(),
            quantity: fill.quantity,
            entry_price: position.entry_price,
            fill_price: fill.fill_price,
            fill_value: fill.fill_value,
            commission: 0.0,
            slippage: 0.0,
            realized_pnl,
            pnl_pct,
            balance: new_balance,
            equity: new_balance,
            open_positions: remaining_positions,
        };

        self.log.append(row)?;
        self.positions.remove(&order.symbol);
        self.balance = new_balance;
        self.total_trades += 1;
        if realized_pnl >= 0.0 {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.update_peak();
        info!(symbol = %order.symbol, pnl = realized_pnl, balance = new_balance, "position closed");
        Ok(ExecutionResult::Accepted(fill))
    }

    /// Mark prices on every open position; tighten LONG trailing stops.
    pub fn update_prices(&mut self, prices: &HashMap<Symbol, f64>) {
        for (symbol, position) in self.positions.iter_mut() {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            position.current_price = price;
            if self.config.trailing_stop.enabled && position.side.is_long_family() {
                if price > position.highest_price {
                    position.highest_price = price;
                }
                let candidate = position.highest_price * (1.0 - self.config.trailing_stop.pct);
                position.stop_loss = Some(position.stop_loss.unwrap_or(candidate).max(candidate));
            }
        }
        self.update_peak();
    }

    /// Symbols whose price has touched a stop-loss or take-profit.
    pub fn check_exits(&self, prices: &HashMap<Symbol, f64>) -> Vec<Symbol> {
        let mut hits = Vec::new();
        for (symbol, position) in &self.positions {
            let Some(&price) = prices.get(symbol) else {
                continue;
            };
            let long = position.side.is_long_family();
            let stop_hit = position
                .stop_loss
                .map(|sl| if long { price <= sl } else { price >= sl })
                .unwrap_or(false);
            let tp_hit = position
                .take_profit
                .map(|tp| if long { price >= tp } else { price <= tp })
                .unwrap_or(false);
            if stop_hit || tp_hit {
                hits.push(symbol.clone());
            }
        }
        hits
    }

    /// Close every open position using a price provider, falling back to the
    /// position's last observed price if the provider errors. Each close is
    /// tagged `strategy_tag = "flatten"` and visited in sorted symbol order
    /// so the resulting order ids are stable across runs (spec §4.G).
    pub fn flatten_all<F>(&mut self, as_of: DateTime<Utc>, mut price_provider: F) -> Result<(), TradeError>
    where
        F: FnMut(&Symbol) -> Option<f64>,
    {
        let mut symbols: Vec<Symbol> = self.positions.keys().cloned().collect();
        symbols.sort();
        for symbol in symbols {
            let position = self.positions.get(&symbol).expect("symbol just listed").clone();
            let price = price_provider(&symbol).unwrap_or(position.current_price);
            let close_side = position.side.opposite();
            let order = OrderRequest::new(
                symbol.clone(),
                close_side,
                OrderKind::Market,
                position.quantity,
                None,
                None,
                None,
                Some("flatten".into()),
            )?;
            match self.submit(&order, price, as_of) {
                Ok(_) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "flatten close failed"),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::types::OrderKind;

    fn session_start() -> DateTime<Utc> {
        "2024-01-01T00:00:00Z".parse().unwrap()
    }

    fn account(starting: f64) -> PaperAccount {
        PaperAccount::new(
            AccountingConfig {
                starting_balance: starting,
                slippage_rate: 0.0005,
                commission_rate: 0.0005,
                allow_shorting: true,
                trailing_stop: TrailingStopConfig::default(),
                log_path: None,
            },
            session_start(),
        )
        .unwrap()
    }

    #[test]
    fn basic_long_round_trip() {
        let mut acct = account(10000.0);
        let open = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            0.1,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let res = acct.submit(&open, 50000.0, session_start()).unwrap();
        let fill = match res {
            ExecutionResult::Accepted(f) => f,
            _ => panic!("expected accept"),
        };
        assert!((fill.fill_price - 50025.0).abs() < 1e-6);
        assert!((fill.commission - 2.50125).abs() < 1e-6);
        assert!((acct.balance() - 10000.0).abs() < 1e-6);

        let close = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Sell,
            OrderKind::Market,
            0.1,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let res2 = acct.submit(&close, 51000.0, session_start()).unwrap();
        assert!(res2.is_accepted());
        assert!((acct.balance() - 10092.45).abs() < 1e-2);
    }

    #[test]
    fn duplicate_same_side_rejected() {
        let mut acct = account(10000.0);
        let open = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            0.1,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        acct.submit(&open, 50000.0, session_start()).unwrap();
        let dup = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            OrderKind::Market,
            0.1,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        let res = acct.submit(&dup, 50000.0, session_start()).unwrap();
        assert!(matches!(
            res,
            ExecutionResult::Rejected {
                kind: RejectKind::DuplicatePosition,
                ..
            }
        ));
    }

    #[test]
    fn trailing_stop_only_tightens() {
        let mut acct = PaperAccount::new(
            AccountingConfig {
                starting_balance: 10000.0,
                slippage_rate: 0.0,
                commission_rate: 0.0,
                allow_shorting: true,
                trailing_stop: TrailingStopConfig {
                    enabled: true,
                    pct: 0.02,
                },
                log_path: None,
            },
            session_start(),
        )
        .unwrap();
        let open = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            1.0,
            None,
            Some(95.0),
            None,
            None,
        )
        .unwrap();
        acct.submit(&open, 100.0, session_start()).unwrap();

        let mut prices = HashMap::new();
        prices.insert(Symbol::new("BTCUSDT"), 102.0);
        acct.update_prices(&prices);
        assert!((acct.position(&Symbol::new("BTCUSDT")).unwrap().stop_loss.unwrap() - 99.96).abs() < 1e-6);

        prices.insert(Symbol::new("BTCUSDT"), 101.0);
        acct.update_prices(&prices);
        assert!((acct.position(&Symbol::new("BTCUSDT")).unwrap().stop_loss.unwrap() - 99.96).abs() < 1e-6);

        prices.insert(Symbol::new("BTCUSDT"), 110.0);
        acct.update_prices(&prices);
        assert!((acct.position(&Symbol::new("BTCUSDT")).unwrap().stop_loss.unwrap() - 107.8).abs() < 1e-6);

        prices.insert(Symbol::new("BTCUSDT"), 107.5);
        acct.update_prices(&prices);
        let hits = acct.check_exits(&prices);
        assert_eq!(hits, vec![Symbol::new("BTCUSDT")]);
    }

    #[test]
    fn flatten_closes_all_positions() {
        let mut acct = account(10000.0);
        let btc = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            0.1,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        acct.submit(&btc, 50000.0, session_start()).unwrap();
        let eth = OrderRequest::new(
            Symbol::new("ETHUSDT"),
            Side::Short,
            OrderKind::Market,
            1.0,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        acct.submit(&eth, 3000.0, session_start()).unwrap();

        acct.flatten_all(session_start(), |symbol| {
            if symbol.as_str() == "BTCUSDT" {
                Some(51000.0)
            } else {
                Some(2900.0)
            }
        })
        .unwrap();

        assert_eq!(acct.open_positions_count(), 0);
        assert!((acct.equity() - acct.balance()).abs() < 1e-9);
    }
}
