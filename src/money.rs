//! Cent-precise money arithmetic. Candle prices and quantities stay `f64`
//! (matching the `ta`-crate-backed indicator pipeline); only balance, equity,
//! commission, and realized PnL — values that must round to exact cents —
//! pass through here.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

/// Round to 2 decimal places (cents), half-up.
pub fn round_cents(value: f64) -> f64 {
    let d = Decimal::from_f64(value).unwrap_or_default();
    d.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(value)
}

/// The canonical balance-update helper: `balance + realized_pnl - commission - slippage`,
/// rounded to cents. `fill_value` never touches balance directly.
pub fn apply_trade_result(balance: f64, realized_pnl: f64, commission: f64, slippage: f64) -> f64 {
    let balance = Decimal::from_f64(balance).unwrap_or_default();
    let realized_pnl = Decimal::from_f64(realized_pnl).unwrap_or_default();
    let commission = Decimal::from_f64(commission).unwrap_or_default();
    let slippage = Decimal::from_f64(slippage).unwrap_or_default();
    let result = balance + realized_pnl - commission - slippage;
    result
        .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}
