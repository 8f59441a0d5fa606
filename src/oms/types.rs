//! Order model: requests, fills, positions, and the result of routing a
//! request through the execution engine. Construction validates; nothing
//! here mutates after it is built.

use crate::types::{SafetyViolationKind, Side, Symbol, TradeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of order this is — determines how the venue resolves a fill price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

/// A validated request to open or close exposure in one symbol.
///
/// Every field is checked in `OrderRequest::new`; a caller cannot construct
/// one carrying an empty/`"UNKNOWN"` symbol or a non-positive quantity.
/// Carries no order id or clock reading of its own — the venue that fills it
/// assigns both deterministically, from its own sequence counter and the
/// `as_of` timestamp the caller supplies (spec §4.G determinism).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: f64,
    pub price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub strategy_tag: Option<String>,
}

impl OrderRequest {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        quantity: f64,
        price: Option<f64>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        strategy_tag: Option<String>,
    ) -> Result<Self, TradeError> {
        if !symbol.is_valid() {
            return Err(TradeError::InvalidSymbol {
                why: format!("symbol '{symbol}' is empty or the UNKNOWN sentinel"),
            });
        }
        if !(quantity > 0.0) {
            return Err(TradeError::InvalidOrder {
                field: "quantity".into(),
                why: format!("quantity must be > 0, got {quantity}"),
            });
        }
        if let Some(p) = price {
            if !(p > 0.0) {
                return Err(TradeError::InvalidOrder {
                    field: "price".into(),
                    why: format!("price must be > 0, got {p}"),
                });
            }
        }
        Ok(Self {
            symbol,
            side,
            kind,
            quantity,
            price,
            stop_loss,
            take_profit,
            strategy_tag,
        })
    }
}

/// An immutable record of one execution. `fill_value` is always
/// `quantity * fill_price`, never the raw request price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderFill {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub fill_price: f64,
    pub fill_value: f64,
    pub commission: f64,
    pub slippage: f64,
    pub timestamp: DateTime<Utc>,
}

impl OrderFill {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: String,
        symbol: Symbol,
        side: Side,
        quantity: f64,
        fill_price: f64,
        commission: f64,
        slippage: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            symbol,
            side,
            quantity,
            fill_price,
            fill_value: quantity * fill_price,
            commission,
            slippage,
            timestamp,
        }
    }
}

/// At most one open position per symbol. `side` is restricted to the
/// Long/Short family — the accounting engine never stores Buy/Sell directly.
/// `commission` is the entry-leg fee, paid once and charged against balance
/// only when the position closes (spec §4.F CLOSE semantics) — it is never
/// recomputed from the exit fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub current_price: f64,
    pub commission: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub highest_price: f64,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        side: Side,
        quantity: f64,
        entry_price: f64,
        commission: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            side,
            quantity,
            entry_price,
            current_price: entry_price,
            commission,
            stop_loss,
            take_profit,
            highest_price: entry_price,
            opened_at,
        }
    }

    /// `(current - entry) * qty` for LONG, `(entry - current) * qty` for SHORT.
    pub fn unrealized_pnl(&self) -> f64 {
        match self.side {
            Side::Long | Side::Buy => (self.current_price - self.entry_price) * self.quantity,
            Side::Short | Side::Sell => (self.entry_price - self.current_price) * self.quantity,
        }
    }

    pub fn realized_pnl_at(&self, exit_price: f64) -> f64 {
        match self.side {
            Side::Long | Side::Buy => (exit_price - self.entry_price) * self.quantity,
            Side::Short | Side::Sell => (self.entry_price - exit_price) * self.quantity,
        }
    }
}

/// Outcome of routing an `OrderRequest` through the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecutionResult {
    Accepted(OrderFill),
    Rejected {
        kind: RejectKind,
        reason: String,
    },
}

impl ExecutionResult {
    /// 0 when rejected.
    pub fn filled_quantity(&self) -> f64 {
        match self {
            ExecutionResult::Accepted(fill) => fill.quantity,
            ExecutionResult::Rejected { .. } => 0.0,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, ExecutionResult::Accepted(_))
    }
}

/// Coarse reason category for a rejected order, independent of the free-text reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectKind {
    InvalidSymbol,
    InsufficientBalance,
    DuplicatePosition,
    ShortingDisabled,
    Safety(SafetyViolationKind),
    MonitorMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_request_rejects_unknown_symbol() {
        let err = OrderRequest::new(
            Symbol::new("UNKNOWN"),
            Side::Long,
            OrderKind::Market,
            1.0,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TradeError::InvalidSymbol { .. }));
    }

    #[test]
    fn order_request_rejects_nonpositive_quantity() {
        let err = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            0.0,
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TradeError::InvalidOrder { .. }));
    }

    #[test]
    fn fill_value_is_quantity_times_price() {
        let fill = OrderFill::new(
            "o1".into(),
            Symbol::new("BTCUSDT"),
            Side::Long,
            0.1,
            50025.0,
            2.50125,
            0.0,
            Utc::now(),
        );
        assert!((fill.fill_value - 5002.5).abs() < 1e-9);
    }

    #[test]
    fn position_unrealized_pnl_long_and_short() {
        let mut pos = Position::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            0.1,
            50000.0,
            2.50125,
            None,
            None,
            Utc::now(),
        );
        pos.current_price = 51000.0;
        assert!((pos.unrealized_pnl() - 100.0).abs() < 1e-9);

        let mut short = Position::new(
            Symbol::new("ETHUSDT"),
            Side::Short,
            1.0,
            3000.0,
            1.5,
            None,
            None,
            Utc::now(),
        );
        short.current_price = 2900.0;
        assert!((short.unrealized_pnl() - 100.0).abs() < 1e-9);
    }
}
