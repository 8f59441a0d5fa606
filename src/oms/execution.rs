//! Execution Engine — validates an order, gates it through the safety
//! monitor, then routes it to whichever venue the configured mode implies.
//! `Venue` generalizes the teacher's venue-side fill logic (`check_fill`)
//! down to the spec's `submit(order, price) -> ExecutionResult` contract.

use crate::oms::accounting::PaperAccount;
use crate::oms::safety::SafetyMonitor;
use crate::oms::types::{ExecutionResult, OrderRequest, RejectKind};
use crate::oms::risk::SizedOrder;
use crate::types::TradeError;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Execution mode. `Live` is intentionally identical to `DryRun` — the real
/// order-placement path is out of scope; see spec open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Monitor,
    Paper,
    DryRun,
    Live,
}

/// A venue is anything that can attempt to fill a validated order at a price.
/// `as_of` is the caller's clock reading for the fill, not the venue's own —
/// no `Venue` impl reads the wall clock (spec §4.G determinism).
pub trait Venue {
    fn submit(
        &mut self,
        order: &OrderRequest,
        current_price: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError>;
    fn equity(&self) -> f64;
}

impl Venue for PaperAccount {
    fn submit(
        &mut self,
        order: &OrderRequest,
        current_price: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        PaperAccount::submit(self, order, current_price, as_of)
    }

    fn equity(&self) -> f64 {
        PaperAccount::equity(self)
    }
}

/// Logs what it would have done but mutates no real books. Backs both
/// `DryRun` and `Live` (spec §4.E, §9).
pub struct DryRunVenue {
    equity: f64,
    next_order_seq: u64,
}

impl DryRunVenue {
    pub fn new(starting_equity: f64) -> Self {
        Self {
            equity: starting_equity,
            next_order_seq: 0,
        }
    }
}

impl Venue for DryRunVenue {
    fn submit(
        &mut self,
        order: &OrderRequest,
        current_price: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        info!(
            symbol = %order.symbol,
            side = ?order.side,
            qty = order.quantity,
            price = current_price,
            "dry-run: would submit order"
        );
        let order_id = match &order.strategy_tag {
            Some(tag) => format!("{tag}-{:010}", self.next_order_seq),
            None => format!("DRYRUN-{:010}", self.next_order_seq),
        };
        self.next_order_seq += 1;
        let fill = crate::oms::types::OrderFill::new(
            order_id,
            order.symbol.clone(),
            order.side,
            order.quantity,
            current_price,
            0.0,
            0.0,
            as_of,
        );
        Ok(ExecutionResult::Accepted(fill))
    }

    fn equity(&self) -> f64 {
        self.equity
    }
}

/// Validates, safety-gates, and routes an `OrderRequest` to the venue
/// implied by `mode`.
pub struct ExecutionEngine<V: Venue> {
    mode: Mode,
    venue: V,
    safety: SafetyMonitor,
}

impl<V: Venue> ExecutionEngine<V> {
    pub fn new(mode: Mode, venue: V, safety: SafetyMonitor) -> Self {
        Self { mode, venue, safety }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn safety(&self) -> &SafetyMonitor {
        &self.safety
    }

    pub fn safety_mut(&mut self) -> &mut SafetyMonitor {
        &mut self.safety
    }

    pub fn venue(&self) -> &V {
        &self.venue
    }

    pub fn venue_mut(&mut self) -> &mut V {
        &mut self.venue
    }

    /// `create_order_from_risk`: it is a hard error if the sized order's
    /// symbol is missing or `"UNKNOWN"` — no silent default.
    pub fn create_order_from_risk(
        sized: &SizedOrder,
        strategy_tag: Option<String>,
    ) -> Result<OrderRequest, TradeError> {
        if !sized.symbol.is_valid() {
            return Err(TradeError::InvalidOrder {
                field: "symbol".into(),
                why: "risk output carries no symbol, or symbol is UNKNOWN".into(),
            });
        }
        OrderRequest::new(
            sized.symbol.clone(),
            sized.side,
            crate::oms::types::OrderKind::Market,
            sized.quantity,
            None,
            sized.stop_loss,
            sized.take_profit,
            strategy_tag,
        )
    }

    pub fn submit(
        &mut self,
        order: &OrderRequest,
        current_price: f64,
        risk_amount: f64,
        exposure_after: f64,
        as_of: DateTime<Utc>,
    ) -> Result<ExecutionResult, TradeError> {
        if !order.symbol.is_valid() {
            return Ok(ExecutionResult::Rejected {
                kind: RejectKind::InvalidSymbol,
                reason: format!("symbol '{}' is empty or UNKNOWN", order.symbol),
            });
        }

        if let Err(TradeError::SafetyViolation { kind }) =
            self.safety.check_pre_trade(risk_amount, exposure_after)
        {
            warn!(symbol = %order.symbol, ?kind, "order rejected by safety monitor");
            return Ok(ExecutionResult::Rejected {
                kind: RejectKind::Safety(kind),
                reason: format!("safety violation: {kind}"),
            });
        }

        if self.mode == Mode::Monitor {
            return Ok(ExecutionResult::Rejected {
                kind: RejectKind::MonitorMode,
                reason: "pipeline is in monitor mode".into(),
            });
        }

        let result = self.venue.submit(order, current_price, as_of)?;
        if result.is_accepted() {
            self.safety.check_post_trade(self.venue.equity());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oms::accounting::AccountingConfig;
    use crate::oms::safety::SafetyConfig;
    use crate::oms::types::OrderKind;
    use crate::types::{Side, Symbol};

    #[test]
    fn unknown_symbol_rejected_before_safety_check() {
        let venue = DryRunVenue::new(10000.0);
        let safety = SafetyMonitor::new(SafetyConfig::default(), 10000.0);
        let mut engine = ExecutionEngine::new(Mode::DryRun, venue, safety);

        let mut order = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            1.0,
            None,
            None,
            None,
            None,
        )
        .unwrap();
        order.symbol = Symbol::new("UNKNOWN");

        let result = engine.submit(&order, 100.0, 10.0, 10.0, Utc::now()).unwrap();
        assert!(matches!(
            result,
            ExecutionResult::Rejected {
                kind: RejectKind::InvalidSymbol,
                ..
            }
        ));
    }

    #[test]
    fn monitor_mode_rejects_without_routing() {
        let venue = DryRunVenue::new(10000.0);
        let safety = SafetyMonitor::new(SafetyConfig::default(), 10000.0);
        let mut engine = ExecutionEngine::new(Mode::Monitor, venue, safety);

        let order = OrderRequest::new(
            Symbol::new("BTCUSDT"),
            Side::Long,
            OrderKind::Market,
            1.0,
            None,
            None,
            None,
            None,
        )
        .unwrap();

        let result = engine.submit(&order, 100.0, 10.0, 10.0, Utc::now()).unwrap();
        assert!(matches!(
            result,
            ExecutionResult::Rejected {
                kind: RejectKind::MonitorMode,
                ..
            }
        ));
    }

    #[test]
    fn paper_mode_routes_to_accounting() {
        let venue = PaperAccount::new(AccountingConfig::default(), Utc::now()).unwrap();
        let safety = SafetyMonitor::new(SafetyConfig::default(), 10000.0);
        let mut engine = ExecutionEngine::new(Mode::Paper, venue, safety);

        let order = OrderRequest::new(
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

        let result = engine.submit(&order, 50000.0, 50.0, 5000.0, Utc::now()).unwrap();
        assert!(result.is_accepted());
        assert_eq!(engine.venue().open_positions_count(), 1);
    }
}
