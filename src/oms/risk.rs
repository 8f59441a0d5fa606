//! Risk Engine — converts a signal + price + stop into a sized order, or a
//! `Skip` with a reason. Generalizes the teacher's `RiskManager` position
//! sizing (drawdown/consecutive-loss multipliers) to the spec's narrower
//! signal -> sized-order contract.

use crate::types::{Side, Signal, Symbol};

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub risk_per_trade_pct: f64,
    pub max_exposure_pct: f64,
    pub min_position_usd: f64,
    pub default_slippage: f64,
    /// ATR multiple used to derive a stop distance when the caller provides none.
    pub default_atr_stop_multiple: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: 0.01,
            max_exposure_pct: 0.5,
            min_position_usd: 10.0,
            default_slippage: 0.0005,
            default_atr_stop_multiple: 2.0,
        }
    }
}

/// A fully sized order request, ready for `create_order_from_risk`.
#[derive(Debug, Clone)]
pub struct SizedOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub risk_usd: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RiskOutcome {
    Sized(SizedOrder),
    Skip { reason: String },
}

pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Size a signal into an order. `atr` feeds the default stop distance
    /// when the caller supplies no explicit `stop_loss_price`.
    pub fn size(
        &self,
        signal: Signal,
        symbol: &Symbol,
        equity: f64,
        entry_price: f64,
        stop_loss_price: Option<f64>,
        take_profit_price: Option<f64>,
        atr: Option<f64>,
    ) -> RiskOutcome {
        if !symbol.is_valid() {
            return RiskOutcome::Skip {
                reason: format!("symbol '{symbol}' is absent or unknown"),
            };
        }
        let side = match signal {
            Signal::Long => Side::Long,
            Signal::Short => Side::Short,
            Signal::Flat => {
                return RiskOutcome::Skip {
                    reason: "flat signal carries no order".into(),
                }
            }
        };

        let stop_distance = match stop_loss_price {
            Some(sl) => (entry_price - sl).abs(),
            None => match atr {
                Some(a) if a > 0.0 => a * self.config.default_atr_stop_multiple,
                _ => {
                    return RiskOutcome::Skip {
                        reason: "no stop_loss and no ATR available to derive one".into(),
                    }
                }
            },
        };

        if stop_distance <= 0.0 {
            return RiskOutcome::Skip {
                reason: "stop distance is zero".into(),
            };
        }

        let risk_usd = self.config.risk_per_trade_pct * equity;
        let raw_quantity = risk_usd / stop_distance;
        let quantity = truncate_to_precision(raw_quantity, symbol);

        let position_value = quantity * entry_price;
        if position_value < self.config.min_position_usd {
            return RiskOutcome::Skip {
                reason: format!(
                    "position value {position_value:.2} below minimum {:.2}",
                    self.config.min_position_usd
                ),
            };
        }

        let derived_stop = stop_loss_price.unwrap_or_else(|| match side {
            Side::Long | Side::Buy => entry_price - stop_distance,
            Side::Short | Side::Sell => entry_price + stop_distance,
        });

        RiskOutcome::Sized(SizedOrder {
            symbol: symbol.clone(),
            side,
            quantity,
            entry_price,
            stop_loss: Some(derived_stop),
            take_profit: take_profit_price,
            risk_usd,
        })
    }
}

/// Truncate (never round up) quantity to a symbol's tradable precision.
/// Unknown symbols default to 8 decimal places (typical spot-crypto precision).
fn truncate_to_precision(qty: f64, _symbol: &Symbol) -> f64 {
    let scale = 1e8;
    (qty * scale).floor() / scale
}
