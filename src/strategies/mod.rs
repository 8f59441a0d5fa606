//! Strategy Evaluator — a strategy is a pure function of
//! `(candles_so_far, params) -> {signal, metadata}`. It never places orders;
//! the pipeline drives risk sizing and execution around it. The trait
//! generalizes the teacher's `strategies::Strategy` trait down to this
//! narrower contract so arbitrary implementations stay interchangeable.

pub mod ema_rsi_scalper;

use crate::types::{Candle, Signal};
use serde_json::Value;

/// Metadata a strategy reports alongside its signal — the risk engine uses
/// `sl_distance`/`tp_distance` to derive stop/target prices when the
/// strategy doesn't size them itself.
#[derive(Debug, Clone, Default)]
pub struct StrategyMetadata {
    pub entry_price: Option<f64>,
    pub sl_distance: Option<f64>,
    pub tp_distance: Option<f64>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub signal: Signal,
    pub metadata: StrategyMetadata,
}

impl StrategyOutput {
    pub fn flat(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Flat,
            metadata: StrategyMetadata {
                reason: reason.into(),
                ..Default::default()
            },
        }
    }
}

/// Strategy surface: polymorphic over `{evaluate, params_schema}`. The
/// pipeline never inspects an implementation's internals.
pub trait Strategy: Send + Sync {
    /// Evaluate against the rolling history for one symbol. `candles` is
    /// ordered oldest-first and ends at the current candle.
    fn evaluate(&self, candles: &[Candle], params: &Value) -> StrategyOutput;

    /// JSON-schema-shaped description of accepted params, for the optimizer
    /// and for config validation at the CLI boundary.
    fn params_schema(&self) -> Value;

    fn name(&self) -> &'static str;
}

/// Construct the named strategy. Unknown names are a configuration error,
/// not a silent fallback.
pub fn create_strategy(name: &str) -> Result<Box<dyn Strategy>, crate::types::TradeError> {
    match name {
        "ema_rsi_scalper" => Ok(Box::new(ema_rsi_scalper::EmaRsiScalper::new())),
        other => Err(crate::types::TradeError::InvalidOrder {
            field: "strategy".into(),
            why: format!("unknown strategy '{other}'"),
        }),
    }
}
