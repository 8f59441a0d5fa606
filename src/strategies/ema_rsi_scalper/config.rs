//! EMA+RSI Scalper configuration. Short/long EMA crossover confirmed by RSI,
//! tuned for 5m/15m/1h candles.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmaRsiScalperConfig {
    /// Fast EMA period (default: 9).
    pub ema_fast: usize,
    /// Slow EMA period (default: 21).
    pub ema_slow: usize,

    /// RSI period (default: 14).
    pub rsi_period: usize,
    /// RSI must be above this for a LONG entry (default: 50).
    pub rsi_long_threshold: f64,
    /// RSI must be below this for a SHORT entry (default: 50).
    pub rsi_short_threshold: f64,

    /// Volume MA period for the optional volume filter (default: 20).
    pub volume_period: usize,
    /// Require current volume above its MA to confirm entry (default: false).
    pub require_volume: bool,
    /// Volume spike threshold relative to the MA (default: 1.2).
    pub volume_threshold: f64,

    /// ATR period used to derive stop/target distances (default: 14).
    pub atr_period: usize,
    pub stop_atr_multiple: f64,
    pub target_atr_multiple: f64,

    /// Allow SHORT entries (default: true, unlike the teacher's long-only default).
    pub allow_short: bool,
}

impl Default for EmaRsiScalperConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            rsi_period: 14,
            rsi_long_threshold: 50.0,
            rsi_short_threshold: 50.0,
            volume_period: 20,
            require_volume: false,
            volume_threshold: 1.2,
            atr_period: 14,
            stop_atr_multiple: 1.5,
            target_atr_multiple: 2.5,
            allow_short: true,
        }
    }
}
