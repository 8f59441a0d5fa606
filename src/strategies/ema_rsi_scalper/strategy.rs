//! EMA+RSI Scalper — default reference strategy (spec §4.F). Pure function
//! of candle history: emits LONG on a bullish EMA crossover confirmed by RSI
//! above threshold, symmetric SHORT on bearish crossover + RSI below
//! threshold, otherwise FLAT. Never touches orders, positions, or books.

use crate::indicators::{atr, ema, rsi, sma};
use crate::strategies::{Strategy, StrategyMetadata, StrategyOutput};
use crate::types::{Candle, Signal};
use serde_json::Value;

use super::config::EmaRsiScalperConfig;

pub struct EmaRsiScalper {
    default_config: EmaRsiScalperConfig,
}

impl EmaRsiScalper {
    pub fn new() -> Self {
        Self {
            default_config: EmaRsiScalperConfig::default(),
        }
    }

    fn resolve_config(&self, params: &Value) -> EmaRsiScalperConfig {
        serde_json::from_value(params.clone()).unwrap_or_else(|_| self.default_config.clone())
    }

    fn crossover(config: &EmaRsiScalperConfig, candles: &[Candle]) -> Option<Signal> {
        if candles.len() < config.ema_slow + 2 {
            return None;
        }
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let fast = ema(&close, config.ema_fast);
        let slow = ema(&close, config.ema_slow);
        let len = fast.len();
        if len < 2 {
            return None;
        }
        let (fast_curr, fast_prev) = (fast[len - 1]?, fast[len - 2]?);
        let (slow_curr, slow_prev) = (slow[len - 1]?, slow[len - 2]?);

        if fast_prev <= slow_prev && fast_curr > slow_curr {
            Some(Signal::Long)
        } else if fast_prev >= slow_prev && fast_curr < slow_curr {
            Some(Signal::Short)
        } else {
            None
        }
    }

    fn rsi_confirms(config: &EmaRsiScalperConfig, candles: &[Candle], signal: Signal) -> bool {
        if candles.len() < config.rsi_period + 1 {
            return false;
        }
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let values = rsi(&close, config.rsi_period);
        let Some(current) = values.last().copied().flatten() else {
            return false;
        };
        match signal {
            Signal::Long => current > config.rsi_long_threshold,
            Signal::Short => current < config.rsi_short_threshold,
            Signal::Flat => false,
        }
    }

    fn volume_confirms(config: &EmaRsiScalperConfig, candles: &[Candle]) -> bool {
        if !config.require_volume {
            return true;
        }
        if candles.len() < config.volume_period + 1 {
            return true;
        }
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
        let avg = sma(&volumes, config.volume_period)
            .last()
            .copied()
            .flatten()
            .unwrap_or(1.0);
        let current = candles.last().map(|c| c.volume).unwrap_or(0.0);
        if avg <= 0.0 {
            true
        } else {
            current >= avg * config.volume_threshold
        }
    }

    fn atr_distance(config: &EmaRsiScalperConfig, candles: &[Candle], multiple: f64) -> f64 {
        let high: Vec<f64> = candles.iter().map(|c| c.high).collect();
        let low: Vec<f64> = candles.iter().map(|c| c.low).collect();
        let close: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let current_atr = atr(&high, &low, &close, config.atr_period)
            .last()
            .copied()
            .flatten()
            .unwrap_or_else(|| close.last().copied().unwrap_or(0.0) * 0.01);
        current_atr * multiple
    }
}

impl Default for EmaRsiScalper {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for EmaRsiScalper {
    fn name(&self) -> &'static str {
        "ema_rsi_scalper"
    }

    fn evaluate(&self, candles: &[Candle], params: &Value) -> StrategyOutput {
        let config = self.resolve_config(params);

        let Some(entry_price) = candles.last().map(|c| c.close) else {
            return StrategyOutput::flat("no candles");
        };

        let Some(signal) = Self::crossover(&config, candles) else {
            return StrategyOutput::flat("no ema crossover");
        };

        if signal == Signal::Short && !config.allow_short {
            return StrategyOutput::flat("short disabled by config");
        }

        if !Self::rsi_confirms(&config, candles, signal) {
            return StrategyOutput::flat("rsi did not confirm crossover");
        }

        if !Self::volume_confirms(&config, candles) {
            return StrategyOutput::flat("volume filter not met");
        }

        let sl_distance = Self::atr_distance(&config, candles, config.stop_atr_multiple);
        let tp_distance = Self::atr_distance(&config, candles, config.target_atr_multiple);

        StrategyOutput {
            signal,
            metadata: StrategyMetadata {
                entry_price: Some(entry_price),
                sl_distance: Some(sl_distance),
                tp_distance: Some(tp_distance),
                reason: "ema crossover confirmed by rsi".into(),
            },
        }
    }

    fn params_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "ema_fast": {"type": "integer", "minimum": 1},
                "ema_slow": {"type": "integer", "minimum": 1},
                "rsi_period": {"type": "integer", "minimum": 1},
                "rsi_long_threshold": {"type": "number"},
                "rsi_short_threshold": {"type": "number"},
                "volume_period": {"type": "integer", "minimum": 1},
                "require_volume": {"type": "boolean"},
                "volume_threshold": {"type": "number"},
                "atr_period": {"type": "integer", "minimum": 1},
                "stop_atr_multiple": {"type": "number"},
                "target_atr_multiple": {"type": "number"},
                "allow_short": {"type": "boolean"},
            },
            "required": ["ema_fast", "ema_slow", "rsi_period"],
        })
    }
}
