//! Core data types shared across the pipeline: candles, symbols, sides, and
//! the error taxonomy every layer surfaces instead of panicking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Trading pair symbol. `""` and `"UNKNOWN"` are reserved invalid values —
/// every layer that accepts a `Symbol` checks `is_valid()` at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `false` for `""` or the sentinel `"UNKNOWN"` (spec.md §3 OrderRequest invariant).
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0 != "UNKNOWN"
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// OHLCV candlestick. Invariants (`low <= open,close <= high`, `volume >= 0`)
/// are enforced in `Candle::new`; `new_unchecked` exists only for test fixtures
/// and the synthetic-fallback generator, which builds valid candles by construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub symbol_hint: Option<()>, // reserved, unused: candles are keyed externally by Symbol
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, TradeError> {
        let candle = Candle::new_unchecked(timestamp, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Candle {
            timestamp,
            symbol_hint: None,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), TradeError> {
        if self.volume < 0.0 {
            return Err(TradeError::DataQuality {
                why: format!("negative volume {}", self.volume),
            });
        }
        if !(self.low <= self.open
            && self.open <= self.high
            && self.low <= self.close
            && self.close <= self.high)
        {
            return Err(TradeError::DataQuality {
                why: format!(
                    "OHLC relationship violated: low={} open={} high={} close={}",
                    self.low, self.open, self.high, self.close
                ),
            });
        }
        Ok(())
    }
}

/// Trade direction. Kept as four distinct variants (rather than a single
/// `Long`/`Short` plus a `Buy`/`Sell` alias) so the trade-log writer can
/// preserve whichever token the caller actually used, per spec.md §9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
    Buy,
    Sell,
}

impl Side {
    /// +1 for the "buying" family (Long/Buy), -1 for the "selling" family (Short/Sell).
    pub fn sign(self) -> f64 {
        match self {
            Side::Long | Side::Buy => 1.0,
            Side::Short | Side::Sell => -1.0,
        }
    }

    pub fn is_long_family(self) -> bool {
        matches!(self, Side::Long | Side::Buy)
    }

    pub fn is_short_family(self) -> bool {
        matches!(self, Side::Short | Side::Sell)
    }

    /// The opposite side within the same family (Long<->Short, Buy<->Sell), used
    /// to detect a same-side duplicate submission vs. an opposite-side close.
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Parse a signal token (`"LONG"` / `"SHORT"`), spec.md §4.A `OrderSide::from_signal`.
    pub fn from_signal(s: &str) -> Result<Side, TradeError> {
        match s {
            "LONG" => Ok(Side::Long),
            "SHORT" => Ok(Side::Short),
            other => Err(TradeError::InvalidOrder {
                field: "side".into(),
                why: format!("unrecognized signal side '{other}'"),
            }),
        }
    }

    /// Exact CSV token to emit for this side (spec.md §6, §9).
    pub fn csv_token(self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// Strategy signal for one symbol on one candle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    Long,
    Short,
    Flat,
}

/// Error taxonomy (spec.md §7). The accounting engine never panics — every
/// invalid state is returned as one of these and leaves prior state unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeError {
    #[error("invalid input on field '{field}': {why}")]
    InvalidOrder { field: String, why: String },

    #[error("invalid symbol: {why}")]
    InvalidSymbol { why: String },

    #[error("insufficient balance: {why}")]
    InsufficientBalance { why: String },

    #[error("duplicate position for {symbol}")]
    DuplicatePosition { symbol: String },

    #[error("shorting disabled")]
    ShortingDisabled,

    #[error("safety violation: {kind}")]
    SafetyViolation { kind: SafetyViolationKind },

    #[error("rejected: pipeline is in monitor mode")]
    MonitorMode,

    #[error("invariant violation ({which}): {why}")]
    InvariantViolation { which: String, why: String },

    #[error("io failure: {why}")]
    IoFailure { why: String },

    #[error("data quality issue: {why}")]
    DataQuality { why: String },
}

/// Sub-kinds of `TradeError::SafetyViolation` (spec.md §4.D / §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyViolationKind {
    RiskPerTrade,
    Exposure,
    MaxOpenTrades,
    KillSwitch,
}

impl std::fmt::Display for SafetyViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SafetyViolationKind::RiskPerTrade => "risk_per_trade",
            SafetyViolationKind::Exposure => "exposure",
            SafetyViolationKind::MaxOpenTrades => "max_open",
            SafetyViolationKind::KillSwitch => "kill_switch",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn candle_rejects_bad_ohlc() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Candle::new(ts, 10.0, 9.0, 8.0, 9.5, 1.0).is_err());
    }

    #[test]
    fn candle_rejects_negative_volume() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(Candle::new(ts, 10.0, 11.0, 9.0, 10.0, -1.0).is_err());
    }

    #[test]
    fn symbol_validity() {
        assert!(!Symbol::new("").is_valid());
        assert!(!Symbol::new("UNKNOWN").is_valid());
        assert!(Symbol::new("BTCUSDT").is_valid());
    }

    #[test]
    fn side_from_signal() {
        assert_eq!(Side::from_signal("LONG").unwrap(), Side::Long);
        assert_eq!(Side::from_signal("SHORT").unwrap(), Side::Short);
        assert!(Side::from_signal("FLAT").is_err());
    }

    #[test]
    fn side_sign_and_opposite() {
        assert_eq!(Side::Long.sign(), 1.0);
        assert_eq!(Side::Sell.sign(), -1.0);
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }
}
