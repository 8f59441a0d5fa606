//! Deterministic crypto strategy trading framework: signal -> risk ->
//! execution -> accounting -> evolution, over historical or synthetic OHLCV
//! data, with paper accounting, backtesting, parameter optimization, and
//! strategy decay detection/evolution.

pub mod analyzer;
pub mod backtest;
pub mod common;
pub mod config;
pub mod data;
pub mod evolution;
pub mod history;
pub mod indicators;
pub mod money;
pub mod oms;
pub mod optimizer;
pub mod strategies;
pub mod types;

pub use config::Config;
pub use oms::{ExecutionEngine, Mode, PaperAccount, RiskEngine, SafetyMonitor, Venue};
pub use strategies::{create_strategy, Strategy};
pub use types::*;
