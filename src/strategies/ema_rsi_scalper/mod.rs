//! EMA+RSI Scalper — default reference strategy implementation.

pub mod config;
pub mod strategy;

pub use config::EmaRsiScalperConfig;
pub use strategy::EmaRsiScalper;
