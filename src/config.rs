//! Configuration — three JSON-backed concerns consumed by the core (spec §6):
//! trading mode, risk, and an opaque strategy-profile-params bag. Loading
//! mechanics mirror the teacher's `Config::from_file`; the credentials an
//! exchange integration would need are out of scope, so only the
//! kill-switch env var and data-dir overrides are read from the process
//! environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::oms::safety::DEFAULT_KILL_SWITCH_ENV_VAR;

/// (a) Trading mode configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingModeConfig {
    pub mode: ExecutionModeSetting,
    #[serde(default)]
    pub allow_live_trading: bool,
    pub max_daily_loss_pct: f64,
    pub max_risk_per_trade_pct: f64,
    pub max_exposure_pct: f64,
    pub max_open_trades: usize,
    #[serde(default = "default_kill_switch_env_var")]
    pub kill_switch_env_var: String,
}

fn default_kill_switch_env_var() -> String {
    DEFAULT_KILL_SWITCH_ENV_VAR.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionModeSetting {
    Monitor,
    Paper,
    DryRun,
    Live,
}

impl Default for TradingModeConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionModeSetting::Paper,
            allow_live_trading: false,
            max_daily_loss_pct: 0.02,
            max_risk_per_trade_pct: 0.02,
            max_exposure_pct: 0.5,
            max_open_trades: 5,
            kill_switch_env_var: default_kill_switch_env_var(),
        }
    }
}

/// (b) Risk configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfigSection {
    pub base_account_size: f64,
    pub default_risk_per_trade: f64,
    pub max_exposure: f64,
    pub default_slippage: f64,
    pub min_position_size_usd: f64,
    #[serde(default)]
    pub enable_trailing_stop: bool,
    #[serde(default = "default_trailing_stop_pct")]
    pub trailing_stop_pct: f64,
}

fn default_trailing_stop_pct() -> f64 {
    0.02
}

impl Default for RiskConfigSection {
    fn default() -> Self {
        Self {
            base_account_size: 10_000.0,
            default_risk_per_trade: 0.01,
            max_exposure: 0.5,
            default_slippage: 0.0005,
            min_position_size_usd: 10.0,
            enable_trailing_stop: false,
            trailing_stop_pct: default_trailing_stop_pct(),
        }
    }
}

/// Top-level configuration consumed by the core: trading mode, risk, and the
/// strategy name + opaque param bag (c). Commission rate and log directory
/// round out what the backtest runner and accounting engine need to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trading: TradingModeConfig,
    pub risk: RiskConfigSection,
    #[serde(default = "default_strategy_name")]
    pub strategy_name: String,
    /// (c) opaque strategy-profile params, passed through verbatim to the
    /// strategy's `evaluate`.
    #[serde(default)]
    pub strategy: serde_json::Value,
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    #[serde(default)]
    pub allow_shorting: bool,
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Grid search overrides for optimization (optional); each key is a
    /// strategy param name, value is the list of candidates to test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<std::collections::HashMap<String, Vec<serde_json::Value>>>,
}

fn default_strategy_name() -> String {
    "ema_rsi_scalper".to_string()
}

fn default_commission_rate() -> f64 {
    0.0005
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trading: TradingModeConfig::default(),
            risk: RiskConfigSection::default(),
            strategy_name: default_strategy_name(),
            strategy: serde_json::json!({}),
            commission_rate: default_commission_rate(),
            allow_shorting: false,
            log_dir: None,
            grid: None,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let config: Config = serde_json::from_str(&contents).context("failed to parse config JSON")?;
        Ok(config)
    }

    /// Materialize this config with `strategy` patched to `overrides`, write
    /// it to a temp file, and return the path. Callers must delete the path
    /// unconditionally (scoped acquisition, spec §4.I / §9).
    pub fn write_scoped_override(&self, overrides: &serde_json::Value, dir: &Path) -> Result<std::path::PathBuf> {
        let mut clone = self.clone();
        clone.strategy = overrides.clone();
        std::fs::create_dir_all(dir).context("failed to create scoped config dir")?;
        let path = dir.join(format!("override_{}.json", uuid::Uuid::new_v4()));
        let json = serde_json::to_string_pretty(&clone).context("failed to serialize scoped config")?;
        std::fs::write(&path, json).context("failed to write scoped config")?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.strategy_name, config.strategy_name);
    }
}
