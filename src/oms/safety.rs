//! Safety Monitor — pre/post-trade limit checks, peak-equity drawdown
//! tracking, and the kill switch. Drawdown is measured from peak equity, not
//! session start, so a normal intra-session profit give-back never trips it.

use crate::types::{SafetyViolationKind, TradeError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Default name of the ambient kill-switch environment variable.
pub const DEFAULT_KILL_SWITCH_ENV_VAR: &str = "CRYPTOBOT_KILL_SWITCH";

fn env_flag_engaged(var_name: &str) -> bool {
    match std::env::var(var_name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub max_daily_loss_pct: f64,
    pub max_risk_per_trade_pct: f64,
    pub max_exposure_pct: f64,
    pub max_open_trades: usize,
    pub kill_switch_env_var: String,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: 0.02,
            max_risk_per_trade_pct: 0.02,
            max_exposure_pct: 0.5,
            max_open_trades: 5,
            kill_switch_env_var: DEFAULT_KILL_SWITCH_ENV_VAR.to_string(),
        }
    }
}

/// Process-wide ambient halt flag. The only legitimate mutable global state
/// in the pipeline — everything else is passed explicitly.
#[derive(Debug, Clone)]
pub struct KillSwitch(Arc<AtomicBool>);

impl KillSwitch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn engage(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_engaged(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SafetyMonitor {
    config: SafetyConfig,
    starting_equity: f64,
    peak_equity: f64,
    current_equity: f64,
    open_positions_count: usize,
    total_exposure: f64,
    halted: bool,
    kill_switch: KillSwitch,
}

impl SafetyMonitor {
    pub fn new(config: SafetyConfig, starting_equity: f64) -> Self {
        Self {
            config,
            starting_equity,
            peak_equity: starting_equity,
            current_equity: starting_equity,
            open_positions_count: 0,
            total_exposure: 0.0,
            halted: false,
            kill_switch: KillSwitch::new(),
        }
    }

    pub fn with_kill_switch(mut self, kill_switch: KillSwitch) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn peak_equity(&self) -> f64 {
        self.peak_equity
    }

    pub fn current_equity(&self) -> f64 {
        self.current_equity
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn kill_switch_engaged(&self) -> bool {
        self.halted
            || self.kill_switch.is_engaged()
            || env_flag_engaged(&self.config.kill_switch_env_var)
    }

    pub fn set_open_positions_count(&mut self, n: usize) {
        self.open_positions_count = n;
    }

    pub fn set_total_exposure(&mut self, exposure: f64) {
        self.total_exposure = exposure;
    }

    /// Reject when the kill switch is engaged, the trade's risk exceeds the
    /// per-trade cap, post-trade exposure exceeds the exposure cap, or the
    /// open-position count is already at the configured maximum.
    pub fn check_pre_trade(
        &self,
        risk_amount: f64,
        exposure_after: f64,
    ) -> Result<(), TradeError> {
        if self.kill_switch_engaged() {
            return Err(TradeError::SafetyViolation {
                kind: SafetyViolationKind::KillSwitch,
            });
        }
        if risk_amount > self.config.max_risk_per_trade_pct * self.current_equity {
            return Err(TradeError::SafetyViolation {
                kind: SafetyViolationKind::RiskPerTrade,
            });
        }
        if exposure_after > self.config.max_exposure_pct * self.current_equity {
            return Err(TradeError::SafetyViolation {
                kind: SafetyViolationKind::Exposure,
            });
        }
        if self.open_positions_count >= self.config.max_open_trades {
            return Err(TradeError::SafetyViolation {
                kind: SafetyViolationKind::MaxOpenTrades,
            });
        }
        Ok(())
    }

    /// Update peak/current equity and engage the kill switch if drawdown
    /// from peak crosses `max_daily_loss_pct`.
    pub fn check_post_trade(&mut self, new_equity: f64) {
        self.current_equity = new_equity;
        if new_equity > self.peak_equity {
            self.peak_equity = new_equity;
        }
        let drawdown = if self.peak_equity > 0.0 {
            (self.peak_equity - new_equity) / self.peak_equity
        } else {
            0.0
        };
        if drawdown >= self.config.max_daily_loss_pct {
            self.kill_switch.engage();
            self.halted = true;
            warn!(
                drawdown,
                peak_equity = self.peak_equity,
                current_equity = new_equity,
                "kill switch engaged: drawdown from peak exceeded max_daily_loss_pct"
            );
        }
    }

    pub fn starting_equity(&self) -> f64 {
        self.starting_equity
    }
}
