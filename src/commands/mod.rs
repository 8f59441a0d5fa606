//! CLI subcommands. Each module owns one subcommand's argument handling and
//! console output; the pipeline logic itself lives in the library crate.

pub mod backtest;
pub mod decay_check;
pub mod evolve;
pub mod optimize;
pub mod paper_run;

use tradecore::config::{Config, ExecutionModeSetting};
use tradecore::types::TradeError;

/// Maps to the process exit codes spec §6 defines: 0 success, 1 fatal
/// configuration error, 2 safety violation at startup, 3 invariant check
/// failed.
#[derive(Debug)]
pub enum CliError {
    Config(anyhow::Error),
    SafetyViolation(String),
    InvariantFailed(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 1,
            CliError::SafetyViolation(_) => 2,
            CliError::InvariantFailed(_) => 3,
        }
    }
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "configuration error: {e}"),
            CliError::SafetyViolation(why) => write!(f, "safety violation at startup: {why}"),
            CliError::InvariantFailed(why) => write!(f, "invariant check failed: {why}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Config(e)
    }
}

impl From<TradeError> for CliError {
    fn from(e: TradeError) -> Self {
        match &e {
            TradeError::InvariantViolation { .. } => CliError::InvariantFailed(e.to_string()),
            TradeError::SafetyViolation { .. } => CliError::SafetyViolation(e.to_string()),
            _ => CliError::Config(anyhow::anyhow!(e)),
        }
    }
}

/// Startup live-trading gate (spec §6 exit code 2): refuse to start in Live
/// mode unless the config has explicitly opted in via `allow_live_trading`.
/// No exchange credential check exists in this build (out of scope), so the
/// config flag is the only gate; per spec §9's resolved Open Question, Live
/// mode executes identically to DryRun once past this gate.
pub fn enforce_live_gate(config: &Config) -> Result<(), CliError> {
    if config.trading.mode == ExecutionModeSetting::Live && !config.trading.allow_live_trading {
        return Err(CliError::SafetyViolation(
            "mode is 'live' but trading.allow_live_trading is false".to_string(),
        ));
    }
    Ok(())
}

pub fn load_config(path: &str) -> Result<Config, CliError> {
    Config::from_file(path).map_err(CliError::from)
}
