//! Evolve command: run the evolution engine (spec §4.K) for one or more
//! symbols. Dry-run by default; `--live` lets an `Apply` decision actually
//! archive-and-overwrite the strategy profile.

use tradecore::evolution::{evolve_symbol, EvolutionDecision, EvolutionThresholds};

use super::CliError;

pub fn run(symbols: String, strategy: String, live: bool, min_improvement_return_pct: f64, max_allowed_dd_increase_pct: f64) -> Result<(), CliError> {
    let thresholds = EvolutionThresholds {
        min_improvement_return_pct,
        max_allowed_dd_increase_pct,
        ..EvolutionThresholds::default()
    };

    for symbol in symbols.split(',').map(|s| s.trim()) {
        let record = evolve_symbol(std::path::Path::new("."), symbol, &strategy, &thresholds, live)?;
        match record.decision {
            EvolutionDecision::Skip => println!("{symbol}: SKIP — {}", record.reason),
            EvolutionDecision::Reject => println!("{symbol}: REJECT — {}", record.reason),
            EvolutionDecision::Apply => println!(
                "{symbol}: APPLY ({}) — {}",
                if record.applied { "applied" } else { "dry-run" },
                record.reason
            ),
        }
    }
    Ok(())
}
