//! Decay Detector + Evolution Engine (component K). Read-only decay
//! scoring, then a candidate-ranking promotion decision in the style of
//! `mqk-promotion::evaluator` (threshold gate + reason list, tie-broken by a
//! composite score) — adapted here to rank historical parameter sets
//! instead of competing live strategies. K only ever touches strategy
//! profiles; risk/safety/trading-mode config is read-only from its view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;

use crate::history::{
    read_history, read_profile, write_profile, PerformanceHistoryEntry, ProfileMetrics, ProfileSource,
};
use crate::types::TradeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayStatus {
    Healthy,
    Degraded,
    NoData,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayThresholds {
    pub min_trades: u64,
    pub winrate_threshold_pct: f64,
    pub dd_threshold_pct: f64,
    pub lookback_days: i64,
}

impl Default for DecayThresholds {
    fn default() -> Self {
        Self {
            min_trades: 10,
            winrate_threshold_pct: 10.0,
            dd_threshold_pct: 10.0,
            lookback_days: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayReport {
    pub symbol: String,
    pub status: DecayStatus,
    pub current_winrate_pct: f64,
    pub current_dd_pct: f64,
    pub best_winrate_pct: Option<f64>,
    pub best_dd_pct: Option<f64>,
    pub winrate_drop: Option<f64>,
    pub dd_increase: Option<f64>,
}

/// Read-only decay scoring for one symbol (spec §4.K).
pub fn detect_decay(
    root: &Path,
    symbol: &str,
    thresholds: DecayThresholds,
) -> Result<DecayReport, TradeError> {
    let profile = match read_profile(root, symbol)? {
        Some(p) => p,
        None => {
            return Ok(DecayReport {
                symbol: symbol.to_string(),
                status: DecayStatus::NoData,
                current_winrate_pct: 0.0,
                current_dd_pct: 0.0,
                best_winrate_pct: None,
                best_dd_pct: None,
                winrate_drop: None,
                dd_increase: None,
            })
        }
    };

    if profile.metrics.trades < thresholds.min_trades {
        return Ok(DecayReport {
            symbol: symbol.to_string(),
            status: DecayStatus::NoData,
            current_winrate_pct: profile.metrics.win_rate_pct,
            current_dd_pct: profile.metrics.max_drawdown_pct,
            best_winrate_pct: None,
            best_dd_pct: None,
            winrate_drop: None,
            dd_increase: None,
        });
    }

    let history = read_history(root)?;
    let cutoff = Utc::now() - chrono::Duration::days(thresholds.lookback_days);

    let qualifying: Vec<&ProfileMetrics> = history
        .iter()
        .filter(|entry| entry.created_at >= cutoff)
        .flat_map(|entry| &entry.profiles)
        .filter(|p| p.symbol == symbol && p.metrics.trades >= thresholds.min_trades)
        .map(|p| &p.metrics)
        .collect();

    if qualifying.is_empty() {
        return Ok(DecayReport {
            symbol: symbol.to_string(),
            status: DecayStatus::NoData,
            current_winrate_pct: profile.metrics.win_rate_pct,
            current_dd_pct: profile.metrics.max_drawdown_pct,
            best_winrate_pct: None,
            best_dd_pct: None,
            winrate_drop: None,
            dd_increase: None,
        });
    }

    let best_winrate = qualifying.iter().map(|m| m.win_rate_pct).fold(f64::MIN, f64::max);
    let best_dd = qualifying.iter().map(|m| m.max_drawdown_pct).fold(f64::MAX, f64::min);

    let winrate_drop = best_winrate - profile.metrics.win_rate_pct;
    let dd_increase = profile.metrics.max_drawdown_pct - best_dd;

    let status = if winrate_drop > thresholds.winrate_threshold_pct || dd_increase > thresholds.dd_threshold_pct {
        DecayStatus::Degraded
    } else {
        DecayStatus::Healthy
    };

    Ok(DecayReport {
        symbol: symbol.to_string(),
        status,
        current_winrate_pct: profile.metrics.win_rate_pct,
        current_dd_pct: profile.metrics.max_drawdown_pct,
        best_winrate_pct: Some(best_winrate),
        best_dd_pct: Some(best_dd),
        winrate_drop: Some(winrate_drop),
        dd_increase: Some(dd_increase),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionDecision {
    Skip,
    Reject,
    Apply,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionThresholds {
    pub decay: DecayThresholds,
    pub min_trades: u64,
    pub min_return_pct: f64,
    pub max_dd_pct: f64,
    pub min_improvement_return_pct: f64,
    pub max_allowed_dd_increase_pct: f64,
    pub trigger_statuses: Vec<DecayStatus>,
}

impl Default for EvolutionThresholds {
    fn default() -> Self {
        Self {
            decay: DecayThresholds::default(),
            min_trades: 10,
            min_return_pct: 0.0,
            max_dd_pct: 25.0,
            min_improvement_return_pct: 2.0,
            max_allowed_dd_increase_pct: 5.0,
            trigger_statuses: vec![DecayStatus::Degraded],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionRecord {
    pub symbol: String,
    pub decided_at: DateTime<Utc>,
    pub decision: EvolutionDecision,
    pub reason: String,
    pub applied: bool,
    pub old_params: serde_json::Value,
    pub new_params: Option<serde_json::Value>,
    pub old_metrics: ProfileMetrics,
    pub new_metrics: Option<ProfileMetrics>,
}

fn candidate_score(m: &ProfileMetrics) -> (f64, f64) {
    (-m.total_return_pct, m.max_drawdown_pct)
}

fn rank_candidates(a: &ProfileMetrics, b: &ProfileMetrics) -> Ordering {
    candidate_score(a)
        .partial_cmp(&candidate_score(b))
        .unwrap_or(Ordering::Equal)
}

/// Run the evolution engine for one symbol. `live` selects whether an
/// `Apply` decision actually overwrites the profile (false = dry-run, the
/// default) or only logs the decision.
pub fn evolve_symbol(
    root: &Path,
    symbol: &str,
    strategy: &str,
    thresholds: &EvolutionThresholds,
    live: bool,
) -> Result<EvolutionRecord, TradeError> {
    let profile = read_profile(root, symbol)?.ok_or_else(|| TradeError::DataQuality {
        why: format!("no strategy profile for {symbol}"),
    })?;

    let decay = detect_decay(root, symbol, thresholds.decay)?;
    if !thresholds.trigger_statuses.contains(&decay.status) {
        let record = EvolutionRecord {
            symbol: symbol.to_string(),
            decided_at: Utc::now(),
            decision: EvolutionDecision::Skip,
            reason: format!("decay status {:?} not in trigger set", decay.status),
            applied: false,
            old_params: profile.params.clone(),
            new_params: None,
            old_metrics: profile.metrics.clone(),
            new_metrics: None,
        };
        append_audit_entry(root, &record)?;
        return Ok(record);
    }

    let history = read_history(root)?;
    let cutoff = Utc::now() - chrono::Duration::days(thresholds.decay.lookback_days as i64);

    let mut candidates: Vec<(serde_json::Value, ProfileMetrics)> = history
        .iter()
        .filter(|entry| entry.created_at >= cutoff && entry.strategy == strategy)
        .flat_map(|entry| &entry.profiles)
        .filter(|p| p.symbol == symbol)
        .filter(|p| {
            p.metrics.trades >= thresholds.min_trades
                && p.metrics.total_return_pct >= thresholds.min_return_pct
                && p.metrics.max_drawdown_pct <= thresholds.max_dd_pct
        })
        .map(|p| (p.params.clone(), p.metrics.clone()))
        .collect();

    candidates.sort_by(|a, b| rank_candidates(&a.1, &b.1));

    let best = match candidates.first() {
        Some(c) => c.clone(),
        None => {
            let record = EvolutionRecord {
                symbol: symbol.to_string(),
                decided_at: Utc::now(),
                decision: EvolutionDecision::Reject,
                reason: "no qualifying candidates in history window".to_string(),
                applied: false,
                old_params: profile.params.clone(),
                new_params: None,
                old_metrics: profile.metrics.clone(),
                new_metrics: None,
            };
            append_audit_entry(root, &record)?;
            return Ok(record);
        }
    };

    let return_improvement = best.1.total_return_pct - profile.metrics.total_return_pct;
    if return_improvement < thresholds.min_improvement_return_pct {
        let record = EvolutionRecord {
            symbol: symbol.to_string(),
            decided_at: Utc::now(),
            decision: EvolutionDecision::Reject,
            reason: format!("insufficient_improvement: {return_improvement:.4} < {:.4}", thresholds.min_improvement_return_pct),
            applied: false,
            old_params: profile.params.clone(),
            new_params: Some(best.0),
            old_metrics: profile.metrics.clone(),
            new_metrics: Some(best.1),
        };
        append_audit_entry(root, &record)?;
        return Ok(record);
    }

    let dd_increase = best.1.max_drawdown_pct - profile.metrics.max_drawdown_pct;
    if dd_increase > thresholds.max_allowed_dd_increase_pct {
        let record = EvolutionRecord {
            symbol: symbol.to_string(),
            decided_at: Utc::now(),
            decision: EvolutionDecision::Reject,
            reason: format!("drawdown_regression: {dd_increase:.4} > {:.4}", thresholds.max_allowed_dd_increase_pct),
            applied: false,
            old_params: profile.params.clone(),
            new_params: Some(best.0),
            old_metrics: profile.metrics.clone(),
            new_metrics: Some(best.1),
        };
        append_audit_entry(root, &record)?;
        return Ok(record);
    }

    let mut applied = false;
    if live {
        let mut updated = profile.clone();
        updated.params = best.0.clone();
        updated.metrics = best.1.clone();
        write_profile(root, updated, ProfileSource::AutoEvolution, None)?;
        applied = true;
    }

    let record = EvolutionRecord {
        symbol: symbol.to_string(),
        decided_at: Utc::now(),
        decision: EvolutionDecision::Apply,
        reason: if live {
            "applied: profile archived and overwritten".to_string()
        } else {
            "dry-run: decision logged, profile unchanged".to_string()
        },
        applied,
        old_params: profile.params.clone(),
        new_params: Some(best.0),
        old_metrics: profile.metrics.clone(),
        new_metrics: Some(best.1),
    };
    append_audit_entry(root, &record)?;
    Ok(record)
}

/// One JSON file per symbol per decision under `logs/evolution_audit/`.
fn append_audit_entry(root: &Path, record: &EvolutionRecord) -> Result<(), TradeError> {
    let dir = root.join("logs").join("evolution_audit");
    std::fs::create_dir_all(&dir).map_err(|e| TradeError::IoFailure {
        why: format!("create evolution audit dir {dir:?}: {e}"),
    })?;
    let path = dir.join(format!(
        "{}_{}.json",
        record.symbol,
        record.decided_at.format("%Y%m%dT%H%M%S%.fZ")
    ));
    let json = serde_json::to_string_pretty(record).map_err(|e| TradeError::IoFailure {
        why: format!("serialize evolution audit record: {e}"),
    })?;
    std::fs::write(&path, json).map_err(|e| TradeError::IoFailure {
        why: format!("write evolution audit record {path:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ProfileMeta, ProfileRunEntry, StrategyProfile, WindowSpec};
    use tempfile::tempdir;

    fn seed_profile(root: &Path, symbol: &str, win_rate: f64, dd: f64, ret: f64, trades: u64) {
        let profile = StrategyProfile {
            symbol: symbol.to_string(),
            strategy: "ema_rsi_scalper".to_string(),
            enabled: true,
            params: serde_json::json!({"ema_fast": 9}),
            meta: ProfileMeta::default(),
            metrics: ProfileMetrics {
                trades,
                win_rate_pct: win_rate,
                total_return_pct: ret,
                max_drawdown_pct: dd,
                avg_r_multiple: 0.0,
                sample_period_days: 30.0,
            },
        };
        write_profile(root, profile, ProfileSource::Manual, None).unwrap();
    }

    fn seed_history(root: &Path, symbol: &str, params: serde_json::Value, win_rate: f64, dd: f64, ret: f64, trades: u64) {
        let now = Utc::now();
        let entry = PerformanceHistoryEntry {
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            strategy: "ema_rsi_scalper".to_string(),
            symbols: vec![symbol.to_string()],
            window: WindowSpec {
                start: now,
                end: now,
                interval: "1h".to_string(),
            },
            risk_config_snapshot: serde_json::json!({}),
            trailing_stop: None,
            profiles: vec![ProfileRunEntry {
                symbol: symbol.to_string(),
                params,
                metrics: ProfileMetrics {
                    trades,
                    win_rate_pct: win_rate,
                    total_return_pct: ret,
                    max_drawdown_pct: dd,
                    avg_r_multiple: 0.0,
                    sample_period_days: 30.0,
                },
                ranked_position: 1,
                selected_for_live: false,
            }],
        };
        crate::history::append_history_entry(root, &entry).unwrap();
    }

    #[test]
    fn skips_when_healthy() {
        let dir = tempdir().unwrap();
        seed_profile(dir.path(), "BTCUSDT", 60.0, 5.0, 10.0, 20);
        seed_history(dir.path(), "BTCUSDT", serde_json::json!({}), 55.0, 6.0, 8.0, 20);

        let thresholds = EvolutionThresholds::default();
        let record = evolve_symbol(dir.path(), "BTCUSDT", "ema_rsi_scalper", &thresholds, false).unwrap();
        assert_eq!(record.decision, EvolutionDecision::Skip);
    }

    #[test]
    fn applies_in_dry_run_without_touching_profile() {
        let dir = tempdir().unwrap();
        seed_profile(dir.path(), "BTCUSDT", 40.0, 20.0, 2.0, 20);
        seed_history(
            dir.path(),
            "BTCUSDT",
            serde_json::json!({"ema_fast": 5}),
            70.0,
            8.0,
            15.0,
            20,
        );

        let thresholds = EvolutionThresholds::default();
        let record = evolve_symbol(dir.path(), "BTCUSDT", "ema_rsi_scalper", &thresholds, false).unwrap();
        assert_eq!(record.decision, EvolutionDecision::Apply);
        assert!(!record.applied);

        let profile = read_profile(dir.path(), "BTCUSDT").unwrap().unwrap();
        assert_eq!(profile.params, serde_json::json!({"ema_fast": 9}));
    }

    #[test]
    fn applies_live_and_overwrites_profile() {
        let dir = tempdir().unwrap();
        seed_profile(dir.path(), "BTCUSDT", 40.0, 20.0, 2.0, 20);
        seed_history(
            dir.path(),
            "BTCUSDT",
            serde_json::json!({"ema_fast": 5}),
            70.0,
            8.0,
            15.0,
            20,
        );

        let thresholds = EvolutionThresholds::default();
        let record = evolve_symbol(dir.path(), "BTCUSDT", "ema_rsi_scalper", &thresholds, true).unwrap();
        assert_eq!(record.decision, EvolutionDecision::Apply);
        assert!(record.applied);

        let profile = read_profile(dir.path(), "BTCUSDT").unwrap().unwrap();
        assert_eq!(profile.params, serde_json::json!({"ema_fast": 5}));
    }

    #[test]
    fn rejects_insufficient_improvement() {
        let dir = tempdir().unwrap();
        seed_profile(dir.path(), "BTCUSDT", 40.0, 20.0, 10.0, 20);
        seed_history(
            dir.path(),
            "BTCUSDT",
            serde_json::json!({"ema_fast": 5}),
            45.0,
            19.0,
            10.5,
            20,
        );

        let thresholds = EvolutionThresholds::default();
        let record = evolve_symbol(dir.path(), "BTCUSDT", "ema_rsi_scalper", &thresholds, false).unwrap();
        assert_eq!(record.decision, EvolutionDecision::Reject);
        assert!(record.reason.contains("insufficient_improvement"));
    }
}
