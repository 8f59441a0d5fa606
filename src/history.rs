//! Performance History & Profile Store (component J). Two append-only /
//! versioned JSON surfaces: the run history (newline-delimited, append-only)
//! and per-symbol strategy profiles (versioned, archived on every write).
//! Atomic writes follow the teacher's temp-file-then-rename convention, same
//! as `mqk-audit`'s `AuditWriter` in the broader corpus — simplified here to
//! drop the hash chain, which this spec does not ask for.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TradeError;

pub const HISTORY_PATH: &str = "logs/performance_history/history.jsonl";
pub const PROFILES_DIR: &str = "config/strategy_profiles";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRunEntry {
    pub symbol: String,
    pub params: serde_json::Value,
    pub metrics: ProfileMetrics,
    pub ranked_position: usize,
    pub selected_for_live: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceHistoryEntry {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub strategy: String,
    pub symbols: Vec<String>,
    pub window: WindowSpec,
    pub risk_config_snapshot: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop: Option<f64>,
    pub profiles: Vec<ProfileRunEntry>,
}

/// Append one entry to the history NDJSON log. Atomic: write to a unique
/// temp path in the same directory, then rename over the real path by
/// copying existing content first (rename can't append, so this reads the
/// current file, appends the new line, and swaps the whole file in).
pub fn append_history_entry(root: &Path, entry: &PerformanceHistoryEntry) -> Result<(), TradeError> {
    let path = root.join(HISTORY_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TradeError::IoFailure {
            why: format!("create history dir {parent:?}: {e}"),
        })?;
    }

    let line = serde_json::to_string(entry).map_err(|e| TradeError::IoFailure {
        why: format!("serialize history entry: {e}"),
    })?;

    let tmp_path = path.with_extension(format!("jsonl.tmp.{}", uuid::Uuid::new_v4()));
    {
        let mut tmp = File::create(&tmp_path).map_err(|e| TradeError::IoFailure {
            why: format!("create history temp file {tmp_path:?}: {e}"),
        })?;
        if path.exists() {
            let existing = fs::read(&path).map_err(|e| TradeError::IoFailure {
                why: format!("read existing history file: {e}"),
            })?;
            tmp.write_all(&existing).map_err(|e| TradeError::IoFailure {
                why: format!("copy existing history into temp file: {e}"),
            })?;
        }
        writeln!(tmp, "{line}").map_err(|e| TradeError::IoFailure {
            why: format!("append history line to temp file: {e}"),
        })?;
        tmp.flush().map_err(|e| TradeError::IoFailure {
            why: format!("flush history temp file: {e}"),
        })?;
    }
    fs::rename(&tmp_path, &path).map_err(|e| TradeError::IoFailure {
        why: format!("rename history temp file into place: {e}"),
    })?;
    Ok(())
}

pub fn read_history(root: &Path) -> Result<Vec<PerformanceHistoryEntry>, TradeError> {
    let path = root.join(HISTORY_PATH);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(&path).map_err(|e| TradeError::IoFailure {
        why: format!("open history file {path:?}: {e}"),
    })?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TradeError::IoFailure {
            why: format!("read history line {i}: {e}"),
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: PerformanceHistoryEntry =
            serde_json::from_str(&line).map_err(|e| TradeError::DataQuality {
                why: format!("parse history line {i}: {e}"),
            })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileSource {
    Manual,
    Optimizer,
    AutoEvolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_source")]
    pub source: ProfileSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub notes: String,
}

fn default_version() -> u32 {
    1
}

fn default_source() -> ProfileSource {
    ProfileSource::Manual
}

impl Default for ProfileMeta {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: 1,
            created_at: now,
            updated_at: now,
            source: ProfileSource::Manual,
            run_id: None,
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileMetrics {
    pub trades: u64,
    pub win_rate_pct: f64,
    pub total_return_pct: f64,
    pub max_drawdown_pct: f64,
    pub avg_r_multiple: f64,
    pub sample_period_days: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub symbol: String,
    pub strategy: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub meta: ProfileMeta,
    #[serde(default)]
    pub metrics: ProfileMetrics,
}

fn default_enabled() -> bool {
    true
}

fn profile_path(root: &Path, symbol: &str) -> PathBuf {
    root.join(PROFILES_DIR).join(format!("{symbol}.json"))
}

fn archive_path(root: &Path, symbol: &str, at: DateTime<Utc>) -> PathBuf {
    root.join(PROFILES_DIR)
        .join("archive")
        .join(format!("{symbol}_profile_{}.json", at.format("%Y%m%dT%H%M%SZ")))
}

/// Read a profile, filling in default `meta`/`metrics` if the file predates
/// those sections (backward compatibility with unversioned legacy profiles).
pub fn read_profile(root: &Path, symbol: &str) -> Result<Option<StrategyProfile>, TradeError> {
    let path = profile_path(root, symbol);
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(&path).map_err(|e| TradeError::IoFailure {
        why: format!("read profile {path:?}: {e}"),
    })?;
    let profile: StrategyProfile = serde_json::from_str(&contents).map_err(|e| TradeError::DataQuality {
        why: format!("parse profile {path:?}: {e}"),
    })?;
    Ok(Some(profile))
}

/// Write a profile: archive the existing file first (if any), then
/// overwrite via temp+rename, bumping `meta.version`/`updated_at`/`source`/
/// `run_id`. Per spec §5, per-symbol writes are serialized by the caller
/// (the evolution engine processes one symbol at a time).
pub fn write_profile(
    root: &Path,
    mut profile: StrategyProfile,
    source: ProfileSource,
    run_id: Option<String>,
) -> Result<StrategyProfile, TradeError> {
    let path = profile_path(root, &profile.symbol);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| TradeError::IoFailure {
            why: format!("create profiles dir {parent:?}: {e}"),
        })?;
    }

    let now = Utc::now();
    if path.exists() {
        let archive_to = archive_path(root, &profile.symbol, now);
        if let Some(parent) = archive_to.parent() {
            fs::create_dir_all(parent).map_err(|e| TradeError::IoFailure {
                why: format!("create archive dir {parent:?}: {e}"),
            })?;
        }
        fs::copy(&path, &archive_to).map_err(|e| TradeError::IoFailure {
            why: format!("archive existing profile {path:?} -> {archive_to:?}: {e}"),
        })?;
    }

    profile.meta.version += 1;
    profile.meta.updated_at = now;
    profile.meta.source = source;
    profile.meta.run_id = run_id;

    let json = serde_json::to_string_pretty(&profile).map_err(|e| TradeError::IoFailure {
        why: format!("serialize profile: {e}"),
    })?;
    let tmp_path = path.with_extension(format!("json.tmp.{}", uuid::Uuid::new_v4()));
    fs::write(&tmp_path, json).map_err(|e| TradeError::IoFailure {
        why: format!("write profile temp file {tmp_path:?}: {e}"),
    })?;
    fs::rename(&tmp_path, &path).map_err(|e| TradeError::IoFailure {
        why: format!("rename profile temp file into place: {e}"),
    })?;

    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_entry() -> PerformanceHistoryEntry {
        let now = Utc::now();
        PerformanceHistoryEntry {
            run_id: "run-1".into(),
            created_at: now,
            strategy: "ema_rsi_scalper".into(),
            symbols: vec!["BTCUSDT".into()],
            window: WindowSpec {
                start: now,
                end: now,
                interval: "1h".into(),
            },
            risk_config_snapshot: serde_json::json!({}),
            trailing_stop: None,
            profiles: vec![ProfileRunEntry {
                symbol: "BTCUSDT".into(),
                params: serde_json::json!({}),
                metrics: ProfileMetrics::default(),
                ranked_position: 1,
                selected_for_live: true,
            }],
        }
    }

    #[test]
    fn history_appends_without_clobbering_prior_lines() {
        let dir = tempdir().unwrap();
        append_history_entry(dir.path(), &sample_entry()).unwrap();
        append_history_entry(dir.path(), &sample_entry()).unwrap();
        let entries = read_history(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn profile_write_archives_the_prior_version_and_bumps_version() {
        let dir = tempdir().unwrap();
        let profile = StrategyProfile {
            symbol: "BTCUSDT".into(),
            strategy: "ema_rsi_scalper".into(),
            enabled: true,
            params: serde_json::json!({"ema_fast": 9}),
            meta: ProfileMeta::default(),
            metrics: ProfileMetrics::default(),
        };
        let v1 = write_profile(dir.path(), profile, ProfileSource::Manual, None).unwrap();
        assert_eq!(v1.meta.version, 2);

        let mut v2_input = v1.clone();
        v2_input.params = serde_json::json!({"ema_fast": 12});
        let v2 = write_profile(dir.path(), v2_input, ProfileSource::Optimizer, Some("run-2".into())).unwrap();
        assert_eq!(v2.meta.version, 3);
        assert_eq!(v2.meta.source, ProfileSource::Optimizer);

        let archive_dir = dir.path().join(PROFILES_DIR).join("archive");
        let archived: Vec<_> = fs::read_dir(&archive_dir).unwrap().collect();
        assert_eq!(archived.len(), 1);
    }

    #[test]
    fn read_profile_fills_defaults_for_legacy_files_without_meta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(PROFILES_DIR).join("ETHUSDT.json");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"symbol":"ETHUSDT","strategy":"ema_rsi_scalper"}"#).unwrap();

        let profile = read_profile(dir.path(), "ETHUSDT").unwrap().unwrap();
        assert!(profile.enabled);
        assert_eq!(profile.meta.version, 1);
        assert_eq!(profile.metrics.trades, 0);
    }
}
