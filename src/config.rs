//! Replay configuration: which pair and day to process, where the input files
//! live, and which time windows to reconstruct.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, TimeDelta};
use serde::Deserialize;
use thiserror::Error;

use crate::engine::{EmptySidePolicy, IngestConfig};
use crate::parser::naive_to_nanos;
use crate::types::Timestamp;

/// Default render channel depth; a handful of windows in flight is plenty.
const DEFAULT_CHANNEL_CAPACITY: usize = 4;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One time window: `[start, end)` hours of the configured date, replayed
/// from the named snapshot file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowSpec {
    pub start: u32,
    pub end: u32,
    pub snapshot: String,
}

impl WindowSpec {
    pub fn label(&self) -> String {
        format!("{}-{}", self.start, self.end)
    }
}

/// Settings for a replay run, loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayConfig {
    /// Exchange prefix of delta file names, e.g. `FTX`.
    pub exchange: String,
    /// Instrument, e.g. `MTA-PERP`.
    pub pair: String,
    /// Trading day as `YYYY-MM-DD`.
    pub date: String,
    pub snapshot_dir: PathBuf,
    pub delta_dir: PathBuf,
    pub output_dir: PathBuf,
    pub windows: Vec<WindowSpec>,

    #[serde(default)]
    pub empty_side_policy: EmptySidePolicy,
    #[serde(default)]
    pub strict_order: bool,
    /// Levels kept per side when seeding from the snapshot; 0 keeps all.
    #[serde(default)]
    pub snapshot_depth: usize,
    #[serde(default = "default_tier")]
    pub bid_tier: f64,
    #[serde(default = "default_tier")]
    pub ask_tier: f64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_tier() -> f64 {
    1.0
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

impl ReplayConfig {
    /// Read, parse and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: ReplayConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.exchange.trim().is_empty() {
            return invalid("`exchange` is empty".to_string());
        }
        if self.pair.trim().is_empty() {
            return invalid("`pair` is empty".to_string());
        }
        self.day()?;
        if self.windows.is_empty() {
            return invalid("no windows configured".to_string());
        }
        for window in &self.windows {
            if window.end > 23 || window.start >= window.end {
                return invalid(format!("window {} is not a valid hour range", window.label()));
            }
            if window.snapshot.trim().is_empty() {
                return invalid(format!("window {} has no snapshot", window.label()));
            }
        }
        if self.channel_capacity == 0 {
            return invalid("`channel_capacity` must be positive".to_string());
        }
        if !(self.bid_tier.is_finite() && self.ask_tier.is_finite()) {
            return invalid("plot tiers must be finite".to_string());
        }
        Ok(())
    }

    fn day(&self) -> Result<NaiveDate, ConfigError> {
        NaiveDate::parse_from_str(&self.date, "%Y-%m-%d")
            .map_err(|e| ConfigError::Invalid(format!("`date` {:?}: {e}", self.date)))
    }

    /// `<delta_dir>/<EXCHANGE>_<PAIR>_delta_<date> <start>:00:00_<date> <end>:00:00.csv`
    pub fn delta_path(&self, window: &WindowSpec) -> PathBuf {
        let date = &self.date;
        self.delta_dir.join(format!(
            "{}_{}_delta_{date} {}:00:00_{date} {}:00:00.csv",
            self.exchange, self.pair, window.start, window.end
        ))
    }

    pub fn snapshot_path(&self, window: &WindowSpec) -> PathBuf {
        self.snapshot_dir.join(&window.snapshot)
    }

    /// `<output_dir>/<PAIR>_<date>_<start>_<end>.ppm`
    pub fn output_path(&self, window: &WindowSpec) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}_{}_{}.ppm",
            self.pair, self.date, window.start, window.end
        ))
    }

    /// Naive `<date> <end>:00:00` in nanoseconds.
    pub fn end_cutoff(&self, window: &WindowSpec) -> Result<Timestamp, ConfigError> {
        let midnight = self.day()?.and_hms_opt(0, 0, 0).ok_or_else(|| {
            ConfigError::Invalid(format!("`date` {:?} has no midnight", self.date))
        })?;
        let end = midnight + TimeDelta::hours(i64::from(window.end));
        naive_to_nanos(end).map_err(ConfigError::Invalid)
    }

    /// Ingestion parameters for a window whose book starts at `start`.
    pub fn ingest_config(&self, window: &WindowSpec, start: Timestamp) -> Result<IngestConfig, ConfigError> {
        Ok(IngestConfig {
            end: self.end_cutoff(window)?,
            start,
            empty_side: self.empty_side_policy,
            strict_order: self.strict_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "exchange": "FTX",
        "pair": "MTA-PERP",
        "date": "2020-09-13",
        "snapshot_dir": "data/snapshots/book-FTX-MTA-PERP",
        "delta_dir": "data/deltas/book-FTX-MTA-PERP",
        "output_dir": "data/book",
        "windows": [
            {"start": 0, "end": 4, "snapshot": "snap_0.json"},
            {"start": 20, "end": 23, "snapshot": "snap_20.json"}
        ],
        "empty_side_policy": "fail"
    }"#;

    #[test]
    fn test_load_defaults() {
        let config = ReplayConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.windows.len(), 2);
        assert_eq!(config.empty_side_policy, EmptySidePolicy::Fail);
        assert!(!config.strict_order);
        assert_eq!(config.snapshot_depth, 0);
        assert_eq!(config.bid_tier, 1.0);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_paths() {
        let config = ReplayConfig::from_json(SAMPLE).unwrap();
        let window = &config.windows[0];
        assert_eq!(
            config.delta_path(window),
            Path::new("data/deltas/book-FTX-MTA-PERP/FTX_MTA-PERP_delta_2020-09-13 0:00:00_2020-09-13 4:00:00.csv")
        );
        assert_eq!(
            config.snapshot_path(window),
            Path::new("data/snapshots/book-FTX-MTA-PERP/snap_0.json")
        );
        assert_eq!(config.output_path(window), Path::new("data/book/MTA-PERP_2020-09-13_0_4.ppm"));
    }

    #[test]
    fn test_end_cutoff() {
        let config = ReplayConfig::from_json(SAMPLE).unwrap();
        let midnight = crate::parser::parse_timestamp("2020-09-13 00:00:00").unwrap();
        let hour = 3_600_000_000_000u64;
        assert_eq!(config.end_cutoff(&config.windows[0]).unwrap(), midnight + 4 * hour);
        assert_eq!(config.end_cutoff(&config.windows[1]).unwrap(), midnight + 23 * hour);

        let ingest = config.ingest_config(&config.windows[0], midnight).unwrap();
        assert_eq!(ingest.start, midnight);
        assert_eq!(ingest.empty_side, EmptySidePolicy::Fail);
    }

    #[test]
    fn test_rejects_bad_windows() {
        let bad = SAMPLE.replace("\"start\": 20", "\"start\": 24");
        assert!(matches!(ReplayConfig::from_json(&bad), Err(ConfigError::Invalid(_))));
        let bad = SAMPLE.replace("\"end\": 23", "\"end\": 24");
        assert!(matches!(ReplayConfig::from_json(&bad), Err(ConfigError::Invalid(_))));
        let bad = SAMPLE.replace("\"end\": 4", "\"end\": 0");
        assert!(matches!(ReplayConfig::from_json(&bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_date_and_unknown_fields() {
        let bad = SAMPLE.replace("2020-09-13", "09-13");
        assert!(matches!(ReplayConfig::from_json(&bad), Err(ConfigError::Invalid(_))));
        let bad = SAMPLE.replace("\"exchange\"", "\"venue\"");
        assert!(matches!(ReplayConfig::from_json(&bad), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = ReplayConfig::load("/nonexistent/replay.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
