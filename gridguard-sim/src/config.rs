//! Serializable simulation configuration.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use gridguard_core::config::GuardConfig;
use gridguard_core::domain::instrument::{Instrument, InstrumentError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a simulation run (content-addressable hash).
pub type RunId = String;

/// Instrument parameters as they appear in config files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub point: f64,
    pub lot_step: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub point_value: f64,
}

impl InstrumentSpec {
    pub fn build(&self) -> Result<Instrument, InstrumentError> {
        Instrument::new(
            self.symbol.clone(),
            self.point,
            self.lot_step,
            self.min_lot,
            self.max_lot,
            self.point_value,
        )
    }
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".into(),
            point: 0.00001,
            lot_step: 0.01,
            min_lot: 0.01,
            max_lot: 100.0,
            point_value: 0.1,
        }
    }
}

/// Everything needed to reproduce a run: feed parameters, account and
/// instrument setup, and the full engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimConfig {
    pub seed: u64,
    pub ticks: usize,
    pub tick_interval_secs: i64,
    pub start_time: DateTime<Utc>,
    pub start_price: f64,
    pub step_points: f64,
    pub spread_points: f64,
    pub start_balance: f64,
    pub bar_secs: i64,
    pub atr_period: usize,
    pub instrument: InstrumentSpec,
    pub guard: GuardConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 1,
            ticks: 10_000,
            tick_interval_secs: 5,
            start_time: Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap(),
            start_price: 1.1000,
            step_points: 8.0,
            spread_points: 2.0,
            start_balance: 10_000.0,
            bar_secs: 60,
            atr_period: 14,
            instrument: InstrumentSpec::default(),
            guard: GuardConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SimConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl SimConfig {
    pub fn from_toml_path(path: &Path) -> Result<Self, SimConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| SimConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| SimConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Deterministic content hash: identical configs share a `RunId`.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).expect("SimConfig serialization failed");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}
