use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::metrics::hrv::OUTLIER_RATIO;
use crate::signal::MEASURE_TIME_S;

/// Minimum window duration (seconds) before rMSSD is emitted.
pub const TRIGGER_THRESHOLD_S: f64 = 2.0;

/// Tunables for an [`HrmSession`](crate::session::HrmSession).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Duration bound of the RR window (seconds).
    pub measure_time_s: f64,
    /// Window duration (seconds) at which rMSSD starts being emitted.
    pub trigger_threshold_s: f64,
    /// Fraction of the previous interval beyond which a change is an artifact.
    pub outlier_ratio: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            measure_time_s: MEASURE_TIME_S,
            trigger_threshold_s: TRIGGER_THRESHOLD_S,
            outlier_ratio: OUTLIER_RATIO,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.measure_time_s.is_finite() && self.measure_time_s > 0.0) {
            anyhow::bail!("measure_time_s must be positive, got {}", self.measure_time_s);
        }
        if !(self.trigger_threshold_s.is_finite() && self.trigger_threshold_s >= 0.0) {
            anyhow::bail!(
                "trigger_threshold_s must be non-negative, got {}",
                self.trigger_threshold_s
            );
        }
        if !(self.outlier_ratio.is_finite() && self.outlier_ratio >= 0.0) {
            anyhow::bail!("outlier_ratio must be non-negative, got {}", self.outlier_ratio);
        }
        Ok(())
    }
}

pub fn parse_config(text: &str) -> Result<SessionConfig> {
    let config: SessionConfig = toml::from_str(text).context("parsing session config")?;
    config.validate()?;
    Ok(config)
}

pub fn read_config(path: &Path) -> Result<SessionConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("in {}", path.display()))
}
