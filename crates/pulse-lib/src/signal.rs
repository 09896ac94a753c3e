use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Duration bound of the RR window, in seconds.
pub const MEASURE_TIME_S: f64 = 60.0;

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

/// Sliding buffer of RR intervals (seconds) bounded by cumulative duration.
///
/// Eviction runs *before* each append and looks at the pre-append total, so
/// right after an append the window may exceed its bound by up to the size of
/// the sample that was just pushed. The next append trims it back.
#[derive(Debug, Clone)]
pub struct RrWindow {
    samples: VecDeque<f64>,
    total_s: f64,
    max_duration_s: f64,
}

impl RrWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::new(),
            total_s: 0.0,
            max_duration_s: MEASURE_TIME_S,
        }
    }

    /// Window bounded by `max_duration_s`, which must be finite and positive.
    pub fn with_duration(max_duration_s: f64) -> Result<Self> {
        if !(max_duration_s.is_finite() && max_duration_s > 0.0) {
            bail!("window duration must be positive, got {}", max_duration_s);
        }
        Ok(Self {
            max_duration_s,
            ..Self::new()
        })
    }

    /// Evict from the front while the current total exceeds the bound, then push `sample_s`.
    pub fn append(&mut self, sample_s: f64) {
        while self.total_s > self.max_duration_s {
            match self.samples.pop_front() {
                Some(old) => {
                    log::debug!("evicting {:.4} s from RR window", old);
                    self.total_s = self.recompute_total();
                }
                None => {
                    self.total_s = 0.0;
                    break;
                }
            }
        }
        self.samples.push_back(sample_s);
        self.total_s += sample_s;
    }

    /// Sum of retained samples in seconds.
    pub fn total_s(&self) -> f64 {
        self.total_s
    }

    pub fn max_duration_s(&self) -> f64 {
        self.max_duration_s
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Retained samples in arrival order.
    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.total_s = 0.0;
    }

    // Summing from scratch keeps float drift out of the eviction test.
    fn recompute_total(&self) -> f64 {
        self.samples.iter().sum()
    }
}

impl Default for RrWindow {
    fn default() -> Self {
        Self::new()
    }
}
