use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Successive intervals differing from the previous accepted one by more than this
/// fraction of it are treated as artifacts.
pub const OUTLIER_RATIO: f64 = 0.2;

/// Outcome of an rMSSD computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rmssd {
    /// Root mean square of successive differences, in milliseconds.
    Value(f64),
    /// No successive pair survived (fewer than two samples or all rejected).
    Unavailable,
}

impl Rmssd {
    pub fn value(self) -> Option<f64> {
        match self {
            Rmssd::Value(ms) => Some(ms),
            Rmssd::Unavailable => None,
        }
    }

    pub fn is_available(self) -> bool {
        matches!(self, Rmssd::Value(_))
    }
}

/// rMSSD with intermediate counts, for reporting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RmssdSummary {
    /// Samples in the input series.
    pub n: usize,
    /// Successive pairs that passed the outlier test.
    pub accepted: usize,
    pub rmssd_ms: Option<f64>,
}

/// rMSSD over RR intervals given in seconds, using the default outlier ratio.
pub fn rmssd(rr_s: &[f64]) -> Rmssd {
    rmssd_with_ratio(rr_s, OUTLIER_RATIO)
}

/// rMSSD over RR intervals in seconds.
///
/// Intervals are converted to milliseconds and walked in order. A sample whose
/// absolute change from `prev` exceeds `prev * ratio` is skipped outright: it is
/// not counted and `prev` stays on the last accepted sample.
pub fn rmssd_with_ratio(rr_s: &[f64], ratio: f64) -> Rmssd {
    let (sum, accepted) = accumulate(rr_s, ratio);
    if accepted == 0 {
        return Rmssd::Unavailable;
    }
    Rmssd::Value((sum / accepted as f64).sqrt())
}

pub fn rmssd_summary(rr: &RRSeries, ratio: f64) -> RmssdSummary {
    let (sum, accepted) = accumulate(&rr.rr, ratio);
    RmssdSummary {
        n: rr.rr.len(),
        accepted,
        rmssd_ms: if accepted > 0 {
            Some((sum / accepted as f64).sqrt())
        } else {
            None
        },
    }
}

fn accumulate(rr_s: &[f64], ratio: f64) -> (f64, usize) {
    let mut ms = rr_s.iter().map(|s| s * 1000.0);
    let Some(mut prev) = ms.next() else {
        return (0.0, 0);
    };
    let mut sum = 0.0;
    let mut accepted = 0;
    for interval in ms {
        if (prev - interval).abs() > prev * ratio {
            continue;
        }
        sum += (interval - prev).powi(2);
        accepted += 1;
        prev = interval;
    }
    (sum, accepted)
}
