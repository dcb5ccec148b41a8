//! Calibration tracking: how well stated probabilities match what happened.
//!
//! Settled predictions are binned into fixed-width probability buckets and
//! compared against realised hit rates (ECE / MCE), scored with the Brier
//! score, and summarised as a letter grade and a confidence direction.
//! Small-sample hit rates get a Wilson score interval.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::OutcomeRecord;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;
/// Mean bucket gap (actual − predicted) beyond which we call a direction.
const DIRECTION_THRESHOLD: f64 = 0.03;
pub const DEFAULT_BUCKETS: usize = 10;

// ── Wilson score interval ────────────────────────────────────────────────────

/// Interval bounds and half-width, all in percent (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WilsonInterval {
    pub lower: f64,
    pub upper: f64,
    pub margin: f64,
}

/// Wilson score interval at 95% for a success rate given in percent.
pub fn wilson_score(success_rate: f64, sample_size: u64) -> WilsonInterval {
    if sample_size == 0 {
        return WilsonInterval {
            lower: 0.0,
            upper: 100.0,
            margin: 50.0,
        };
    }
    let z2 = Z_95 * Z_95;
    let n = sample_size as f64;
    let p = (success_rate / 100.0).clamp(0.0, 1.0);

    let denom = 1.0 + z2 / n;
    let center = (p + z2 / (2.0 * n)) / denom;
    let margin = Z_95 * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt() / denom;

    WilsonInterval {
        lower: ((center - margin) * 100.0).clamp(0.0, 100.0),
        upper: ((center + margin) * 100.0).clamp(0.0, 100.0),
        margin: margin * 100.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleTier {
    Insufficient,
    Low,
    Moderate,
    Good,
    Excellent,
}

impl SampleTier {
    pub fn from_sample_size(n: u64) -> Self {
        match n {
            n if n >= 100 => SampleTier::Excellent,
            n if n >= 50 => SampleTier::Good,
            n if n >= 20 => SampleTier::Moderate,
            n if n >= 10 => SampleTier::Low,
            _ => SampleTier::Insufficient,
        }
    }
}

/// A leg's historical hit rate with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HitRateConfidence {
    /// Percent (0–100).
    pub success_rate: f64,
    pub sample_size: u64,
    pub interval: WilsonInterval,
    pub tier: SampleTier,
}

pub fn hit_rate_confidence(hits: u64, total: u64) -> HitRateConfidence {
    let hits = hits.min(total);
    let success_rate = if total == 0 {
        0.0
    } else {
        hits as f64 * 100.0 / total as f64
    };
    HitRateConfidence {
        success_rate,
        sample_size: total,
        interval: wilson_score(success_rate, total),
        tier: SampleTier::from_sample_size(total),
    }
}

// ── Buckets and summary metrics ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationBucket {
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Mean stated probability; the bucket midpoint when empty.
    pub predicted_avg: f64,
    /// Fraction of wins; 0 when empty.
    pub actual_avg: f64,
    pub sample_count: usize,
    pub interval: WilsonInterval,
}

impl CalibrationBucket {
    pub fn gap(&self) -> f64 {
        self.actual_avg - self.predicted_avg
    }
}

/// Count-weighted mean of |actual − predicted|. Empty buckets contribute 0.
pub fn expected_calibration_error(buckets: &[CalibrationBucket]) -> f64 {
    let total: usize = buckets.iter().map(|b| b.sample_count).sum();
    if total == 0 {
        return 0.0;
    }
    buckets
        .iter()
        .filter(|b| b.sample_count > 0)
        .map(|b| b.sample_count as f64 / total as f64 * b.gap().abs())
        .sum()
}

/// Worst |actual − predicted| over populated buckets.
pub fn max_calibration_error(buckets: &[CalibrationBucket]) -> f64 {
    buckets
        .iter()
        .filter(|b| b.sample_count > 0)
        .map(|b| b.gap().abs())
        .fold(0.0, f64::max)
}

/// Mean squared error of the stated probabilities. 0 for no records.
pub fn brier_score(records: &[OutcomeRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: f64 = records
        .iter()
        .map(|r| {
            let outcome = if r.won { 1.0 } else { 0.0 };
            (r.predicted.clamp(0.0, 1.0) - outcome).powi(2)
        })
        .sum();
    sum / records.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CalibrationGrade {
    A,
    B,
    C,
    D,
    F,
}

impl CalibrationGrade {
    /// Lower Brier is better; bands are inclusive on the upper edge.
    pub fn from_brier(brier: f64) -> Self {
        if brier <= 0.10 {
            CalibrationGrade::A
        } else if brier <= 0.15 {
            CalibrationGrade::B
        } else if brier <= 0.20 {
            CalibrationGrade::C
        } else if brier <= 0.25 {
            CalibrationGrade::D
        } else {
            CalibrationGrade::F
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CalibrationGrade::A => "excellent",
            CalibrationGrade::B => "good",
            CalibrationGrade::C => "fair",
            CalibrationGrade::D => "poor",
            CalibrationGrade::F => "unreliable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationDirection {
    /// Outcomes hit less often than stated.
    Overconfident,
    /// Outcomes hit more often than stated.
    Underconfident,
    Calibrated,
}

/// Count-weighted mean of (actual − predicted) across buckets.
pub fn calibration_direction(buckets: &[CalibrationBucket]) -> (f64, CalibrationDirection) {
    let total: usize = buckets.iter().map(|b| b.sample_count).sum();
    if total == 0 {
        return (0.0, CalibrationDirection::Calibrated);
    }
    let mean_gap: f64 = buckets
        .iter()
        .map(|b| b.sample_count as f64 * b.gap())
        .sum::<f64>()
        / total as f64;
    let direction = if mean_gap > DIRECTION_THRESHOLD {
        CalibrationDirection::Underconfident
    } else if mean_gap < -DIRECTION_THRESHOLD {
        CalibrationDirection::Overconfident
    } else {
        CalibrationDirection::Calibrated
    };
    (mean_gap, direction)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub total_predictions: usize,
    pub buckets: Vec<CalibrationBucket>,
    pub ece: f64,
    pub mce: f64,
    pub brier_score: f64,
    /// `None` until there is at least one settled prediction.
    pub grade: Option<CalibrationGrade>,
    pub mean_gap: f64,
    pub direction: CalibrationDirection,
    pub sample_tier: SampleTier,
}

/// Bins settled predictions into `bucket_count` equal-width buckets on [0, 1].
#[derive(Debug, Clone, Copy)]
pub struct CalibrationTracker {
    bucket_count: usize,
}

impl Default for CalibrationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKETS)
    }
}

impl CalibrationTracker {
    pub fn new(bucket_count: usize) -> Self {
        Self {
            bucket_count: bucket_count.max(1),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    fn bucket_index(&self, predicted: f64) -> usize {
        let p = predicted.clamp(0.0, 1.0);
        ((p * self.bucket_count as f64).floor() as usize).min(self.bucket_count - 1)
    }

    pub fn buckets(&self, records: &[OutcomeRecord]) -> Vec<CalibrationBucket> {
        let width = 1.0 / self.bucket_count as f64;
        let mut sums = vec![(0.0f64, 0usize, 0usize); self.bucket_count];
        for r in records {
            let slot = &mut sums[self.bucket_index(r.predicted)];
            slot.0 += r.predicted.clamp(0.0, 1.0);
            slot.1 += usize::from(r.won);
            slot.2 += 1;
        }

        sums.into_iter()
            .enumerate()
            .map(|(i, (predicted_sum, wins, count))| {
                let lower_bound = i as f64 * width;
                let upper_bound = lower_bound + width;
                let (predicted_avg, actual_avg) = if count == 0 {
                    ((lower_bound + upper_bound) / 2.0, 0.0)
                } else {
                    (predicted_sum / count as f64, wins as f64 / count as f64)
                };
                CalibrationBucket {
                    lower_bound,
                    upper_bound,
                    predicted_avg,
                    actual_avg,
                    sample_count: count,
                    interval: wilson_score(actual_avg * 100.0, count as u64),
                }
            })
            .collect()
    }

    pub fn report(&self, records: &[OutcomeRecord]) -> CalibrationReport {
        let buckets = self.buckets(records);
        let ece = expected_calibration_error(&buckets);
        let mce = max_calibration_error(&buckets);
        let brier = brier_score(records);
        let (mean_gap, direction) = calibration_direction(&buckets);
        let grade = (!records.is_empty()).then(|| CalibrationGrade::from_brier(brier));

        debug!(
            predictions = records.len(),
            ece = format!("{:.4}", ece),
            mce = format!("{:.4}", mce),
            brier = format!("{:.4}", brier),
            ?direction,
            "calibration report"
        );

        CalibrationReport {
            total_predictions: records.len(),
            buckets,
            ece,
            mce,
            brier_score: brier,
            grade,
            mean_gap,
            direction,
            sample_tier: SampleTier::from_sample_size(records.len() as u64),
        }
    }
}

/// Records settled at or after `cutoff`. Undated records are dropped.
pub fn settled_since(records: &[OutcomeRecord], cutoff: DateTime<Utc>) -> Vec<OutcomeRecord> {
    records
        .iter()
        .filter(|r| r.settled_at.is_some_and(|t| t >= cutoff))
        .cloned()
        .collect()
}
