//! Joint win probability of a parlay, adjusted for leg dependence.

use serde::{Deserialize, Serialize};

use super::correlation::CorrelationMatrix;

/// Lowest probability ever reported; keeps the joint value strictly positive.
pub const MIN_PROBABILITY: f64 = 1e-6;
/// Lower bound on the multiplicative adjustment.
const MIN_FACTOR: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    /// Dependence lowers the joint probability (default).
    Penalize,
    /// Dependence raises it, as for positively correlated same-game stacks.
    Reward,
}

/// How mean |ρ| turns into a multiplier on the independent product.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationAdjustment {
    pub direction: AdjustmentDirection,
    pub sensitivity: f64,
}

impl Default for CorrelationAdjustment {
    fn default() -> Self {
        Self {
            direction: AdjustmentDirection::Penalize,
            sensitivity: 0.5,
        }
    }
}

impl CorrelationAdjustment {
    pub fn factor(&self, avg_correlation: f64) -> f64 {
        let shift = self.sensitivity * avg_correlation.abs();
        let factor = match self.direction {
            AdjustmentDirection::Penalize => 1.0 - shift,
            AdjustmentDirection::Reward => 1.0 + shift,
        };
        factor.max(MIN_FACTOR)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct JointProbability {
    pub independent_probability: f64,
    pub correlated_probability: f64,
    pub adjustment_factor: f64,
    /// Display only: (correlated / independent − 1) · 100.
    pub correlation_impact_pct: f64,
}

pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        return MIN_PROBABILITY;
    }
    p.clamp(MIN_PROBABILITY, 1.0)
}

/// Product of leg probabilities, scaled by the dependence adjustment.
pub fn adjust(
    leg_probabilities: &[f64],
    matrix: &CorrelationMatrix,
    policy: &CorrelationAdjustment,
) -> JointProbability {
    let independent = clamp_probability(leg_probabilities.iter().product::<f64>());
    let factor = policy.factor(matrix.avg_correlation);
    let correlated = clamp_probability(independent * factor);
    JointProbability {
        independent_probability: independent,
        correlated_probability: correlated,
        adjustment_factor: factor,
        correlation_impact_pct: (correlated / independent - 1.0) * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parlay::correlation::CorrelationSeverity;
    use approx::assert_relative_eq;

    fn matrix_with_avg(avg: f64) -> CorrelationMatrix {
        CorrelationMatrix {
            coefficients: vec![vec![1.0, avg], vec![avg, 1.0]],
            avg_correlation: avg,
            max_correlation: avg,
            severity: CorrelationSeverity::from_average(avg),
            has_high_correlation: avg > 0.30,
        }
    }

    #[test]
    fn independent_legs_match_naive_product() {
        let j = adjust(&[0.6, 0.55], &matrix_with_avg(0.0), &CorrelationAdjustment::default());
        assert_relative_eq!(j.independent_probability, 0.33, epsilon = 1e-12);
        assert_relative_eq!(j.correlated_probability, 0.33, epsilon = 1e-9);
        assert_relative_eq!(j.correlation_impact_pct, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn penalize_lowers_and_reward_raises() {
        let m = matrix_with_avg(0.2);
        let down = adjust(&[0.6, 0.55], &m, &CorrelationAdjustment::default());
        assert_relative_eq!(down.correlated_probability, 0.33 * 0.9, epsilon = 1e-12);
        assert_relative_eq!(down.correlation_impact_pct, -10.0, epsilon = 1e-9);

        let up = adjust(
            &[0.6, 0.55],
            &m,
            &CorrelationAdjustment {
                direction: AdjustmentDirection::Reward,
                sensitivity: 0.5,
            },
        );
        assert!(up.correlated_probability > up.independent_probability);
    }

    #[test]
    fn output_stays_in_unit_interval() {
        let reward = CorrelationAdjustment {
            direction: AdjustmentDirection::Reward,
            sensitivity: 3.0,
        };
        let j = adjust(&[0.99, 0.99], &matrix_with_avg(0.9), &reward);
        assert!(j.correlated_probability <= 1.0);

        let harsh = CorrelationAdjustment {
            direction: AdjustmentDirection::Penalize,
            sensitivity: 10.0,
        };
        let j = adjust(&[1e-4, 1e-4], &matrix_with_avg(0.9), &harsh);
        assert!(j.correlated_probability > 0.0);
        assert!(j.independent_probability > 0.0);
    }
}
