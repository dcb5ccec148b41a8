use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::models::ParlayCandidate;

use super::compatibility::{assert_no_duplicate_players, check_compatibility, ParlayMode, RejectionReason};
use super::correlation::{build_matrix, CorrelationMatrix, CorrelationSource};
use super::ensemble::{score_parlay, ParlayConsensus};
use super::joint::{adjust, CorrelationAdjustment, JointProbability};
use super::kelly::{size_stake, BankrollConfig, KellyInput, KellyResult, LegPrice};

/// Tunables for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineConfig {
    pub mode: ParlayMode,
    pub bankroll: BankrollConfig,
    pub adjustment: CorrelationAdjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedParlay {
    pub correlation: CorrelationMatrix,
    pub joint: JointProbability,
    pub kelly: KellyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ParlayConsensus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ParlayEvaluation {
    Rejected { reasons: Vec<RejectionReason> },
    Accepted(Box<AcceptedParlay>),
}

impl ParlayEvaluation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ParlayEvaluation::Accepted(_))
    }

    pub fn accepted(&self) -> Option<&AcceptedParlay> {
        match self {
            ParlayEvaluation::Accepted(a) => Some(a.as_ref()),
            ParlayEvaluation::Rejected { .. } => None,
        }
    }
}

/// Runs a candidate through validation, correlation, joint adjustment and
/// stake sizing. Holds only read-only state, so one engine can serve any
/// number of independent candidates.
pub struct ParlayEngine<S: CorrelationSource> {
    config: EngineConfig,
    correlations: S,
}

impl<S: CorrelationSource> ParlayEngine<S> {
    pub fn new(config: EngineConfig, correlations: S) -> Self {
        Self {
            config,
            correlations,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate(&self, candidate: &ParlayCandidate) -> EngineResult<ParlayEvaluation> {
        let label = candidate.id.as_deref().unwrap_or("<unnamed>");
        let legs = &candidate.legs;

        let verdict = check_compatibility(legs, self.config.mode);
        if !verdict.accepted {
            info!(
                parlay = label,
                legs = legs.len(),
                rejections = verdict.reasons.len(),
                "Parlay rejected"
            );
            return Ok(ParlayEvaluation::Rejected {
                reasons: verdict.reasons,
            });
        }
        assert_no_duplicate_players(legs, "parlay evaluation")?;

        let correlation = build_matrix(legs, candidate.sport, &self.correlations);
        if correlation.has_high_correlation {
            warn!(
                parlay = label,
                max_correlation = format!("{:.2}", correlation.max_correlation),
                "Parlay contains highly correlated legs"
            );
        }

        let probabilities: Vec<f64> = legs.iter().map(|l| l.probability).collect();
        let joint = adjust(&probabilities, &correlation, &self.config.adjustment);
        debug!(
            parlay = label,
            independent = format!("{:.4}", joint.independent_probability),
            correlated = format!("{:.4}", joint.correlated_probability),
            "Joint probability adjusted"
        );

        let prices = legs
            .iter()
            .map(|l| LegPrice {
                win_probability: l.probability,
                decimal_odds: l.decimal_odds,
            })
            .collect();
        let kelly = size_stake(
            &KellyInput::Legs(prices),
            &self.config.bankroll,
            Some(joint.correlated_probability),
        );

        let consensus = if legs.iter().any(|l| l.signals.is_some()) {
            score_parlay(legs)
        } else {
            None
        };

        info!(
            parlay = label,
            legs = legs.len(),
            edge_pct = format!("{:.2}%", kelly.edge_percent),
            stake = format!("${:.2}", kelly.recommended_stake),
            "Parlay evaluated"
        );

        Ok(ParlayEvaluation::Accepted(Box::new(AcceptedParlay {
            correlation,
            joint,
            kelly,
            consensus,
        })))
    }

    /// Evaluate independent candidates; order of results matches input.
    pub fn evaluate_all(
        &self,
        candidates: &[ParlayCandidate],
    ) -> EngineResult<Vec<ParlayEvaluation>> {
        candidates.iter().map(|c| self.evaluate(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Leg, LegSignals, Side, Sport, StatType};
    use crate::parlay::correlation::{CorrelationSeverity, CorrelationTable};

    fn engine(mode: ParlayMode) -> ParlayEngine<CorrelationTable> {
        ParlayEngine::new(
            EngineConfig {
                mode,
                ..Default::default()
            },
            CorrelationTable::new(),
        )
    }

    fn candidate(legs: Vec<Leg>) -> ParlayCandidate {
        ParlayCandidate {
            id: Some("test".into()),
            sport: Sport::Nba,
            legs,
        }
    }

    #[test]
    fn rejects_before_sizing() {
        let c = candidate(vec![
            Leg::new("Anthony Edwards", StatType::Points, "min-den", Side::Over, 0.6, 1.9),
            Leg::new("Jamal Murray", StatType::Assists, "min-den", Side::Over, 0.55, 1.9),
        ]);
        let eval = engine(ParlayMode::Safe).evaluate(&c).unwrap();
        match eval {
            ParlayEvaluation::Rejected { reasons } => {
                assert_eq!(
                    reasons,
                    vec![RejectionReason::SameEvent {
                        event_id: "min-den".into()
                    }]
                );
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn high_risk_mode_allows_same_game() {
        let c = candidate(vec![
            Leg::new("Anthony Edwards", StatType::Points, "min-den", Side::Over, 0.6, 1.9),
            Leg::new("Jamal Murray", StatType::Assists, "min-den", Side::Over, 0.55, 1.9),
        ]);
        let eval = engine(ParlayMode::HighRisk).evaluate(&c).unwrap();
        let accepted = eval.accepted().expect("accepted");
        assert_eq!(accepted.correlation.severity, CorrelationSeverity::Low);
        assert!(accepted.joint.correlated_probability < accepted.joint.independent_probability);
        assert!(accepted.consensus.is_none());
    }

    #[test]
    fn consensus_attached_when_signals_present() {
        let c = candidate(vec![
            Leg::new("A", StatType::Points, "g1", Side::Over, 0.6, 2.0).with_signals(LegSignals {
                hit_rate: Some(0.7),
                ..Default::default()
            }),
            Leg::new("B", StatType::Rebounds, "g2", Side::Over, 0.6, 2.0),
        ]);
        let eval = engine(ParlayMode::Safe).evaluate(&c).unwrap();
        let consensus = eval.accepted().unwrap().consensus.as_ref().unwrap();
        assert_eq!(consensus.legs.len(), 2);
        assert_eq!(consensus.strongest_leg, 0);
    }

    #[test]
    fn evaluate_all_preserves_order() {
        let ok = candidate(vec![
            Leg::new("A", StatType::Points, "g1", Side::Over, 0.6, 2.0),
            Leg::new("B", StatType::Points, "g2", Side::Over, 0.6, 2.0),
        ]);
        let bad = candidate(vec![
            Leg::new("A", StatType::Points, "g1", Side::Over, 0.6, 2.0),
            Leg::new("a", StatType::Rebounds, "g2", Side::Over, 0.6, 2.0),
        ]);
        let results = engine(ParlayMode::Safe).evaluate_all(&[ok, bad]).unwrap();
        assert!(results[0].is_accepted());
        assert!(!results[1].is_accepted());
    }
}
