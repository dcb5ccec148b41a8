//! Per-leg consensus across independent indicators, and the parlay-level
//! summary shown next to a stake recommendation.
//!
//! Each available signal contributes a bounded, signed score pointing toward
//! (positive) or against (negative) the leg's chosen side. Missing signals
//! contribute nothing.

use serde::Serialize;

use crate::models::{Leg, LegSignals, Side, Trend};

const HIT_RATE_CAP: f64 = 25.0;
const TREND_POINTS: f64 = 10.0;
const CONSISTENCY_CAP: f64 = 15.0;
const LINE_VALUE_CAP: f64 = 20.0;
const CONFIDENCE_CAP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Consensus {
    StrongFade,
    LeanFade,
    Neutral,
    LeanPick,
    StrongPick,
}

impl Consensus {
    pub fn from_score(score: f64) -> Self {
        if score >= 30.0 {
            Consensus::StrongPick
        } else if score >= 10.0 {
            Consensus::LeanPick
        } else if score > -10.0 {
            Consensus::Neutral
        } else if score > -30.0 {
            Consensus::LeanFade
        } else {
            Consensus::StrongFade
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SignalBreakdown {
    pub hit_rate: f64,
    pub trend: f64,
    pub consistency: f64,
    pub line_value: f64,
    pub confidence: f64,
}

impl SignalBreakdown {
    pub fn total(&self) -> f64 {
        self.hit_rate + self.trend + self.consistency + self.line_value + self.confidence
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleResult {
    pub player: String,
    pub consensus_score: f64,
    pub consensus: Consensus,
    pub signals_used: usize,
    pub breakdown: SignalBreakdown,
}

/// +1 when a higher number favours the side, −1 when it hurts it.
fn side_sign(side: Side) -> f64 {
    match side {
        Side::Under => -1.0,
        _ => 1.0,
    }
}

pub fn score_signals(signals: &LegSignals, side: Side) -> (SignalBreakdown, usize) {
    let mut used = 0;
    let mut b = SignalBreakdown::default();

    if let Some(hr) = signals.hit_rate {
        b.hit_rate = ((hr - 0.5) * 100.0).clamp(-HIT_RATE_CAP, HIT_RATE_CAP);
        used += 1;
    }
    if let Some(trend) = signals.trend {
        b.trend = match trend {
            Trend::Up => TREND_POINTS,
            Trend::Down => -TREND_POINTS,
            Trend::Flat => 0.0,
        } * side_sign(side);
        used += 1;
    }
    if let Some(c) = signals.consistency {
        b.consistency = ((c - 0.5) * 30.0).clamp(-CONSISTENCY_CAP, CONSISTENCY_CAP);
        used += 1;
    }
    if let (Some(line), Some(avg)) = (signals.line, signals.season_average) {
        if line > 0.0 {
            // Season average above the line favours the over.
            let deviation_pct = (avg - line) / line * 100.0;
            b.line_value =
                (deviation_pct * 1.5 * side_sign(side)).clamp(-LINE_VALUE_CAP, LINE_VALUE_CAP);
            used += 1;
        }
    }
    if let Some(conf) = signals.confidence {
        b.confidence = ((conf - 0.5) * 40.0).clamp(-CONFIDENCE_CAP, CONFIDENCE_CAP);
        used += 1;
    }
    (b, used)
}

pub fn score_leg(leg: &Leg) -> EnsembleResult {
    let (breakdown, used) = leg
        .signals
        .as_ref()
        .map(|s| score_signals(s, leg.side))
        .unwrap_or_default();
    let score = breakdown.total();
    EnsembleResult {
        player: leg.player.clone(),
        consensus_score: score,
        consensus: Consensus::from_score(score),
        signals_used: used,
        breakdown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParlayRisk {
    Low,
    Medium,
    High,
    Extreme,
}

impl ParlayRisk {
    /// The weakest leg decides first; the mean can only escalate further.
    pub fn classify(weakest: f64, mean: f64) -> Self {
        if weakest <= -30.0 {
            ParlayRisk::Extreme
        } else if weakest < -10.0 {
            ParlayRisk::High
        } else if weakest < 10.0 || mean < 20.0 {
            ParlayRisk::Medium
        } else {
            ParlayRisk::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParlayConsensus {
    pub legs: Vec<EnsembleResult>,
    pub overall_score: f64,
    pub weakest_leg: usize,
    pub strongest_leg: usize,
    pub parlay_risk: ParlayRisk,
}

/// `None` for an empty parlay. Ties resolve to the lowest index.
pub fn summarize(results: Vec<EnsembleResult>) -> Option<ParlayConsensus> {
    if results.is_empty() {
        return None;
    }
    let mean = results.iter().map(|r| r.consensus_score).sum::<f64>() / results.len() as f64;

    let mut weakest = 0;
    let mut strongest = 0;
    for (i, r) in results.iter().enumerate().skip(1) {
        if r.consensus_score < results[weakest].consensus_score {
            weakest = i;
        }
        if r.consensus_score > results[strongest].consensus_score {
            strongest = i;
        }
    }
    let parlay_risk = ParlayRisk::classify(results[weakest].consensus_score, mean);

    Some(ParlayConsensus {
        legs: results,
        overall_score: mean,
        weakest_leg: weakest,
        strongest_leg: strongest,
        parlay_risk,
    })
}

pub fn score_parlay(legs: &[Leg]) -> Option<ParlayConsensus> {
    summarize(legs.iter().map(score_leg).collect())
}
