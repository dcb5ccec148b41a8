//! Kelly Criterion stake sizing for parlays.
//!
//! The Kelly formula sizes a bet to maximise the expected logarithm of wealth.
//! With decimal odds `o` (total return per unit staked) and win probability `p`:
//!
//!   f* = (p·o − 1) / (o − 1)
//!
//! We apply a *fractional* Kelly multiplier (0 < m ≤ 1) and a hard cap on the
//! fraction of bankroll, trading a little growth for much lower variance.
//! Parlay probabilities are discounted for leg dependence before sizing: either
//! with an externally supplied correlated probability, or with a flat default
//! factor on the naive product.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::joint::clamp_probability;

/// Flat discount on the naive product when no correlated probability is given.
pub const DEFAULT_CORRELATION_FACTOR: f64 = 0.85;

/// Bankroll options recognised from collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BankrollConfig {
    #[serde(alias = "bankrollAmount")]
    pub bankroll_amount: f64,
    /// Fractional Kelly multiplier in (0, 1].
    #[serde(alias = "kellyMultiplier")]
    pub kelly_multiplier: f64,
    /// Hard cap on a single stake, in percent of bankroll.
    #[serde(alias = "maxBetPercent")]
    pub max_bet_percent: f64,
    #[serde(default = "default_correlation_factor", alias = "correlationFactor")]
    pub correlation_factor: f64,
}

fn default_correlation_factor() -> f64 {
    DEFAULT_CORRELATION_FACTOR
}

impl Default for BankrollConfig {
    fn default() -> Self {
        Self {
            bankroll_amount: 1000.0,
            kelly_multiplier: 0.25,
            max_bet_percent: 5.0,
            correlation_factor: DEFAULT_CORRELATION_FACTOR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LegPrice {
    pub win_probability: f64,
    pub decimal_odds: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KellyInput {
    /// Individual legs; odds and probabilities are multiplied together.
    Legs(Vec<LegPrice>),
    /// Already combined parlay probability and total decimal odds.
    Combined {
        probability: f64,
        total_decimal_odds: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Aggressive,
    Reckless,
}

impl RiskLevel {
    /// Band on the adjusted bankroll fraction.
    pub fn from_fraction(fraction: f64) -> Self {
        if fraction < 0.02 {
            RiskLevel::Conservative
        } else if fraction < 0.05 {
            RiskLevel::Moderate
        } else if fraction < 0.10 {
            RiskLevel::Aggressive
        } else {
            RiskLevel::Reckless
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KellyResult {
    pub recommended_stake: f64,
    pub edge_percent: f64,
    pub expected_value: f64,
    pub full_kelly_fraction: f64,
    pub adjusted_kelly_fraction: f64,
    pub true_probability: f64,
    pub combined_odds: f64,
    pub risk_level: Option<RiskLevel>,
    pub warning: Option<String>,
    pub variance: f64,
    pub standard_deviation: f64,
    pub risk_of_ruin_pct: f64,
}

impl KellyResult {
    fn no_bet(true_probability: f64, combined_odds: f64, edge_percent: f64, warning: String) -> Self {
        KellyResult {
            recommended_stake: 0.0,
            edge_percent,
            expected_value: 0.0,
            full_kelly_fraction: 0.0,
            adjusted_kelly_fraction: 0.0,
            true_probability,
            combined_odds,
            risk_level: None,
            warning: Some(warning),
            variance: 0.0,
            standard_deviation: 0.0,
            risk_of_ruin_pct: 0.0,
        }
    }

    pub fn is_bet(&self) -> bool {
        self.recommended_stake > 0.0
    }
}

// ── Odds conversion ──────────────────────────────────────────────────────────

/// `+150` → 2.5, `−120` → 1.833…, `±100` → 2.0. Values with |odds| < 100 are
/// not valid American odds.
pub fn american_to_decimal(odds: f64) -> Option<f64> {
    if !odds.is_finite() || odds.abs() < 100.0 {
        return None;
    }
    Some(if odds > 0.0 {
        1.0 + odds / 100.0
    } else {
        1.0 + 100.0 / odds.abs()
    })
}

pub fn decimal_to_american(decimal: f64) -> Option<f64> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return None;
    }
    Some(if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    })
}

/// Break-even probability implied by decimal odds.
pub fn implied_probability(decimal: f64) -> f64 {
    if decimal <= 0.0 || !decimal.is_finite() {
        return 0.0;
    }
    (1.0 / decimal).min(1.0)
}

/// Expected return per unit staked, in percent.
pub fn edge_percent(win_prob: f64, decimal_odds: f64) -> f64 {
    (win_prob * decimal_odds - 1.0) * 100.0
}

// ── Variance / risk of ruin ──────────────────────────────────────────────────

/// Variance of a single bet's profit: win `stake·(o−1)` with probability `p`,
/// lose `stake` otherwise.
pub fn bet_variance(stake: f64, decimal_odds: f64, win_prob: f64) -> f64 {
    if stake <= 0.0 {
        return 0.0;
    }
    let p = win_prob.clamp(0.0, 1.0);
    p * (1.0 - p) * (stake * decimal_odds).powi(2)
}

/// Diffusion approximation `exp(−2·μ·B / σ²)` with μ the expected profit per
/// bet, B the bankroll and σ² the bet variance, as a percentage.
pub fn risk_of_ruin_pct(stake: f64, bankroll: f64, decimal_odds: f64, win_prob: f64) -> f64 {
    if stake <= 0.0 || bankroll <= 0.0 {
        return 0.0;
    }
    let variance = bet_variance(stake, decimal_odds, win_prob);
    if variance <= 0.0 {
        return 0.0;
    }
    let mean = stake * (win_prob * decimal_odds - 1.0);
    if mean <= 0.0 {
        return 100.0;
    }
    ((-2.0 * mean * bankroll / variance).exp() * 100.0).clamp(0.0, 100.0)
}

// ── Sizing ───────────────────────────────────────────────────────────────────

/// Size a stake for a parlay.
///
/// `correlated_probability`, when supplied, replaces the default discount of
/// the naive probability product.
pub fn size_stake(
    input: &KellyInput,
    config: &BankrollConfig,
    correlated_probability: Option<f64>,
) -> KellyResult {
    let (naive_probability, combined_odds) = match input {
        KellyInput::Legs(legs) => (
            legs.iter().map(|l| l.win_probability).product::<f64>(),
            legs.iter().map(|l| l.decimal_odds).product::<f64>(),
        ),
        KellyInput::Combined {
            probability,
            total_decimal_odds,
        } => (*probability, *total_decimal_odds),
    };

    let true_probability = clamp_probability(
        correlated_probability.unwrap_or(naive_probability * config.correlation_factor),
    );

    if !combined_odds.is_finite() || combined_odds <= 1.0 {
        return KellyResult::no_bet(
            true_probability,
            combined_odds,
            0.0,
            format!("invalid combined odds {combined_odds:.3}; no bet"),
        );
    }

    let edge = true_probability * combined_odds - 1.0;
    let edge_pct = edge * 100.0;
    if edge_pct <= 0.0 {
        debug!(
            edge_pct = format!("{:.2}%", edge_pct),
            true_probability, combined_odds, "No edge, no bet"
        );
        return KellyResult::no_bet(
            true_probability,
            combined_odds,
            edge_pct,
            format!("no positive edge ({edge_pct:.2}%); no bet"),
        );
    }

    let full_kelly = edge / (combined_odds - 1.0);
    let cap = (config.max_bet_percent / 100.0).clamp(0.0, 1.0);
    let fractional = full_kelly * config.kelly_multiplier.clamp(0.0, 1.0);
    let adjusted = fractional.min(cap);
    let bankroll = config.bankroll_amount.max(0.0);
    let stake = bankroll * adjusted;
    let expected_value = stake * edge;
    let risk_level = RiskLevel::from_fraction(adjusted);

    let mut warnings = Vec::new();
    if bankroll <= 0.0 {
        warnings.push("bankroll is zero; nothing to stake".to_string());
    }
    if fractional > cap {
        warnings.push(format!(
            "stake capped at {:.1}% of bankroll (fractional Kelly {:.1}%)",
            cap * 100.0,
            fractional * 100.0
        ));
    }
    if risk_level == RiskLevel::Reckless {
        warnings.push("stake exceeds 10% of bankroll".to_string());
    }

    let variance = bet_variance(stake, combined_odds, true_probability);
    let risk_of_ruin = risk_of_ruin_pct(stake, bankroll, combined_odds, true_probability);

    debug!(
        full_kelly = format!("{:.2}%", full_kelly * 100.0),
        adjusted = format!("{:.2}%", adjusted * 100.0),
        stake = format!("${:.2}", stake),
        ev = format!("${:.4}", expected_value),
        ?risk_level,
        "Stake sized"
    );

    KellyResult {
        recommended_stake: stake,
        edge_percent: edge_pct,
        expected_value,
        full_kelly_fraction: full_kelly,
        adjusted_kelly_fraction: adjusted,
        true_probability,
        combined_odds,
        risk_level: Some(risk_level),
        warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
        variance,
        standard_deviation: variance.sqrt(),
        risk_of_ruin_pct: risk_of_ruin,
    }
}
