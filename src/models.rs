use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, EngineResult};
use crate::parlay::compatibility::{canonicalize_stat, normalize_player};
use crate::parlay::kelly::american_to_decimal;

/// Canonical player-prop stat category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum StatType {
    #[serde(rename = "points")]
    Points,
    #[serde(rename = "rebounds")]
    Rebounds,
    #[serde(rename = "assists")]
    Assists,
    #[serde(rename = "pr")]
    PointsRebounds,
    #[serde(rename = "pa")]
    PointsAssists,
    #[serde(rename = "ra")]
    ReboundsAssists,
    #[serde(rename = "pra")]
    PointsReboundsAssists,
}

impl StatType {
    pub fn token(self) -> &'static str {
        match self {
            StatType::Points => "points",
            StatType::Rebounds => "rebounds",
            StatType::Assists => "assists",
            StatType::PointsRebounds => "pr",
            StatType::PointsAssists => "pa",
            StatType::ReboundsAssists => "ra",
            StatType::PointsReboundsAssists => "pra",
        }
    }

    /// Base stats summed by this category. A base stat returns itself.
    pub fn base_components(self) -> &'static [StatType] {
        match self {
            StatType::Points => &[StatType::Points],
            StatType::Rebounds => &[StatType::Rebounds],
            StatType::Assists => &[StatType::Assists],
            StatType::PointsRebounds => &[StatType::Points, StatType::Rebounds],
            StatType::PointsAssists => &[StatType::Points, StatType::Assists],
            StatType::ReboundsAssists => &[StatType::Rebounds, StatType::Assists],
            StatType::PointsReboundsAssists => {
                &[StatType::Points, StatType::Rebounds, StatType::Assists]
            }
        }
    }

    pub fn is_compound(self) -> bool {
        self.base_components().len() > 1
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl TryFrom<String> for StatType {
    type Error = EngineError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        canonicalize_stat(&raw).ok_or_else(|| EngineError::InvalidLeg(format!("unknown stat '{raw}'")))
    }
}

/// Market a leg is priced on: a canonical player stat, or an opaque market
/// token (moneyline, spread, totals…) that takes no part in overlap rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum MarketType {
    Stat(StatType),
    Other(String),
}

impl MarketType {
    pub fn token(&self) -> &str {
        match self {
            MarketType::Stat(s) => s.token(),
            MarketType::Other(t) => t.as_str(),
        }
    }

    pub fn stat(&self) -> Option<StatType> {
        match self {
            MarketType::Stat(s) => Some(*s),
            MarketType::Other(_) => None,
        }
    }

    /// Canonicalize a raw market string. Unknown markets keep their
    /// lowercased, trimmed text as the token.
    pub fn parse(raw: &str) -> Self {
        match canonicalize_stat(raw) {
            Some(stat) => MarketType::Stat(stat),
            None => MarketType::Other(raw.trim().to_lowercase()),
        }
    }
}

impl From<StatType> for MarketType {
    fn from(stat: StatType) -> Self {
        MarketType::Stat(stat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Over,
    Under,
    Home,
    Away,
    Yes,
    No,
}

impl FromStr for Side {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "over" | "o" | "more" | "higher" => Ok(Side::Over),
            "under" | "u" | "less" | "lower" => Ok(Side::Under),
            "home" => Ok(Side::Home),
            "away" => Ok(Side::Away),
            "yes" => Ok(Side::Yes),
            "no" => Ok(Side::No),
            other => Err(EngineError::InvalidLeg(format!("unknown side '{other}'"))),
        }
    }
}

/// Sport a parlay belongs to. Drives same-event correlation defaults and the
/// historical coefficient lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Sport {
    Nba,
    Wnba,
    Ncaab,
    Nfl,
    Ncaaf,
    Mlb,
    Nhl,
    Soccer,
    Other,
}

impl From<&str> for Sport {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "nba" | "basketball_nba" => Sport::Nba,
            "wnba" | "basketball_wnba" => Sport::Wnba,
            "ncaab" | "basketball_ncaab" | "college_basketball" => Sport::Ncaab,
            "nfl" | "americanfootball_nfl" | "american_football" => Sport::Nfl,
            "ncaaf" | "americanfootball_ncaaf" | "college_football" => Sport::Ncaaf,
            "mlb" | "baseball_mlb" | "baseball" => Sport::Mlb,
            "nhl" | "icehockey_nhl" | "ice_hockey" => Sport::Nhl,
            "soccer" | "football_eu" => Sport::Soccer,
            _ => Sport::Other,
        }
    }
}

impl From<String> for Sport {
    fn from(s: String) -> Self {
        Sport::from(s.as_str())
    }
}

/// Optional per-leg indicators consumed by the ensemble scorer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegSignals {
    /// Historical hit rate of this side (0.0–1.0).
    #[serde(default, alias = "hitRate")]
    pub hit_rate: Option<f64>,
    #[serde(default)]
    pub trend: Option<Trend>,
    /// Game-to-game consistency (0.0–1.0, higher = steadier).
    #[serde(default, alias = "consistencyScore", alias = "consistency_score")]
    pub consistency: Option<f64>,
    #[serde(default)]
    pub line: Option<f64>,
    #[serde(default, alias = "seasonAverage", alias = "season_avg", alias = "seasonAvg")]
    pub season_average: Option<f64>,
    /// Stated model confidence (0.0–1.0).
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    #[serde(alias = "rising", alias = "hot")]
    Up,
    #[serde(alias = "falling", alias = "cold")]
    Down,
    #[serde(alias = "stable", alias = "neutral")]
    Flat,
}

/// One proposition bet, already normalized by the boundary adapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub player: String,
    pub market: MarketType,
    /// Event identifier; empty when unknown.
    pub event_id: String,
    pub side: Side,
    /// Win probability in (0, 1].
    pub probability: f64,
    /// Decimal odds (> 1.0).
    pub decimal_odds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<LegSignals>,
}

impl Leg {
    pub fn new(
        player: impl Into<String>,
        market: impl Into<MarketType>,
        event_id: impl Into<String>,
        side: Side,
        probability: f64,
        decimal_odds: f64,
    ) -> Self {
        Leg {
            player: player.into(),
            market: market.into(),
            event_id: event_id.into(),
            side,
            probability,
            decimal_odds,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: LegSignals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn stat(&self) -> Option<StatType> {
        self.market.stat()
    }

    pub fn normalized_player(&self) -> String {
        normalize_player(&self.player)
    }
}

/// An ordered set of legs under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParlayCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub sport: Sport,
    pub legs: Vec<Leg>,
}

// ── Boundary adapter ─────────────────────────────────────────────────────────
//
// Upstream producers disagree on field names (snake_case vs camelCase, hit
// rate vs probability, American vs decimal odds). Everything is resolved here
// so the engine only ever sees `Leg`.

#[derive(Debug, Clone, Deserialize)]
pub struct RawLeg {
    #[serde(alias = "player_name", alias = "playerName")]
    pub player: String,
    #[serde(
        alias = "stat_type",
        alias = "statType",
        alias = "market",
        alias = "market_type",
        alias = "marketType",
        alias = "prop_type",
        alias = "propType"
    )]
    pub stat: String,
    #[serde(default, alias = "eventId", alias = "game_id", alias = "gameId")]
    pub event_id: Option<String>,
    #[serde(default, alias = "direction", alias = "pick")]
    pub side: Option<String>,
    #[serde(default, alias = "win_probability", alias = "winProbability")]
    pub probability: Option<f64>,
    /// Historical hit rate; stands in for `probability` when that is absent.
    #[serde(default, alias = "hitRate")]
    pub hit_rate: Option<f64>,
    #[serde(default, alias = "americanOdds")]
    pub american_odds: Option<f64>,
    #[serde(default, alias = "decimalOdds")]
    pub decimal_odds: Option<f64>,
    /// Unlabelled odds: |odds| ≥ 100 is read as American, otherwise decimal.
    #[serde(default)]
    pub odds: Option<f64>,
    #[serde(default)]
    pub signals: Option<LegSignals>,
}

impl TryFrom<RawLeg> for Leg {
    type Error = EngineError;

    fn try_from(raw: RawLeg) -> Result<Self, Self::Error> {
        let player = raw.player.trim().to_string();
        if player.is_empty() {
            return Err(EngineError::InvalidLeg("empty player".into()));
        }
        if raw.stat.trim().is_empty() {
            return Err(EngineError::InvalidLeg(format!("empty market for {player}")));
        }
        let side = raw
            .side
            .as_deref()
            .ok_or_else(|| EngineError::InvalidLeg(format!("missing side for {player}")))?
            .parse::<Side>()?;

        let probability = raw
            .probability
            .or(raw.hit_rate)
            .ok_or_else(|| EngineError::InvalidLeg(format!("missing probability for {player}")))?;
        let probability = normalize_probability(probability)?;

        let decimal_odds = match (raw.decimal_odds, raw.american_odds, raw.odds) {
            (Some(d), _, _) => d,
            (None, Some(a), _) => american_to_decimal(a).ok_or(EngineError::InvalidOdds(a))?,
            (None, None, Some(o)) if o.abs() >= 100.0 => {
                american_to_decimal(o).ok_or(EngineError::InvalidOdds(o))?
            }
            (None, None, Some(o)) => o,
            (None, None, None) => {
                return Err(EngineError::InvalidLeg(format!("missing odds for {player}")))
            }
        };
        if !decimal_odds.is_finite() || decimal_odds <= 1.0 {
            return Err(EngineError::InvalidOdds(decimal_odds));
        }

        Ok(Leg {
            player,
            market: MarketType::parse(&raw.stat),
            event_id: raw.event_id.unwrap_or_default().trim().to_string(),
            side,
            probability,
            decimal_odds,
            signals: raw.signals,
        })
    }
}

/// Accept either a fraction (0.62) or a percentage (62.0).
fn normalize_probability(p: f64) -> EngineResult<f64> {
    let p = if p > 1.0 && p <= 100.0 { p / 100.0 } else { p };
    if !p.is_finite() || p <= 0.0 || p > 1.0 {
        return Err(EngineError::InvalidProbability(p));
    }
    Ok(p)
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawParlay {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sport: Option<String>,
    pub legs: Vec<RawLeg>,
}

impl TryFrom<RawParlay> for ParlayCandidate {
    type Error = EngineError;

    fn try_from(raw: RawParlay) -> Result<Self, Self::Error> {
        let legs = raw
            .legs
            .into_iter()
            .map(Leg::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParlayCandidate {
            id: raw.id,
            sport: raw.sport.as_deref().map(Sport::from).unwrap_or(Sport::Other),
            legs,
        })
    }
}

/// One settled prediction: the probability we stated and whether it hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOutcome")]
pub struct OutcomeRecord {
    pub predicted: f64,
    pub won: bool,
    pub settled_at: Option<DateTime<Utc>>,
}

impl OutcomeRecord {
    pub fn new(predicted: f64, won: bool) -> Self {
        OutcomeRecord {
            predicted,
            won,
            settled_at: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawOutcome {
    #[serde(
        alias = "predicted_probability",
        alias = "predictedProbability",
        alias = "probability"
    )]
    predicted: f64,
    #[serde(default, alias = "hit")]
    won: Option<bool>,
    /// Numeric outcome (1 = win, 0 = loss) from settlement jobs.
    #[serde(default, alias = "actual")]
    outcome: Option<f64>,
    #[serde(default, alias = "settledAt")]
    settled_at: Option<DateTime<Utc>>,
}

impl TryFrom<RawOutcome> for OutcomeRecord {
    type Error = EngineError;

    fn try_from(raw: RawOutcome) -> Result<Self, Self::Error> {
        let won = match (raw.won, raw.outcome) {
            (Some(w), _) => w,
            (None, Some(o)) => o >= 0.5,
            (None, None) => {
                return Err(EngineError::InvalidLeg("outcome record without result".into()))
            }
        };
        let predicted = if raw.predicted > 1.0 && raw.predicted <= 100.0 {
            raw.predicted / 100.0
        } else {
            raw.predicted
        };
        if !predicted.is_finite() {
            return Err(EngineError::InvalidProbability(raw.predicted));
        }
        Ok(OutcomeRecord {
            predicted,
            won,
            settled_at: raw.settled_at,
        })
    }
}

/// A qualifying prop for one player, competing for that player's single slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropCandidate {
    #[serde(alias = "player_name", alias = "playerName")]
    pub player: String,
    #[serde(alias = "stat_type", alias = "statType")]
    pub stat: StatType,
    #[serde(default)]
    pub line: f64,
    #[serde(alias = "overHitRate")]
    pub over_hit_rate: f64,
    #[serde(alias = "underHitRate")]
    pub under_hit_rate: f64,
    #[serde(alias = "recommendation", alias = "direction")]
    pub recommended: Side,
    #[serde(default)]
    pub edge: f64,
    #[serde(default)]
    pub volatility: f64,
}
