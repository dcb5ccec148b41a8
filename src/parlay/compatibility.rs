//! Leg compatibility rules.
//!
//! Every rule here is a plain predicate: a violation is a normal rejection the
//! caller filters on, never an error. The one exception is
//! [`assert_no_duplicate_players`], which guards an invariant that upstream
//! filtering must already have established.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error};

use crate::error::{EngineError, EngineResult};
use crate::models::{Leg, PropCandidate, Side, StatType};

// ── Canonicalization ─────────────────────────────────────────────────────────

const POINTS: u8 = 0b001;
const REBOUNDS: u8 = 0b010;
const ASSISTS: u8 = 0b100;

/// Component set → canonical category.
static STAT_COMPONENTS: [(u8, StatType); 7] = [
    (POINTS | REBOUNDS | ASSISTS, StatType::PointsReboundsAssists),
    (POINTS | REBOUNDS, StatType::PointsRebounds),
    (POINTS | ASSISTS, StatType::PointsAssists),
    (REBOUNDS | ASSISTS, StatType::ReboundsAssists),
    (POINTS, StatType::Points),
    (REBOUNDS, StatType::Rebounds),
    (ASSISTS, StatType::Assists),
];

/// Base components named by one segment. Short forms are any run of distinct
/// `p`/`r`/`a` letters, in any order (`pra`, `rp`, `a`).
fn segment_components(segment: &str) -> u8 {
    match segment {
        "points" | "point" | "pts" | "pt" => POINTS,
        "rebounds" | "rebound" | "rebs" | "reb" => REBOUNDS,
        "assists" | "assist" | "asts" | "ast" => ASSISTS,
        short if short.len() <= 3 => {
            let mut set = 0u8;
            for c in short.chars() {
                let bit = match c {
                    'p' => POINTS,
                    'r' => REBOUNDS,
                    'a' => ASSISTS,
                    _ => return 0,
                };
                if set & bit != 0 {
                    return 0;
                }
                set |= bit;
            }
            set
        }
        _ => 0,
    }
}

/// Map any stat/market spelling to its canonical category, or `None` when the
/// market is not a counting-stat prop.
///
/// Every segment contributes its base components and the union decides the
/// category, so a three-way combo is recognised whatever the order or mix of
/// spellings (`"Rebounds + Assists + Points"`, `"Points+Reb+Ast"`).
pub fn canonicalize_stat(raw: &str) -> Option<StatType> {
    let components = raw
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .fold(0u8, |set, segment| set | segment_components(segment));
    STAT_COMPONENTS
        .iter()
        .find(|(set, _)| *set == components)
        .map(|(_, stat)| *stat)
}

/// Player identity key: lowercase + trim.
pub fn normalize_player(name: &str) -> String {
    name.trim().to_lowercase()
}

// ── Parlay mode ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParlayMode {
    /// One leg per event.
    #[default]
    Safe,
    /// Same-game stacking allowed.
    HighRisk,
}

impl FromStr for ParlayMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" => Ok(ParlayMode::Safe),
            "high_risk" | "high-risk" | "highrisk" => Ok(ParlayMode::HighRisk),
            other => Err(EngineError::UnknownMode(other.to_string())),
        }
    }
}

impl fmt::Display for ParlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParlayMode::Safe => f.write_str("safe"),
            ParlayMode::HighRisk => f.write_str("high_risk"),
        }
    }
}

// ── Rules ────────────────────────────────────────────────────────────────────

/// True iff `player` has no leg yet. `existing_counts` is keyed by normalized
/// player name.
pub fn can_add_player_leg(existing_counts: &HashMap<String, usize>, player: &str) -> bool {
    existing_counts
        .get(&normalize_player(player))
        .copied()
        .unwrap_or(0)
        == 0
}

/// Whether adding `candidate` after `existing` would double-count a stat for
/// the same player.
///
/// A compound candidate is rejected as soon as the player has any other leg.
/// A base candidate is rejected only when one of the player's existing legs is
/// a compound that already sums it; two different base stats are fine.
pub fn violates_combo_overlap(existing: &[Leg], candidate: &Leg) -> bool {
    let Some(candidate_stat) = candidate.stat() else {
        return false;
    };
    let player = candidate.normalized_player();
    let same_player: Vec<&Leg> = existing
        .iter()
        .filter(|l| l.normalized_player() == player)
        .collect();

    if candidate_stat.is_compound() {
        return !same_player.is_empty();
    }

    same_player
        .iter()
        .filter_map(|l| l.stat())
        .any(|s| s.is_compound() && s.base_components().contains(&candidate_stat))
}

pub fn no_same_player(legs: &[Leg]) -> bool {
    let mut seen = HashSet::with_capacity(legs.len());
    legs.iter().all(|l| seen.insert(l.normalized_player()))
}

/// Left fold: each leg is checked against every leg before it.
pub fn no_base_combo_overlap(legs: &[Leg]) -> bool {
    (0..legs.len()).all(|i| !violates_combo_overlap(&legs[..i], &legs[i]))
}

/// In safe mode every known event may appear at most once. Legs with an empty
/// event id are not constrained.
pub fn no_same_event_in_safe_mode(legs: &[Leg], mode: ParlayMode) -> bool {
    if mode == ParlayMode::HighRisk {
        return true;
    }
    let mut seen = HashSet::new();
    legs.iter()
        .filter(|l| !l.event_id.is_empty())
        .all(|l| seen.insert(l.event_id.as_str()))
}

/// Fatal check for code paths that run after filtering. Hitting this means a
/// caller skipped [`no_same_player`].
pub fn assert_no_duplicate_players(legs: &[Leg], context: &str) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(legs.len());
    for leg in legs {
        if !seen.insert(leg.normalized_player()) {
            error!(context = %context, player = %leg.player, "duplicate player reached post-filter stage");
            return Err(EngineError::DuplicatePlayer {
                context: context.to_string(),
                player: leg.player.clone(),
            });
        }
    }
    Ok(())
}

// ── Prop selection ───────────────────────────────────────────────────────────

/// Reliability ranking of each stat category (higher = steadier).
static STAT_SAFETY_WEIGHTS: [(StatType, f64); 7] = [
    (StatType::ReboundsAssists, 5.0),
    (StatType::Rebounds, 4.0),
    (StatType::Assists, 3.0),
    (StatType::Points, 2.0),
    (StatType::PointsRebounds, 2.0),
    (StatType::PointsAssists, 2.0),
    (StatType::PointsReboundsAssists, 1.0),
];

pub fn stat_safety_weight(stat: StatType) -> f64 {
    STAT_SAFETY_WEIGHTS
        .iter()
        .find(|(s, _)| *s == stat)
        .map(|(_, w)| *w)
        .unwrap_or(0.0)
}

/// `hitRate·100 + |edge|·8 − volatility·40 + safety·5`, where the hit rate is
/// the one matching the prop's own recommended direction.
pub fn prop_quality(prop: &PropCandidate) -> f64 {
    let hit_rate = match prop.recommended {
        Side::Under => prop.under_hit_rate,
        _ => prop.over_hit_rate,
    };
    hit_rate * 100.0 + prop.edge.abs() * 8.0 - prop.volatility * 40.0
        + stat_safety_weight(prop.stat) * 5.0
}

/// Pick the highest-quality prop; the first one wins a tie.
pub fn select_best_prop(candidates: &[PropCandidate]) -> Option<&PropCandidate> {
    let mut best: Option<(&PropCandidate, f64)> = None;
    for prop in candidates {
        let q = prop_quality(prop);
        match best {
            Some((_, best_q)) if q <= best_q => {}
            _ => best = Some((prop, q)),
        }
    }
    if let Some((prop, q)) = best {
        debug!(player = %prop.player, stat = %prop.stat, quality = q, "selected prop");
    }
    best.map(|(p, _)| p)
}

// ── Combined verdict ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RejectionReason {
    DuplicatePlayer { player: String },
    ComboOverlap { player: String, stat: StatType },
    SameEvent { event_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompatibilityVerdict {
    pub accepted: bool,
    pub reasons: Vec<RejectionReason>,
}

/// Run every rule and report each violation, in leg order.
pub fn check_compatibility(legs: &[Leg], mode: ParlayMode) -> CompatibilityVerdict {
    let mut reasons = Vec::new();

    let mut counts: HashMap<String, usize> = HashMap::new();
    for leg in legs {
        if !can_add_player_leg(&counts, &leg.player) {
            reasons.push(RejectionReason::DuplicatePlayer {
                player: leg.player.clone(),
            });
        }
        *counts.entry(leg.normalized_player()).or_insert(0) += 1;
    }

    for (i, leg) in legs.iter().enumerate() {
        if violates_combo_overlap(&legs[..i], leg) {
            if let Some(stat) = leg.stat() {
                reasons.push(RejectionReason::ComboOverlap {
                    player: leg.player.clone(),
                    stat,
                });
            }
        }
    }

    if mode == ParlayMode::Safe {
        let mut seen = HashSet::new();
        for leg in legs.iter().filter(|l| !l.event_id.is_empty()) {
            if !seen.insert(leg.event_id.as_str()) {
                reasons.push(RejectionReason::SameEvent {
                    event_id: leg.event_id.clone(),
                });
            }
        }
    }

    CompatibilityVerdict {
        accepted: reasons.is_empty(),
        reasons,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketType;

    fn prop_leg(player: &str, stat: StatType) -> Leg {
        Leg::new(player, stat, "", Side::Over, 0.55, 1.9)
    }

    fn event_leg(player: &str, event: &str) -> Leg {
        Leg::new(player, StatType::Points, event, Side::Over, 0.55, 1.9)
    }

    fn prop(stat: StatType, over: f64, under: f64, rec: Side, edge: f64, vol: f64) -> PropCandidate {
        PropCandidate {
            player: "Nikola Jokic".into(),
            stat,
            line: 10.5,
            over_hit_rate: over,
            under_hit_rate: under,
            recommended: rec,
            edge,
            volatility: vol,
        }
    }

    #[test]
    fn canonicalize_prefers_three_way_combo() {
        for raw in [
            "pra",
            "PRA",
            "Pts+Reb+Ast",
            "P+R+A",
            "player_points_rebounds_assists",
            "Points + Rebounds + Assists",
            "points, rebounds and assists",
        ] {
            assert_eq!(
                canonicalize_stat(raw),
                Some(StatType::PointsReboundsAssists),
                "{raw}"
            );
        }
    }

    #[test]
    fn canonicalize_three_way_in_any_order_or_spelling() {
        for raw in [
            "Points + Assists + Rebounds",
            "Rebounds+Assists+Points",
            "Points+Reb+Ast",
            "pts_reb_asts",
            "Assists & Pts & Rebs",
            "rpa",
            "PR + A",
        ] {
            assert_eq!(
                canonicalize_stat(raw),
                Some(StatType::PointsReboundsAssists),
                "{raw}"
            );
        }
        assert_eq!(canonicalize_stat("Assists + Points"), Some(StatType::PointsAssists));
        assert_eq!(canonicalize_stat("ar"), Some(StatType::ReboundsAssists));
    }

    #[test]
    fn combo_overlap_sees_reordered_three_way_market() {
        let existing = vec![Leg::new(
            "LeBron James",
            MarketType::parse("Points+Reb+Ast"),
            "",
            Side::Over,
            0.55,
            1.9,
        )];
        assert_eq!(existing[0].stat(), Some(StatType::PointsReboundsAssists));
        assert!(violates_combo_overlap(&existing, &prop_leg("LeBron James", StatType::Points)));
    }

    #[test]
    fn canonicalize_two_way_and_base() {
        assert_eq!(canonicalize_stat("Pts+Reb"), Some(StatType::PointsRebounds));
        assert_eq!(canonicalize_stat("player_points_assists"), Some(StatType::PointsAssists));
        assert_eq!(canonicalize_stat("Rebs+Asts"), Some(StatType::ReboundsAssists));
        assert_eq!(canonicalize_stat("player_rebounds"), Some(StatType::Rebounds));
        assert_eq!(canonicalize_stat(" Points "), Some(StatType::Points));
        assert_eq!(canonicalize_stat("ast"), Some(StatType::Assists));
    }

    #[test]
    fn canonicalize_rejects_non_stat_markets() {
        assert_eq!(canonicalize_stat("moneyline"), None);
        assert_eq!(canonicalize_stat("player_pass_attempts"), None);
        assert_eq!(canonicalize_stat("passing_yards"), None);
        assert_eq!(canonicalize_stat("ppa"), None);
        assert_eq!(canonicalize_stat(""), None);
    }

    #[test]
    fn normalize_player_is_idempotent() {
        for name in ["  LeBron James ", "LEBRON JAMES", "lebron james", "\tLuka Dončić\n"] {
            let once = normalize_player(name);
            assert_eq!(normalize_player(&once), once);
        }
        assert_eq!(normalize_player("  LeBron James "), normalize_player("LEBRON JAMES"));
    }

    #[test]
    fn can_add_player_leg_checks_normalized_count() {
        let mut counts = HashMap::new();
        assert!(can_add_player_leg(&counts, "LeBron James"));
        counts.insert("lebron james".to_string(), 1);
        assert!(!can_add_player_leg(&counts, " LEBRON JAMES"));
        counts.insert("anthony davis".to_string(), 0);
        assert!(can_add_player_leg(&counts, "Anthony Davis"));
    }

    #[test]
    fn combo_overlap_empty_existing_never_violates() {
        for stat in [StatType::Points, StatType::PointsReboundsAssists, StatType::ReboundsAssists] {
            assert!(!violates_combo_overlap(&[], &prop_leg("LeBron James", stat)));
        }
    }

    #[test]
    fn combo_overlap_compound_after_base_violates() {
        let existing = vec![prop_leg("LeBron James", StatType::Points)];
        let candidate = prop_leg("LeBron James", StatType::PointsReboundsAssists);
        assert!(violates_combo_overlap(&existing, &candidate));
    }

    #[test]
    fn combo_overlap_distinct_base_stats_allowed() {
        let existing = vec![prop_leg("LeBron James", StatType::Points)];
        let candidate = prop_leg("LeBron James", StatType::Rebounds);
        assert!(!violates_combo_overlap(&existing, &candidate));
    }

    #[test]
    fn combo_overlap_base_inside_existing_compound() {
        let existing = vec![prop_leg("LeBron James", StatType::PointsRebounds)];
        assert!(violates_combo_overlap(&existing, &prop_leg("lebron james ", StatType::Rebounds)));
        assert!(!violates_combo_overlap(&existing, &prop_leg("LeBron James", StatType::Assists)));
    }

    #[test]
    fn combo_overlap_compound_blocked_even_without_shared_base() {
        // Conservative policy: any existing leg for the player blocks a compound.
        let existing = vec![prop_leg("LeBron James", StatType::Assists)];
        let candidate = prop_leg("LeBron James", StatType::PointsRebounds);
        assert!(violates_combo_overlap(&existing, &candidate));
    }

    #[test]
    fn combo_overlap_ignores_other_players_and_non_stat_markets() {
        let existing = vec![prop_leg("Anthony Davis", StatType::PointsReboundsAssists)];
        assert!(!violates_combo_overlap(&existing, &prop_leg("LeBron James", StatType::Points)));

        let ml = Leg::new(
            "LeBron James",
            MarketType::Other("moneyline".into()),
            "",
            Side::Home,
            0.6,
            1.7,
        );
        assert!(!violates_combo_overlap(&[prop_leg("LeBron James", StatType::PointsReboundsAssists)], &ml));
    }

    #[test]
    fn no_same_player_cases() {
        assert!(no_same_player(&[]));
        assert!(no_same_player(&[
            prop_leg("LeBron James", StatType::Points),
            prop_leg("Anthony Davis", StatType::Points),
        ]));
        assert!(!no_same_player(&[
            prop_leg("LeBron James", StatType::Points),
            prop_leg("Anthony Davis", StatType::Points),
            prop_leg(" lebron JAMES", StatType::Assists),
        ]));
    }

    #[test]
    fn no_base_combo_overlap_folds_in_order() {
        let ok = vec![
            prop_leg("LeBron James", StatType::Points),
            prop_leg("LeBron James", StatType::Rebounds),
        ];
        assert!(no_base_combo_overlap(&ok));

        let bad = vec![
            prop_leg("LeBron James", StatType::PointsAssists),
            prop_leg("LeBron James", StatType::Assists),
        ];
        assert!(!no_base_combo_overlap(&bad));
    }

    #[test]
    fn same_event_rule_depends_on_mode() {
        let legs = vec![
            event_leg("A", "lal-bos"),
            event_leg("B", "lal-bos"),
            event_leg("C", ""),
            event_leg("D", ""),
        ];
        assert!(!no_same_event_in_safe_mode(&legs, ParlayMode::Safe));
        assert!(no_same_event_in_safe_mode(&legs, ParlayMode::HighRisk));
        assert!(no_same_event_in_safe_mode(&legs[2..], ParlayMode::Safe));
    }

    #[test]
    fn parlay_mode_parses() {
        assert_eq!("safe".parse::<ParlayMode>().unwrap(), ParlayMode::Safe);
        assert_eq!("High_Risk".parse::<ParlayMode>().unwrap(), ParlayMode::HighRisk);
        assert!(matches!(
            "yolo".parse::<ParlayMode>(),
            Err(EngineError::UnknownMode(_))
        ));
    }

    #[test]
    fn assert_no_duplicate_players_is_an_invariant_error() {
        let legs = vec![
            prop_leg("LeBron James", StatType::Points),
            prop_leg("LEBRON JAMES", StatType::Rebounds),
        ];
        let err = assert_no_duplicate_players(&legs, "kelly sizing").unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(assert_no_duplicate_players(&legs[..1], "kelly sizing").is_ok());
    }

    #[test]
    fn select_best_prop_uses_recommended_direction() {
        // Under side has the better hit rate; quality must read under_hit_rate.
        let a = prop(StatType::Points, 0.40, 0.70, Side::Under, 0.0, 0.0);
        let b = prop(StatType::Points, 0.65, 0.35, Side::Over, 0.0, 0.0);
        let props = [a.clone(), b];
        let best = select_best_prop(&props).unwrap();
        assert_eq!(best, &a);
    }

    #[test]
    fn select_best_prop_weighs_safety_and_volatility() {
        // 60 + 0 - 4 + 25 = 81 vs 62 + 0 - 4 + 5 = 63
        let ra = prop(StatType::ReboundsAssists, 0.60, 0.40, Side::Over, 0.0, 0.1);
        let pra = prop(StatType::PointsReboundsAssists, 0.62, 0.38, Side::Over, 0.0, 0.1);
        let props = [pra, ra.clone()];
        assert_eq!(select_best_prop(&props).unwrap(), &ra);
    }

    #[test]
    fn select_best_prop_tie_keeps_first_and_empty_is_none() {
        let first = prop(StatType::Points, 0.6, 0.4, Side::Over, 1.0, 0.2);
        let mut second = first.clone();
        second.player = "Jamal Murray".into();
        let props = [first.clone(), second];
        let best = select_best_prop(&props).unwrap();
        assert_eq!(best.player, first.player);
        assert!(select_best_prop(&[]).is_none());
    }

    #[test]
    fn check_compatibility_rejects_same_player_stack() {
        let legs = vec![
            prop_leg("LeBron James", StatType::Points),
            prop_leg("LeBron James", StatType::PointsReboundsAssists),
            prop_leg("LeBron James", StatType::Rebounds),
        ];
        let verdict = check_compatibility(&legs, ParlayMode::HighRisk);
        assert!(!verdict.accepted);
        assert!(verdict
            .reasons
            .iter()
            .any(|r| matches!(r, RejectionReason::DuplicatePlayer { .. })));
        assert!(verdict.reasons.contains(&RejectionReason::ComboOverlap {
            player: "LeBron James".into(),
            stat: StatType::PointsReboundsAssists,
        }));
    }

    #[test]
    fn check_compatibility_accepts_clean_parlay() {
        let legs = vec![event_leg("A", "g1"), event_leg("B", "g2"), event_leg("C", "g3")];
        let verdict = check_compatibility(&legs, ParlayMode::Safe);
        assert!(verdict.accepted);
        assert!(verdict.reasons.is_empty());
    }
}
