//! Pairwise dependence between the legs of a parlay.
//!
//! Three sources, checked in order:
//! - same player in the same event: a fixed high coefficient
//! - same event, different players: a sport-level default
//! - different events: the historical per-sport market-pair table
//!   (0.0 when the pair was never measured)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{Leg, MarketType, Sport};

/// Two legs on one player in one game move together strongly.
pub const SAME_PLAYER_SAME_EVENT: f64 = 0.65;

/// Severity band edges on mean |ρ|.
const SEVERITY_LOW: f64 = 0.10;
const SEVERITY_MEDIUM: f64 = 0.20;
const SEVERITY_HIGH: f64 = 0.30;

/// Default correlation for two different players in the same game.
pub fn same_event_default(sport: Sport) -> f64 {
    match sport {
        Sport::Nba | Sport::Wnba | Sport::Ncaab => 0.15,
        Sport::Nfl | Sport::Ncaaf => 0.20,
        Sport::Mlb => 0.10,
        Sport::Nhl => 0.12,
        Sport::Soccer => 0.15,
        Sport::Other => 0.10,
    }
}

/// Historical market-type coefficients for legs in different events.
/// Implementations hold a pre-fetched snapshot; lookups never block.
pub trait CorrelationSource: Send + Sync {
    fn historical(&self, sport: Sport, a: &MarketType, b: &MarketType) -> Option<f64>;
}

/// One measured coefficient, as exported by the nightly correlation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub sport: Sport,
    #[serde(alias = "marketA", alias = "stat_a")]
    pub market_a: String,
    #[serde(alias = "marketB", alias = "stat_b")]
    pub market_b: String,
    #[serde(alias = "correlation", alias = "rho")]
    pub coefficient: f64,
}

/// In-memory snapshot keyed by sport and unordered market-token pair.
#[derive(Debug, Clone, Default)]
pub struct CorrelationTable {
    entries: HashMap<(Sport, String, String), f64>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CorrelationRecord>) -> Self {
        let mut table = Self::new();
        for r in records {
            let a = MarketType::parse(&r.market_a);
            let b = MarketType::parse(&r.market_b);
            table.insert(r.sport, &a, &b, r.coefficient);
        }
        table
    }

    pub fn insert(&mut self, sport: Sport, a: &MarketType, b: &MarketType, coefficient: f64) {
        if !coefficient.is_finite() {
            return;
        }
        self.entries
            .insert(Self::key(sport, a, b), coefficient.clamp(-1.0, 1.0));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(sport: Sport, a: &MarketType, b: &MarketType) -> (Sport, String, String) {
        let (x, y) = (a.token(), b.token());
        if x <= y {
            (sport, x.to_string(), y.to_string())
        } else {
            (sport, y.to_string(), x.to_string())
        }
    }
}

impl CorrelationSource for CorrelationTable {
    fn historical(&self, sport: Sport, a: &MarketType, b: &MarketType) -> Option<f64> {
        self.entries.get(&Self::key(sport, a, b)).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationSeverity {
    None,
    Low,
    Medium,
    High,
}

impl CorrelationSeverity {
    pub fn from_average(avg: f64) -> Self {
        if avg < SEVERITY_LOW {
            CorrelationSeverity::None
        } else if avg < SEVERITY_MEDIUM {
            CorrelationSeverity::Low
        } else if avg <= SEVERITY_HIGH {
            CorrelationSeverity::Medium
        } else {
            CorrelationSeverity::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    /// Symmetric, unit diagonal.
    pub coefficients: Vec<Vec<f64>>,
    pub avg_correlation: f64,
    pub max_correlation: f64,
    pub severity: CorrelationSeverity,
    pub has_high_correlation: bool,
}

impl CorrelationMatrix {
    pub fn size(&self) -> usize {
        self.coefficients.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.coefficients[i][j]
    }
}

/// Coefficient for one pair of legs.
pub fn pairwise_correlation(a: &Leg, b: &Leg, sport: Sport, source: &dyn CorrelationSource) -> f64 {
    let same_event = !a.event_id.is_empty() && a.event_id == b.event_id;
    let rho = if same_event && a.normalized_player() == b.normalized_player() {
        SAME_PLAYER_SAME_EVENT
    } else if same_event {
        same_event_default(sport)
    } else {
        source.historical(sport, &a.market, &b.market).unwrap_or(0.0)
    };
    rho.clamp(-1.0, 1.0)
}

/// Build the full matrix and its aggregates.
pub fn build_matrix(legs: &[Leg], sport: Sport, source: &dyn CorrelationSource) -> CorrelationMatrix {
    let n = legs.len();
    let mut coefficients = vec![vec![0.0; n]; n];
    let mut abs_sum = 0.0;
    let mut max_abs = 0.0f64;
    let mut pairs = 0usize;
    let mut has_high = false;

    for i in 0..n {
        coefficients[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = pairwise_correlation(&legs[i], &legs[j], sport, source);
            coefficients[i][j] = rho;
            coefficients[j][i] = rho;
            abs_sum += rho.abs();
            max_abs = max_abs.max(rho.abs());
            has_high |= rho.abs() > SEVERITY_HIGH;
            pairs += 1;
        }
    }

    let avg = if pairs > 0 { abs_sum / pairs as f64 } else { 0.0 };
    let severity = CorrelationSeverity::from_average(avg);
    debug!(
        legs = n,
        avg_correlation = format!("{:.3}", avg),
        max_correlation = format!("{:.3}", max_abs),
        ?severity,
        "correlation matrix built"
    );

    CorrelationMatrix {
        coefficients,
        avg_correlation: avg,
        max_correlation: max_abs,
        severity,
        has_high_correlation: has_high,
    }
}
