use clap::{Parser, Subcommand};
use std::path::PathBuf;

use parlay_engine::parlay::compatibility::ParlayMode;
use parlay_engine::parlay::joint::{AdjustmentDirection, CorrelationAdjustment};
use parlay_engine::parlay::kelly::BankrollConfig;
use parlay_engine::EngineConfig;

/// Parlay risk & construction engine
#[derive(Parser, Debug, Clone)]
#[command(name = "parlay-engine", version, about)]
pub struct Config {
    /// Bankroll available for staking (USD)
    #[arg(long, env = "BANKROLL_AMOUNT", default_value = "1000.0", global = true)]
    pub bankroll_amount: f64,

    /// Fractional Kelly multiplier (0.0–1.0]
    #[arg(long, env = "KELLY_MULTIPLIER", default_value = "0.25", global = true)]
    pub kelly_multiplier: f64,

    /// Maximum single stake as a percent of bankroll
    #[arg(long, env = "MAX_BET_PERCENT", default_value = "5.0", global = true)]
    pub max_bet_percent: f64,

    /// Flat discount on the naive probability product when no correlated
    /// probability is available
    #[arg(long, env = "CORRELATION_FACTOR", default_value = "0.85", global = true)]
    pub correlation_factor: f64,

    /// Parlay construction mode: "safe" (one leg per event) or "high_risk"
    #[arg(long, env = "PARLAY_MODE", default_value = "safe", global = true)]
    pub mode: ParlayMode,

    /// How strongly mean leg correlation moves the joint probability
    #[arg(long, env = "CORRELATION_SENSITIVITY", default_value = "0.5", global = true)]
    pub correlation_sensitivity: f64,

    /// Treat correlation as raising the joint probability instead of lowering it
    #[arg(long, env = "REWARD_CORRELATION", default_value = "false", global = true)]
    pub reward_correlation: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate, correlate and size one or more parlays
    Evaluate {
        /// JSON file with a parlay object or an array of parlays
        #[arg(long)]
        parlays: PathBuf,

        /// JSON file with historical market-pair correlation records
        #[arg(long, env = "CORRELATIONS_PATH")]
        correlations: Option<PathBuf>,
    },
    /// Calibration report over settled predictions
    Calibrate {
        /// JSON array of {predicted, won|outcome, settled_at?} records
        #[arg(long)]
        history: PathBuf,

        /// Number of equal-width probability buckets
        #[arg(long, env = "CALIBRATION_BUCKETS", default_value = "10")]
        buckets: usize,

        /// Only use records settled within the last N days
        #[arg(long)]
        since_days: Option<i64>,
    },
    /// Pick the best prop per player from a candidate list
    BestProp {
        /// JSON array of prop candidates
        #[arg(long)]
        props: PathBuf,
    },
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.bankroll_amount.is_finite() || self.bankroll_amount < 0.0 {
            anyhow::bail!("bankroll_amount must be a non-negative number");
        }
        if !(self.kelly_multiplier > 0.0 && self.kelly_multiplier <= 1.0) {
            anyhow::bail!("kelly_multiplier must be in (0.0, 1.0]");
        }
        if !(self.max_bet_percent > 0.0 && self.max_bet_percent <= 100.0) {
            anyhow::bail!("max_bet_percent must be in (0, 100]");
        }
        if !(self.correlation_factor > 0.0 && self.correlation_factor <= 1.0) {
            anyhow::bail!("correlation_factor must be in (0.0, 1.0]");
        }
        if !self.correlation_sensitivity.is_finite() || self.correlation_sensitivity < 0.0 {
            anyhow::bail!("correlation_sensitivity must be non-negative");
        }
        if let Command::Calibrate { buckets, .. } = &self.command {
            if *buckets == 0 {
                anyhow::bail!("buckets must be at least 1");
            }
        }
        Ok(())
    }

    pub fn bankroll(&self) -> BankrollConfig {
        BankrollConfig {
            bankroll_amount: self.bankroll_amount,
            kelly_multiplier: self.kelly_multiplier,
            max_bet_percent: self.max_bet_percent,
            correlation_factor: self.correlation_factor,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            mode: self.mode,
            bankroll: self.bankroll(),
            adjustment: CorrelationAdjustment {
                direction: if self.reward_correlation {
                    AdjustmentDirection::Reward
                } else {
                    AdjustmentDirection::Penalize
                },
                sensitivity: self.correlation_sensitivity,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(args).expect("args should parse")
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&["parlay-engine", "evaluate", "--parlays", "p.json"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.mode, ParlayMode::Safe);
        let engine = config.engine_config();
        assert_eq!(engine.adjustment.direction, AdjustmentDirection::Penalize);
        assert_eq!(engine.bankroll.max_bet_percent, 5.0);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let config = parse(&[
            "parlay-engine",
            "evaluate",
            "--parlays",
            "p.json",
            "--mode",
            "high_risk",
            "--bankroll-amount",
            "250",
        ]);
        assert_eq!(config.mode, ParlayMode::HighRisk);
        assert_eq!(config.bankroll().bankroll_amount, 250.0);
    }

    #[test]
    fn rejects_out_of_range_multiplier() {
        let config = parse(&[
            "parlay-engine",
            "--kelly-multiplier",
            "1.5",
            "best-prop",
            "--props",
            "x.json",
        ]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Config::try_parse_from([
            "parlay-engine",
            "--mode",
            "yolo",
            "best-prop",
            "--props",
            "x.json"
        ])
        .is_err());
    }

    #[test]
    fn rejects_zero_buckets() {
        let config = parse(&[
            "parlay-engine",
            "calibrate",
            "--history",
            "h.json",
            "--buckets",
            "0",
        ]);
        assert!(config.validate().is_err());
    }
}
