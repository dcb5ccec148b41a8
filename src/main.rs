use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

mod config;

use config::{Command, Config};
use parlay_engine::models::{OutcomeRecord, PropCandidate, RawParlay};
use parlay_engine::parlay::calibration::{settled_since, CalibrationTracker};
use parlay_engine::parlay::compatibility::{normalize_player, select_best_prop};
use parlay_engine::parlay::correlation::{CorrelationRecord, CorrelationTable};
use parlay_engine::{ParlayCandidate, ParlayEngine, ParlayEvaluation};

/// A parlays file may hold one parlay or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParlayFile {
    Many(Vec<RawParlay>),
    One(RawParlay),
}

#[derive(Serialize)]
struct EvaluationOutput<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(flatten)]
    evaluation: &'a ParlayEvaluation,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    // stdout carries results only; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();
    config.validate()?;

    match &config.command {
        Command::Evaluate {
            parlays,
            correlations,
        } => evaluate(&config, parlays, correlations.as_deref()),
        Command::Calibrate {
            history,
            buckets,
            since_days,
        } => calibrate(history, *buckets, *since_days),
        Command::BestProp { props } => best_prop(props),
    }
}

fn evaluate(config: &Config, parlays: &Path, correlations: Option<&Path>) -> Result<()> {
    let table = match correlations {
        Some(path) => {
            let records: Vec<CorrelationRecord> = read_json(path)?;
            let table = CorrelationTable::from_records(records);
            info!("Loaded {} historical correlations from {}", table.len(), path.display());
            table
        }
        None => CorrelationTable::new(),
    };

    let raw = match read_json::<ParlayFile>(parlays)? {
        ParlayFile::Many(v) => v,
        ParlayFile::One(p) => vec![p],
    };
    let candidates = raw
        .into_iter()
        .enumerate()
        .map(|(i, p)| {
            ParlayCandidate::try_from(p).with_context(|| format!("Invalid parlay at index {i}"))
        })
        .collect::<Result<Vec<_>>>()?;

    info!(
        mode = %config.mode,
        parlays = candidates.len(),
        "Evaluating parlays"
    );

    let engine = ParlayEngine::new(config.engine_config(), table);
    let evaluations = engine.evaluate_all(&candidates)?;

    let accepted = evaluations.iter().filter(|e| e.is_accepted()).count();
    if accepted < evaluations.len() {
        warn!(
            "{} of {} parlays rejected",
            evaluations.len() - accepted,
            evaluations.len()
        );
    }

    let output: Vec<EvaluationOutput<'_>> = candidates
        .iter()
        .zip(&evaluations)
        .map(|(c, e)| EvaluationOutput {
            id: c.id.as_deref(),
            evaluation: e,
        })
        .collect();
    print_json(&output)
}

fn calibrate(history: &Path, buckets: usize, since_days: Option<i64>) -> Result<()> {
    let mut records: Vec<OutcomeRecord> = read_json(history)?;
    if let Some(days) = since_days {
        let cutoff = Utc::now() - Duration::days(days);
        let before = records.len();
        records = settled_since(&records, cutoff);
        info!(
            "Using {} of {} records settled in the last {} days",
            records.len(),
            before,
            days
        );
    }
    if records.is_empty() {
        warn!("No settled predictions to calibrate against");
    }

    let report = CalibrationTracker::new(buckets).report(&records);
    if let Some(grade) = report.grade {
        info!(
            "Calibration grade {} (ECE {:.4}, Brier {:.4})",
            grade.label(),
            report.ece,
            report.brier_score
        );
    }
    print_json(&report)
}

fn best_prop(props: &Path) -> Result<()> {
    let candidates: Vec<PropCandidate> = read_json(props)?;

    // Group by player, keeping first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut by_player: HashMap<String, Vec<PropCandidate>> = HashMap::new();
    for prop in candidates {
        let key = normalize_player(&prop.player);
        if !by_player.contains_key(&key) {
            order.push(key.clone());
        }
        by_player.entry(key).or_default().push(prop);
    }

    let picks: Vec<&PropCandidate> = order
        .iter()
        .filter_map(|key| by_player.get(key))
        .filter_map(|props| select_best_prop(props))
        .collect();
    info!("Selected {} props across {} players", picks.len(), order.len());
    print_json(&picks)
}
