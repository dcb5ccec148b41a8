//! Parlay risk and construction engine.
//!
//! Decides which legs may be combined, discounts their joint probability for
//! dependence, sizes a Kelly stake, and tracks how well stated probabilities
//! have matched outcomes. Everything here is pure and synchronous; callers
//! supply pre-fetched snapshots and own all I/O.

pub mod error;
pub mod models;
pub mod parlay;

pub use error::{EngineError, EngineResult};
pub use models::{Leg, MarketType, OutcomeRecord, ParlayCandidate, Side, Sport, StatType};
pub use parlay::{EngineConfig, ParlayEngine, ParlayEvaluation};
