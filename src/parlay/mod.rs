pub mod calibration;
pub mod compatibility;
pub mod correlation;
pub mod engine;
pub mod ensemble;
pub mod joint;
pub mod kelly;

pub use engine::{AcceptedParlay, EngineConfig, ParlayEngine, ParlayEvaluation};
