use thiserror::Error;

/// Errors raised by the parlay engine.
///
/// Rule violations (duplicate player, combo overlap, same event in safe mode)
/// are *not* errors; they come back as boolean verdicts. Only malformed input
/// and broken internal invariants surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A parlay that should already have been filtered still contains the same
    /// player twice. Indicates an upstream logic bug, not a user rejection.
    #[error("invariant violated in {context}: player '{player}' appears more than once")]
    DuplicatePlayer { context: String, player: String },

    #[error("invalid odds: {0}")]
    InvalidOdds(f64),

    #[error("invalid probability: {0}")]
    InvalidProbability(f64),

    #[error("invalid leg: {0}")]
    InvalidLeg(String),

    #[error("unknown parlay mode '{0}' (expected 'safe' or 'high_risk')")]
    UnknownMode(String),
}

impl EngineError {
    /// True for failures that signal a programming error rather than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, EngineError::DuplicatePlayer { .. })
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
