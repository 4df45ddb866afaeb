use thiserror::Error;

/// Failures that abort an evaluation or startup.
///
/// Gate rejections are deliberately not represented here: a rejected
/// candidate is a normal outcome and travels as a `Rejection` value.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient history for {symbol}: need {required} bars, have {available}")]
    InsufficientHistory {
        symbol: String,
        required: usize,
        available: usize,
    },

    #[error("malformed snapshot for {symbol}: {reason}")]
    MalformedSnapshot { symbol: String, reason: String },

    #[error("indicator error: {0}")]
    Indicator(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Data errors abort one symbol/bar evaluation and are never fatal.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientHistory { .. }
                | EngineError::MalformedSnapshot { .. }
                | EngineError::Indicator(_)
        )
    }

    pub fn malformed(symbol: &str, reason: impl Into<String>) -> Self {
        EngineError::MalformedSnapshot {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}
