// Signal Generation Framework
// Turns indicator snapshots into gated, rate-limited trade signals

pub mod indicators;
pub mod levels;
pub mod pipeline;
pub mod rate_limit;
pub mod scorer;
pub mod signals;
pub mod validators;

pub use indicators::{compute_indicators, IndicatorEngine};
pub use levels::TradeLevels;
pub use pipeline::{Evaluation, SignalPipeline};
pub use rate_limit::{RateLimitState, RateLimiter};
pub use scorer::ConfirmationScorer;
pub use signals::{BarWindow, CandidateEvent, Rejection, Verdict};
pub use validators::{CandidateValidator, QualityGate, SentimentGate};
