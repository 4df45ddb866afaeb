// Signal Generation Pipeline
// Sequences scorer, gates and rate limiter for one (symbol, bar) event

use super::levels::TradeLevels;
use super::rate_limit::RateLimiter;
use super::scorer::ConfirmationScorer;
use super::signals::{BarWindow, Rejection, Verdict};
use super::validators::{CandidateValidator, QualityGate, SentimentGate};
use common::{EngineConfig, EngineError, LevelConfig, SentimentSource, Signal, Symbol};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// No EMA cross on this bar
    NoCrossover,
    Rejected(Rejection),
    Emitted(Signal),
}

impl Evaluation {
    pub fn label(&self) -> &'static str {
        match self {
            Evaluation::NoCrossover => "no_crossover",
            Evaluation::Rejected(_) => "rejected",
            Evaluation::Emitted(_) => "emitted",
        }
    }

    pub fn signal(&self) -> Option<&Signal> {
        match self {
            Evaluation::Emitted(signal) => Some(signal),
            _ => None,
        }
    }
}

/// Signal decision pipeline
pub struct SignalPipeline {
    scorer: ConfirmationScorer,
    validators: Vec<Box<dyn CandidateValidator>>,
    rate_limiter: Arc<RateLimiter>,
    levels: LevelConfig,
}

impl SignalPipeline {
    /// Empty pipeline; gates run in the order they are added
    pub fn new(rate_limiter: Arc<RateLimiter>, levels: LevelConfig) -> Self {
        Self {
            scorer: ConfirmationScorer::new(),
            validators: Vec::new(),
            rate_limiter,
            levels,
        }
    }

    /// Quality gate, then sentiment gate
    pub fn from_config(
        config: &EngineConfig,
        sentiment: Arc<dyn SentimentSource>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self::new(rate_limiter, config.levels.clone())
            .add_validator(Box::new(QualityGate::from_config(config)))
            .add_validator(Box::new(SentimentGate::new(config.sentiment.clone(), sentiment)))
    }

    pub fn add_validator(mut self, validator: Box<dyn CandidateValidator>) -> Self {
        info!("Adding candidate validator: {}", validator.name());
        self.validators.push(validator);
        self
    }

    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Evaluate the current bar of `window`.
    ///
    /// Gate and rate-limit rejections are `Ok(Evaluation::Rejected(..))`;
    /// `Err` is reserved for data errors. The rate limiter only records the
    /// emission when a signal is actually produced.
    pub async fn evaluate(&self, symbol: &Symbol, window: BarWindow) -> Result<Evaluation, EngineError> {
        if window.current().symbol != symbol.name {
            return Err(EngineError::malformed(
                &symbol.name,
                format!("window belongs to {}", window.current().symbol),
            ));
        }

        let Some(candidate) = self.scorer.score(symbol, window) else {
            return Ok(Evaluation::NoCrossover);
        };

        for validator in &self.validators {
            if let Verdict::Reject(rejection) = validator.validate(&candidate).await {
                debug!(
                    symbol = %symbol,
                    direction = %candidate.direction,
                    gate = validator.name(),
                    reason = rejection.reason(),
                    "candidate rejected: {}",
                    rejection
                );
                return Ok(Evaluation::Rejected(rejection));
            }
        }

        let levels = TradeLevels::compute(candidate.direction, &candidate.snapshot, &self.levels)?;
        if let Verdict::Reject(rejection) = levels.check(candidate.direction, self.levels.min_risk_reward) {
            debug!(
                symbol = %symbol,
                direction = %candidate.direction,
                reason = rejection.reason(),
                "candidate levels rejected: {}",
                rejection
            );
            return Ok(Evaluation::Rejected(rejection));
        }

        if let Verdict::Reject(rejection) = self.rate_limiter.admit(symbol, candidate.timestamp).await {
            debug!(
                symbol = %symbol,
                direction = %candidate.direction,
                reason = rejection.reason(),
                "candidate rate limited: {}",
                rejection
            );
            return Ok(Evaluation::Rejected(rejection));
        }

        let signal = Signal::new(
            symbol,
            candidate.direction,
            candidate.confirmations,
            levels.entry,
            levels.stop_loss,
            levels.take_profits,
            candidate.timestamp,
        );
        info!(
            symbol = %symbol,
            direction = %signal.direction(),
            confirmations = signal.confirmations(),
            entry = %signal.entry_price(),
            "signal emitted"
        );
        Ok(Evaluation::Emitted(signal))
    }
}
