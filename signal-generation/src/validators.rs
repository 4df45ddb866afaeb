// Candidate Validators
// Gates a candidate event must clear before it can become a signal

use super::signals::{CandidateEvent, Rejection, Verdict};
use common::{Direction, EngineConfig, QualityConfig, SentimentConfig, SentimentScore, SentimentSource};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A stage in the gating sequence
#[async_trait::async_trait]
pub trait CandidateValidator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn validate(&self, candidate: &CandidateEvent) -> Verdict;
}

/// Confirmation count, volume ratio and volatility floor
pub struct QualityGate {
    config: QualityConfig,
    /// Minimum ATR per symbol; symbols not listed have no floor
    min_atr: HashMap<String, f64>,
}

impl QualityGate {
    pub fn new(config: QualityConfig, min_atr: HashMap<String, f64>) -> Self {
        Self { config, min_atr }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        let min_atr = config
            .symbols
            .iter()
            .map(|s| (s.name.clone(), s.min_atr))
            .collect();
        Self::new(config.quality.clone(), min_atr)
    }

    fn check(&self, candidate: &CandidateEvent) -> Verdict {
        if candidate.confirmations < self.config.min_confirmations {
            return Verdict::Reject(Rejection::InsufficientConfirmations {
                have: candidate.confirmations,
                need: self.config.min_confirmations,
            });
        }

        if self.config.volume_filter {
            // no average volume yet reads as no liquidity confirmation
            let ratio = candidate.snapshot.volume_ratio().unwrap_or(0.0);
            if ratio < self.config.min_volume_ratio {
                return Verdict::Reject(Rejection::LowVolume {
                    ratio,
                    min: self.config.min_volume_ratio,
                });
            }
        }

        let min_atr = self
            .min_atr
            .get(&candidate.symbol.name)
            .copied()
            .unwrap_or(0.0);
        if candidate.snapshot.atr < min_atr {
            return Verdict::Reject(Rejection::LowVolatility {
                atr: candidate.snapshot.atr,
                min: min_atr,
            });
        }

        Verdict::Pass
    }
}

#[async_trait::async_trait]
impl CandidateValidator for QualityGate {
    fn name(&self) -> &'static str {
        "quality"
    }

    async fn validate(&self, candidate: &CandidateEvent) -> Verdict {
        let verdict = self.check(candidate);
        debug!(
            "Quality gate for {} {}: {:?}",
            candidate.symbol, candidate.direction, verdict
        );
        verdict
    }
}

/// Vetoes candidates that run against strong news sentiment
pub struct SentimentGate {
    config: SentimentConfig,
    source: Arc<dyn SentimentSource>,
}

impl SentimentGate {
    pub fn new(config: SentimentConfig, source: Arc<dyn SentimentSource>) -> Self {
        Self { config, source }
    }

    /// Symbol score if fresh, else global, else neutral
    async fn effective_polarity(&self, candidate: &CandidateEvent) -> f64 {
        let staleness = chrono::Duration::seconds(self.config.staleness_secs as i64);
        let fresh = |score: &SentimentScore| candidate.timestamp - score.timestamp <= staleness;

        if let Some(score) = self
            .source
            .current_sentiment(Some(&candidate.symbol.name))
            .await
        {
            if fresh(&score) {
                return score.polarity;
            }
            debug!(symbol = %candidate.symbol, "symbol sentiment is stale, using global");
        }

        match self.source.current_sentiment(None).await {
            Some(score) => score.polarity,
            None => 0.0,
        }
    }
}

#[async_trait::async_trait]
impl CandidateValidator for SentimentGate {
    fn name(&self) -> &'static str {
        "sentiment"
    }

    async fn validate(&self, candidate: &CandidateEvent) -> Verdict {
        let polarity = self.effective_polarity(candidate).await;
        let vetoed = match candidate.direction {
            Direction::Long => polarity < self.config.negative_threshold,
            Direction::Short => polarity > self.config.positive_threshold,
        };
        debug!(
            "Sentiment gate for {} {}: polarity {:+.2}, vetoed? {}",
            candidate.symbol, candidate.direction, polarity, vetoed
        );

        if vetoed {
            Verdict::Reject(Rejection::SentimentVeto {
                direction: candidate.direction,
                polarity,
            })
        } else {
            Verdict::Pass
        }
    }
}
