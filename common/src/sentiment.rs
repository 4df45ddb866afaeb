use crate::types::SentimentScore;
use async_trait::async_trait;

/// Sentiment collaborator consulted by the sentiment gate.
///
/// `symbol = None` asks for the global (market-wide) score. `None` in the
/// result means the score is unavailable, which never blocks a signal.
#[async_trait]
pub trait SentimentSource: Send + Sync {
    async fn current_sentiment(&self, symbol: Option<&str>) -> Option<SentimentScore>;
}

/// Source that never has an opinion. Useful when no news feed is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeutralSentiment;

#[async_trait]
impl SentimentSource for NeutralSentiment {
    async fn current_sentiment(&self, _symbol: Option<&str>) -> Option<SentimentScore> {
        None
    }
}
