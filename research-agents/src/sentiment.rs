//! Sentiment Agent - scores crypto news headlines for market mood
//!
//! Each article is scored against bullish and bearish keyword lexicons.
//! Scores are aggregated globally and per mentioned asset, and served to
//! the signal pipeline through `SentimentSource`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{SentimentScore, SentimentSource};
use dashmap::DashMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::RwLock;
use tracing::{debug, info};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"[a-z]+(?:-[a-z]+)*").unwrap();
    static ref BULLISH: HashSet<&'static str> = [
        "bullish", "uptrend", "rally", "surge", "moon", "rocket", "breakout",
        "accumulation", "buying", "adoption", "partnership", "upgrade", "burn",
        "positive", "gains", "profit",
    ]
    .into_iter()
    .collect();
    static ref BEARISH: HashSet<&'static str> = [
        "bearish", "downtrend", "crash", "dump", "correction", "breakdown",
        "distribution", "selling", "fud", "panic", "regulation", "ban",
        "negative", "losses", "decline", "sell-off",
    ]
    .into_iter()
    .collect();
}

/// Quote assets stripped from trading pairs when matching mentions
const QUOTE_ASSETS: [&str; 4] = ["USDT", "USDC", "BUSD", "USD"];

/// Headline from the news feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    #[serde(default)]
    pub summary: String,
    /// Assets the article mentions, e.g. `["SOL", "ETH"]`
    #[serde(default)]
    pub symbols: Vec<String>,
    pub published_at: DateTime<Utc>,
}

/// Sentiment agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentAgentConfig {
    /// Articles older than this (relative to the newest seen) are dropped
    pub retention_secs: u64,
    /// Fewer articles than this in a scope means no score
    pub min_articles: usize,
}

impl Default for SentimentAgentConfig {
    fn default() -> Self {
        Self {
            retention_secs: 6 * 3600,
            min_articles: 1,
        }
    }
}

#[derive(Debug, Clone)]
struct ScoredArticle {
    polarity: f64,
    assets: Vec<String>,
    published_at: DateTime<Utc>,
}

/// Keyword polarity of one article in [-1, 1]
pub fn score_text(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let (mut bullish, mut bearish) = (0u32, 0u32);
    for word in WORD.find_iter(&lower).map(|m| m.as_str()) {
        if BULLISH.contains(word) {
            bullish += 1;
        } else if BEARISH.contains(word) {
            bearish += 1;
        }
    }

    let total = bullish + bearish;
    if total == 0 {
        return 0.0;
    }
    (f64::from(bullish) - f64::from(bearish)) / f64::from(total)
}

/// Base asset of a trading pair: `SOLUSDT` -> `SOL`
fn base_asset(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    let base = QUOTE_ASSETS
        .iter()
        .find_map(|quote| upper.strip_suffix(quote).filter(|base| !base.is_empty()))
        .map(str::to_string);
    base.unwrap_or(upper)
}

/// Sentiment Agent - analyzes news for market sentiment
pub struct SentimentAgent {
    config: SentimentAgentConfig,
    articles: RwLock<VecDeque<ScoredArticle>>,
    global: RwLock<Option<SentimentScore>>,
    by_asset: DashMap<String, SentimentScore>,
}

impl SentimentAgent {
    pub fn new(config: SentimentAgentConfig) -> Self {
        Self {
            config,
            articles: RwLock::new(VecDeque::new()),
            global: RwLock::new(None),
            by_asset: DashMap::new(),
        }
    }

    /// Score and store articles, prune expired ones, refresh aggregates
    pub async fn add_articles(&self, articles: Vec<NewsArticle>) {
        let count = articles.len();
        let mut store = self.articles.write().await;

        for article in articles {
            let polarity = score_text(&format!("{} {}", article.title, article.summary));
            debug!(title = %article.title, polarity, "scored article");
            store.push_back(ScoredArticle {
                polarity,
                assets: article.symbols.iter().map(|s| base_asset(s)).collect(),
                published_at: article.published_at,
            });
        }

        if let Some(newest) = store.iter().map(|a| a.published_at).max() {
            let horizon = newest - Duration::seconds(self.config.retention_secs as i64);
            store.retain(|a| a.published_at >= horizon);
        }

        self.refresh(&store).await;
        debug!("Added {} articles, retained: {}", count, store.len());
    }

    pub async fn article_count(&self) -> usize {
        self.articles.read().await.len()
    }

    async fn refresh(&self, articles: &VecDeque<ScoredArticle>) {
        let global = self.aggregate(articles.iter()).map(|(p, ts)| SentimentScore::global(p, ts));
        if let Some(score) = &global {
            info!(polarity = score.polarity, articles = articles.len(), "global sentiment updated");
        }
        *self.global.write().await = global;

        let mut grouped: HashMap<&str, Vec<&ScoredArticle>> = HashMap::new();
        for article in articles {
            for asset in &article.assets {
                grouped.entry(asset.as_str()).or_default().push(article);
            }
        }

        self.by_asset.clear();
        for (asset, scoped) in grouped {
            if let Some((polarity, ts)) = self.aggregate(scoped.into_iter()) {
                self.by_asset
                    .insert(asset.to_string(), SentimentScore::for_symbol(asset, polarity, ts));
            }
        }
    }

    /// Mean polarity and newest timestamp, if enough articles
    fn aggregate<'a>(
        &self,
        articles: impl Iterator<Item = &'a ScoredArticle>,
    ) -> Option<(f64, DateTime<Utc>)> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut newest: Option<DateTime<Utc>> = None;
        for article in articles {
            count += 1;
            sum += article.polarity;
            newest = newest.max(Some(article.published_at));
        }

        if count == 0 || count < self.config.min_articles {
            return None;
        }
        newest.map(|ts| ((sum / count as f64).clamp(-1.0, 1.0), ts))
    }
}

impl Default for SentimentAgent {
    fn default() -> Self {
        Self::new(SentimentAgentConfig::default())
    }
}

#[async_trait]
impl SentimentSource for SentimentAgent {
    async fn current_sentiment(&self, symbol: Option<&str>) -> Option<SentimentScore> {
        match symbol {
            Some(symbol) => self
                .by_asset
                .get(&base_asset(symbol))
                .map(|entry| entry.value().clone()),
            None => self.global.read().await.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn article(title: &str, symbols: &[&str], hour: u32) -> NewsArticle {
        NewsArticle {
            title: title.to_string(),
            summary: String::new(),
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_keyword_scoring() {
        assert_eq!(score_text("Solana rally continues as adoption grows"), 1.0);
        assert_eq!(score_text("Exchange ban sparks panic selling"), -1.0);
        assert_eq!(score_text("Bullish breakout fizzles into a crash"), 1.0 / 3.0);
        assert_eq!(score_text("Markets flat ahead of the weekend"), 0.0);
        assert_eq!(score_text("Sell-off deepens"), -1.0);
    }

    #[test]
    fn test_base_asset() {
        assert_eq!(base_asset("SOLUSDT"), "SOL");
        assert_eq!(base_asset("ethusd"), "ETH");
        assert_eq!(base_asset("PEPE"), "PEPE");
        assert_eq!(base_asset("USDT"), "USDT");
    }

    #[tokio::test]
    async fn test_no_articles_is_unavailable() {
        let agent = SentimentAgent::default();
        assert!(agent.current_sentiment(None).await.is_none());
        assert!(agent.current_sentiment(Some("SOLUSDT")).await.is_none());
    }

    #[tokio::test]
    async fn test_global_and_symbol_scores() {
        let agent = SentimentAgent::default();
        agent
            .add_articles(vec![
                article("SOL rally on new partnership", &["SOL"], 10),
                article("Regulators threaten ban, panic spreads", &[], 11),
            ])
            .await;

        let global = agent.current_sentiment(None).await.unwrap();
        assert_eq!(global.polarity, 0.0);
        assert_eq!(global.timestamp.hour(), 11);

        let sol = agent.current_sentiment(Some("SOLUSDT")).await.unwrap();
        assert_eq!(sol.polarity, 1.0);
        assert_eq!(sol.timestamp.hour(), 10);
        assert!(agent.current_sentiment(Some("ETHUSDT")).await.is_none());
    }

    #[tokio::test]
    async fn test_retention_prunes_old_articles() {
        let agent = SentimentAgent::default();
        agent.add_articles(vec![article("crash", &["BTC"], 1)]).await;
        agent.add_articles(vec![article("rally", &["ETH"], 9)]).await;

        assert_eq!(agent.article_count().await, 1);
        assert!(agent.current_sentiment(Some("BTCUSDT")).await.is_none());
        assert_eq!(agent.current_sentiment(None).await.unwrap().polarity, 1.0);
    }

    #[tokio::test]
    async fn test_min_articles_threshold() {
        let agent = SentimentAgent::new(SentimentAgentConfig {
            min_articles: 2,
            ..Default::default()
        });
        agent.add_articles(vec![article("rally", &["SOL"], 1)]).await;
        assert!(agent.current_sentiment(None).await.is_none());

        agent.add_articles(vec![article("dump", &[], 2)]).await;
        assert!(agent.current_sentiment(None).await.is_some());
        assert!(agent.current_sentiment(Some("SOL")).await.is_none());
    }

    #[test]
    fn test_article_deserializes_with_defaults() {
        let json = r#"{"title":"ETH upgrade live","published_at":"2024-03-01T10:00:00Z"}"#;
        let article: NewsArticle = serde_json::from_str(json).unwrap();
        assert!(article.symbols.is_empty());
        assert!(article.summary.is_empty());
    }
}
