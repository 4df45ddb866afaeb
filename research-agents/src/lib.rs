//! Research Agents
//!
//! News-driven collaborators for the signal pipeline. The sentiment agent
//! turns crypto headlines into the polarity scores the sentiment gate reads.

pub mod sentiment;

pub use sentiment::{score_text, NewsArticle, SentimentAgent, SentimentAgentConfig};
