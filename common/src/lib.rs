//! Shared domain types for the signal engine.
//!
//! Every crate in the workspace speaks in these types: symbols and their
//! categories, candles and indicator snapshots, sentiment scores and the
//! final `Signal` artifact. The configuration surface and the error taxonomy
//! live here as well so that startup validation happens in one place.

pub mod config;
pub mod error;
pub mod sentiment;
pub mod types;

pub use config::{
    CategoryCaps, DispatchConfig, EmailConfig, EngineConfig, FeedConfig, IndicatorConfig, LevelConfig, LevelMode,
    QualityConfig, RateLimitConfig, SentimentConfig, SymbolConfig, TelegramConfig,
};
pub use error::EngineError;
pub use sentiment::{NeutralSentiment, SentimentSource};
pub use types::{
    Candle, Category, Direction, IndicatorSnapshot, SentimentScope, SentimentScore, Signal, Symbol,
    TakeProfit,
};
