use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Symbol grouping used for shared rate-limit caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Layer1,
    DeFi,
    Gaming,
    Ai,
    Meme,
    Major,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Layer1 => "layer1",
            Category::DeFi => "defi",
            Category::Gaming => "gaming",
            Category::Ai => "ai",
            Category::Meme => "meme",
            Category::Major => "major",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => f.write_str("LONG"),
            Direction::Short => f.write_str("SHORT"),
        }
    }
}

/// A tradable asset, fixed at configuration time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub category: Category,
}

impl Symbol {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// OHLCV bar as delivered by the market-data feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Indicator values for one symbol at one bar close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub bb_upper: f64,
    pub bb_mid: f64,
    pub bb_lower: f64,
    pub stoch_k: f64,
    pub stoch_d: f64,
    pub atr: f64,
    pub volume: f64,
    pub avg_volume: f64,
}

impl IndicatorSnapshot {
    /// Current volume relative to the rolling average. `None` when the
    /// average is zero, i.e. the market has not traded at all.
    pub fn volume_ratio(&self) -> Option<f64> {
        if self.avg_volume > 0.0 {
            Some(self.volume / self.avg_volume)
        } else {
            None
        }
    }

    /// Reject snapshots that cannot be reasoned about.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fields = [
            ("close", self.close),
            ("ema_fast", self.ema_fast),
            ("ema_slow", self.ema_slow),
            ("rsi", self.rsi),
            ("macd_line", self.macd_line),
            ("macd_signal", self.macd_signal),
            ("bb_upper", self.bb_upper),
            ("bb_mid", self.bb_mid),
            ("bb_lower", self.bb_lower),
            ("stoch_k", self.stoch_k),
            ("stoch_d", self.stoch_d),
            ("atr", self.atr),
            ("volume", self.volume),
            ("avg_volume", self.avg_volume),
        ];

        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(EngineError::malformed(&self.symbol, format!("{name} is not finite")));
        }
        if self.close <= 0.0 {
            return Err(EngineError::malformed(&self.symbol, "close must be positive"));
        }
        if self.volume < 0.0 || self.avg_volume < 0.0 || self.atr < 0.0 {
            return Err(EngineError::malformed(&self.symbol, "negative volume or atr"));
        }
        Ok(())
    }
}

/// Which population a sentiment score describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentScope {
    Global,
    Symbol(String),
}

/// Sentiment polarity from the news collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub scope: SentimentScope,
    pub polarity: f64, // -1.0 to 1.0
    pub timestamp: DateTime<Utc>,
}

impl SentimentScore {
    pub fn global(polarity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            scope: SentimentScope::Global,
            polarity: polarity.clamp(-1.0, 1.0),
            timestamp,
        }
    }

    pub fn for_symbol(symbol: &str, polarity: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            scope: SentimentScope::Symbol(symbol.to_string()),
            polarity: polarity.clamp(-1.0, 1.0),
            timestamp,
        }
    }
}

/// One take-profit target: distance from entry in percent, and the price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TakeProfit {
    pub pct: Decimal,
    pub price: Decimal,
}

/// The emitted artifact. Fields are private so a signal cannot change after
/// it leaves the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    id: Uuid,
    symbol: String,
    category: Category,
    direction: Direction,
    confirmations: u8,
    entry_price: Decimal,
    stop_loss: Decimal,
    take_profits: Vec<TakeProfit>,
    strength: f64,
    timestamp: DateTime<Utc>,
}

impl Signal {
    pub const MAX_CONFIRMATIONS: u8 = 3;

    pub fn new(
        symbol: &Symbol,
        direction: Direction,
        confirmations: u8,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profits: Vec<TakeProfit>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let confirmations = confirmations.min(Self::MAX_CONFIRMATIONS);
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.name.clone(),
            category: symbol.category,
            direction,
            confirmations,
            entry_price,
            stop_loss,
            take_profits,
            strength: f64::from(confirmations) / f64::from(Self::MAX_CONFIRMATIONS),
            timestamp,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn confirmations(&self) -> u8 {
        self.confirmations
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn stop_loss(&self) -> Decimal {
        self.stop_loss
    }

    pub fn take_profits(&self) -> &[TakeProfit] {
        &self.take_profits
    }

    /// confirmations / 3
    pub fn strength(&self) -> f64 {
        self.strength
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
