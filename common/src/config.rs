//! Engine configuration
//!
//! Read once at startup from a TOML file overlaid with `SIGNAL_BOT__*`
//! environment variables. Nothing here is hot-reloaded.

use crate::error::EngineError;
use crate::types::{Category, Symbol};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Overall engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// The basket of tracked symbols
    pub symbols: Vec<SymbolConfig>,

    #[serde(default)]
    pub indicators: IndicatorConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    #[serde(default)]
    pub sentiment: SentimentConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub levels: LevelConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    pub telegram: TelegramConfig,

    /// Fallback channel. Without it an exhausted primary ends local-only.
    #[serde(default)]
    pub email: Option<EmailConfig>,

    #[serde(default)]
    pub feed: FeedConfig,
}

/// A configured symbol and its volatility floor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    pub name: String,
    pub category: Category,

    /// Minimum ATR for a candidate to be considered (filters dead markets)
    #[serde(default)]
    pub min_atr: f64,
}

impl SymbolConfig {
    pub fn symbol(&self) -> Symbol {
        Symbol::new(self.name.clone(), self.category)
    }
}

/// Indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger: usize,
    pub bollinger_std_dev: f64,
    pub stochastic_k: usize,
    pub stochastic_d: usize,
    pub atr: usize,
    pub volume_avg: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_slow: 21,
            rsi: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bollinger: 20,
            bollinger_std_dev: 2.0,
            stochastic_k: 14,
            stochastic_d: 3,
            atr: 14,
            volume_avg: 20,
        }
    }
}

impl IndicatorConfig {
    /// Number of bars needed before every indicator is warmed up.
    pub fn min_lookback(&self) -> usize {
        [
            self.ema_slow,
            self.ema_fast,
            self.rsi + 1,
            self.macd_slow + self.macd_signal,
            self.bollinger,
            self.stochastic_k + self.stochastic_d,
            self.atr + 1,
            // the rolling volume average excludes the current bar
            self.volume_avg + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }
}

/// Quality gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Enable the volume-ratio check
    pub volume_filter: bool,
    pub min_volume_ratio: f64,
    pub min_confirmations: u8,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            volume_filter: true,
            min_volume_ratio: 1.5,
            min_confirmations: 2,
        }
    }
}

/// Sentiment gate thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentConfig {
    /// LONG is vetoed below this polarity
    pub negative_threshold: f64,
    /// SHORT is vetoed above this polarity
    pub positive_threshold: f64,
    /// Symbol scores older than this fall back to the global score
    pub staleness_secs: u64,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            negative_threshold: -0.5,
            positive_threshold: 0.5,
            staleness_secs: 1800,
        }
    }
}

/// Per-symbol cooldown and per-category hourly caps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub min_signal_interval_secs: u64,
    pub window_secs: u64,

    pub category_caps: CategoryCaps,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_signal_interval_secs: 300,
            window_secs: 3600,
            category_caps: CategoryCaps::default(),
        }
    }
}

impl RateLimitConfig {
    pub fn cap_for(&self, category: Category) -> Option<u32> {
        self.category_caps.get(category)
    }
}

/// Hourly emission caps; `None` means uncapped
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryCaps {
    pub layer1: Option<u32>,
    pub defi: Option<u32>,
    pub gaming: Option<u32>,
    pub ai: Option<u32>,
    pub meme: Option<u32>,
    pub major: Option<u32>,
}

impl Default for CategoryCaps {
    fn default() -> Self {
        // majors are uncapped, altcoin categories share an hourly budget
        Self {
            layer1: Some(6),
            defi: Some(4),
            gaming: Some(3),
            ai: Some(4),
            meme: Some(2),
            major: None,
        }
    }
}

impl CategoryCaps {
    pub fn get(&self, category: Category) -> Option<u32> {
        match category {
            Category::Layer1 => self.layer1,
            Category::DeFi => self.defi,
            Category::Gaming => self.gaming,
            Category::Ai => self.ai,
            Category::Meme => self.meme,
            Category::Major => self.major,
        }
    }
}

/// How stop-loss and take-profit distances are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LevelMode {
    /// Distances are percentages of the entry price
    Percent,
    /// Distances are multiples of ATR
    Atr,
}

/// Stop-loss and take-profit placement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    pub mode: LevelMode,
    /// Percent of entry (percent mode) or ATR multiple (atr mode)
    pub stop_loss: f64,
    pub take_profits: Vec<f64>,
    /// Minimum reward-to-risk on the first target; 0 disables the check
    pub min_risk_reward: f64,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            mode: LevelMode::Percent,
            stop_loss: 0.3,
            take_profits: vec![0.5, 1.0, 1.5],
            min_risk_reward: 1.5,
        }
    }
}

/// Delivery and queueing policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub queue_capacity: usize,
    pub primary_timeout_secs: u64,
    pub primary_max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub fallback_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub journal_dir: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            primary_timeout_secs: 10,
            primary_max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 4000,
            fallback_timeout_secs: 15,
            shutdown_grace_secs: 20,
            journal_dir: PathBuf::from("logs"),
        }
    }
}

/// Telegram Bot API credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// SMTP relay for the fallback channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: String,
}

fn default_smtp_port() -> u16 {
    465
}

/// Replay feed consumed by the service binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub path: PathBuf,
    /// Capacity of each per-symbol bar channel
    pub symbol_buffer: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/feed.jsonl"),
            symbol_buffer: 256,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file with `SIGNAL_BOT__SECTION__KEY` env overrides.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("SIGNAL_BOT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .map_err(|e| EngineError::Config(format!("failed to read {path}: {e}")))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::Config(format!("invalid configuration: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (no environment overlay).
    pub fn from_toml(content: &str) -> Result<Self, EngineError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything the engine must not start with.
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: String| Err(EngineError::Config(msg));

        if self.symbols.is_empty() {
            return fail("at least one symbol must be configured".into());
        }
        let mut seen = HashSet::new();
        for symbol in &self.symbols {
            if symbol.name.trim().is_empty() {
                return fail("symbol name cannot be empty".into());
            }
            if !seen.insert(symbol.name.as_str()) {
                return fail(format!("duplicate symbol {}", symbol.name));
            }
            if !symbol.min_atr.is_finite() || symbol.min_atr < 0.0 {
                return fail(format!("min_atr for {} must be >= 0", symbol.name));
            }
        }

        let ind = &self.indicators;
        let periods = [
            ind.ema_fast,
            ind.ema_slow,
            ind.rsi,
            ind.macd_fast,
            ind.macd_slow,
            ind.macd_signal,
            ind.bollinger,
            ind.stochastic_k,
            ind.stochastic_d,
            ind.atr,
            ind.volume_avg,
        ];
        if periods.contains(&0) {
            return fail("indicator periods must be positive".into());
        }
        if ind.ema_fast >= ind.ema_slow {
            return fail("ema_fast must be shorter than ema_slow".into());
        }
        if ind.macd_fast >= ind.macd_slow {
            return fail("macd_fast must be shorter than macd_slow".into());
        }
        if !ind.bollinger_std_dev.is_finite() || ind.bollinger_std_dev <= 0.0 {
            return fail("bollinger_std_dev must be positive".into());
        }

        if self.quality.min_confirmations > 3 {
            return fail("min_confirmations must be within 0..=3".into());
        }
        if !self.quality.min_volume_ratio.is_finite() || self.quality.min_volume_ratio <= 0.0 {
            return fail("min_volume_ratio must be positive".into());
        }

        let s = &self.sentiment;
        let in_range = |v: f64| (-1.0..=1.0).contains(&v);
        if !in_range(s.negative_threshold) || !in_range(s.positive_threshold) {
            return fail("sentiment thresholds must lie within [-1, 1]".into());
        }
        if s.negative_threshold >= s.positive_threshold {
            return fail("negative_threshold must be below positive_threshold".into());
        }

        if self.rate_limit.min_signal_interval_secs == 0 || self.rate_limit.window_secs == 0 {
            return fail("rate limit intervals must be positive".into());
        }

        if self.levels.take_profits.is_empty() {
            return fail("at least one take-profit level is required".into());
        }
        let mut distances =
            std::iter::once(self.levels.stop_loss).chain(self.levels.take_profits.iter().copied());
        if distances.any(|d| !d.is_finite() || d <= 0.0) {
            return fail("stop-loss and take-profit distances must be positive".into());
        }
        if !self.levels.min_risk_reward.is_finite() || self.levels.min_risk_reward < 0.0 {
            return fail("min_risk_reward must be >= 0".into());
        }

        let d = &self.dispatch;
        if d.queue_capacity == 0 || d.primary_max_attempts == 0 {
            return fail("queue_capacity and primary_max_attempts must be positive".into());
        }
        if d.primary_timeout_secs == 0 || d.fallback_timeout_secs == 0 {
            return fail("channel timeouts must be positive".into());
        }

        if self.telegram.bot_token.trim().is_empty() || self.telegram.chat_id.trim().is_empty() {
            return fail("telegram bot_token and chat_id are required".into());
        }
        if let Some(email) = &self.email {
            let fields = [&email.smtp_host, &email.username, &email.password, &email.from, &email.to];
            if fields.iter().any(|f| f.trim().is_empty()) {
                return fail("email section is present but incomplete".into());
            }
        }

        Ok(())
    }

    pub fn symbol_config(&self, name: &str) -> Option<&SymbolConfig> {
        self.symbols.iter().find(|s| s.name == name)
    }
}
