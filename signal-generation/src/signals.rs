use chrono::{DateTime, Utc};
use common::{Category, Direction, EngineError, IndicatorSnapshot, Symbol};
use std::fmt;

/// The current bar plus the two bars before it, all for one symbol.
///
/// Owned by a single pipeline invocation; never shared across calls.
#[derive(Debug, Clone)]
pub struct BarWindow {
    earlier: IndicatorSnapshot,
    previous: IndicatorSnapshot,
    current: IndicatorSnapshot,
}

impl BarWindow {
    pub fn new(
        earlier: IndicatorSnapshot,
        previous: IndicatorSnapshot,
        current: IndicatorSnapshot,
    ) -> Result<Self, EngineError> {
        for snap in [&earlier, &previous, &current] {
            snap.validate()?;
            if snap.symbol != current.symbol {
                return Err(EngineError::malformed(
                    &current.symbol,
                    format!("window mixes symbols ({} and {})", snap.symbol, current.symbol),
                ));
            }
        }
        if !(earlier.timestamp < previous.timestamp && previous.timestamp < current.timestamp) {
            return Err(EngineError::malformed(
                &current.symbol,
                "window timestamps are not strictly increasing",
            ));
        }

        Ok(Self {
            earlier,
            previous,
            current,
        })
    }

    pub fn earlier(&self) -> &IndicatorSnapshot {
        &self.earlier
    }

    pub fn previous(&self) -> &IndicatorSnapshot {
        &self.previous
    }

    pub fn current(&self) -> &IndicatorSnapshot {
        &self.current
    }

    pub fn into_current(self) -> IndicatorSnapshot {
        self.current
    }
}

/// A detected crossover with its confirmation tally.
///
/// Lives only for one pipeline pass.
#[derive(Debug, Clone)]
pub struct CandidateEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    pub confirmations: u8, // 0..=3
    pub timestamp: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
}

/// Why a candidate did not become a signal
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    InsufficientConfirmations { have: u8, need: u8 },
    LowVolume { ratio: f64, min: f64 },
    LowVolatility { atr: f64, min: f64 },
    SentimentVeto { direction: Direction, polarity: f64 },
    SymbolCooldown { elapsed_secs: i64, min_secs: u64 },
    CategoryCap { category: Category, count: usize, cap: u32 },
    /// Stop and targets are not strictly ordered around the entry
    TargetOrder { direction: Direction },
    RiskReward { ratio: f64, min: f64 },
}

impl Rejection {
    /// Stable label for diagnostic counters
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::InsufficientConfirmations { .. } => "confirmations",
            Rejection::LowVolume { .. } => "volume",
            Rejection::LowVolatility { .. } => "volatility",
            Rejection::SentimentVeto { .. } => "sentiment",
            Rejection::SymbolCooldown { .. } => "cooldown",
            Rejection::CategoryCap { .. } => "category_cap",
            Rejection::TargetOrder { .. } => "targets",
            Rejection::RiskReward { .. } => "risk_reward",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::InsufficientConfirmations { have, need } => {
                write!(f, "{have}/3 confirmations, need {need}")
            }
            Rejection::LowVolume { ratio, min } => write!(f, "volume ratio {ratio:.2} < {min:.2}"),
            Rejection::LowVolatility { atr, min } => write!(f, "atr {atr:.6} < {min:.6}"),
            Rejection::SentimentVeto { direction, polarity } => {
                write!(f, "{direction} vetoed by sentiment {polarity:+.2}")
            }
            Rejection::SymbolCooldown {
                elapsed_secs,
                min_secs,
            } => write!(f, "cooldown: {elapsed_secs}s since last signal, need {min_secs}s"),
            Rejection::CategoryCap {
                category,
                count,
                cap,
            } => write!(f, "{category} hourly cap reached ({count}/{cap})"),
            Rejection::TargetOrder { direction } => {
                write!(f, "{direction} stop and targets out of order")
            }
            Rejection::RiskReward { ratio, min } => write!(f, "risk/reward {ratio:.2} < {min:.2}"),
        }
    }
}

/// Gate outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Reject(Rejection),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}
