use crate::signals::{Rejection, Verdict};
use common::{Direction, EngineError, IndicatorSnapshot, LevelConfig, LevelMode, TakeProfit};
use rust_decimal::prelude::*;

const PRICE_DP: u32 = 8;

/// Entry, stop and targets for one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct TradeLevels {
    pub entry: Decimal,
    pub stop_loss: Decimal,
    /// Nearest target first
    pub take_profits: Vec<TakeProfit>,
}

impl TradeLevels {
    /// Levels around the snapshot close. LONG stops below and targets above
    /// the entry; SHORT mirrors.
    pub fn compute(
        direction: Direction,
        snapshot: &IndicatorSnapshot,
        config: &LevelConfig,
    ) -> Result<Self, EngineError> {
        let entry = snapshot.close;
        let unit = match config.mode {
            LevelMode::Percent => entry / 100.0,
            LevelMode::Atr => snapshot.atr,
        };
        let sign = match direction {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        };

        let mut distances = config.take_profits.clone();
        distances.sort_by(|a, b| a.total_cmp(b));

        let price = |offset: f64, what: &str| -> Result<Decimal, EngineError> {
            let p = entry + sign * offset;
            if !p.is_finite() || p <= 0.0 {
                return Err(EngineError::malformed(
                    &snapshot.symbol,
                    format!("{what} price {p} is not positive"),
                ));
            }
            to_decimal(&snapshot.symbol, p)
        };

        let stop_loss = price(-config.stop_loss * unit, "stop-loss")?;
        let take_profits = distances
            .iter()
            .map(|d| {
                let offset = d * unit;
                Ok(TakeProfit {
                    pct: to_decimal(&snapshot.symbol, offset / entry * 100.0)?,
                    price: price(offset, "take-profit")?,
                })
            })
            .collect::<Result<Vec<_>, EngineError>>()?;

        Ok(Self {
            entry: to_decimal(&snapshot.symbol, entry)?,
            stop_loss,
            take_profits,
        })
    }
}

impl TradeLevels {
    /// `stop < entry < tp1 < tp2 < ..` for LONG (mirrored for SHORT), and
    /// the first target must pay at least `min_risk_reward` times the risk.
    pub fn check(&self, direction: Direction, min_risk_reward: f64) -> Verdict {
        let mut ladder = Vec::with_capacity(self.take_profits.len() + 2);
        ladder.push(self.stop_loss);
        ladder.push(self.entry);
        ladder.extend(self.take_profits.iter().map(|tp| tp.price));

        let ordered = ladder.windows(2).all(|pair| match direction {
            Direction::Long => pair[0] < pair[1],
            Direction::Short => pair[0] > pair[1],
        });
        if !ordered {
            return Verdict::Reject(Rejection::TargetOrder { direction });
        }

        let Some(first) = self.take_profits.first() else {
            return Verdict::Reject(Rejection::TargetOrder { direction });
        };
        let risk = (self.entry - self.stop_loss).abs();
        let reward = (first.price - self.entry).abs();
        let ratio = (reward / risk).to_f64().unwrap_or(0.0);
        if ratio < min_risk_reward {
            return Verdict::Reject(Rejection::RiskReward {
                ratio,
                min: min_risk_reward,
            });
        }

        Verdict::Pass
    }
}

fn to_decimal(symbol: &str, value: f64) -> Result<Decimal, EngineError> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(PRICE_DP).normalize())
        .ok_or_else(|| EngineError::malformed(symbol, format!("{value} is not representable as a price")))
}
