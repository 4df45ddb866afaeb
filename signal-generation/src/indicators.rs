//! Indicator computation backed by the `ta` crate.
//!
//! `IndicatorEngine` is the streaming form: feed one candle per bar close and
//! receive a snapshot once every indicator has warmed up. `compute_indicators`
//! is the batch form over a candle series.

use chrono::{DateTime, Utc};
use common::{Candle, EngineError, IndicatorConfig, IndicatorSnapshot};
use ta::indicators::{
    AverageTrueRange, BollingerBands, ExponentialMovingAverage, FastStochastic,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};
use ta::{DataItem, Next};
use tracing::trace;

/// Streaming indicator state for one symbol
#[derive(Debug)]
pub struct IndicatorEngine {
    symbol: String,
    lookback: usize,
    bars: usize,
    last_timestamp: Option<DateTime<Utc>>,
    ema_fast: ExponentialMovingAverage,
    ema_slow: ExponentialMovingAverage,
    rsi: RelativeStrengthIndex,
    macd: MovingAverageConvergenceDivergence,
    bollinger: BollingerBands,
    stoch_k: FastStochastic,
    stoch_d: SimpleMovingAverage,
    atr: AverageTrueRange,
    volume_avg: SimpleMovingAverage,
    // average of the bars before the current one
    prior_avg_volume: f64,
}

fn ta_err(symbol: &str, what: &str, err: impl std::fmt::Debug) -> EngineError {
    EngineError::Indicator(format!("{symbol}: {what}: {err:?}"))
}

impl IndicatorEngine {
    pub fn new(symbol: impl Into<String>, config: &IndicatorConfig) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        let s = symbol.as_str();

        Ok(Self {
            lookback: config.min_lookback(),
            bars: 0,
            last_timestamp: None,
            ema_fast: ExponentialMovingAverage::new(config.ema_fast).map_err(|e| ta_err(s, "ema_fast", e))?,
            ema_slow: ExponentialMovingAverage::new(config.ema_slow).map_err(|e| ta_err(s, "ema_slow", e))?,
            rsi: RelativeStrengthIndex::new(config.rsi).map_err(|e| ta_err(s, "rsi", e))?,
            macd: MovingAverageConvergenceDivergence::new(config.macd_fast, config.macd_slow, config.macd_signal)
                .map_err(|e| ta_err(s, "macd", e))?,
            bollinger: BollingerBands::new(config.bollinger, config.bollinger_std_dev)
                .map_err(|e| ta_err(s, "bollinger", e))?,
            stoch_k: FastStochastic::new(config.stochastic_k).map_err(|e| ta_err(s, "stochastic_k", e))?,
            stoch_d: SimpleMovingAverage::new(config.stochastic_d).map_err(|e| ta_err(s, "stochastic_d", e))?,
            atr: AverageTrueRange::new(config.atr).map_err(|e| ta_err(s, "atr", e))?,
            volume_avg: SimpleMovingAverage::new(config.volume_avg).map_err(|e| ta_err(s, "volume_avg", e))?,
            prior_avg_volume: 0.0,
            symbol,
        })
    }

    /// Bars required before the first snapshot is produced
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn bars_seen(&self) -> usize {
        self.bars
    }

    /// Feed one closed bar. Returns `Ok(None)` while warming up.
    ///
    /// Invalid or out-of-order candles are rejected without touching the
    /// indicator state.
    pub fn next(&mut self, candle: &Candle) -> Result<Option<IndicatorSnapshot>, EngineError> {
        if candle.symbol != self.symbol {
            return Err(EngineError::malformed(
                &self.symbol,
                format!("candle for {} fed to {} engine", candle.symbol, self.symbol),
            ));
        }
        if let Some(last) = self.last_timestamp {
            if candle.timestamp <= last {
                return Err(EngineError::malformed(
                    &self.symbol,
                    format!("bar at {} is not after {}", candle.timestamp, last),
                ));
            }
        }

        let item = DataItem::builder()
            .open(candle.open)
            .high(candle.high)
            .low(candle.low)
            .close(candle.close)
            .volume(candle.volume)
            .build()
            .map_err(|e| EngineError::malformed(&self.symbol, format!("invalid candle: {e:?}")))?;

        self.last_timestamp = Some(candle.timestamp);
        self.bars += 1;

        let ema_fast = self.ema_fast.next(candle.close);
        let ema_slow = self.ema_slow.next(candle.close);
        let rsi = self.rsi.next(candle.close);
        let macd = self.macd.next(candle.close);
        let bands = self.bollinger.next(candle.close);
        let stoch_k = self.stoch_k.next(&item);
        let stoch_d = self.stoch_d.next(stoch_k);
        let atr = self.atr.next(&item);

        let avg_volume = self.prior_avg_volume;
        self.prior_avg_volume = self.volume_avg.next(candle.volume);

        if self.bars < self.lookback {
            trace!(symbol = %self.symbol, bars = self.bars, lookback = self.lookback, "warming up");
            return Ok(None);
        }

        Ok(Some(IndicatorSnapshot {
            symbol: self.symbol.clone(),
            timestamp: candle.timestamp,
            close: candle.close,
            ema_fast,
            ema_slow,
            rsi,
            macd_line: macd.macd,
            macd_signal: macd.signal,
            bb_upper: bands.upper,
            bb_mid: bands.average,
            bb_lower: bands.lower,
            stoch_k,
            stoch_d,
            atr,
            volume: candle.volume,
            avg_volume,
        }))
    }
}

/// Snapshot for the last bar of `candles`.
///
/// Fails with `InsufficientHistory` when fewer than the minimum lookback
/// bars are available.
pub fn compute_indicators(
    symbol: &str,
    candles: &[Candle],
    config: &IndicatorConfig,
) -> Result<IndicatorSnapshot, EngineError> {
    let required = config.min_lookback();
    if candles.len() < required {
        return Err(EngineError::InsufficientHistory {
            symbol: symbol.to_string(),
            required,
            available: candles.len(),
        });
    }

    let mut engine = IndicatorEngine::new(symbol, config)?;
    let mut latest = None;
    for candle in candles {
        latest = engine.next(candle)?;
    }

    latest.ok_or_else(|| EngineError::InsufficientHistory {
        symbol: symbol.to_string(),
        required,
        available: candles.len(),
    })
}
