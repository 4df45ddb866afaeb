use crate::signals::{BarWindow, CandidateEvent};
use common::{Direction, IndicatorSnapshot, Symbol};
use tracing::debug;

/// Stochastic levels a %K cross has to start from
const STOCH_OVERSOLD: f64 = 20.0;
const STOCH_OVERBOUGHT: f64 = 80.0;

/// Detects an EMA crossover on the current bar and counts the oscillators
/// that agree with it.
///
/// Confirmations are read on the crossover bar itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfirmationScorer;

impl ConfirmationScorer {
    pub fn new() -> Self {
        Self
    }

    /// Zero or one candidate for this bar. `None` is the usual outcome.
    pub fn score(&self, symbol: &Symbol, window: BarWindow) -> Option<CandidateEvent> {
        let direction = crossover(window.previous(), window.current())?;

        let checks = [
            ("macd", macd_confirms(direction, window.current())),
            ("bollinger", bollinger_confirms(direction, &window)),
            ("stochastic", stochastic_confirms(direction, &window)),
        ];
        let confirmations = checks.iter().filter(|(_, ok)| *ok).count() as u8;

        debug!(
            symbol = %symbol,
            direction = %direction,
            confirmations,
            macd = checks[0].1,
            bollinger = checks[1].1,
            stochastic = checks[2].1,
            "EMA crossover"
        );

        let timestamp = window.current().timestamp;
        Some(CandidateEvent {
            symbol: symbol.clone(),
            direction,
            confirmations,
            timestamp,
            snapshot: window.into_current(),
        })
    }
}

/// Strict flip of the fast/slow EMA ordering between two bars
fn crossover(previous: &IndicatorSnapshot, current: &IndicatorSnapshot) -> Option<Direction> {
    if previous.ema_fast <= previous.ema_slow && current.ema_fast > current.ema_slow {
        Some(Direction::Long)
    } else if previous.ema_fast >= previous.ema_slow && current.ema_fast < current.ema_slow {
        Some(Direction::Short)
    } else {
        None
    }
}

fn macd_confirms(direction: Direction, current: &IndicatorSnapshot) -> bool {
    match direction {
        Direction::Long => current.macd_line > current.macd_signal,
        Direction::Short => current.macd_line < current.macd_signal,
    }
}

/// Price on the near side of the mid band and moving back toward it
fn bollinger_confirms(direction: Direction, window: &BarWindow) -> bool {
    let current = window.current();
    let earlier = window.earlier();
    match direction {
        Direction::Long => current.close < current.bb_mid && current.close > earlier.close,
        Direction::Short => current.close > current.bb_mid && current.close < earlier.close,
    }
}

fn stochastic_confirms(direction: Direction, window: &BarWindow) -> bool {
    let previous = window.previous();
    let current = window.current();
    let earlier = window.earlier();
    match direction {
        Direction::Long => {
            previous.stoch_k <= previous.stoch_d
                && current.stoch_k > current.stoch_d
                && (previous.stoch_k < STOCH_OVERSOLD || earlier.stoch_k < STOCH_OVERSOLD)
        }
        Direction::Short => {
            previous.stoch_k >= previous.stoch_d
                && current.stoch_k < current.stoch_d
                && (previous.stoch_k > STOCH_OVERBOUGHT || earlier.stoch_k > STOCH_OVERBOUGHT)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::fixtures::snapshot;
    use common::Category;

    fn sol() -> Symbol {
        Symbol::new("SOLUSDT", Category::Layer1)
    }

    /// Bars 0..=2 with a bullish EMA cross on bar 2 and nothing else
    fn bullish_cross() -> (IndicatorSnapshot, IndicatorSnapshot, IndicatorSnapshot) {
        let mut earlier = snapshot(0);
        earlier.ema_fast = 99.0;
        let mut previous = snapshot(1);
        previous.ema_fast = 99.8;
        let mut current = snapshot(2);
        current.ema_fast = 100.2;
        // above the mid band: no bollinger confirmation
        current.close = 102.0;
        (earlier, previous, current)
    }

    fn window(bars: (IndicatorSnapshot, IndicatorSnapshot, IndicatorSnapshot)) -> BarWindow {
        BarWindow::new(bars.0, bars.1, bars.2).unwrap()
    }

    #[test]
    fn test_no_cross_no_candidate() {
        let w = window((snapshot(0), snapshot(1), snapshot(2)));
        assert!(ConfirmationScorer::new().score(&sol(), w).is_none());
    }

    #[test]
    fn test_level_without_flip_is_not_a_cross() {
        let (earlier, mut previous, current) = bullish_cross();
        previous.ema_fast = 100.1; // already above
        let w = window((earlier, previous, current));
        assert!(ConfirmationScorer::new().score(&sol(), w).is_none());
    }

    #[test]
    fn test_bare_long_cross() {
        let candidate = ConfirmationScorer::new()
            .score(&sol(), window(bullish_cross()))
            .unwrap();
        assert_eq!(candidate.direction, Direction::Long);
        assert_eq!(candidate.confirmations, 0);
        assert_eq!(candidate.timestamp, snapshot(2).timestamp);
    }

    #[test]
    fn test_long_with_all_confirmations() {
        let (mut earlier, mut previous, mut current) = bullish_cross();
        current.macd_line = 0.4;
        current.macd_signal = 0.1;
        earlier.close = 98.5;
        current.close = 99.5;
        previous.stoch_k = 15.0;
        previous.stoch_d = 18.0;
        current.stoch_k = 25.0;
        current.stoch_d = 20.0;

        let candidate = ConfirmationScorer::new()
            .score(&sol(), window((earlier, previous, current)))
            .unwrap();
        assert_eq!(candidate.confirmations, 3);
    }

    #[test]
    fn test_stochastic_cross_needs_oversold_origin() {
        let (earlier, mut previous, mut current) = bullish_cross();
        previous.stoch_k = 45.0;
        previous.stoch_d = 48.0;
        current.stoch_k = 55.0;
        current.stoch_d = 50.0;

        let candidate = ConfirmationScorer::new()
            .score(&sol(), window((earlier, previous, current)))
            .unwrap();
        assert_eq!(candidate.confirmations, 0);
    }

    #[test]
    fn test_short_cross_mirrors() {
        let mut earlier = snapshot(0);
        earlier.ema_fast = 101.0;
        earlier.close = 104.0;
        earlier.stoch_k = 88.0;
        let mut previous = snapshot(1);
        previous.ema_fast = 100.0;
        previous.stoch_k = 78.0;
        previous.stoch_d = 76.0;
        let mut current = snapshot(2);
        current.ema_fast = 99.6;
        current.macd_line = -0.3;
        current.close = 102.5;
        current.stoch_k = 70.0;
        current.stoch_d = 74.0;

        let candidate = ConfirmationScorer::new()
            .score(&sol(), window((earlier, previous, current)))
            .unwrap();
        assert_eq!(candidate.direction, Direction::Short);
        assert_eq!(candidate.confirmations, 3);
    }
}
