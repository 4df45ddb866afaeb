//! Per-symbol cooldown and per-category sliding-window caps.
//!
//! All times are bar timestamps, not wall-clock time. Symbols advance
//! through bar time independently, so a check may arrive with a `now`
//! earlier than emissions already recorded for its category. The cap
//! therefore counts emissions less than one window away on either side of
//! `now`, and window entries are only evicted once they are a full window
//! behind the slowest symbol seen in the category.

use crate::signals::{Rejection, Verdict};
use chrono::{DateTime, Duration, Utc};
use common::{Category, RateLimitConfig, Symbol};
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;
use tracing::debug;

/// Emission history
#[derive(Debug, Default)]
pub struct RateLimitState {
    last_emit: HashMap<String, DateTime<Utc>>,
    /// Latest bar time each symbol was checked at, grouped by category
    clocks: HashMap<Category, HashMap<String, DateTime<Utc>>>,
    emissions: HashMap<Category, VecDeque<DateTime<Utc>>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cooldown first, then the category cap. Advances the symbol's clock
    /// and evicts expired window entries as a side effect.
    pub fn check(&mut self, config: &RateLimitConfig, symbol: &Symbol, now: DateTime<Utc>) -> Verdict {
        self.advance(symbol, now);
        self.evict(config, symbol.category);

        if let Some(last) = self.last_emit.get(&symbol.name) {
            let elapsed = now - *last;
            if elapsed < Duration::seconds(config.min_signal_interval_secs as i64) {
                return Verdict::Reject(Rejection::SymbolCooldown {
                    elapsed_secs: elapsed.num_seconds(),
                    min_secs: config.min_signal_interval_secs,
                });
            }
        }

        let Some(cap) = config.cap_for(symbol.category) else {
            return Verdict::Pass;
        };

        // any window of `window_secs` holding `now` also holds only
        // emissions within this distance of it
        let window = Duration::seconds(config.window_secs as i64);
        let count = self
            .emissions
            .get(&symbol.category)
            .map_or(0, |w| w.iter().filter(|t| (**t - now).abs() < window).count());
        if count >= cap as usize {
            return Verdict::Reject(Rejection::CategoryCap {
                category: symbol.category,
                count,
                cap,
            });
        }

        Verdict::Pass
    }

    pub fn record(&mut self, symbol: &Symbol, at: DateTime<Utc>) {
        self.last_emit.insert(symbol.name.clone(), at);
        self.emissions
            .entry(symbol.category)
            .or_default()
            .push_back(at);
    }

    /// Emissions for `category` in the trailing window `(now - window, now]`
    pub fn emissions_in_window(
        &self,
        config: &RateLimitConfig,
        category: Category,
        now: DateTime<Utc>,
    ) -> usize {
        let horizon = now - Duration::seconds(config.window_secs as i64);
        self.emissions
            .get(&category)
            .map_or(0, |w| w.iter().filter(|t| **t > horizon && **t <= now).count())
    }

    /// Number of emissions still held for `category`
    pub fn retained(&self, category: Category) -> usize {
        self.emissions.get(&category).map_or(0, VecDeque::len)
    }

    pub fn last_emit(&self, symbol: &str) -> Option<DateTime<Utc>> {
        self.last_emit.get(symbol).copied()
    }

    fn advance(&mut self, symbol: &Symbol, now: DateTime<Utc>) {
        let clock = self
            .clocks
            .entry(symbol.category)
            .or_default()
            .entry(symbol.name.clone())
            .or_insert(now);
        if now > *clock {
            *clock = now;
        }
    }

    /// Drop entries no symbol of the category can still count. A symbol's
    /// checks never go back in bar time, so its clock bounds what it needs.
    fn evict(&mut self, config: &RateLimitConfig, category: Category) {
        let Some(slowest) = self.clocks.get(&category).and_then(|c| c.values().min().copied()) else {
            return;
        };
        let horizon = slowest - Duration::seconds(config.window_secs as i64);
        if let Some(window) = self.emissions.get_mut(&category) {
            window.retain(|t| *t > horizon);
        }
    }
}

/// Shared limiter. `admit` runs check and record under one lock so two
/// symbols of the same category cannot both take the last slot.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<RateLimitState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RateLimitState::new()),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Dry run; records nothing
    pub async fn check(&self, symbol: &Symbol, now: DateTime<Utc>) -> Verdict {
        let mut state = self.state.lock().await;
        state.check(&self.config, symbol, now)
    }

    /// Check and, on pass, record the emission
    pub async fn admit(&self, symbol: &Symbol, now: DateTime<Utc>) -> Verdict {
        let mut state = self.state.lock().await;
        let verdict = state.check(&self.config, symbol, now);
        if verdict.is_pass() {
            state.record(symbol, now);
        }
        debug!(symbol = %symbol, category = %symbol.category, ?verdict, "rate limit");
        verdict
    }

    pub async fn emissions_in_window(&self, category: Category, now: DateTime<Utc>) -> usize {
        let state = self.state.lock().await;
        state.emissions_in_window(&self.config, category, now)
    }

    pub async fn retained(&self, category: Category) -> usize {
        self.state.lock().await.retained(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn secs(n: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(n)
    }

    #[tokio::test]
    async fn test_symbol_cooldown() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let sol = Symbol::new("SOLUSDT", Category::Layer1);

        assert!(limiter.admit(&sol, secs(0)).await.is_pass());
        match limiter.admit(&sol, secs(120)).await {
            Verdict::Reject(Rejection::SymbolCooldown { elapsed_secs, .. }) => {
                assert_eq!(elapsed_secs, 120)
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
        // a rejected attempt does not restart the cooldown
        assert!(limiter.admit(&sol, secs(300)).await.is_pass());
    }

    #[tokio::test]
    async fn test_check_does_not_record() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let sol = Symbol::new("SOLUSDT", Category::Layer1);

        assert!(limiter.check(&sol, secs(0)).await.is_pass());
        assert!(limiter.check(&sol, secs(10)).await.is_pass());
        assert_eq!(limiter.emissions_in_window(Category::Layer1, secs(10)).await, 0);
    }

    #[tokio::test]
    async fn test_category_cap_and_eviction() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let doge = Symbol::new("DOGEUSDT", Category::Meme);
        let pepe = Symbol::new("PEPEUSDT", Category::Meme);
        let shib = Symbol::new("SHIBUSDT", Category::Meme);

        assert!(limiter.admit(&doge, secs(0)).await.is_pass());
        assert!(limiter.admit(&pepe, secs(60)).await.is_pass());
        match limiter.admit(&shib, secs(120)).await {
            Verdict::Reject(r) => assert_eq!(r.reason(), "category_cap"),
            Verdict::Pass => panic!("meme cap is 2"),
        }

        // the first emission is exactly one window old and no longer counts
        assert!(limiter.admit(&shib, secs(3600)).await.is_pass());
        assert_eq!(limiter.emissions_in_window(Category::Meme, secs(3600)).await, 2);
    }

    #[tokio::test]
    async fn test_major_is_uncapped() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for i in 0..20 {
            let s = Symbol::new(format!("MAJOR{i}"), Category::Major);
            assert!(limiter.admit(&s, secs(i)).await.is_pass());
        }
    }

    #[tokio::test]
    async fn test_cooldown_checked_before_cap() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let doge = Symbol::new("DOGEUSDT", Category::Meme);
        let pepe = Symbol::new("PEPEUSDT", Category::Meme);

        limiter.admit(&doge, secs(0)).await;
        limiter.admit(&pepe, secs(1)).await;
        match limiter.admit(&doge, secs(2)).await {
            Verdict::Reject(r) => assert_eq!(r.reason(), "cooldown"),
            Verdict::Pass => panic!("expected rejection"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_admits_respect_cap() {
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
        let mut handles = Vec::new();
        for i in 0..10 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let s = Symbol::new(format!("GAME{i}"), Category::Gaming);
                limiter.admit(&s, secs(i)).await.is_pass()
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    fn capped_layer1(cap: u32) -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        config.category_caps.layer1 = Some(cap);
        config
    }

    #[tokio::test]
    async fn test_lagging_symbol_still_sees_category_history() {
        let limiter = RateLimiter::new(capped_layer1(2));
        let avax = Symbol::new("AVAXUSDT", Category::Layer1);
        let sol = Symbol::new("SOLUSDT", Category::Layer1);

        assert!(limiter.admit(&avax, secs(1000)).await.is_pass());
        assert!(limiter.admit(&avax, secs(1400)).await.is_pass());
        // SOL runs ahead in bar time; its window no longer holds AVAX's emissions
        assert!(limiter.admit(&sol, secs(5000)).await.is_pass());

        match limiter.admit(&avax, secs(1800)).await {
            Verdict::Reject(r) => assert_eq!(r.reason(), "category_cap"),
            Verdict::Pass => panic!("third layer1 emission inside one hour"),
        }
        assert_eq!(limiter.emissions_in_window(Category::Layer1, secs(1800)).await, 2);
    }

    #[tokio::test]
    async fn test_cap_counts_later_emissions_of_other_symbols() {
        let limiter = RateLimiter::new(capped_layer1(1));
        let avax = Symbol::new("AVAXUSDT", Category::Layer1);
        let ada = Symbol::new("ADAUSDT", Category::Layer1);
        let sol = Symbol::new("SOLUSDT", Category::Layer1);

        assert!(limiter.admit(&sol, secs(4000)).await.is_pass());
        // 3000s before SOL's emission: one window would hold both
        assert!(!limiter.admit(&avax, secs(1000)).await.is_pass());
        // a full window before it is fine
        assert!(limiter.admit(&ada, secs(400)).await.is_pass());
    }

    #[tokio::test]
    async fn test_eviction_follows_slowest_symbol() {
        let limiter = RateLimiter::new(capped_layer1(10));
        let avax = Symbol::new("AVAXUSDT", Category::Layer1);
        let sol = Symbol::new("SOLUSDT", Category::Layer1);

        limiter.admit(&avax, secs(0)).await;
        limiter.admit(&sol, secs(10_000)).await;
        // AVAX's clock is still at 0, so its emission must be kept
        assert_eq!(limiter.retained(Category::Layer1).await, 2);

        limiter.check(&avax, secs(9_000)).await;
        assert_eq!(limiter.retained(Category::Layer1).await, 1);
    }
}
