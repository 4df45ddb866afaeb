// Service Runner
// Replays the feed through per-symbol pipelines and the dispatch worker

use crate::feed::{FeedEvent, FeedReader};
use crate::metrics::Metrics;
use anyhow::{Context, Result};
use common::{Candle, EngineConfig, IndicatorSnapshot, Symbol};
use notifier::{
    DispatchPolicy, DispatchQueue, Dispatcher, EmailChannel, NotificationChannel, PushOutcome,
    SignalJournal, TelegramChannel,
};
use research_agents::SentimentAgent;
use signal_generation::{BarWindow, Evaluation, IndicatorEngine, RateLimiter, SignalPipeline};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What happened during one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub candles: usize,
    pub news: usize,
    pub malformed_lines: usize,
    pub interrupted: bool,
}

pub struct Runner {
    config: EngineConfig,
    pipeline: Arc<SignalPipeline>,
    sentiment: Arc<SentimentAgent>,
    dispatcher: Arc<Dispatcher>,
    queue: Arc<DispatchQueue>,
    metrics: Arc<Metrics>,
}

impl Runner {
    /// Wire the real channels from configuration
    pub async fn build(config: EngineConfig) -> Result<Self> {
        let policy = DispatchPolicy::from_config(&config.dispatch);
        let journal = SignalJournal::open(&config.dispatch.journal_dir)
            .await
            .with_context(|| format!("cannot open journal in {}", config.dispatch.journal_dir.display()))?;

        let primary = TelegramChannel::new(&config.telegram, policy.primary_timeout)
            .context("cannot set up telegram channel")?;
        let fallback = match &config.email {
            Some(email) => {
                let channel = EmailChannel::new(email, policy.fallback_timeout)
                    .context("cannot set up email channel")?;
                Some(Box::new(channel) as Box<dyn NotificationChannel>)
            }
            None => {
                warn!("no [email] section: an exhausted primary channel ends local-only");
                None
            }
        };

        let dispatcher = Dispatcher::new(journal, Box::new(primary), fallback, policy);
        Self::new(config, dispatcher)
    }

    pub fn new(config: EngineConfig, dispatcher: Dispatcher) -> Result<Self> {
        let sentiment = Arc::new(SentimentAgent::default());
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let pipeline = SignalPipeline::from_config(&config, sentiment.clone(), limiter);

        Ok(Self {
            queue: Arc::new(DispatchQueue::new(config.dispatch.queue_capacity)),
            metrics: Arc::new(Metrics::new().context("cannot register metrics")?),
            pipeline: Arc::new(pipeline),
            dispatcher: Arc::new(dispatcher),
            sentiment,
            config,
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Replay the feed until it ends or `shutdown` resolves, then drain.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<RunSummary> {
        let mut feed = FeedReader::open(&self.config.feed.path).await?;

        let worker = tokio::spawn(dispatch_worker(
            self.queue.clone(),
            self.dispatcher.clone(),
            self.metrics.clone(),
        ));

        let mut senders = HashMap::new();
        let mut symbol_tasks = Vec::new();
        for symbol_config in &self.config.symbols {
            let (tx, rx) = mpsc::channel(self.config.feed.symbol_buffer.max(1));
            let task = SymbolTask {
                symbol: symbol_config.symbol(),
                engine: IndicatorEngine::new(symbol_config.name.clone(), &self.config.indicators)?,
                history: VecDeque::with_capacity(3),
                pipeline: self.pipeline.clone(),
                queue: self.queue.clone(),
                dispatcher: self.dispatcher.clone(),
                metrics: self.metrics.clone(),
            };
            senders.insert(symbol_config.name.clone(), tx);
            symbol_tasks.push(tokio::spawn(task.run(rx)));
        }
        info!(symbols = senders.len(), feed = %self.config.feed.path.display(), "replaying feed");

        let mut summary = RunSummary::default();
        tokio::pin!(shutdown);
        loop {
            let event = tokio::select! {
                event = feed.next_event() => event?,
                _ = &mut shutdown => {
                    info!("Shutting down gracefully...");
                    summary.interrupted = true;
                    break;
                }
            };

            match event {
                Some(FeedEvent::Candle(candle)) => {
                    summary.candles += 1;
                    match senders.get(&candle.symbol) {
                        Some(tx) => {
                            if tx.send(candle).await.is_err() {
                                warn!("symbol task stopped early");
                            }
                        }
                        None => {
                            debug!(symbol = %candle.symbol, "candle for unconfigured symbol");
                            self.metrics.record_unknown_symbol();
                        }
                    }
                }
                Some(FeedEvent::News(article)) => {
                    summary.news += 1;
                    self.sentiment.add_articles(vec![article]).await;
                }
                None => {
                    info!("feed exhausted");
                    break;
                }
            }
        }
        summary.malformed_lines = feed.malformed();

        drop(senders);
        for task in symbol_tasks {
            if let Err(e) = task.await {
                warn!("symbol task failed: {}", e);
            }
        }

        self.queue.close().await;
        let grace = Duration::from_secs(self.config.dispatch.shutdown_grace_secs);
        let abort = worker.abort_handle();
        if tokio::time::timeout(grace, worker).await.is_err() {
            warn!(?grace, "dispatch did not finish within the grace period, abandoning in-flight delivery");
            abort.abort();
            while let Some(signal) = self.queue.pop().await {
                let report = self.dispatcher.record_only(&signal).await;
                self.metrics.record_dispatch(&report);
            }
        }

        info!(
            candles = summary.candles,
            news = summary.news,
            malformed = summary.malformed_lines,
            "run finished\n{}",
            self.metrics.render()
        );
        Ok(summary)
    }
}

/// Delivers queued signals until the queue is closed and drained
pub async fn dispatch_worker(queue: Arc<DispatchQueue>, dispatcher: Arc<Dispatcher>, metrics: Arc<Metrics>) {
    while let Some(signal) = queue.pop().await {
        let report = dispatcher.dispatch(&signal).await;
        metrics.record_dispatch(&report);
    }
    debug!("dispatch worker finished");
}

/// Owns one symbol's indicator state and its last three snapshots
struct SymbolTask {
    symbol: Symbol,
    engine: IndicatorEngine,
    history: VecDeque<IndicatorSnapshot>,
    pipeline: Arc<SignalPipeline>,
    queue: Arc<DispatchQueue>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

impl SymbolTask {
    async fn run(mut self, mut rx: mpsc::Receiver<Candle>) {
        while let Some(candle) = rx.recv().await {
            self.on_candle(&candle).await;
        }
        debug!(symbol = %self.symbol, bars = self.engine.bars_seen(), "symbol task finished");
    }

    async fn on_candle(&mut self, candle: &Candle) {
        let snapshot = match self.engine.next(candle) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return,
            Err(e) => {
                warn!(symbol = %self.symbol, "dropping bar: {}", e);
                self.metrics.record_data_error(&self.symbol.name);
                return;
            }
        };

        if self.history.len() == 3 {
            self.history.pop_front();
        }
        self.history.push_back(snapshot);
        if self.history.len() < 3 {
            return;
        }

        let window = BarWindow::new(
            self.history[0].clone(),
            self.history[1].clone(),
            self.history[2].clone(),
        );
        let evaluation = match window {
            Ok(window) => self.pipeline.evaluate(&self.symbol, window).await,
            Err(e) => Err(e),
        };
        let evaluation = match evaluation {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(symbol = %self.symbol, "evaluation aborted: {}", e);
                self.metrics.record_data_error(&self.symbol.name);
                return;
            }
        };
        self.metrics.record_evaluation(&evaluation);

        if let Evaluation::Emitted(signal) = evaluation {
            match self.queue.push(signal).await {
                PushOutcome::Queued => {}
                PushOutcome::Evicted(old) => {
                    warn!(id = %old.id(), symbol = old.symbol(), "dispatch queue full, dropping oldest pending signal");
                    self.metrics.record_eviction();
                    let report = self.dispatcher.record_only(&old).await;
                    self.metrics.record_dispatch(&report);
                }
                PushOutcome::Closed(signal) => {
                    let report = self.dispatcher.record_only(&signal).await;
                    self.metrics.record_dispatch(&report);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use common::{Category, Direction, Signal, TakeProfit};
    use notifier::{Backoff, DeliveryError};
    use rust_decimal_macros::dec;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingChannel(Arc<AtomicU32>);

    #[async_trait]
    impl NotificationChannel for CountingChannel {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _signal: &Signal) -> Result<(), DeliveryError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn policy() -> DispatchPolicy {
        DispatchPolicy {
            primary_timeout: Duration::from_millis(200),
            primary_max_attempts: 1,
            backoff: Backoff::Fixed { delay: Duration::ZERO },
            fallback_timeout: Duration::from_millis(200),
        }
    }

    fn config(dir: &std::path::Path, feed: &std::path::Path) -> EngineConfig {
        EngineConfig::from_toml(&format!(
            r#"
            [[symbols]]
            name = "SOLUSDT"
            category = "layer1"

            [dispatch]
            journal_dir = "{}"

            [telegram]
            bot_token = "123:abc"
            chat_id = "42"

            [feed]
            path = "{}"
            "#,
            dir.display(),
            feed.display()
        ))
        .unwrap()
    }

    fn signal(minute: i64) -> Signal {
        Signal::new(
            &Symbol::new("SOLUSDT", Category::Layer1),
            Direction::Short,
            3,
            dec!(100),
            dec!(100.3),
            vec![TakeProfit { pct: dec!(0.5), price: dec!(99.5) }],
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + ChronoDuration::minutes(minute),
        )
    }

    #[tokio::test]
    async fn test_dispatch_worker_drains_queue() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let journal = SignalJournal::open(dir.path()).await.unwrap();
        let dispatcher = Arc::new(Dispatcher::new(
            journal.clone(),
            Box::new(CountingChannel(calls.clone())),
            None,
            policy(),
        ));
        let queue = Arc::new(DispatchQueue::new(8));
        let metrics = Arc::new(Metrics::new().unwrap());

        queue.push(signal(0)).await;
        queue.push(signal(5)).await;
        queue.close().await;
        dispatch_worker(queue, dispatcher, metrics.clone()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.dispatches("primary"), 2);
        assert_eq!(journal.read_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_replay_feed_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("feed.jsonl");
        let mut feed = std::fs::File::create(&feed_path).unwrap();
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        for i in 0..80i64 {
            let close = 100.0 + (i as f64 * 0.2).sin() * 3.0;
            let candle = Candle {
                symbol: "SOLUSDT".to_string(),
                timestamp: base + ChronoDuration::minutes(i * 15),
                open: close - 0.1,
                high: close + 0.8,
                low: close - 0.8,
                close,
                volume: 1000.0 + (i % 7) as f64 * 150.0,
            };
            let mut line = serde_json::to_value(&candle).unwrap();
            line["kind"] = "candle".into();
            writeln!(feed, "{line}").unwrap();
        }
        writeln!(
            feed,
            r#"{{"kind":"candle","symbol":"DOGEUSDT","timestamp":"2024-03-01T00:00:00Z","open":1,"high":1,"low":1,"close":1,"volume":1}}"#
        )
        .unwrap();
        writeln!(
            feed,
            r#"{{"kind":"news","title":"Solana upgrade sparks rally","symbols":["SOL"],"published_at":"2024-03-01T01:00:00Z"}}"#
        )
        .unwrap();
        writeln!(feed, "{{broken").unwrap();
        drop(feed);

        let config = config(&dir.path().join("logs"), &feed_path);
        let calls = Arc::new(AtomicU32::new(0));
        let journal = SignalJournal::open(&config.dispatch.journal_dir).await.unwrap();
        let dispatcher = Dispatcher::new(journal.clone(), Box::new(CountingChannel(calls.clone())), None, policy());
        let runner = Runner::new(config, dispatcher).unwrap();
        let metrics = runner.metrics();

        let summary = runner.run(std::future::pending()).await.unwrap();
        assert_eq!(summary.candles, 81);
        assert_eq!(summary.news, 1);
        assert_eq!(summary.malformed_lines, 1);
        assert!(!summary.interrupted);
        assert_eq!(metrics.unknown_symbols(), 1);

        // every bar after warm-up with a full window gets evaluated
        let evaluated = metrics.evaluations("no_crossover")
            + metrics.evaluations("rejected")
            + metrics.evaluations("emitted");
        assert_eq!(evaluated, 80 - 35 + 1 - 2);

        // each emitted signal was delivered and journaled exactly once
        let emitted = metrics.evaluations("emitted");
        assert_eq!(u64::from(calls.load(Ordering::SeqCst)), emitted);
        assert_eq!(journal.read_all().await.unwrap().len() as u64, emitted);
    }

    /// Never answers within any test's patience
    struct StalledChannel;

    #[async_trait]
    impl NotificationChannel for StalledChannel {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn deliver(&self, _signal: &Signal) -> Result<(), DeliveryError> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("feed.jsonl");
        let mut feed = std::fs::File::create(&feed_path).unwrap();
        for i in 0..2000 {
            writeln!(
                feed,
                r#"{{"kind":"candle","symbol":"DOGEUSDT","timestamp":"2024-03-01T00:{:02}:{:02}Z","open":1,"high":1,"low":1,"close":1,"volume":1}}"#,
                (i / 60) % 60,
                i % 60
            )
            .unwrap();
        }
        drop(feed);

        let config = config(&dir.path().join("logs"), &feed_path);
        let journal = SignalJournal::open(&config.dispatch.journal_dir).await.unwrap();
        let dispatcher = Dispatcher::new(journal, Box::new(CountingChannel(Arc::new(AtomicU32::new(0)))), None, policy());
        let runner = Runner::new(config, dispatcher).unwrap();

        // shutdown is ready from the start, so replay stops long before the end
        let summary = runner.run(async {}).await.unwrap();
        assert!(summary.interrupted);
        assert!(summary.candles < 2000);
    }

    #[tokio::test]
    async fn test_stalled_delivery_is_abandoned_after_grace_period() {
        let dir = tempfile::tempdir().unwrap();
        let feed_path = dir.path().join("feed.jsonl");
        std::fs::write(&feed_path, "").unwrap();

        let mut config = config(&dir.path().join("logs"), &feed_path);
        config.dispatch.shutdown_grace_secs = 1;
        let journal = SignalJournal::open(&config.dispatch.journal_dir).await.unwrap();
        let stalled = DispatchPolicy {
            primary_timeout: Duration::from_secs(120),
            ..policy()
        };
        let dispatcher = Dispatcher::new(journal.clone(), Box::new(StalledChannel), None, stalled);
        let runner = Runner::new(config, dispatcher).unwrap();
        let metrics = runner.metrics();

        let pending: Vec<_> = (0..4).map(|i| signal(i * 10)).collect();
        for s in &pending {
            assert_eq!(runner.queue.push(s.clone()).await, PushOutcome::Queued);
        }

        let started = std::time::Instant::now();
        let summary = runner.run(std::future::pending()).await.unwrap();
        assert!(!summary.interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));

        // the stalled signal was journaled before its first attempt, the rest on abandon
        let mut recorded: Vec<_> = journal.read_all().await.unwrap().iter().map(|s| s.id()).collect();
        let mut expected: Vec<_> = pending.iter().map(|s| s.id()).collect();
        recorded.sort();
        expected.sort();
        assert_eq!(recorded, expected);

        assert_eq!(metrics.dispatches("local_only"), 3);
        assert_eq!(metrics.dispatches("primary"), 0);
    }
}
