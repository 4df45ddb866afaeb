use notifier::DispatchReport;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use signal_generation::Evaluation;

/// Diagnostic counters, logged at shutdown
pub struct Metrics {
    registry: Registry,
    evaluations: IntCounterVec,
    rejections: IntCounterVec,
    data_errors: IntCounterVec,
    dispatches: IntCounterVec,
    evictions: IntCounter,
    unknown_symbols: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("signal_bot".to_string()), None)?;

        let evaluations = IntCounterVec::new(
            Opts::new("evaluations_total", "Pipeline evaluations by outcome"),
            &["outcome"],
        )?;
        let rejections = IntCounterVec::new(
            Opts::new("rejections_total", "Rejected candidates by reason"),
            &["reason"],
        )?;
        let data_errors = IntCounterVec::new(
            Opts::new("data_errors_total", "Aborted evaluations by symbol"),
            &["symbol"],
        )?;
        let dispatches = IntCounterVec::new(
            Opts::new("dispatches_total", "Dispatch results by outcome"),
            &["outcome"],
        )?;
        let evictions = IntCounter::new("queue_evictions_total", "Signals dropped from a full dispatch queue")?;
        let unknown_symbols = IntCounter::new("unknown_symbol_candles_total", "Candles for unconfigured symbols")?;

        registry.register(Box::new(evaluations.clone()))?;
        registry.register(Box::new(rejections.clone()))?;
        registry.register(Box::new(data_errors.clone()))?;
        registry.register(Box::new(dispatches.clone()))?;
        registry.register(Box::new(evictions.clone()))?;
        registry.register(Box::new(unknown_symbols.clone()))?;

        Ok(Self {
            registry,
            evaluations,
            rejections,
            data_errors,
            dispatches,
            evictions,
            unknown_symbols,
        })
    }

    pub fn record_evaluation(&self, evaluation: &Evaluation) {
        self.evaluations.with_label_values(&[evaluation.label()]).inc();
        if let Evaluation::Rejected(rejection) = evaluation {
            self.rejections.with_label_values(&[rejection.reason()]).inc();
        }
    }

    pub fn record_data_error(&self, symbol: &str) {
        self.data_errors.with_label_values(&[symbol]).inc();
    }

    pub fn record_dispatch(&self, report: &DispatchReport) {
        self.dispatches.with_label_values(&[report.outcome.as_str()]).inc();
    }

    pub fn record_eviction(&self) {
        self.evictions.inc();
    }

    pub fn record_unknown_symbol(&self) {
        self.unknown_symbols.inc();
    }

    pub fn evaluations(&self, outcome: &str) -> u64 {
        self.evaluations.with_label_values(&[outcome]).get()
    }

    pub fn dispatches(&self, outcome: &str) -> u64 {
        self.dispatches.with_label_values(&[outcome]).get()
    }

    pub fn unknown_symbols(&self) -> u64 {
        self.unknown_symbols.get()
    }

    /// Prometheus text exposition format
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buf) {
            return format!("# failed to encode metrics: {e}\n");
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signal_generation::Rejection;

    #[test]
    fn test_counts_and_render() {
        let metrics = Metrics::new().unwrap();
        metrics.record_evaluation(&Evaluation::NoCrossover);
        metrics.record_evaluation(&Evaluation::Rejected(Rejection::LowVolume {
            ratio: 1.1,
            min: 1.5,
        }));
        metrics.record_eviction();

        assert_eq!(metrics.evaluations("no_crossover"), 1);
        assert_eq!(metrics.evaluations("rejected"), 1);

        let text = metrics.render();
        assert!(text.contains("signal_bot_rejections_total{reason=\"volume\"} 1"));
        assert!(text.contains("signal_bot_queue_evictions_total 1"));
    }
}
