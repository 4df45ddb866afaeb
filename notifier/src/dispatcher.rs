//! Per-signal delivery state machine.
//!
//! `Pending -> Primary(1..=n) -> Fallback -> Done`, where a primary success
//! jumps straight to `Done`. No state is revisited and every path ends in
//! `Done`. The journal write happens before any network attempt and its
//! failure never blocks delivery.

use crate::backoff::Backoff;
use crate::channels::NotificationChannel;
use crate::error::DeliveryError;
use crate::journal::SignalJournal;
use common::{DispatchConfig, Signal};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    DeliveredPrimary,
    DeliveredFallback,
    /// Only the local journal (if that succeeded) has the signal
    DeliveredLocalOnly,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::DeliveredPrimary => "primary",
            DispatchOutcome::DeliveredFallback => "fallback",
            DispatchOutcome::DeliveredLocalOnly => "local_only",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub signal_id: Uuid,
    pub outcome: DispatchOutcome,
    /// The record is in `signals.log`
    pub journaled: bool,
    /// `latest_signal.json` now holds this signal
    pub latest_updated: bool,
    pub primary_attempts: u32,
    pub fallback_attempted: bool,
}

/// Timeouts and retry budget
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub primary_timeout: Duration,
    pub primary_max_attempts: u32,
    pub backoff: Backoff,
    pub fallback_timeout: Duration,
}

impl DispatchPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            primary_timeout: Duration::from_secs(config.primary_timeout_secs),
            primary_max_attempts: config.primary_max_attempts.max(1),
            backoff: Backoff::from_config(config),
            fallback_timeout: Duration::from_secs(config.fallback_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeliveryState {
    Pending,
    Primary { attempt: u32 },
    Fallback,
    Done(DispatchOutcome),
}

pub struct Dispatcher {
    journal: SignalJournal,
    primary: Box<dyn NotificationChannel>,
    fallback: Option<Box<dyn NotificationChannel>>,
    policy: DispatchPolicy,
}

impl Dispatcher {
    pub fn new(
        journal: SignalJournal,
        primary: Box<dyn NotificationChannel>,
        fallback: Option<Box<dyn NotificationChannel>>,
        policy: DispatchPolicy,
    ) -> Self {
        Self {
            journal,
            primary,
            fallback,
            policy,
        }
    }

    pub fn journal(&self) -> &SignalJournal {
        &self.journal
    }

    /// Journal, then primary with retries, then fallback once
    pub async fn dispatch(&self, signal: &Signal) -> DispatchReport {
        let (journaled, latest_updated) = self.record(signal).await;
        let mut primary_attempts = 0;
        let mut fallback_attempted = false;

        let mut state = DeliveryState::Pending;
        let outcome = loop {
            state = match state {
                DeliveryState::Pending => DeliveryState::Primary { attempt: 1 },

                DeliveryState::Primary { attempt } => {
                    primary_attempts = attempt;
                    match self.attempt(self.primary.as_ref(), signal, self.policy.primary_timeout).await {
                        Ok(()) => DeliveryState::Done(DispatchOutcome::DeliveredPrimary),
                        Err(e) => {
                            warn!(
                                id = %signal.id(),
                                channel = self.primary.name(),
                                attempt,
                                "primary delivery failed: {}",
                                e
                            );
                            if attempt < self.policy.primary_max_attempts {
                                tokio::time::sleep(self.policy.backoff.delay(attempt - 1)).await;
                                DeliveryState::Primary { attempt: attempt + 1 }
                            } else {
                                DeliveryState::Fallback
                            }
                        }
                    }
                }

                DeliveryState::Fallback => match &self.fallback {
                    None => {
                        warn!(id = %signal.id(), "primary exhausted and no fallback channel configured");
                        DeliveryState::Done(DispatchOutcome::DeliveredLocalOnly)
                    }
                    Some(channel) => {
                        fallback_attempted = true;
                        match self.attempt(channel.as_ref(), signal, self.policy.fallback_timeout).await {
                            Ok(()) => DeliveryState::Done(DispatchOutcome::DeliveredFallback),
                            Err(e) => {
                                warn!(
                                    id = %signal.id(),
                                    channel = channel.name(),
                                    "fallback delivery failed: {}",
                                    e
                                );
                                DeliveryState::Done(DispatchOutcome::DeliveredLocalOnly)
                            }
                        }
                    }
                },

                DeliveryState::Done(outcome) => break outcome,
            };
        };

        let report = DispatchReport {
            signal_id: signal.id(),
            outcome,
            journaled,
            latest_updated,
            primary_attempts,
            fallback_attempted,
        };
        self.log_report(signal, &report);
        report
    }

    /// For signals that will never reach a channel (evicted from the queue,
    /// or left over at shutdown)
    pub async fn record_only(&self, signal: &Signal) -> DispatchReport {
        let (journaled, latest_updated) = self.record(signal).await;
        let report = DispatchReport {
            signal_id: signal.id(),
            outcome: DispatchOutcome::DeliveredLocalOnly,
            journaled,
            latest_updated,
            primary_attempts: 0,
            fallback_attempted: false,
        };
        self.log_report(signal, &report);
        report
    }

    /// (appended to the log, latest snapshot replaced)
    async fn record(&self, signal: &Signal) -> (bool, bool) {
        match self.journal.record(signal).await {
            Ok(()) => (true, true),
            Err(e @ DeliveryError::LatestSnapshot(_)) => {
                warn!(id = %signal.id(), symbol = signal.symbol(), "signal journaled but {}", e);
                (true, false)
            }
            Err(e) => {
                warn!(id = %signal.id(), symbol = signal.symbol(), "journal write failed: {}", e);
                (false, false)
            }
        }
    }

    async fn attempt(
        &self,
        channel: &dyn NotificationChannel,
        signal: &Signal,
        timeout: Duration,
    ) -> Result<(), DeliveryError> {
        match tokio::time::timeout(timeout, channel.deliver(signal)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout {
                channel: channel.name(),
                after: timeout,
            }),
        }
    }

    fn log_report(&self, signal: &Signal, report: &DispatchReport) {
        match (report.outcome, report.journaled) {
            (DispatchOutcome::DeliveredLocalOnly, false) => error!(
                id = %signal.id(),
                symbol = signal.symbol(),
                direction = %signal.direction(),
                "signal lost: every channel and the local journal failed"
            ),
            (DispatchOutcome::DeliveredLocalOnly, true) => warn!(
                id = %signal.id(),
                symbol = signal.symbol(),
                outcome = %report.outcome,
                "signal recorded locally only"
            ),
            (outcome, _) => info!(
                id = %signal.id(),
                symbol = signal.symbol(),
                outcome = %outcome,
                attempts = report.primary_attempts,
                "signal delivered"
            ),
        }
    }
}
