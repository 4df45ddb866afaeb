use std::time::Duration;
use thiserror::Error;

/// A failed delivery attempt. Recovered by the dispatcher's retry and
/// fallback chain; never fatal on its own.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("{channel} timed out after {after:?}")]
    Timeout {
        channel: &'static str,
        after: Duration,
    },

    #[error("{channel} transport error: {message}")]
    Transport {
        channel: &'static str,
        message: String,
    },

    #[error("{channel} rejected the message (status {status}): {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },

    #[error("{channel} is not configured: {reason}")]
    NotConfigured {
        channel: &'static str,
        reason: String,
    },

    #[error("journal write failed: {0}")]
    Journal(#[from] std::io::Error),

    /// The log line was appended but `latest_signal.json` was not replaced
    #[error("latest snapshot update failed: {0}")]
    LatestSnapshot(std::io::Error),
}

impl DeliveryError {
    pub fn transport(channel: &'static str, err: impl std::fmt::Display) -> Self {
        DeliveryError::Transport {
            channel,
            message: err.to_string(),
        }
    }
}
