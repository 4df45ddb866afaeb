//! Bounded single-consumer queue between evaluation and delivery.
//!
//! Producers never wait: pushing into a full queue evicts the oldest
//! pending signal and hands it back to the caller.

use common::Signal;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};

#[derive(Debug, PartialEq)]
pub enum PushOutcome {
    Queued,
    /// Queued, and the oldest pending signal was dropped to make room
    Evicted(Signal),
    /// The queue is closed; the signal was not queued
    Closed(Signal),
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Signal>,
    closed: bool,
}

#[derive(Debug)]
pub struct DispatchQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl DispatchQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, signal: Signal) -> PushOutcome {
        let mut state = self.state.lock().await;
        if state.closed {
            return PushOutcome::Closed(signal);
        }

        let evicted = if state.items.len() >= self.capacity {
            state.items.pop_front()
        } else {
            None
        };
        state.items.push_back(signal);
        drop(state);

        self.notify.notify_one();
        match evicted {
            Some(old) => PushOutcome::Evicted(old),
            None => PushOutcome::Queued,
        }
    }

    /// Next signal in FIFO order. Returns `None` once the queue is closed
    /// and drained.
    pub async fn pop(&self) -> Option<Signal> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(signal) = state.items.pop_front() {
                    return Some(signal);
                }
                if state.closed {
                    return None;
                }
            }
            // a notify_one issued before we wait leaves a permit behind
            self.notify.notified().await;
        }
    }

    /// Stop accepting signals. Already queued signals can still be popped.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.notify.notify_one();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::fixtures::signal;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_and_drop_oldest() {
        let queue = DispatchQueue::new(2);
        let (a, b, c) = (signal(0), signal(1), signal(2));

        assert_eq!(queue.push(a.clone()).await, PushOutcome::Queued);
        assert_eq!(queue.push(b.clone()).await, PushOutcome::Queued);
        assert_eq!(queue.push(c.clone()).await, PushOutcome::Evicted(a));
        assert_eq!(queue.len().await, 2);

        assert_eq!(queue.pop().await, Some(b));
        assert_eq!(queue.pop().await, Some(c));
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let queue = DispatchQueue::new(4);
        let s = signal(0);
        queue.push(s.clone()).await;
        queue.close().await;

        assert!(matches!(queue.push(signal(1)).await, PushOutcome::Closed(_)));
        assert_eq!(queue.pop().await, Some(s));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(DispatchQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let s = signal(3);
        queue.push(s.clone()).await;

        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(popped, Some(s));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(DispatchQueue::new(4));
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;
        let popped = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(popped.is_none());
    }
}
