//! Per-instance FIFO of alerts awaiting processing.
//!
//! Alert ids are remembered for the life of the instance so a re-delivered
//! alert is never processed twice. Items are never requeued.

use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::types::AlertNotification;

#[derive(Debug, Clone)]
pub struct GameQueueItem {
    pub alert: AlertNotification,
    /// Enqueue sequence number, for log correlation.
    pub position: u64,
}

#[derive(Debug, Default)]
pub struct GameQueue {
    items: VecDeque<GameQueueItem>,
    seen: HashSet<String>,
    enqueued: u64,
}

/// What happened to a delivered batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    pub added: usize,
    pub duplicates: usize,
    pub missing_id: usize,
}

impl GameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unseen alerts in delivery order.
    pub fn enqueue_batch(&mut self, batch: Vec<AlertNotification>) -> EnqueueSummary {
        let mut summary = EnqueueSummary::default();
        for alert in batch {
            if alert.id.is_empty() {
                debug!("Skipped alert with missing id");
                summary.missing_id += 1;
                continue;
            }
            if !self.seen.insert(alert.id.clone()) {
                debug!(id = %alert.id, "Skipped duplicate alert");
                summary.duplicates += 1;
                continue;
            }
            self.enqueued += 1;
            debug!(id = %alert.id, position = self.enqueued, "Alert queued");
            self.items.push_back(GameQueueItem {
                alert,
                position: self.enqueued,
            });
            summary.added += 1;
        }
        summary
    }

    pub fn pop(&mut self) -> Option<GameQueueItem> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop pending items and forget seen ids (instance stop).
    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
    }
}
