use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::status::{Completion, UnifiedStatus};
use crate::util::lock_unpoisoned;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionMetricsSnapshot {
    pub requests_started: u64,
    pub requests_succeeded: u64,
    pub requests_failed: u64,
    pub requests_cancelled: u64,
    pub attempts: u64,
    pub retries: u64,
    pub transport_failures: u64,
    pub partial_transfers: u64,
    pub status_counts: BTreeMap<u16, u64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct SessionMetrics {
    inner: Arc<SessionMetricsInner>,
}

#[derive(Debug, Default)]
struct SessionMetricsInner {
    requests_started: AtomicU64,
    requests_succeeded: AtomicU64,
    requests_failed: AtomicU64,
    requests_cancelled: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    transport_failures: AtomicU64,
    partial_transfers: AtomicU64,
    status_counts: Mutex<BTreeMap<u16, u64>>,
}

impl SessionMetrics {
    pub(crate) fn record_request_started(&self) {
        self.inner.requests_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.inner.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_attempt(&self, completion: &Completion) {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
        match completion {
            Completion::Complete => {}
            Completion::PartialFile { .. } => {
                self.inner.partial_transfers.fetch_add(1, Ordering::Relaxed);
            }
            Completion::Failed { .. } => {
                self.inner
                    .transport_failures
                    .fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub(crate) fn record_request_completed(&self, status: UnifiedStatus) {
        let counter = match status {
            UnifiedStatus::Cancelled => &self.inner.requests_cancelled,
            status if status.is_success() => &self.inner.requests_succeeded,
            _ => &self.inner.requests_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(code) = status.http_code() {
            let mut status_counts = lock_unpoisoned(&self.inner.status_counts);
            *status_counts.entry(code).or_insert(0) += 1;
        }
    }

    pub(crate) fn snapshot(&self) -> SessionMetricsSnapshot {
        SessionMetricsSnapshot {
            requests_started: self.inner.requests_started.load(Ordering::Relaxed),
            requests_succeeded: self.inner.requests_succeeded.load(Ordering::Relaxed),
            requests_failed: self.inner.requests_failed.load(Ordering::Relaxed),
            requests_cancelled: self.inner.requests_cancelled.load(Ordering::Relaxed),
            attempts: self.inner.attempts.load(Ordering::Relaxed),
            retries: self.inner.retries.load(Ordering::Relaxed),
            transport_failures: self.inner.transport_failures.load(Ordering::Relaxed),
            partial_transfers: self.inner.partial_transfers.load(Ordering::Relaxed),
            status_counts: lock_unpoisoned(&self.inner.status_counts).clone(),
        }
    }
}
