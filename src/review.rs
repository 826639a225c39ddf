//! Manual-review queue seam and local buffering.
//!
//! Pairs scoring in the review band are emitted to an external queue for
//! a human decision; the cluster stays unmerged until the reviewer
//! accepts. The queue being down must never block a run — auto-merges do
//! not depend on it — so the router parks undeliverable entries in a
//! bounded local buffer and retries them at the start of later runs.
//! When the buffer overflows, the oldest entry is dropped and counted;
//! review entries are advisory, losing one degrades recall, not
//! correctness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::company::{CanonicalCompany, CompanyId};
use crate::error::ReviewQueueError;
use crate::normalize::NormalizedRecord;
use crate::record::RecordId;
use crate::score::FieldContribution;

/// One side of a candidate pair, summarized for the reviewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewSide {
    /// Set when this side is a raw record from the current batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    /// Set when this side is an existing canonical company.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<CompanyId>,
    /// Display name.
    pub legal_name: String,
    /// City, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Website domain, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ReviewSide {
    /// Summarizes a batch record.
    #[must_use]
    pub fn of_record(record: &NormalizedRecord) -> Self {
        Self {
            record_id: Some(record.record_id()),
            company_id: None,
            legal_name: record.display_name.clone(),
            city: record.city_display.clone(),
            domain: record.key.domain_key.clone(),
        }
    }

    /// Summarizes an existing company.
    #[must_use]
    pub fn of_company(company: &CanonicalCompany) -> Self {
        Self {
            record_id: None,
            company_id: Some(company.company_id),
            legal_name: company.legal_name.value.clone(),
            city: company.city.as_ref().map(|c| c.value.clone()),
            domain: company.website_domain.as_ref().map(|d| d.value.clone()),
        }
    }
}

/// A candidate pair awaiting a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Entry id.
    pub id: Uuid,
    /// First side (lower record id when both are records).
    pub side_a: ReviewSide,
    /// Second side.
    pub side_b: ReviewSide,
    /// The pair score that landed in the review band.
    pub score: f64,
    /// Per-field score breakdown for explainability.
    pub contributions: Vec<FieldContribution>,
    /// When the pair was scored.
    pub created_at: DateTime<Utc>,
}

impl ReviewEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(
        side_a: ReviewSide,
        side_b: ReviewSide,
        score: f64,
        contributions: Vec<FieldContribution>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            side_a,
            side_b,
            score,
            contributions,
            created_at: Utc::now(),
        }
    }
}

/// A reviewer's verdict on a queued pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum ReviewDecision {
    /// The sides are the same company; merge them.
    Confirm {
        /// The reviewed entry.
        entry: ReviewEntry,
        /// Who decided.
        reviewer: String,
    },
    /// The sides are different companies; record the dismissal.
    Reject {
        /// The reviewed entry.
        entry: ReviewEntry,
        /// Who decided.
        reviewer: String,
    },
}

/// Seam to the external review queue.
pub trait ReviewQueue: Send + Sync {
    /// Delivers one entry within `timeout`.
    ///
    /// # Errors
    ///
    /// `ReviewQueueError::Unavailable` or `Timeout`; both are retryable
    /// and the router buffers the entry locally.
    fn enqueue(&self, entry: ReviewEntry, timeout: Duration) -> Result<(), ReviewQueueError>;
}

/// In-memory [`ReviewQueue`].
#[derive(Debug, Default)]
pub struct InMemoryReviewQueue {
    entries: Mutex<Vec<ReviewEntry>>,
}

impl InMemoryReviewQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of delivered entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<ReviewEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of delivered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Whether nothing has been delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReviewQueue for InMemoryReviewQueue {
    fn enqueue(&self, entry: ReviewEntry, _timeout: Duration) -> Result<(), ReviewQueueError> {
        let mut entries = self.entries.lock().map_err(|_| ReviewQueueError::Unavailable {
            reason: "poisoned queue lock".to_string(),
        })?;
        entries.push(entry);
        Ok(())
    }
}

/// Buffering front over a [`ReviewQueue`].
///
/// Dispatch tries the queue once; on failure the entry parks in a
/// bounded FIFO buffer. `flush_pending` retries in order and stops at
/// the first failure so ordering is preserved.
pub struct ReviewRouter {
    queue: Arc<dyn ReviewQueue>,
    buffer: Mutex<VecDeque<ReviewEntry>>,
    capacity: usize,
    timeout: Duration,
    buffered_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl ReviewRouter {
    /// Creates a router with the given buffer capacity and enqueue
    /// timeout.
    #[must_use]
    pub fn new(queue: Arc<dyn ReviewQueue>, capacity: usize, timeout: Duration) -> Self {
        Self {
            queue,
            buffer: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            timeout,
            buffered_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        }
    }

    /// Delivers an entry, parking it locally when the queue is down.
    /// Returns true when the entry reached the queue directly.
    pub fn dispatch(&self, entry: ReviewEntry) -> bool {
        match self.queue.enqueue(entry.clone(), self.timeout) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, entry_id = %entry.id, "review queue unavailable, buffering entry");
                self.park(entry);
                false
            }
        }
    }

    /// Retries parked entries in order; stops at the first failure.
    /// Returns how many were delivered.
    pub fn flush_pending(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = {
                let Ok(mut buffer) = self.buffer.lock() else {
                    return delivered;
                };
                buffer.pop_front()
            };
            let Some(entry) = next else {
                return delivered;
            };
            if let Err(err) = self.queue.enqueue(entry.clone(), self.timeout) {
                warn!(error = %err, "review queue still unavailable, keeping buffer");
                if let Ok(mut buffer) = self.buffer.lock() {
                    buffer.push_front(entry);
                }
                return delivered;
            }
            delivered += 1;
        }
    }

    fn park(&self, entry: ReviewEntry) {
        let Ok(mut buffer) = self.buffer.lock() else {
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if buffer.len() >= self.capacity {
            let dropped = buffer.pop_front();
            self.dropped_total.fetch_add(1, Ordering::Relaxed);
            if let Some(dropped) = dropped {
                warn!(entry_id = %dropped.id, "review buffer full, dropping oldest entry");
            }
        }
        buffer.push_back(entry);
        self.buffered_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Entries currently parked.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    /// Entries ever parked.
    #[must_use]
    pub fn buffered_total(&self) -> u64 {
        self.buffered_total.load(Ordering::Relaxed)
    }

    /// Entries lost to buffer overflow.
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ReviewRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewRouter")
            .field("capacity", &self.capacity)
            .field("pending", &self.pending())
            .field("buffered_total", &self.buffered_total())
            .field("dropped_total", &self.dropped_total())
            .finish_non_exhaustive()
    }
}
