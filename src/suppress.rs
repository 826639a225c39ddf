//! Suppression (right-to-be-forgotten) collaborator.
//!
//! The compliance store is external; this module owns the seam the
//! engine calls through. The engine fails closed on it: a cluster whose
//! suppression status cannot be confirmed within the timeout commits
//! nothing that run, because wrongly un-suppressing a company breaks a
//! compliance guarantee while a delayed merge only costs freshness.
//!
//! Suppressed companies keep their member records registered as excluded
//! so future batches cannot resurrect the company under the same
//! identity until an explicit restore.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::company::CompanyId;
use crate::error::SuppressionError;
use crate::record::RecordId;

/// Compliance status of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionStatus {
    /// Visible; merging and indexing proceed normally.
    Active,
    /// Withheld; no new data may be folded in.
    Suppressed,
}

/// Seam to the external suppression store.
pub trait SuppressionStore: Send + Sync {
    /// Confirms a company's status within `timeout`.
    ///
    /// # Errors
    ///
    /// `SuppressionError::Timeout` or `Unavailable` when the store cannot
    /// answer in time; both are retryable and the caller must fail
    /// closed.
    fn status(
        &self,
        company_id: CompanyId,
        timeout: Duration,
    ) -> Result<SuppressionStatus, SuppressionError>;

    /// Marks a company suppressed and registers its members as excluded
    /// from future merges. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates store failures as `SuppressionError`.
    fn suppress(
        &self,
        company_id: CompanyId,
        member_ids: &[RecordId],
    ) -> Result<(), SuppressionError>;

    /// Clears a company's suppression and its members' exclusion flags.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates store failures as `SuppressionError`.
    fn restore(&self, company_id: CompanyId) -> Result<(), SuppressionError>;

    /// Whether a record is excluded from merging (it belonged to a
    /// suppressed or deleted company).
    ///
    /// # Errors
    ///
    /// Propagates store failures as `SuppressionError`.
    fn is_record_excluded(&self, record_id: RecordId) -> Result<bool, SuppressionError>;
}

#[derive(Debug, Default)]
struct SuppressionState {
    suppressed: HashSet<CompanyId>,
    excluded: HashMap<RecordId, CompanyId>,
}

/// In-memory [`SuppressionStore`].
#[derive(Debug, Default)]
pub struct InMemorySuppressionStore {
    state: RwLock<SuppressionState>,
}

impl InMemorySuppressionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err(context: &'static str) -> SuppressionError {
    SuppressionError::Internal {
        reason: format!("poisoned lock: {context}"),
    }
}

impl SuppressionStore for InMemorySuppressionStore {
    fn status(
        &self,
        company_id: CompanyId,
        _timeout: Duration,
    ) -> Result<SuppressionStatus, SuppressionError> {
        let state = self.state.read().map_err(|_| lock_err("status"))?;
        if state.suppressed.contains(&company_id) {
            Ok(SuppressionStatus::Suppressed)
        } else {
            Ok(SuppressionStatus::Active)
        }
    }

    fn suppress(
        &self,
        company_id: CompanyId,
        member_ids: &[RecordId],
    ) -> Result<(), SuppressionError> {
        let mut state = self.state.write().map_err(|_| lock_err("suppress"))?;
        state.suppressed.insert(company_id);
        for member in member_ids {
            state.excluded.insert(*member, company_id);
        }
        Ok(())
    }

    fn restore(&self, company_id: CompanyId) -> Result<(), SuppressionError> {
        let mut state = self.state.write().map_err(|_| lock_err("restore"))?;
        state.suppressed.remove(&company_id);
        state.excluded.retain(|_, owner| *owner != company_id);
        Ok(())
    }

    fn is_record_excluded(&self, record_id: RecordId) -> Result<bool, SuppressionError> {
        let state = self.state.read().map_err(|_| lock_err("is_excluded"))?;
        Ok(state.excluded.contains_key(&record_id))
    }
}
