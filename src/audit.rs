//! Audit log for merge and compliance actions.
//!
//! Every action that changes a canonical company outside plain field
//! refreshes leaves exactly one entry: merges (automatic or reviewer
//! confirmed), suppressions, restores, deletes, splits, and review
//! dismissals. Downstream compliance tooling reads these to reconstruct
//! who did what to which company and when.

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::company::CompanyId;
use crate::record::RecordId;
use crate::storage::StorageError;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Records or companies were folded into a canonical company.
    Merge,
    /// A company was suppressed (RTBF).
    Suppress,
    /// A suppression was explicitly lifted.
    Restore,
    /// A company was removed outright.
    Delete,
    /// Members were detached into a new company.
    Split,
    /// A reviewer dismissed a candidate pair.
    ReviewReject,
}

impl AuditAction {
    /// Returns a stable snake_case identifier for this action.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Suppress => "suppress",
            Self::Restore => "restore",
            Self::Delete => "delete",
            Self::Split => "split",
            Self::ReviewReject => "review_reject",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry id.
    pub id: Uuid,
    /// What happened.
    pub action: AuditAction,
    /// The company acted on.
    pub company_id: CompanyId,
    /// Records touched by the action.
    pub affected_record_ids: Vec<RecordId>,
    /// Who acted: `"engine"` for automatic decisions, a reviewer or
    /// requester reference otherwise.
    pub actor: String,
    /// Free-form context (merge source, requester reference).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates an entry stamped now.
    #[must_use]
    pub fn new(
        action: AuditAction,
        company_id: CompanyId,
        affected_record_ids: Vec<RecordId>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            company_id,
            affected_record_ids,
            actor: actor.into(),
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches free-form context.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Seam to the audit sink.
pub trait AuditLog: Send + Sync {
    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Propagates sink failures as `StorageError`.
    fn append(&self, entry: AuditEntry) -> Result<(), StorageError>;

    /// All entries for one company, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates sink failures as `StorageError`.
    fn entries_for(&self, company_id: CompanyId) -> Result<Vec<AuditEntry>, StorageError>;

    /// Total number of entries.
    ///
    /// # Errors
    ///
    /// Propagates sink failures as `StorageError`.
    fn len(&self) -> Result<usize, StorageError>;

    /// Whether the log is empty.
    ///
    /// # Errors
    ///
    /// Propagates sink failures as `StorageError`.
    fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

/// In-memory [`AuditLog`].
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LockPoisoned` if the interior lock is
    /// poisoned.
    pub fn all(&self) -> Result<Vec<AuditEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned("audit.all".to_string()))?;
        Ok(entries.clone())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append(&self, entry: AuditEntry) -> Result<(), StorageError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StorageError::LockPoisoned("audit.append".to_string()))?;
        entries.push(entry);
        Ok(())
    }

    fn entries_for(&self, company_id: CompanyId) -> Result<Vec<AuditEntry>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned("audit.entries_for".to_string()))?;
        Ok(entries
            .iter()
            .filter(|e| e.company_id == company_id)
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<usize, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::LockPoisoned("audit.len".to_string()))?;
        Ok(entries.len())
    }
}
