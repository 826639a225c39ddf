//! Abstract storage traits for kanon.
//!
//! These traits define the contract that storage backends must implement.
//! By using traits, we enable:
//! - In-memory backends for testing and embedded use
//! - Persistent backends for production

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::block::BlockKey;
use crate::company::{CanonicalCompany, CompanyId};
use crate::record::{Fingerprint, RecordId};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Company not found.
    #[error("Company not found: {0}")]
    CompanyNotFound(CompanyId),

    /// Record not found.
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),

    /// A lock guarding shared state was poisoned.
    #[error("Poisoned lock: {0}")]
    LockPoisoned(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Backend I/O error.
    #[error("Storage I/O error: {0}")]
    Io(String),
}

/// Storage trait for canonical company documents.
///
/// # Safety Considerations
/// - `upsert` must be idempotent: writing the same document twice leaves
///   one row keyed by its `company_id`
/// - Implementations must handle concurrent readers safely
pub trait CompanyStore: Send + Sync {
    /// Insert or replace a company, keyed by its id. Also refreshes the
    /// member and block indexes for that company.
    fn upsert(&self, company: CanonicalCompany) -> Result<(), StorageError>;

    /// Get a company by id, chasing `mark_merged` tombstones to the
    /// surviving document.
    fn get(&self, id: CompanyId) -> Result<Option<CanonicalCompany>, StorageError>;

    /// Get several companies at once; unknown ids are skipped.
    fn get_many(&self, ids: &[CompanyId]) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Companies whose canonical identity answers to a blocking key.
    /// Incremental runs score new records against these representatives.
    fn find_by_block(&self, key: &BlockKey) -> Result<Vec<CanonicalCompany>, StorageError>;

    /// Tombstone `loser` so lookups resolve to `winner`. The loser's
    /// document is removed; its members must already be folded into the
    /// winner by the caller.
    fn mark_merged(&self, loser: CompanyId, winner: CompanyId) -> Result<(), StorageError>;

    /// Remove a company outright (hard delete for retraction).
    ///
    /// # Errors
    /// `CompanyNotFound` if no such company exists.
    fn remove(&self, id: CompanyId) -> Result<(), StorageError>;

    /// The active company a record belongs to, if any.
    fn member_company(&self, record_id: RecordId) -> Result<Option<CompanyId>, StorageError>;

    /// All stored companies, suppressed included, ordered by id.
    fn all(&self) -> Result<Vec<CanonicalCompany>, StorageError>;
}

/// Storage trait for cross-run resolution state.
///
/// The high-water mark makes incremental runs explicit versioned state:
/// it is read at run start and advanced only on successful commit.
pub trait RunStateStore: Send + Sync {
    /// The last successfully processed fetch timestamp, if any run has
    /// committed yet.
    fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, StorageError>;

    /// Advance the mark. Values at or below the current mark are ignored
    /// so the mark is monotonic.
    fn advance_high_water_mark(&self, ts: DateTime<Utc>) -> Result<(), StorageError>;

    /// The record that first carried this content fingerprint, if seen.
    fn seen_fingerprint(&self, fp: &Fingerprint) -> Result<Option<RecordId>, StorageError>;

    /// Remember a committed record's content fingerprint.
    fn record_fingerprint(&self, fp: Fingerprint, record_id: RecordId)
        -> Result<(), StorageError>;
}
