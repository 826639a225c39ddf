//! # Kanon - Company Entity Resolution
//!
//! Kanon deduplicates company records scraped from heterogeneous sources
//! into canonical company documents. Each batch of raw records is
//! normalized, grouped into candidate blocks, pairwise scored, clustered
//! by transitive closure, and merged with full provenance.
//!
//! ## Core Concepts
//!
//! - **RawRecord**: One observation of a company from one source
//! - **NormalizedRecord**: The observation after name/city/domain folding
//! - **CanonicalCompany**: The merged document, every field with provenance
//! - **ResolutionEngine**: The batch pipeline plus the review, retraction,
//!   and split surfaces
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kanon::{
//!     EngineConfig, InMemoryAuditLog, InMemoryCompanyStore, InMemoryReviewQueue,
//!     InMemoryRunState, InMemorySuppressionStore, ResolutionEngine,
//! };
//!
//! let engine = ResolutionEngine::new(
//!     Arc::new(InMemoryCompanyStore::new()),
//!     Arc::new(InMemoryRunState::new()),
//!     Arc::new(InMemorySuppressionStore::new()),
//!     Arc::new(InMemoryReviewQueue::new()),
//!     Arc::new(InMemoryAuditLog::new()),
//!     EngineConfig::default(),
//! )?;
//!
//! let report = engine.run_batch(records)?;
//! println!("{} companies created", report.new_companies);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod company;
pub mod config;
pub mod error;
pub mod record;

// Pipeline stages
pub mod block;
pub mod cluster;
pub mod merge;
pub mod normalize;
pub mod score;

// Engine and collaborator seams
pub mod audit;
pub mod engine;
pub mod review;
pub mod storage;
pub mod suppress;

// Re-export primary types at crate root for convenience
pub use audit::{AuditAction, AuditEntry, AuditLog, InMemoryAuditLog};
pub use company::{CanonicalCompany, CanonicalValue, CompanyId, Provenance};
pub use config::EngineConfig;
pub use engine::{
    BatchReport, ResolutionEngine, RetractionAction, RetractionOutcome, RetractionRequest,
    ReviewOutcome, SplitOutcome,
};
pub use error::{
    KanonError, KanonResult, PipelineError, ReviewQueueError, SuppressionError, ValidationError,
};
pub use normalize::{NormalizedRecord, Normalizer};
pub use record::{Fingerprint, RawRecord, RecordFields, RecordId, SourceType};
pub use review::{
    InMemoryReviewQueue, ReviewDecision, ReviewEntry, ReviewQueue, ReviewRouter, ReviewSide,
};
pub use score::{FieldContribution, FieldWeights, PairScore, Scorer};
pub use storage::{
    CompanyStore, InMemoryCompanyStore, InMemoryRunState, RunStateStore, StorageError,
};
pub use suppress::{InMemorySuppressionStore, SuppressionStatus, SuppressionStore};
