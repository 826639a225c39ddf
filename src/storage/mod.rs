//! Storage seams for kanon.
//!
//! These traits define the abstract interface for storage backends.
//! The in-memory implementations back tests and embedded use.

mod memory;
mod traits;

pub use memory::{InMemoryCompanyStore, InMemoryRunState};
pub use traits::{CompanyStore, RunStateStore, StorageError};
