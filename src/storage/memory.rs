//! In-memory storage backend.
//!
//! This module provides thread-safe in-memory implementations of the
//! storage traits. It is intended for embedded usage, tests, and as a
//! reference implementation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::block::BlockKey;
use crate::company::{CanonicalCompany, CompanyId};
use crate::record::{Fingerprint, RecordId};
use crate::storage::traits::{CompanyStore, RunStateStore, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::LockPoisoned(context.to_string())
}

#[derive(Debug, Default)]
struct CompanyState {
    by_id: BTreeMap<CompanyId, CanonicalCompany>,
    by_block: HashMap<BlockKey, BTreeSet<CompanyId>>,
    member_index: HashMap<RecordId, CompanyId>,
    merged_into: HashMap<CompanyId, CompanyId>,
}

fn resolve_surviving_id(
    state: &CompanyState,
    id: CompanyId,
) -> Result<CompanyId, StorageError> {
    let mut current = id;
    for _ in 0..128 {
        let Some(next) = state.merged_into.get(&current).copied() else {
            return Ok(current);
        };
        if next == current {
            return Err(StorageError::Io(
                "company merge map contains a self-cycle".to_string(),
            ));
        }
        current = next;
    }
    Err(StorageError::Io(
        "company merge map resolution exceeded hop limit".to_string(),
    ))
}

fn unindex(state: &mut CompanyState, company: &CanonicalCompany) {
    for key in &company.block_keys {
        if let Some(ids) = state.by_block.get_mut(key) {
            ids.remove(&company.company_id);
            if ids.is_empty() {
                state.by_block.remove(key);
            }
        }
    }
    for member in &company.member_record_ids {
        if state.member_index.get(member) == Some(&company.company_id) {
            state.member_index.remove(member);
        }
    }
}

/// In-memory [`CompanyStore`].
#[derive(Debug, Default)]
pub struct InMemoryCompanyStore {
    state: RwLock<CompanyState>,
}

impl InMemoryCompanyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-tombstoned) companies.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LockPoisoned` if the interior lock is
    /// poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.len"))?;
        Ok(state.by_id.len())
    }

    /// Whether the store holds no companies.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::LockPoisoned` if the interior lock is
    /// poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }
}

impl CompanyStore for InMemoryCompanyStore {
    fn upsert(&self, company: CanonicalCompany) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("company.upsert"))?;
        if let Some(previous) = state.by_id.remove(&company.company_id) {
            unindex(&mut state, &previous);
        }
        for key in &company.block_keys {
            state
                .by_block
                .entry(key.clone())
                .or_default()
                .insert(company.company_id);
        }
        for member in &company.member_record_ids {
            state.member_index.insert(*member, company.company_id);
        }
        // An upsert under a tombstoned id revives that id.
        state.merged_into.remove(&company.company_id);
        state.by_id.insert(company.company_id, company);
        Ok(())
    }

    fn get(&self, id: CompanyId) -> Result<Option<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.get"))?;
        let surviving = resolve_surviving_id(&state, id)?;
        Ok(state.by_id.get(&surviving).cloned())
    }

    fn get_many(&self, ids: &[CompanyId]) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.get_many"))?;
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let surviving = resolve_surviving_id(&state, *id)?;
            if seen.insert(surviving) {
                if let Some(company) = state.by_id.get(&surviving) {
                    out.push(company.clone());
                }
            }
        }
        Ok(out)
    }

    fn find_by_block(&self, key: &BlockKey) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("company.find_by_block"))?;
        let Some(ids) = state.by_block.get(key) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.by_id.get(id).cloned())
            .collect())
    }

    fn mark_merged(&self, loser: CompanyId, winner: CompanyId) -> Result<(), StorageError> {
        if loser == winner {
            return Err(StorageError::Io(
                "cannot merge a company into itself".to_string(),
            ));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| lock_err("company.mark_merged"))?;
        if !state.by_id.contains_key(&winner) {
            return Err(StorageError::CompanyNotFound(winner));
        }
        let Some(doc) = state.by_id.remove(&loser) else {
            return Err(StorageError::CompanyNotFound(loser));
        };
        unindex(&mut state, &doc);
        state.merged_into.insert(loser, winner);
        Ok(())
    }

    fn remove(&self, id: CompanyId) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("company.remove"))?;
        let Some(doc) = state.by_id.remove(&id) else {
            return Err(StorageError::CompanyNotFound(id));
        };
        unindex(&mut state, &doc);
        Ok(())
    }

    fn member_company(&self, record_id: RecordId) -> Result<Option<CompanyId>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| lock_err("company.member_company"))?;
        let Some(id) = state.member_index.get(&record_id).copied() else {
            return Ok(None);
        };
        Ok(Some(resolve_surviving_id(&state, id)?))
    }

    fn all(&self) -> Result<Vec<CanonicalCompany>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("company.all"))?;
        Ok(state.by_id.values().cloned().collect())
    }
}

#[derive(Debug, Default)]
struct RunState {
    high_water_mark: Option<DateTime<Utc>>,
    fingerprints: HashMap<[u8; 32], RecordId>,
}

/// In-memory [`RunStateStore`].
#[derive(Debug, Default)]
pub struct InMemoryRunState {
    state: RwLock<RunState>,
}

impl InMemoryRunState {
    /// Creates an empty run state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStateStore for InMemoryRunState {
    fn high_water_mark(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("run.hwm"))?;
        Ok(state.high_water_mark)
    }

    fn advance_high_water_mark(&self, ts: DateTime<Utc>) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("run.advance"))?;
        if state.high_water_mark.map_or(true, |current| ts > current) {
            state.high_water_mark = Some(ts);
        }
        Ok(())
    }

    fn seen_fingerprint(&self, fp: &Fingerprint) -> Result<Option<RecordId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("run.seen"))?;
        Ok(state.fingerprints.get(fp.as_bytes()).copied())
    }

    fn record_fingerprint(
        &self,
        fp: Fingerprint,
        record_id: RecordId,
    ) -> Result<(), StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("run.record"))?;
        state
            .fingerprints
            .entry(*fp.as_bytes())
            .or_insert(record_id);
        Ok(())
    }
}
