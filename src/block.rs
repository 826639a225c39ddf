//! Candidate grouping (blocking).
//!
//! Blocking turns the O(n²) all-pairs comparison into near-linear work:
//! only records sharing a blocking key are compared. The key is the
//! website domain when one exists — domains are the strongest identity
//! signal — and the folded `(name, city)` pair otherwise. Records lacking
//! both never get here; the normalizer rejects them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::normalize::{NormalizedRecord, Normalizer};

/// Key under which records are grouped for pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlockKey {
    /// Shared website domain (scheme/www already stripped).
    Domain {
        /// The normalized host.
        domain: String,
    },

    /// Folded name key plus folded city key.
    NameCity {
        /// Folded name key.
        name: String,
        /// Folded city key.
        city: String,
    },
}

impl BlockKey {
    /// Builds a domain key.
    #[must_use]
    pub fn domain(domain: impl Into<String>) -> Self {
        Self::Domain {
            domain: domain.into(),
        }
    }

    /// Builds a name+city key from already-folded parts.
    #[must_use]
    pub fn name_city(name: impl Into<String>, city: impl Into<String>) -> Self {
        Self::NameCity {
            name: name.into(),
            city: city.into(),
        }
    }

    /// The blocking key of a normalized record: domain when present, else
    /// name+city.
    #[must_use]
    pub fn for_record(record: &NormalizedRecord) -> Self {
        if let Some(domain) = &record.key.domain_key {
            return Self::domain(domain.clone());
        }
        let city = record
            .key
            .city_key
            .as_deref()
            .map(Normalizer::city_key_folded)
            .unwrap_or_default();
        Self::name_city(record.key.name_key.clone(), city)
    }
}

/// A transient group of records sharing one blocking key.
///
/// Groups live for the duration of a run and are never persisted.
#[derive(Debug)]
pub struct CandidateGroup {
    /// The shared key.
    pub key: BlockKey,
    /// Members, ordered by record id for deterministic pairing.
    pub records: Vec<NormalizedRecord>,
}

impl CandidateGroup {
    /// Number of pairwise comparisons this group will produce among its
    /// own members (representatives add more).
    #[must_use]
    pub fn pair_count(&self) -> usize {
        let n = self.records.len();
        n * (n.saturating_sub(1)) / 2
    }
}

/// Result of one blocking pass.
#[derive(Debug)]
pub struct BlockOutcome {
    /// Groups sorted by key for deterministic downstream processing.
    pub groups: Vec<CandidateGroup>,
    /// How many oversized groups had to be split.
    pub overflow_splits: u64,
}

/// Groups normalized records by blocking key, splitting oversized groups.
#[derive(Debug, Clone, Copy)]
pub struct Blocker {
    max_block_size: usize,
}

impl Blocker {
    /// Creates a blocker with the given group size cap.
    #[must_use]
    pub const fn new(max_block_size: usize) -> Self {
        Self { max_block_size }
    }

    /// Partitions records into candidate groups.
    ///
    /// A group larger than the cap is split by the first token of the
    /// name key; a shard that still exceeds the cap is chunked at the cap
    /// so pairwise cost stays bounded (pairs across chunks are skipped —
    /// a precision trade-off, logged as a warning).
    #[must_use]
    pub fn group(&self, records: Vec<NormalizedRecord>) -> BlockOutcome {
        let mut by_key: HashMap<BlockKey, Vec<NormalizedRecord>> = HashMap::new();
        for record in records {
            let key = BlockKey::for_record(&record);
            by_key.entry(key).or_default().push(record);
        }

        let mut overflow_splits = 0u64;
        let mut groups = Vec::with_capacity(by_key.len());
        for (key, mut members) in by_key {
            members.sort_by_key(|r| r.record_id());
            if members.len() <= self.max_block_size {
                groups.push(CandidateGroup { key, records: members });
                continue;
            }

            overflow_splits += 1;
            warn!(
                key = ?key,
                size = members.len(),
                cap = self.max_block_size,
                "block overflow: splitting group by first name token"
            );

            let mut shards: HashMap<String, Vec<NormalizedRecord>> = HashMap::new();
            for record in members {
                let token = record
                    .key
                    .name_key
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_string();
                shards.entry(token).or_default().push(record);
            }

            for (token, shard) in shards {
                if shard.len() > self.max_block_size {
                    warn!(
                        key = ?key,
                        token = %token,
                        size = shard.len(),
                        cap = self.max_block_size,
                        "block shard still oversized: chunking at cap, cross-chunk pairs skipped"
                    );
                    let mut shard = shard;
                    while !shard.is_empty() {
                        let rest = shard.split_off(shard.len().min(self.max_block_size));
                        groups.push(CandidateGroup {
                            key: key.clone(),
                            records: shard,
                        });
                        shard = rest;
                    }
                } else {
                    groups.push(CandidateGroup {
                        key: key.clone(),
                        records: shard,
                    });
                }
            }
        }

        groups.sort_by(|a, b| {
            a.key
                .cmp(&b.key)
                .then_with(|| a.records.first().map(NormalizedRecord::record_id).cmp(
                    &b.records.first().map(NormalizedRecord::record_id),
                ))
        });

        BlockOutcome {
            groups,
            overflow_splits,
        }
    }
}
