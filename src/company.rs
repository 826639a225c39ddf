//! Canonical company documents.
//!
//! A canonical company is the merged, deduplicated view of one real-world
//! business: one chosen value per scalar field, full provenance for every
//! choice, and the complete member list that produced it. Company ids are
//! minted once from the founding member's identity and never recomputed,
//! so downstream consumers can key on them across runs.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::BlockKey;
use crate::normalize::{CompanyKind, Normalizer};
use crate::record::{RecordId, SourceType};
use crate::score::MatchFields;

/// Namespace for deriving company ids from identity strings.
const COMPANY_NAMESPACE: Uuid = Uuid::from_u128(0x9f3b_1c64_8d2a_4e71_b306_55c1_d7aa_93f2);

/// Stable identifier of a canonical company.
///
/// Derived deterministically from the founding member's identity string,
/// so re-resolving the same inputs on an empty store reproduces the same
/// ids. Once minted, an id sticks to its cluster for life; growing the
/// member set never changes it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CompanyId(Uuid);

impl CompanyId {
    /// Derives the id for a founding identity string.
    #[must_use]
    pub fn derive(identity: &str) -> Self {
        Self(Uuid::new_v5(&COMPANY_NAMESPACE, identity.as_bytes()))
    }

    /// Wraps an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// The nil id.
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the nil id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CompanyId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<CompanyId> for Uuid {
    fn from(id: CompanyId) -> Self {
        id.0
    }
}

/// Where a canonical value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Member record that supplied the value.
    pub record_id: RecordId,
    /// Collector that produced that record.
    pub source: SourceType,
    /// When the record was fetched.
    pub fetch_ts: DateTime<Utc>,
}

/// A losing candidate kept for lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternate<T> {
    /// The value that was not chosen.
    pub value: T,
    /// Where it came from.
    pub provenance: Provenance,
}

/// A chosen field value with its provenance and runners-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalValue<T> {
    /// The winning value.
    pub value: T,
    /// Which member supplied it.
    pub chosen_from: Provenance,
    /// Distinct losing values, newest first, capped by config.
    #[serde(default = "Vec::new", skip_serializing_if = "Vec::is_empty")]
    pub alternates: Vec<Alternate<T>>,
}

impl<T> CanonicalValue<T> {
    /// A canonical value with no alternates.
    #[must_use]
    pub const fn new(value: T, chosen_from: Provenance) -> Self {
        Self {
            value,
            chosen_from,
            alternates: Vec::new(),
        }
    }
}

/// The merged, deduplicated view of one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalCompany {
    /// Stable id, minted at creation.
    pub company_id: CompanyId,
    /// Best-known display name.
    pub legal_name: CanonicalValue<String>,
    /// Folded matching key of `legal_name`; kept alongside the display
    /// form so representatives can be scored without re-normalizing.
    pub name_key: String,
    /// Canonical city display form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<CanonicalValue<String>>,
    /// Normalized website host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_domain: Option<CanonicalValue<String>>,
    /// E.164 phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<CanonicalValue<String>>,
    /// Normalized street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<CanonicalValue<String>>,
    /// Detected or declared legal form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_kind: Option<CanonicalValue<CompanyKind>>,
    /// Review rating, when any member carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<CanonicalValue<f64>>,
    /// Review count, when any member carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<CanonicalValue<u64>>,
    /// Union of member emails, sorted and deduplicated.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,
    /// Member keywords ranked by frequency, capped by config.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Every member record, sorted by id.
    pub member_record_ids: Vec<RecordId>,
    /// Every collector that contributed a member.
    pub data_sources: BTreeSet<SourceType>,
    /// Earliest member fetch timestamp.
    pub first_seen: DateTime<Utc>,
    /// Latest member fetch timestamp, or the wall clock for lifecycle
    /// events (suppress, restore, split) that change the document
    /// without new observations.
    pub last_updated: DateTime<Utc>,
    /// True while the company is withheld from read paths.
    #[serde(default)]
    pub suppressed: bool,
    /// Blocking keys this company answers to during incremental runs.
    pub block_keys: Vec<BlockKey>,
}

impl CanonicalCompany {
    /// Whether a record belongs to this company.
    #[must_use]
    pub fn is_member(&self, record_id: RecordId) -> bool {
        self.member_record_ids.binary_search(&record_id).is_ok()
    }

    /// Number of member records.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.member_record_ids.len()
    }

    /// Comparison view for scoring this company against an incoming
    /// record. Uses the same field forms the normalizer emits.
    #[must_use]
    pub fn match_fields(&self) -> MatchFields {
        MatchFields {
            name_key: self.name_key.clone(),
            domain_key: self.website_domain.as_ref().map(|d| d.value.clone()),
            phone_digits: self
                .phone
                .as_ref()
                .map(|p| p.value.chars().filter(char::is_ascii_digit).collect()),
            address_tokens: self
                .address
                .as_ref()
                .map(|a| Normalizer::address_tokens(&a.value))
                .unwrap_or_default(),
        }
    }
}
