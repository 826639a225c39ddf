//! Raw record types and provenance.
//!
//! A raw record is one observation of a company from one source at one
//! point in time. Records are immutable once ingested: the engine never
//! edits an observation, it only re-derives canonical state from the set
//! of member records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique, stable raw-record identifier.
///
/// Once assigned at ingestion, a `RecordId` never changes. Canonical
/// companies reference their members by these ids.
///
/// # Examples
///
/// ```
/// use kanon::RecordId;
///
/// let id = RecordId::new();
/// assert!(!id.is_nil());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Creates a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a record ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true if this is a nil (all zeros) UUID.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Creates a nil record ID (for testing or sentinel values).
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RecordId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<RecordId> for Uuid {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

/// Where a record was collected from.
///
/// Source kinds drive provenance display and the `data_sources` union on
/// canonical companies. They deliberately mirror the upstream collectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Organic search result scrape.
    GoogleSearch,
    /// Places / maps listing.
    GooglePlaces,
    /// LinkedIn company page.
    Linkedin,
    /// Instagram business profile.
    Instagram,
    /// Facebook page.
    Facebook,
    /// Twitter/X profile.
    Twitter,
    /// The company's own website.
    Website,
    /// WHOIS registration data.
    Whois,
    /// Official trade-registry extract.
    TradeRegistry,
    /// Hand-entered by an operator.
    Manual,
}

impl SourceType {
    /// Returns a stable snake_case identifier for this source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoogleSearch => "google_search",
            Self::GooglePlaces => "google_places",
            Self::Linkedin => "linkedin",
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::Website => "website",
            Self::Whois => "whois",
            Self::TradeRegistry => "trade_registry",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content fingerprint of a record's observed payload.
///
/// Two observations with identical source, source reference, and field
/// values produce the same fingerprint even when their record ids and
/// fetch timestamps differ. The run state uses this to skip re-ingesting
/// byte-identical re-observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the digest as a lowercase hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut out = String::with_capacity(64);
        for byte in self.0 {
            use fmt::Write;
            // Writing to a String cannot fail.
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The observed field values of a raw record.
///
/// Every field is optional; the normalizer decides whether the record
/// carries enough identity signal to participate in matching at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    /// Legal or trading name as observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,

    /// City as observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Website URL as observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    /// Phone number as observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Street address as observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Declared legal form, when the source states one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_type: Option<String>,

    /// Aggregate rating (e.g. places listing), when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    /// Review count backing the rating, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_count: Option<u64>,

    /// Contact emails as observed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emails: Vec<String>,

    /// Descriptive keywords as observed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
}

/// One immutable observation of a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Unique identifier assigned at ingestion.
    pub record_id: RecordId,

    /// Which collector produced this record.
    pub source: SourceType,

    /// Source URL or upstream external id.
    pub source_ref: String,

    /// When the observation was fetched.
    pub fetch_ts: DateTime<Utc>,

    /// Version of the parser that extracted the fields.
    pub parser_version: String,

    /// Observed field values.
    pub fields: RecordFields,
}

impl RawRecord {
    /// Creates a record with a fresh random id.
    #[must_use]
    pub fn new(
        source: SourceType,
        source_ref: impl Into<String>,
        fetch_ts: DateTime<Utc>,
        parser_version: impl Into<String>,
        fields: RecordFields,
    ) -> Self {
        Self {
            record_id: RecordId::new(),
            source,
            source_ref: source_ref.into(),
            fetch_ts,
            parser_version: parser_version.into(),
            fields,
        }
    }

    /// Creates a record with a caller-supplied id (replays, fixtures).
    #[must_use]
    pub fn with_id(
        record_id: RecordId,
        source: SourceType,
        source_ref: impl Into<String>,
        fetch_ts: DateTime<Utc>,
        parser_version: impl Into<String>,
        fields: RecordFields,
    ) -> Self {
        Self {
            record_id,
            source,
            source_ref: source_ref.into(),
            fetch_ts,
            parser_version: parser_version.into(),
            fields,
        }
    }

    /// Computes the content fingerprint of this observation.
    ///
    /// The digest covers the source, the source reference, and every
    /// observed field value, but not the record id or fetch timestamp:
    /// re-fetching unchanged content yields the same fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();

        let mut part = |tag: &str, value: &str| {
            hasher.update(tag.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(value.as_bytes());
            hasher.update(b"\x1e");
        };

        part("source", self.source.as_str());
        part("source_ref", &self.source_ref);

        let f = &self.fields;
        if let Some(v) = &f.legal_name {
            part("legal_name", v);
        }
        if let Some(v) = &f.city {
            part("city", v);
        }
        if let Some(v) = &f.website {
            part("website", v);
        }
        if let Some(v) = &f.phone {
            part("phone", v);
        }
        if let Some(v) = &f.address {
            part("address", v);
        }
        if let Some(v) = &f.company_type {
            part("company_type", v);
        }
        if let Some(v) = f.rating {
            part("rating", &format!("{:016x}", v.to_bits()));
        }
        if let Some(v) = f.reviews_count {
            part("reviews_count", &v.to_string());
        }
        for email in &f.emails {
            part("email", email);
        }
        for keyword in &f.keywords {
            part("keyword", keyword);
        }

        Fingerprint(*hasher.finalize().as_bytes())
    }
}
