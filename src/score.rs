//! Pairwise similarity scoring.
//!
//! A pair score is a weighted sum of per-field similarities in `[0, 1]`.
//! Fields missing on either side do not punish the pair: their weight is
//! redistributed proportionally across the fields both sides carry, so a
//! sparse record can still reach the auto-merge threshold on the strength
//! of what it does have — without absent data ever counting as agreement.
//!
//! Scoring is pure and symmetric: the same pair always produces the same
//! score, in either argument order.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use strsim::jaro_winkler;

use crate::error::{PipelineError, ValidationError};
use crate::normalize::NormalizedRecord;
use crate::record::RecordId;

/// Name similarities below this are treated as zero; weak partial name
/// overlap is noise, not evidence.
pub const NAME_FLOOR: f64 = 0.6;

/// Fields that participate in pair scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchField {
    /// Normalized website host, exact match only.
    WebsiteDomain,
    /// Folded legal name, Jaro-Winkler similarity.
    LegalName,
    /// Digits-only phone, exact match only.
    Phone,
    /// Normalized address tokens, Jaccard overlap.
    Address,
}

impl MatchField {
    /// Returns a stable snake_case identifier for this field.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WebsiteDomain => "website_domain",
            Self::LegalName => "legal_name",
            Self::Phone => "phone",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scoring weights per field. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    /// Weight of the website-domain comparator.
    pub domain: f64,
    /// Weight of the legal-name comparator.
    pub legal_name: f64,
    /// Weight of the phone comparator.
    pub phone: f64,
    /// Weight of the address comparator.
    pub address: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            domain: 0.5,
            legal_name: 0.3,
            phone: 0.1,
            address: 0.1,
        }
    }
}

impl FieldWeights {
    /// Validates that every weight is non-negative and the total is 1.0.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidWeights` otherwise.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let weights = [self.domain, self.legal_name, self.phone, self.address];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ValidationError::InvalidWeights {
                reason: "weights must be finite and non-negative".to_string(),
            });
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(ValidationError::InvalidWeights {
                reason: format!("weights must sum to 1.0, got {sum}"),
            });
        }
        Ok(())
    }

    /// Raw (pre-redistribution) weight of one field.
    #[must_use]
    pub const fn weight_of(&self, field: MatchField) -> f64 {
        match field {
            MatchField::WebsiteDomain => self.domain,
            MatchField::LegalName => self.legal_name,
            MatchField::Phone => self.phone,
            MatchField::Address => self.address,
        }
    }
}

/// Comparison view of one side of a pair.
///
/// Both raw records and canonical-company representatives reduce to this
/// before scoring, so record-record and record-company comparisons share
/// one code path.
#[derive(Debug, Clone)]
pub struct MatchFields {
    /// Folded name key.
    pub name_key: String,
    /// Normalized domain, when known.
    pub domain_key: Option<String>,
    /// Digits-only phone, when known.
    pub phone_digits: Option<String>,
    /// Normalized address token set (empty when unknown).
    pub address_tokens: BTreeSet<String>,
}

impl MatchFields {
    /// Comparison view of a normalized record.
    #[must_use]
    pub fn of_record(record: &NormalizedRecord) -> Self {
        Self {
            name_key: record.key.name_key.clone(),
            domain_key: record.key.domain_key.clone(),
            phone_digits: record.phone_digits.clone(),
            address_tokens: record.address_tokens.clone(),
        }
    }
}

/// One field's share of a pair score.
///
/// `weight` is the redistributed weight actually applied (raw weight over
/// the sum of participating weights), so contributions always sum to the
/// final score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldContribution {
    /// Which field.
    pub field: MatchField,
    /// Raw comparator similarity in [0, 1].
    pub similarity: f64,
    /// Redistributed weight applied to this field.
    pub weight: f64,
    /// `similarity * weight`.
    pub weighted: f64,
}

/// The scored comparison of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    /// Final weighted score in [0, 1].
    pub score: f64,
    /// Per-field breakdown (participating fields only).
    pub contributions: Vec<FieldContribution>,
}

/// A scored edge between two records. Transient: edges live only for the
/// run that produced them (review entries carry their own copy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchEdge {
    /// First record (lower id).
    pub record_a: RecordId,
    /// Second record (higher id).
    pub record_b: RecordId,
    /// Final weighted score.
    pub score: f64,
    /// Per-field breakdown.
    pub contributions: Vec<FieldContribution>,
}

/// Jaccard overlap of two token sets. Empty-vs-anything is undefined and
/// never reaches here (the field only participates when both sides have
/// tokens).
fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    {
        intersection as f64 / union as f64
    }
}

/// Weighted multi-field pair scorer.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    weights: FieldWeights,
}

impl Scorer {
    /// Creates a scorer with validated weights.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidWeights` if the weights are
    /// malformed.
    pub fn new(weights: FieldWeights) -> Result<Self, ValidationError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    /// The weights in effect.
    #[must_use]
    pub const fn weights(&self) -> FieldWeights {
        self.weights
    }

    /// Scores one pair of comparison views.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Scoring` when a comparator produces a
    /// non-finite value; the caller skips that pair only.
    pub fn score_pair(
        &self,
        id_a: RecordId,
        id_b: RecordId,
        a: &MatchFields,
        b: &MatchFields,
    ) -> Result<PairScore, PipelineError> {
        let mut participating: Vec<(MatchField, f64)> = Vec::with_capacity(4);

        if let (Some(da), Some(db)) = (&a.domain_key, &b.domain_key) {
            let sim = if da == db { 1.0 } else { 0.0 };
            participating.push((MatchField::WebsiteDomain, sim));
        }

        if !a.name_key.is_empty() && !b.name_key.is_empty() {
            let raw = jaro_winkler(&a.name_key, &b.name_key);
            let sim = if raw < NAME_FLOOR { 0.0 } else { raw };
            participating.push((MatchField::LegalName, sim));
        }

        if let (Some(pa), Some(pb)) = (&a.phone_digits, &b.phone_digits) {
            let sim = if pa == pb { 1.0 } else { 0.0 };
            participating.push((MatchField::Phone, sim));
        }

        if !a.address_tokens.is_empty() && !b.address_tokens.is_empty() {
            participating.push((MatchField::Address, jaccard(&a.address_tokens, &b.address_tokens)));
        }

        let total_weight: f64 = participating
            .iter()
            .map(|(field, _)| self.weights.weight_of(*field))
            .sum();

        if total_weight <= 0.0 {
            return Ok(PairScore {
                score: 0.0,
                contributions: Vec::new(),
            });
        }

        let mut contributions = Vec::with_capacity(participating.len());
        let mut score = 0.0;
        for (field, similarity) in participating {
            let weight = self.weights.weight_of(field) / total_weight;
            let weighted = weight * similarity;
            score += weighted;
            contributions.push(FieldContribution {
                field,
                similarity,
                weight,
                weighted,
            });
        }

        if !score.is_finite() {
            return Err(PipelineError::Scoring {
                record_a: id_a,
                record_b: id_b,
                reason: "non-finite pair score".to_string(),
            });
        }

        Ok(PairScore {
            score: score.clamp(0.0, 1.0),
            contributions,
        })
    }

    /// Scores a record pair and wraps the result into an edge, endpoints
    /// ordered by record id.
    ///
    /// # Errors
    ///
    /// Propagates `PipelineError::Scoring` from [`Self::score_pair`].
    pub fn edge(
        &self,
        a: &NormalizedRecord,
        b: &NormalizedRecord,
    ) -> Result<MatchEdge, PipelineError> {
        let (first, second) = if a.record_id() <= b.record_id() {
            (a, b)
        } else {
            (b, a)
        };
        let pair = self.score_pair(
            first.record_id(),
            second.record_id(),
            &MatchFields::of_record(first),
            &MatchFields::of_record(second),
        )?;
        Ok(MatchEdge {
            record_a: first.record_id(),
            record_b: second.record_id(),
            score: pair.score,
            contributions: pair.contributions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Normalizer;
    use crate::record::{RawRecord, RecordFields, SourceType};
    use chrono::Utc;

    fn scorer() -> Scorer {
        Scorer::new(FieldWeights::default()).unwrap()
    }

    fn fields(
        name: &str,
        domain: Option<&str>,
        phone: Option<&str>,
        address_tokens: &[&str],
    ) -> MatchFields {
        MatchFields {
            name_key: name.to_string(),
            domain_key: domain.map(ToString::to_string),
            phone_digits: phone.map(ToString::to_string),
            address_tokens: address_tokens.iter().map(ToString::to_string).collect(),
        }
    }

    fn score(a: &MatchFields, b: &MatchFields) -> PairScore {
        scorer()
            .score_pair(RecordId::new(), RecordId::new(), a, b)
            .unwrap()
    }

    #[test]
    fn test_weights_default_sum_to_one() {
        FieldWeights::default().validate().unwrap();
    }

    #[test]
    fn test_weights_reject_bad_sum() {
        let weights = FieldWeights {
            domain: 0.5,
            legal_name: 0.5,
            phone: 0.5,
            address: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_weights_reject_negative() {
        let weights = FieldWeights {
            domain: 1.2,
            legal_name: -0.2,
            phone: 0.0,
            address: 0.0,
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_identical_domains_never_below_domain_share() {
        // Shared domain, hopeless names: the domain share survives.
        let a = fields("ACME YAZILIM", Some("acme.com"), None, &[]);
        let b = fields("TAMAMEN FARKLI", Some("acme.com"), None, &[]);
        let pair = score(&a, &b);
        // domain weight 0.5 of participating 0.8 → 0.625
        assert!(pair.score >= 0.5);
        assert!((pair.score - 0.625).abs() < 1e-9);
    }

    #[test]
    fn test_domain_and_identical_name_reach_auto_threshold() {
        let a = fields("ACME YAZILIM", Some("acme.com"), None, &[]);
        let b = fields("ACME YAZILIM", Some("acme.com"), None, &[]);
        let pair = score(&a, &b);
        assert!((pair.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_fields_redistribute_proportionally() {
        // Only name participates: its redistributed weight is 1.0.
        let a = fields("ACME YAZILIM", None, None, &[]);
        let b = fields("ACME YAZILIM", None, None, &[]);
        let pair = score(&a, &b);
        assert!((pair.score - 1.0).abs() < 1e-9);
        assert_eq!(pair.contributions.len(), 1);
        assert!((pair.contributions[0].weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_name_below_floor_scores_zero() {
        let a = fields("ACME YAZILIM", None, None, &[]);
        let b = fields("ZZZZZ METALURJI", None, None, &[]);
        let pair = score(&a, &b);
        assert!((pair.score - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_phone_exact_match_contributes() {
        let a = fields("ACME", None, Some("905361234567"), &[]);
        let b = fields("ACME", None, Some("905361234567"), &[]);
        let pair = score(&a, &b);
        // name 0.3 + phone 0.1 participate; both similarity 1.0
        assert!((pair.score - 1.0).abs() < 1e-9);
        assert_eq!(pair.contributions.len(), 2);
    }

    #[test]
    fn test_phone_mismatch_drags_score() {
        let a = fields("ACME", None, Some("905361234567"), &[]);
        let b = fields("ACME", None, Some("905309999999"), &[]);
        let pair = score(&a, &b);
        // name share 0.75 * 1.0 + phone share 0.25 * 0.0
        assert!((pair.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_address_jaccard_overlap() {
        let a = fields("ACME", None, None, &["bagdat", "caddesi", "42"]);
        let b = fields("ACME", None, None, &["bagdat", "caddesi", "7"]);
        let pair = score(&a, &b);
        let address = pair
            .contributions
            .iter()
            .find(|c| c.field == MatchField::Address)
            .unwrap();
        assert!((address.similarity - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_contributions_sum_to_score() {
        let a = fields(
            "ACME YAZILIM",
            Some("acme.com"),
            Some("905361234567"),
            &["bagdat", "caddesi"],
        );
        let b = fields(
            "ACME YAZILIM TICARET",
            Some("acme.com"),
            Some("905361234567"),
            &["bagdat", "caddesi", "42"],
        );
        let pair = score(&a, &b);
        let sum: f64 = pair.contributions.iter().map(|c| c.weighted).sum();
        assert!((pair.score - sum).abs() < 1e-9);
    }

    #[test]
    fn test_scoring_is_symmetric() {
        let a = fields("ACME YAZILIM", Some("acme.com"), None, &["bagdat"]);
        let b = fields("ACME BILISIM", Some("acme.net"), None, &["bagdat", "42"]);
        let ab = score(&a, &b);
        let ba = score(&b, &a);
        assert!((ab.score - ba.score).abs() < 1e-12);
    }

    #[test]
    fn test_same_company_spellings_auto_merge_after_normalization() {
        let normalizer = Normalizer::new().unwrap();
        let scorer = scorer();

        let r1 = normalizer
            .normalize(RawRecord::new(
                SourceType::GoogleSearch,
                "ref-1",
                Utc::now(),
                "v1",
                RecordFields {
                    legal_name: Some("ACME YAZILIM".to_string()),
                    city: Some("Istanbul".to_string()),
                    website: Some("acme.com".to_string()),
                    ..RecordFields::default()
                },
            ))
            .unwrap();
        let r2 = normalizer
            .normalize(RawRecord::new(
                SourceType::TradeRegistry,
                "ref-2",
                Utc::now(),
                "v1",
                RecordFields {
                    legal_name: Some("Acme Yazilim A.S.".to_string()),
                    city: Some("İstanbul".to_string()),
                    website: Some("https://www.acme.com".to_string()),
                    ..RecordFields::default()
                },
            ))
            .unwrap();

        let edge = scorer.edge(&r1, &r2).unwrap();
        assert!(edge.score >= 0.95, "score was {}", edge.score);
    }

    #[test]
    fn test_city_only_pair_never_reaches_review_band() {
        let normalizer = Normalizer::new().unwrap();
        let scorer = scorer();

        let r1 = normalizer
            .normalize(RawRecord::new(
                SourceType::GooglePlaces,
                "ref-1",
                Utc::now(),
                "v1",
                RecordFields {
                    legal_name: Some("Anadolu Lokantası".to_string()),
                    city: Some("Ankara".to_string()),
                    ..RecordFields::default()
                },
            ))
            .unwrap();
        let r2 = normalizer
            .normalize(RawRecord::new(
                SourceType::GooglePlaces,
                "ref-2",
                Utc::now(),
                "v1",
                RecordFields {
                    legal_name: Some("Zirve Nakliyat".to_string()),
                    city: Some("Ankara".to_string()),
                    ..RecordFields::default()
                },
            ))
            .unwrap();

        let edge = scorer.edge(&r1, &r2).unwrap();
        assert!(edge.score < 0.85, "score was {}", edge.score);
    }

    #[test]
    fn test_edge_orders_endpoints_by_record_id() {
        let normalizer = Normalizer::new().unwrap();
        let make = |name: &str| {
            normalizer
                .normalize(RawRecord::new(
                    SourceType::Website,
                    "ref",
                    Utc::now(),
                    "v1",
                    RecordFields {
                        legal_name: Some(name.to_string()),
                        city: Some("Bursa".to_string()),
                        ..RecordFields::default()
                    },
                ))
                .unwrap()
        };
        let a = make("Kaya Tekstil");
        let b = make("Kaya Tekstil Sanayi");
        let edge = scorer().edge(&a, &b).unwrap();
        assert!(edge.record_a <= edge.record_b);
        let flipped = scorer().edge(&b, &a).unwrap();
        assert_eq!(edge.record_a, flipped.record_a);
        assert!((edge.score - flipped.score).abs() < 1e-12);
    }
}
