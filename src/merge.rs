//! Merge/provenance builder.
//!
//! Folds a cluster of member records into one canonical company document.
//! Scalar conflicts go to the most recently fetched member (record-id
//! order breaks exact timestamp ties); losing values survive as
//! alternates with their own lineage. Aggregate fields union: emails
//! deduplicate and sort, keywords rank by frequency across members and
//! get capped.
//!
//! Rebuilding is deterministic: the same member set always produces the
//! same document, byte for byte. Timestamps derive from member fetch
//! times, never the wall clock, so replays after a crash converge.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};

use crate::block::BlockKey;
use crate::company::{
    Alternate, CanonicalCompany, CanonicalValue, CompanyId, Provenance,
};
use crate::error::ValidationError;
use crate::normalize::{NormalizedRecord, Normalizer};
use crate::record::RecordId;

/// Ordering key for "most recent wins": fetch time first, record id as
/// the deterministic tie-break.
fn recency(p: &Provenance) -> (DateTime<Utc>, RecordId) {
    (p.fetch_ts, p.record_id)
}

fn provenance_of(record: &NormalizedRecord) -> Provenance {
    Provenance {
        record_id: record.record_id(),
        source: record.record.source,
        fetch_ts: record.record.fetch_ts,
    }
}

/// Offers `candidate` to the slot, keeping whichever side is newer and
/// demoting the other to an alternate.
fn fold_scalar<T: Clone + PartialEq>(
    slot: &mut Option<CanonicalValue<T>>,
    candidate: Option<(T, Provenance)>,
    max_alternates: usize,
) {
    let Some((value, provenance)) = candidate else {
        return;
    };
    match slot {
        None => *slot = Some(CanonicalValue::new(value, provenance)),
        Some(current) => {
            fold_present(current, value, provenance, max_alternates);
        }
    }
}

/// Same contest for a slot that always holds a value (the legal name).
/// Returns true when the candidate won.
fn fold_present<T: Clone + PartialEq>(
    current: &mut CanonicalValue<T>,
    value: T,
    provenance: Provenance,
    max_alternates: usize,
) -> bool {
    if current.value == value {
        // Same value from a newer fetch refreshes the provenance.
        if recency(&provenance) > recency(&current.chosen_from) {
            current.chosen_from = provenance;
            return true;
        }
        return false;
    }
    if recency(&provenance) > recency(&current.chosen_from) {
        let demoted = Alternate {
            value: std::mem::replace(&mut current.value, value),
            provenance: std::mem::replace(&mut current.chosen_from, provenance),
        };
        push_alternate(current, demoted, max_alternates);
        true
    } else {
        push_alternate(current, Alternate { value, provenance }, max_alternates);
        false
    }
}

/// Inserts an alternate, keeping the list distinct by value, ordered
/// newest first, and capped.
fn push_alternate<T: Clone + PartialEq>(
    current: &mut CanonicalValue<T>,
    alternate: Alternate<T>,
    max_alternates: usize,
) {
    if alternate.value == current.value {
        return;
    }
    if let Some(existing) = current
        .alternates
        .iter_mut()
        .find(|a| a.value == alternate.value)
    {
        if recency(&alternate.provenance) > recency(&existing.provenance) {
            existing.provenance = alternate.provenance;
        }
    } else {
        current.alternates.push(alternate);
    }
    current
        .alternates
        .sort_by(|a, b| recency(&b.provenance).cmp(&recency(&a.provenance)));
    current.alternates.truncate(max_alternates);
}

/// Ranks keywords by frequency, ties broken lexicographically, capped.
fn rank_keywords(counts: &BTreeMap<String, u64>, cap: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, u64)> = counts.iter().map(|(k, c)| (k, *c)).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(cap).map(|(k, _)| k.clone()).collect()
}

/// Blocking keys a canonical document answers to during incremental runs.
fn block_keys_of(
    name_key: &str,
    city: Option<&str>,
    domain: Option<&str>,
) -> Vec<BlockKey> {
    let mut keys = Vec::with_capacity(2);
    if let Some(domain) = domain {
        keys.push(BlockKey::domain(domain));
    }
    if let Some(city) = city {
        keys.push(BlockKey::name_city(
            name_key,
            Normalizer::city_key_folded(city),
        ));
    }
    keys
}

/// Builds and rebuilds canonical company documents.
#[derive(Debug, Clone, Copy)]
pub struct MergeBuilder {
    keyword_cap: usize,
    max_alternates: usize,
}

impl MergeBuilder {
    /// Creates a builder with the configured caps.
    #[must_use]
    pub const fn new(keyword_cap: usize, max_alternates: usize) -> Self {
        Self {
            keyword_cap,
            max_alternates,
        }
    }

    /// Builds a fresh company from a cluster of member records.
    ///
    /// The founding member is the earliest-fetched record (every
    /// normalized record qualifies; the normalizer guarantees a name plus
    /// city or domain), and the company id derives from its identity.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` on an empty cluster.
    pub fn build_new(
        &self,
        members: &[NormalizedRecord],
    ) -> Result<CanonicalCompany, ValidationError> {
        let founding = members
            .iter()
            .min_by_key(|r| (r.record.fetch_ts, r.record_id()))
            .ok_or_else(|| ValidationError::EmptyField {
                field: "members".to_string(),
            })?;
        let company_id = CompanyId::derive(&founding.identity_string());

        let seed = CanonicalCompany {
            company_id,
            legal_name: CanonicalValue::new(
                founding.display_name.clone(),
                provenance_of(founding),
            ),
            name_key: founding.key.name_key.clone(),
            city: None,
            website_domain: None,
            phone: None,
            address: None,
            company_kind: None,
            rating: None,
            reviews_count: None,
            emails: Vec::new(),
            keywords: Vec::new(),
            member_record_ids: Vec::new(),
            data_sources: BTreeSet::new(),
            first_seen: founding.record.fetch_ts,
            last_updated: founding.record.fetch_ts,
            suppressed: false,
            block_keys: Vec::new(),
        };

        Ok(self.fold_into(seed, members))
    }

    /// Folds new member records into an existing document, keeping its
    /// id. Idempotent for an already-absorbed member.
    #[must_use]
    pub fn fold_into(
        &self,
        mut company: CanonicalCompany,
        new_members: &[NormalizedRecord],
    ) -> CanonicalCompany {
        // Ascending recency so the newest candidate ends up chosen and
        // alternates accumulate oldest-last deterministically.
        let mut ordered: Vec<&NormalizedRecord> = new_members.iter().collect();
        ordered.sort_by_key(|r| (r.record.fetch_ts, r.record_id()));

        let mut keyword_counts: BTreeMap<String, u64> = BTreeMap::new();
        for keyword in &company.keywords {
            *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
        }
        let mut emails: BTreeSet<String> = company.emails.iter().cloned().collect();

        for record in ordered {
            let p = provenance_of(record);

            // Name folds as display + key in lockstep.
            let name_won = fold_present(
                &mut company.legal_name,
                record.display_name.clone(),
                p.clone(),
                self.max_alternates,
            );
            if name_won {
                company.name_key = record.key.name_key.clone();
            }

            fold_scalar(
                &mut company.city,
                record.city_display.clone().map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.website_domain,
                record.key.domain_key.clone().map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.phone,
                record.phone_e164.clone().map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.address,
                record.address.clone().map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.company_kind,
                record.company_kind.map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.rating,
                record.record.fields.rating.map(|v| (v, p.clone())),
                self.max_alternates,
            );
            fold_scalar(
                &mut company.reviews_count,
                record.record.fields.reviews_count.map(|v| (v, p.clone())),
                self.max_alternates,
            );

            for email in &record.emails {
                emails.insert(email.clone());
            }
            for keyword in &record.keywords {
                *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
            }

            if company
                .member_record_ids
                .binary_search(&record.record_id())
                .is_err()
            {
                company.member_record_ids.push(record.record_id());
                company.member_record_ids.sort_unstable();
            }
            company.data_sources.insert(record.record.source);
            company.first_seen = company.first_seen.min(record.record.fetch_ts);
            company.last_updated = company.last_updated.max(record.record.fetch_ts);
        }

        company.emails = emails.into_iter().collect();
        company.keywords = rank_keywords(&keyword_counts, self.keyword_cap);
        company.block_keys = block_keys_of(
            &company.name_key,
            company.city.as_ref().map(|c| c.value.as_str()),
            company.website_domain.as_ref().map(|d| d.value.as_str()),
        );
        company
    }

    /// Absorbs `losers` into `winner`, keeping the winner's id. Scalar
    /// conflicts between documents resolve by chosen-value recency, same
    /// as member-level folding.
    #[must_use]
    pub fn merge_companies(
        &self,
        mut winner: CanonicalCompany,
        losers: Vec<CanonicalCompany>,
    ) -> CanonicalCompany {
        let mut keyword_counts: BTreeMap<String, u64> = BTreeMap::new();
        for keyword in &winner.keywords {
            *keyword_counts.entry(keyword.clone()).or_insert(0) += 1;
        }
        let mut emails: BTreeSet<String> = winner.emails.iter().cloned().collect();

        for loser in losers {
            let name_won = fold_present(
                &mut winner.legal_name,
                loser.legal_name.value.clone(),
                loser.legal_name.chosen_from.clone(),
                self.max_alternates,
            );
            if name_won {
                winner.name_key = loser.name_key.clone();
            }
            for alternate in loser.legal_name.alternates {
                push_alternate(&mut winner.legal_name, alternate, self.max_alternates);
            }

            Self::merge_slot(&mut winner.city, loser.city, self.max_alternates);
            Self::merge_slot(
                &mut winner.website_domain,
                loser.website_domain,
                self.max_alternates,
            );
            Self::merge_slot(&mut winner.phone, loser.phone, self.max_alternates);
            Self::merge_slot(&mut winner.address, loser.address, self.max_alternates);
            Self::merge_slot(
                &mut winner.company_kind,
                loser.company_kind,
                self.max_alternates,
            );
            Self::merge_slot(&mut winner.rating, loser.rating, self.max_alternates);
            Self::merge_slot(
                &mut winner.reviews_count,
                loser.reviews_count,
                self.max_alternates,
            );

            for email in loser.emails {
                emails.insert(email);
            }
            for keyword in loser.keywords {
                *keyword_counts.entry(keyword).or_insert(0) += 1;
            }
            for member in loser.member_record_ids {
                if winner.member_record_ids.binary_search(&member).is_err() {
                    winner.member_record_ids.push(member);
                }
            }
            winner.member_record_ids.sort_unstable();
            winner.data_sources.extend(loser.data_sources);
            winner.first_seen = winner.first_seen.min(loser.first_seen);
            winner.last_updated = winner.last_updated.max(loser.last_updated);
        }

        winner.emails = emails.into_iter().collect();
        winner.keywords = rank_keywords(&keyword_counts, self.keyword_cap);
        winner.block_keys = block_keys_of(
            &winner.name_key,
            winner.city.as_ref().map(|c| c.value.as_str()),
            winner.website_domain.as_ref().map(|d| d.value.as_str()),
        );
        winner
    }

    fn merge_slot<T: Clone + PartialEq>(
        slot: &mut Option<CanonicalValue<T>>,
        incoming: Option<CanonicalValue<T>>,
        max_alternates: usize,
    ) {
        let Some(incoming) = incoming else { return };
        fold_scalar(
            slot,
            Some((incoming.value, incoming.chosen_from)),
            max_alternates,
        );
        if let Some(current) = slot {
            for alternate in incoming.alternates {
                push_alternate(current, alternate, max_alternates);
            }
        }
    }

    /// Strips the detached members' scalar contributions, promoting the
    /// newest surviving alternate where the chosen value came from a
    /// detached record. Aggregate fields carry no per-value lineage and
    /// are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` when no member set or legal
    /// name would survive the split.
    pub fn remove_members(
        &self,
        mut company: CanonicalCompany,
        detach: &HashSet<RecordId>,
        normalizer: &Normalizer,
    ) -> Result<CanonicalCompany, ValidationError> {
        company.member_record_ids.retain(|id| !detach.contains(id));
        if company.member_record_ids.is_empty() {
            return Err(ValidationError::EmptyField {
                field: "member_record_ids".to_string(),
            });
        }

        let name_slot = Self::strip_slot(Some(company.legal_name), detach);
        let Some(legal_name) = name_slot else {
            return Err(ValidationError::EmptyField {
                field: "legal_name".to_string(),
            });
        };
        company.name_key = normalizer.fold_name_key(&legal_name.value);
        company.legal_name = legal_name;

        company.city = Self::strip_slot(company.city, detach);
        company.website_domain = Self::strip_slot(company.website_domain, detach);
        company.phone = Self::strip_slot(company.phone, detach);
        company.address = Self::strip_slot(company.address, detach);
        company.company_kind = Self::strip_slot(company.company_kind, detach);
        company.rating = Self::strip_slot(company.rating, detach);
        company.reviews_count = Self::strip_slot(company.reviews_count, detach);

        company.block_keys = block_keys_of(
            &company.name_key,
            company.city.as_ref().map(|c| c.value.as_str()),
            company.website_domain.as_ref().map(|d| d.value.as_str()),
        );
        Ok(company)
    }

    fn strip_slot<T: Clone + PartialEq>(
        slot: Option<CanonicalValue<T>>,
        detach: &HashSet<RecordId>,
    ) -> Option<CanonicalValue<T>> {
        let mut slot = slot?;
        slot.alternates
            .retain(|a| !detach.contains(&a.provenance.record_id));
        if !detach.contains(&slot.chosen_from.record_id) {
            return Some(slot);
        }
        // Promote the newest surviving alternate.
        if slot.alternates.is_empty() {
            return None;
        }
        let promoted = slot.alternates.remove(0);
        Some(CanonicalValue {
            value: promoted.value,
            chosen_from: promoted.provenance,
            alternates: slot.alternates,
        })
    }
}
