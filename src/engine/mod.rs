//! Resolution engine.
//!
//! Turns batches of raw records into canonical companies: normalize,
//! block, score, cluster, merge, commit. The engine owns the decision
//! logic and writes through five pluggable seams — company store, run
//! state, suppression store, review queue, audit log — so backends can
//! vary without touching resolution semantics.
//!
//! Commit discipline: upserts are idempotent and keyed by company id,
//! fingerprints are recorded only at commit, and the high-water mark
//! advances only when nothing was held back. A corrupted cluster state
//! aborts the run before anything is written. Re-running a batch after
//! a crash therefore converges instead of duplicating companies.

pub(crate) mod workers;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::block::Blocker;
use crate::cluster::{ClusterNode, ClusterSet};
use crate::company::{CanonicalCompany, CompanyId};
use crate::config::EngineConfig;
use crate::error::{KanonError, KanonResult, PipelineError, SuppressionError, ValidationError};
use crate::merge::MergeBuilder;
use crate::normalize::{NormalizedRecord, Normalizer};
use crate::record::{RawRecord, RecordId};
use crate::review::{ReviewDecision, ReviewEntry, ReviewQueue, ReviewRouter, ReviewSide};
use crate::score::Scorer;
use crate::storage::{CompanyStore, RunStateStore, StorageError};
use crate::suppress::{SuppressionStatus, SuppressionStore};

use workers::{score_groups, GroupTask, Thresholds};

/// What a retraction request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetractionAction {
    /// Remove the company document outright, keeping member exclusions.
    Delete,
    /// Withhold the company and exclude its members from future merges.
    Suppress,
    /// Explicitly lift a suppression.
    Restore,
}

/// A retraction (right-to-be-forgotten) request from the compliance
/// surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetractionRequest {
    /// What to do.
    pub action: RetractionAction,
    /// The company acted on.
    pub company_id: CompanyId,
    /// Who asked (ticket reference, operator id).
    pub requester_ref: String,
}

/// Result of applying a retraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetractionOutcome {
    /// The surviving company id the request resolved to.
    pub company_id: CompanyId,
    /// The action applied.
    pub action: RetractionAction,
    /// False when the company was already in the requested state.
    pub changed: bool,
}

/// Result of applying a reviewer's decision.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    /// The two sides were merged under this id.
    Merged {
        /// The surviving company.
        company_id: CompanyId,
    },
    /// Both sides already resolved to the same company.
    AlreadyMerged {
        /// That company.
        company_id: CompanyId,
    },
    /// The pair was dismissed; nothing changed.
    Rejected,
}

/// Result of a manual split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    /// The company the members were detached from.
    pub original: CompanyId,
    /// The fresh company holding the detached members.
    pub detached: CompanyId,
}

/// Counters and state from one `run_batch` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Records handed to the run.
    pub received: usize,
    /// Records at or below the high-water mark.
    pub skipped_high_water: usize,
    /// Records whose content fingerprint was already committed.
    pub skipped_duplicate: usize,
    /// Records excluded by a prior suppression or deletion.
    pub skipped_excluded: usize,
    /// Records rejected for carrying no identity signal.
    pub invalid: usize,
    /// Candidate groups after blocking.
    pub groups: usize,
    /// Oversized groups that had to be split.
    pub overflow_splits: u64,
    /// Pairs scored across all groups.
    pub pairs_scored: u64,
    /// Pairs skipped after a comparator failure.
    pub scoring_errors: u64,
    /// Edges accepted at or above the auto-merge threshold.
    pub auto_merges: u64,
    /// Entries emitted toward the review queue.
    pub review_entries: u64,
    /// Canonical documents written.
    pub upserts: u64,
    /// Companies created this run.
    pub new_companies: u64,
    /// Clusters that hit a suppressed identity.
    pub suppressed_hits: u64,
    /// Records or clusters held back pending a confirmed suppression
    /// answer.
    pub held_back: u64,
    /// The high-water mark after the run.
    pub high_water_mark: Option<DateTime<Utc>>,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

/// Outcome of the suppression gate for one target company.
enum Gate {
    Active,
    Suppressed,
    Unconfirmed,
}

const ENGINE_ACTOR: &str = "engine";

/// The entity-resolution engine.
///
/// One `run_batch` at a time per engine; callers serialize batches.
/// Review decisions, retractions, and splits may interleave between
/// runs.
pub struct ResolutionEngine {
    companies: Arc<dyn CompanyStore>,
    run_state: Arc<dyn RunStateStore>,
    suppression: Arc<dyn SuppressionStore>,
    review: ReviewRouter,
    audit: Arc<dyn AuditLog>,
    normalizer: Normalizer,
    scorer: Scorer,
    blocker: Blocker,
    merger: MergeBuilder,
    config: EngineConfig,
}

impl ResolutionEngine {
    /// Builds an engine over the five collaborator seams.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the config or its weights are
    /// malformed.
    pub fn new(
        companies: Arc<dyn CompanyStore>,
        run_state: Arc<dyn RunStateStore>,
        suppression: Arc<dyn SuppressionStore>,
        review_queue: Arc<dyn ReviewQueue>,
        audit: Arc<dyn AuditLog>,
        config: EngineConfig,
    ) -> KanonResult<Self> {
        config.validate()?;
        let normalizer = Normalizer::new()?;
        let scorer = Scorer::new(config.weights)?;
        let blocker = Blocker::new(config.max_block_size);
        let merger = MergeBuilder::new(config.keyword_cap, config.max_alternates);
        let review = ReviewRouter::new(
            review_queue,
            config.review_buffer_capacity,
            config.review_timeout(),
        );
        Ok(Self {
            companies,
            run_state,
            suppression,
            review,
            audit,
            normalizer,
            scorer,
            blocker,
            merger,
            config,
        })
    }

    /// The configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Review entries currently parked because the queue was down.
    #[must_use]
    pub fn review_pending(&self) -> usize {
        self.review.pending()
    }

    fn storage_err(err: StorageError) -> KanonError {
        KanonError::Pipeline(PipelineError::Storage {
            message: err.to_string(),
        })
    }

    /// Resolves one bounded increment of new records.
    ///
    /// Records at or below the high-water mark, re-observations with a
    /// known fingerprint, and excluded records are skipped. Invalid
    /// records are counted and never block the batch. See the module
    /// docs for the commit discipline.
    ///
    /// # Errors
    ///
    /// Cluster corruption aborts before any commit; storage failures
    /// surface as pipeline errors. Collaborator outages (suppression
    /// store, review queue) degrade the run instead of failing it.
    pub fn run_batch(&self, records: Vec<RawRecord>) -> KanonResult<BatchReport> {
        let started = Instant::now();
        let mut report = BatchReport {
            received: records.len(),
            ..BatchReport::default()
        };
        info!(received = records.len(), "starting resolution run");

        let flushed = self.review.flush_pending();
        if flushed > 0 {
            info!(flushed, "delivered buffered review entries");
        }

        let high_water = self.run_state.high_water_mark().map_err(Self::storage_err)?;

        // Intake: high-water mark, duplicate fingerprints, exclusions,
        // then normalization.
        let mut normalized: Vec<NormalizedRecord> = Vec::with_capacity(records.len());
        let mut max_seen_ts: Option<DateTime<Utc>> = None;
        for record in records {
            if high_water.is_some_and(|mark| record.fetch_ts <= mark) {
                report.skipped_high_water += 1;
                continue;
            }
            max_seen_ts = Some(max_seen_ts.map_or(record.fetch_ts, |t| t.max(record.fetch_ts)));

            if self
                .run_state
                .seen_fingerprint(&record.fingerprint())
                .map_err(Self::storage_err)?
                .is_some()
            {
                report.skipped_duplicate += 1;
                continue;
            }

            match self.suppression.is_record_excluded(record.record_id) {
                Ok(true) => {
                    report.skipped_excluded += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => {
                    // Fail closed: without a confirmed answer this record
                    // must not commit, and the mark must not advance past
                    // it.
                    warn!(
                        error = %err,
                        record = %record.record_id,
                        "exclusion check failed, holding record back"
                    );
                    report.held_back += 1;
                    continue;
                }
            }

            match self.normalizer.normalize(record) {
                Ok(rec) => normalized.push(rec),
                Err(err) => {
                    warn!(error = %err, "skipping invalid record");
                    report.invalid += 1;
                }
            }
        }

        let records_by_id: BTreeMap<RecordId, NormalizedRecord> = normalized
            .iter()
            .map(|r| (r.record_id(), r.clone()))
            .collect();

        // Block, attach representatives, score.
        let blocked = self.blocker.group(normalized);
        report.groups = blocked.groups.len();
        report.overflow_splits = blocked.overflow_splits;

        let mut tasks = Vec::with_capacity(blocked.groups.len());
        for group in blocked.groups {
            let representatives = self
                .companies
                .find_by_block(&group.key)
                .map_err(Self::storage_err)?
                .into_iter()
                .filter(|company| !company.suppressed)
                .collect();
            tasks.push(GroupTask {
                group,
                representatives,
            });
        }

        let thresholds = Thresholds {
            auto_merge: self.config.auto_merge_threshold,
            review: self.config.review_threshold,
        };
        let outcomes = score_groups(tasks, self.scorer, thresholds, self.config.group_workers)?;

        // Reconciliation: fold per-group edges into one partition.
        let mut clusters = ClusterSet::new();
        for record_id in records_by_id.keys() {
            clusters.intern(ClusterNode::Record(*record_id));
        }
        let mut review_entries: Vec<ReviewEntry> = Vec::new();
        for outcome in outcomes {
            report.pairs_scored += outcome.pairs_scored;
            report.scoring_errors += outcome.scoring_errors;
            for (a, b) in outcome.auto_edges {
                clusters.union(a, b)?;
                report.auto_merges += 1;
            }
            review_entries.extend(outcome.review_entries);
        }
        // A corrupted partition aborts here, before any commit.
        let partition = clusters.clusters()?;

        for members in partition {
            self.commit_cluster(&members, &records_by_id, &mut report)?;
        }

        for entry in review_entries {
            self.review.dispatch(entry);
            report.review_entries += 1;
        }

        if report.held_back == 0 {
            if let Some(ts) = max_seen_ts {
                self.run_state
                    .advance_high_water_mark(ts)
                    .map_err(Self::storage_err)?;
            }
        } else {
            warn!(
                held_back = report.held_back,
                "work held back, high-water mark not advanced"
            );
        }
        report.high_water_mark = self.run_state.high_water_mark().map_err(Self::storage_err)?;
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        info!(
            upserts = report.upserts,
            new_companies = report.new_companies,
            auto_merges = report.auto_merges,
            review_entries = report.review_entries,
            invalid = report.invalid,
            "resolution run finished"
        );
        Ok(report)
    }

    /// Commits one cluster: resolve its target company, gate on
    /// suppression, merge, upsert, audit.
    fn commit_cluster(
        &self,
        members: &[ClusterNode],
        records_by_id: &BTreeMap<RecordId, NormalizedRecord>,
        report: &mut BatchReport,
    ) -> KanonResult<()> {
        let mut record_ids: Vec<RecordId> = Vec::new();
        let mut company_ids: Vec<CompanyId> = Vec::new();
        for node in members {
            match node {
                ClusterNode::Record(id) => record_ids.push(*id),
                ClusterNode::Company(id) => company_ids.push(*id),
            }
        }
        if record_ids.is_empty() {
            return Ok(());
        }
        let new_members: Vec<NormalizedRecord> = record_ids
            .iter()
            .filter_map(|id| records_by_id.get(id).cloned())
            .collect();

        let mut existing = self
            .companies
            .get_many(&company_ids)
            .map_err(Self::storage_err)?;
        existing.sort_by_key(|c| (c.first_seen, c.company_id));

        if existing.is_empty() {
            let fresh = self.merger.build_new(&new_members)?;
            // The derived id may belong to an earlier incarnation of the
            // same identity: a replay after a crash, a suppressed company
            // this batch must not resurrect, or a live namesake.
            let prior = self
                .companies
                .get(fresh.company_id)
                .map_err(Self::storage_err)?;
            let target_id = prior.as_ref().map_or(fresh.company_id, |p| p.company_id);

            match self.confirm_active(target_id, prior.as_ref()) {
                Gate::Active => match prior {
                    None => self.finish_commit(fresh, &new_members, true, None, report)?,
                    Some(previous)
                        if new_members
                            .iter()
                            .all(|m| previous.is_member(m.record_id())) =>
                    {
                        // Replay of an interrupted commit; folding the
                        // same members back in is idempotent.
                        let doc = self.merger.fold_into(previous, &new_members);
                        self.finish_commit(doc, &new_members, false, None, report)?;
                    }
                    Some(previous) => {
                        self.commit_namesake(fresh, &previous, &new_members, report)?;
                    }
                },
                Gate::Suppressed => self.suppressed_hit(target_id, &new_members, report),
                Gate::Unconfirmed => report.held_back += 1,
            }
        } else {
            let winner = existing.remove(0);
            let losers = existing;
            match self.confirm_active(winner.company_id, Some(&winner)) {
                Gate::Active => {
                    let mut absorbed: Vec<CompanyId> = Vec::new();
                    for loser in &losers {
                        self.companies
                            .mark_merged(loser.company_id, winner.company_id)
                            .map_err(Self::storage_err)?;
                        absorbed.push(loser.company_id);
                    }
                    let doc = if losers.is_empty() {
                        winner
                    } else {
                        self.merger.merge_companies(winner, losers)
                    };
                    let doc = self.merger.fold_into(doc, &new_members);
                    let details = if absorbed.is_empty() {
                        None
                    } else {
                        Some(format!(
                            "absorbed companies: {}",
                            absorbed
                                .iter()
                                .map(ToString::to_string)
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    };
                    self.finish_commit(doc, &new_members, false, details, report)?;
                }
                Gate::Suppressed => self.suppressed_hit(winner.company_id, &new_members, report),
                Gate::Unconfirmed => report.held_back += 1,
            }
        }
        Ok(())
    }

    /// Commits a cluster whose derived identity is already owned by a
    /// live company the cluster never matched.
    ///
    /// Folding here would merge below the thresholds: a strong match
    /// would have reached the holder through its block representative,
    /// so this pair scored at best in the review band. The newcomer is
    /// committed under its own deterministic id and the review entry,
    /// when one was emitted, carries the merge decision.
    fn commit_namesake(
        &self,
        mut fresh: CanonicalCompany,
        holder: &CanonicalCompany,
        new_members: &[NormalizedRecord],
        report: &mut BatchReport,
    ) -> KanonResult<()> {
        let founding = new_members
            .iter()
            .min_by_key(|r| (r.record.fetch_ts, r.record_id()))
            .ok_or_else(|| KanonError::internal("namesake cluster has no members"))?;
        let distinct_id = CompanyId::derive(&format!(
            "{}|{}",
            founding.identity_string(),
            founding.record_id()
        ));
        info!(
            holder = %holder.company_id,
            minted = %distinct_id,
            "identity collision with a live company, minting a distinct id"
        );

        let prior = self
            .companies
            .get(distinct_id)
            .map_err(Self::storage_err)?;
        match self.confirm_active(distinct_id, prior.as_ref()) {
            Gate::Active => {
                let (doc, created) = match prior {
                    // Replay of an earlier namesake commit.
                    Some(previous) => (self.merger.fold_into(previous, new_members), false),
                    None => {
                        fresh.company_id = distinct_id;
                        (fresh, true)
                    }
                };
                self.finish_commit(doc, new_members, created, None, report)?;
            }
            Gate::Suppressed => self.suppressed_hit(distinct_id, new_members, report),
            Gate::Unconfirmed => report.held_back += 1,
        }
        Ok(())
    }

    /// Upserts a rebuilt document, records member fingerprints, and
    /// writes the audit entry when membership actually grew.
    fn finish_commit(
        &self,
        doc: CanonicalCompany,
        new_members: &[NormalizedRecord],
        created: bool,
        details: Option<String>,
        report: &mut BatchReport,
    ) -> KanonResult<()> {
        let company_id = doc.company_id;
        self.companies.upsert(doc).map_err(Self::storage_err)?;
        report.upserts += 1;
        if created {
            report.new_companies += 1;
        }
        for member in new_members {
            self.run_state
                .record_fingerprint(member.record.fingerprint(), member.record_id())
                .map_err(Self::storage_err)?;
        }

        // A lone record founding a new company merged nothing; anything
        // else is an auditable merge.
        let merged_something = !created || new_members.len() > 1 || details.is_some();
        if merged_something && !new_members.is_empty() {
            let mut entry = AuditEntry::new(
                AuditAction::Merge,
                company_id,
                new_members.iter().map(NormalizedRecord::record_id).collect(),
                ENGINE_ACTOR,
            );
            if let Some(details) = details {
                entry = entry.with_details(details);
            }
            self.audit.append(entry).map_err(Self::storage_err)?;
        }
        Ok(())
    }

    /// Marks a cluster's records excluded after hitting a suppressed
    /// identity, so later runs skip them at intake.
    fn suppressed_hit(
        &self,
        company_id: CompanyId,
        new_members: &[NormalizedRecord],
        report: &mut BatchReport,
    ) {
        report.suppressed_hits += 1;
        let member_ids: Vec<RecordId> =
            new_members.iter().map(NormalizedRecord::record_id).collect();
        warn!(
            company = %company_id,
            records = member_ids.len(),
            "matching records hit a suppressed identity, not folding"
        );
        if let Err(err) = self.suppression.suppress(company_id, &member_ids) {
            warn!(error = %err, "failed to register excluded records");
            return;
        }
        for member in new_members {
            if let Err(err) = self
                .run_state
                .record_fingerprint(member.record.fingerprint(), member.record_id())
            {
                warn!(error = %err, "failed to record fingerprint for excluded record");
            }
        }
    }

    /// Fail-closed suppression gate for one target company. The local
    /// document flag and the compliance store must both clear.
    fn confirm_active(&self, company_id: CompanyId, doc: Option<&CanonicalCompany>) -> Gate {
        if doc.is_some_and(|d| d.suppressed) {
            return Gate::Suppressed;
        }
        match self
            .suppression
            .status(company_id, self.config.suppression_timeout())
        {
            Ok(SuppressionStatus::Active) => Gate::Active,
            Ok(SuppressionStatus::Suppressed) => Gate::Suppressed,
            Err(err) => {
                warn!(
                    error = %err,
                    company = %company_id,
                    "suppression status unconfirmed, failing closed"
                );
                Gate::Unconfirmed
            }
        }
    }

    /// Applies a retraction request.
    ///
    /// Suppress and restore are idempotent; delete removes the document
    /// while keeping member exclusions so the identity cannot return.
    ///
    /// # Errors
    ///
    /// `CompanyNotFound` for unknown ids; suppression-store failures are
    /// retryable and leave the document untouched.
    pub fn apply_retraction(&self, request: RetractionRequest) -> KanonResult<RetractionOutcome> {
        let company = self
            .companies
            .get(request.company_id)
            .map_err(Self::storage_err)?
            .ok_or_else(|| Self::storage_err(StorageError::CompanyNotFound(request.company_id)))?;
        let company_id = company.company_id;
        let members = company.member_record_ids.clone();

        let changed = match request.action {
            RetractionAction::Suppress => {
                if company.suppressed {
                    false
                } else {
                    // Store first: if it fails the document stays
                    // untouched and the request can be retried.
                    self.suppression.suppress(company_id, &members)?;
                    let mut doc = company;
                    doc.suppressed = true;
                    doc.last_updated = Utc::now();
                    self.companies.upsert(doc).map_err(Self::storage_err)?;
                    self.audit
                        .append(AuditEntry::new(
                            AuditAction::Suppress,
                            company_id,
                            members,
                            request.requester_ref.clone(),
                        ))
                        .map_err(Self::storage_err)?;
                    true
                }
            }
            RetractionAction::Restore => {
                if company.suppressed {
                    self.suppression.restore(company_id)?;
                    let mut doc = company;
                    doc.suppressed = false;
                    doc.last_updated = Utc::now();
                    self.companies.upsert(doc).map_err(Self::storage_err)?;
                    self.audit
                        .append(AuditEntry::new(
                            AuditAction::Restore,
                            company_id,
                            members,
                            request.requester_ref.clone(),
                        ))
                        .map_err(Self::storage_err)?;
                    true
                } else {
                    false
                }
            }
            RetractionAction::Delete => {
                self.suppression.suppress(company_id, &members)?;
                self.companies
                    .remove(company_id)
                    .map_err(Self::storage_err)?;
                self.audit
                    .append(AuditEntry::new(
                        AuditAction::Delete,
                        company_id,
                        members,
                        request.requester_ref.clone(),
                    ))
                    .map_err(Self::storage_err)?;
                true
            }
        };

        info!(
            company = %company_id,
            action = ?request.action,
            changed,
            requester = %request.requester_ref,
            "applied retraction"
        );
        Ok(RetractionOutcome {
            company_id,
            action: request.action,
            changed,
        })
    }

    /// Applies a reviewer's verdict on a queued pair.
    ///
    /// # Errors
    ///
    /// `CompanyNotFound`/`RecordNotFound` when a side no longer resolves,
    /// and a suppression error when the surviving side is suppressed:
    /// merging into a withheld company is never allowed.
    pub fn apply_review_decision(&self, decision: ReviewDecision) -> KanonResult<ReviewOutcome> {
        match decision {
            ReviewDecision::Reject { entry, reviewer } => {
                let company_id = self
                    .resolve_side(&entry.side_a)
                    .or_else(|_| self.resolve_side(&entry.side_b))
                    .unwrap_or_else(|_| CompanyId::nil());
                let affected: Vec<RecordId> = [entry.side_a.record_id, entry.side_b.record_id]
                    .into_iter()
                    .flatten()
                    .collect();
                self.audit
                    .append(
                        AuditEntry::new(AuditAction::ReviewReject, company_id, affected, reviewer)
                            .with_details(format!("review entry {}", entry.id)),
                    )
                    .map_err(Self::storage_err)?;
                Ok(ReviewOutcome::Rejected)
            }
            ReviewDecision::Confirm { entry, reviewer } => {
                let a = self.resolve_side(&entry.side_a)?;
                let b = self.resolve_side(&entry.side_b)?;
                if a == b {
                    return Ok(ReviewOutcome::AlreadyMerged { company_id: a });
                }
                let mut docs = self.companies.get_many(&[a, b]).map_err(Self::storage_err)?;
                if docs.len() < 2 {
                    let id = docs.first().map_or(a, |d| d.company_id);
                    return Ok(ReviewOutcome::AlreadyMerged { company_id: id });
                }
                docs.sort_by_key(|c| (c.first_seen, c.company_id));
                let winner = docs.remove(0);
                let loser = docs.remove(0);
                let winner_id = winner.company_id;
                let loser_id = loser.company_id;

                match self.confirm_active(winner_id, Some(&winner)) {
                    Gate::Active => {}
                    Gate::Suppressed | Gate::Unconfirmed => {
                        return Err(KanonError::Suppression(SuppressionError::Unavailable {
                            reason: format!(
                                "cannot merge into company {winner_id}: suppression not cleared"
                            ),
                        }));
                    }
                }

                let affected = loser.member_record_ids.clone();
                self.companies
                    .mark_merged(loser_id, winner_id)
                    .map_err(Self::storage_err)?;
                let merged = self.merger.merge_companies(winner, vec![loser]);
                self.companies.upsert(merged).map_err(Self::storage_err)?;
                self.audit
                    .append(
                        AuditEntry::new(AuditAction::Merge, winner_id, affected, reviewer)
                            .with_details(format!(
                                "review confirm {} absorbed company {loser_id}",
                                entry.id
                            )),
                    )
                    .map_err(Self::storage_err)?;
                info!(winner = %winner_id, loser = %loser_id, "review confirm merged companies");
                Ok(ReviewOutcome::Merged {
                    company_id: winner_id,
                })
            }
        }
    }

    /// Resolves one review side to the company currently holding it.
    fn resolve_side(&self, side: &ReviewSide) -> KanonResult<CompanyId> {
        if let Some(company_id) = side.company_id {
            let doc = self
                .companies
                .get(company_id)
                .map_err(Self::storage_err)?
                .ok_or_else(|| Self::storage_err(StorageError::CompanyNotFound(company_id)))?;
            return Ok(doc.company_id);
        }
        let record_id = side
            .record_id
            .ok_or_else(|| KanonError::internal("review side carries neither record nor company"))?;
        self.companies
            .member_company(record_id)
            .map_err(Self::storage_err)?
            .ok_or_else(|| Self::storage_err(StorageError::RecordNotFound(record_id)))
    }

    /// Detaches members into a fresh company. Splits are manual only;
    /// nothing in the automatic path undoes a merge.
    ///
    /// The detached observations are passed whole because raw records
    /// live upstream; the engine verifies each one is a member before
    /// rebuilding both documents.
    ///
    /// # Errors
    ///
    /// `CompanyNotFound`/`RecordNotFound` for unknown ids, and a
    /// validation error when the remaining document would lose its name
    /// or its last member.
    pub fn split_company(
        &self,
        company_id: CompanyId,
        detach: Vec<RawRecord>,
        actor: &str,
    ) -> KanonResult<SplitOutcome> {
        if detach.is_empty() {
            return Err(KanonError::Validation(ValidationError::EmptyField {
                field: "detach".to_string(),
            }));
        }
        let company = self
            .companies
            .get(company_id)
            .map_err(Self::storage_err)?
            .ok_or_else(|| Self::storage_err(StorageError::CompanyNotFound(company_id)))?;
        for record in &detach {
            if !company.is_member(record.record_id) {
                return Err(Self::storage_err(StorageError::RecordNotFound(
                    record.record_id,
                )));
            }
        }

        let mut detached_members = Vec::with_capacity(detach.len());
        for record in detach {
            detached_members.push(self.normalizer.normalize(record)?);
        }
        let detach_ids: HashSet<RecordId> = detached_members
            .iter()
            .map(NormalizedRecord::record_id)
            .collect();
        let detach_list: Vec<RecordId> = {
            let mut ids: Vec<RecordId> = detach_ids.iter().copied().collect();
            ids.sort_unstable();
            ids
        };

        let original_id = company.company_id;
        let mut remaining = self
            .merger
            .remove_members(company, &detach_ids, &self.normalizer)?;
        remaining.last_updated = Utc::now();

        let mut detached_doc = self.merger.build_new(&detached_members)?;
        if detached_doc.company_id == original_id {
            // The detachment carries the founding identity; the fresh
            // document needs its own deterministic id.
            let founding = detached_members
                .iter()
                .min_by_key(|r| (r.record.fetch_ts, r.record_id()))
                .ok_or_else(|| KanonError::internal("detached member set went empty"))?;
            detached_doc.company_id = CompanyId::derive(&format!(
                "{}|split-of|{original_id}",
                founding.identity_string()
            ));
        }

        let detached_id = detached_doc.company_id;
        self.companies
            .upsert(remaining)
            .map_err(Self::storage_err)?;
        self.companies
            .upsert(detached_doc)
            .map_err(Self::storage_err)?;
        self.audit
            .append(
                AuditEntry::new(AuditAction::Split, original_id, detach_list, actor)
                    .with_details(format!("detached into {detached_id}")),
            )
            .map_err(Self::storage_err)?;

        info!(original = %original_id, detached = %detached_id, "split company");
        Ok(SplitOutcome {
            original: original_id,
            detached: detached_id,
        })
    }
}

impl std::fmt::Debug for ResolutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEngine")
            .field("config", &self.config)
            .field("review", &self.review)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::record::{RecordFields, SourceType};
    use crate::review::InMemoryReviewQueue;
    use crate::storage::{InMemoryCompanyStore, InMemoryRunState};
    use crate::suppress::InMemorySuppressionStore;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration as StdDuration;

    struct Fixture {
        engine: ResolutionEngine,
        companies: Arc<InMemoryCompanyStore>,
        suppression: Arc<InMemorySuppressionStore>,
        queue: Arc<InMemoryReviewQueue>,
        audit: Arc<InMemoryAuditLog>,
    }

    fn fixture() -> Fixture {
        let companies = Arc::new(InMemoryCompanyStore::new());
        let suppression = Arc::new(InMemorySuppressionStore::new());
        let queue = Arc::new(InMemoryReviewQueue::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = ResolutionEngine::new(
            companies.clone(),
            Arc::new(InMemoryRunState::new()),
            suppression.clone(),
            queue.clone(),
            audit.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        Fixture {
            engine,
            companies,
            suppression,
            queue,
            audit,
        }
    }

    fn at(day: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap() + Duration::days(day)
    }

    fn record(day: i64, source: SourceType, fields: RecordFields) -> RawRecord {
        RawRecord::new(source, format!("ref-{day}"), at(day), "v2.1", fields)
    }

    fn acme_pair() -> Vec<RawRecord> {
        vec![
            record(
                0,
                SourceType::GoogleSearch,
                RecordFields {
                    legal_name: Some("ACME YAZILIM".to_string()),
                    city: Some("Istanbul".to_string()),
                    website: Some("acme.com".to_string()),
                    ..RecordFields::default()
                },
            ),
            record(
                1,
                SourceType::TradeRegistry,
                RecordFields {
                    legal_name: Some("Acme Yazilim A.S.".to_string()),
                    city: Some("İstanbul".to_string()),
                    website: Some("https://www.acme.com".to_string()),
                    ..RecordFields::default()
                },
            ),
        ]
    }

    fn nova_pair() -> Vec<RawRecord> {
        // Identical names, no domain, 60% address token overlap:
        // (0.3 + 0.1 * 0.6) / 0.4 = 0.9 — inside the review band.
        vec![
            record(
                0,
                SourceType::GooglePlaces,
                RecordFields {
                    legal_name: Some("Nova Danışmanlık".to_string()),
                    city: Some("Ankara".to_string()),
                    address: Some("Bağdat Cad. No: 4".to_string()),
                    ..RecordFields::default()
                },
            ),
            record(
                1,
                SourceType::GoogleSearch,
                RecordFields {
                    legal_name: Some("Nova Danışmanlık".to_string()),
                    city: Some("Ankara".to_string()),
                    address: Some("Bağdat Cad. No: 9".to_string()),
                    ..RecordFields::default()
                },
            ),
        ]
    }

    #[test]
    fn test_duplicate_pair_auto_merges_into_one_company() {
        let f = fixture();
        let report = f.engine.run_batch(acme_pair()).unwrap();

        assert_eq!(report.received, 2);
        assert_eq!(report.auto_merges, 1);
        assert_eq!(report.new_companies, 1);
        assert_eq!(f.companies.len().unwrap(), 1);

        let company = &f.companies.all().unwrap()[0];
        assert_eq!(company.member_count(), 2);
        assert!(company.data_sources.contains(&SourceType::GoogleSearch));
        assert!(company.data_sources.contains(&SourceType::TradeRegistry));
        // The merge of two records leaves an audit trail.
        assert_eq!(f.audit.len().unwrap(), 1);
        let entry = &f.audit.all().unwrap()[0];
        assert_eq!(entry.action, AuditAction::Merge);
        assert_eq!(entry.actor, "engine");
    }

    #[test]
    fn test_city_only_pair_stays_apart() {
        let f = fixture();
        let batch = vec![
            record(
                0,
                SourceType::GooglePlaces,
                RecordFields {
                    legal_name: Some("Anadolu Lokantası".to_string()),
                    city: Some("Ankara".to_string()),
                    ..RecordFields::default()
                },
            ),
            record(
                0,
                SourceType::GooglePlaces,
                RecordFields {
                    legal_name: Some("Zirve Nakliyat".to_string()),
                    city: Some("Ankara".to_string()),
                    ..RecordFields::default()
                },
            ),
        ];
        let report = f.engine.run_batch(batch).unwrap();
        assert_eq!(report.auto_merges, 0);
        assert_eq!(report.review_entries, 0);
        assert_eq!(f.companies.len().unwrap(), 2);
    }

    #[test]
    fn test_invalid_record_is_skipped_not_fatal() {
        let f = fixture();
        let mut batch = acme_pair();
        batch.push(record(
            2,
            SourceType::Whois,
            RecordFields {
                legal_name: Some("Kimsesiz Ltd".to_string()),
                ..RecordFields::default()
            },
        ));
        let report = f.engine.run_batch(batch).unwrap();
        assert_eq!(report.invalid, 1);
        assert_eq!(f.companies.len().unwrap(), 1);
    }

    #[test]
    fn test_rerunning_the_same_batch_is_a_noop() {
        let f = fixture();
        let first = f.engine.run_batch(acme_pair()).unwrap();
        assert_eq!(first.upserts, 1);
        let ids_before: Vec<CompanyId> = f
            .companies
            .all()
            .unwrap()
            .iter()
            .map(|c| c.company_id)
            .collect();

        let second = f.engine.run_batch(acme_pair()).unwrap();
        // Everything falls under the advanced high-water mark.
        assert_eq!(second.skipped_high_water, 2);
        assert_eq!(second.upserts, 0);
        let ids_after: Vec<CompanyId> = f
            .companies
            .all()
            .unwrap()
            .iter()
            .map(|c| c.company_id)
            .collect();
        assert_eq!(ids_before, ids_after);
        assert_eq!(f.companies.len().unwrap(), 1);
    }

    #[test]
    fn test_reobservation_with_newer_timestamp_skipped_by_fingerprint() {
        let f = fixture();
        let batch = acme_pair();
        f.engine.run_batch(batch.clone()).unwrap();

        // Same content, fresh ids, later timestamps: the fingerprint
        // catches what the high-water mark cannot.
        let replayed: Vec<RawRecord> = batch
            .into_iter()
            .map(|r| RawRecord::new(r.source, r.source_ref, at(10), r.parser_version, r.fields))
            .collect();
        let report = f.engine.run_batch(replayed).unwrap();
        assert_eq!(report.skipped_duplicate, 2);
        assert_eq!(report.upserts, 0);
        assert_eq!(f.companies.len().unwrap(), 1);
    }

    #[test]
    fn test_incremental_record_folds_into_existing_company() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;

        // Never compared against the first record directly; it reaches
        // the cluster through the company representative.
        let newcomer = record(
            5,
            SourceType::Website,
            RecordFields {
                legal_name: Some("Acme Yazılım A.Ş.".to_string()),
                city: Some("İstanbul".to_string()),
                website: Some("https://acme.com/about".to_string()),
                phone: Some("0536 123 45 67".to_string()),
                ..RecordFields::default()
            },
        );
        let report = f.engine.run_batch(vec![newcomer]).unwrap();
        assert_eq!(report.new_companies, 0);
        assert_eq!(report.upserts, 1);

        let company = f.companies.get(company_id).unwrap().unwrap();
        assert_eq!(company.member_count(), 3);
        assert_eq!(company.phone.as_ref().unwrap().value, "+905361234567");
        assert_eq!(f.companies.len().unwrap(), 1);
    }

    #[test]
    fn test_three_same_domain_records_form_one_company() {
        let f = fixture();
        let make = |day: i64, name: &str| {
            record(
                day,
                SourceType::GoogleSearch,
                RecordFields {
                    legal_name: Some(name.to_string()),
                    city: Some("Bursa".to_string()),
                    website: Some("kaya.com.tr".to_string()),
                    ..RecordFields::default()
                },
            )
        };
        let batch = vec![
            make(0, "Kaya İnşaat"),
            make(1, "Kaya İnş. Ltd. Şti."),
            make(2, "Kaya İnşaat Limited Şirketi"),
        ];
        f.engine.run_batch(batch).unwrap();
        assert_eq!(f.companies.len().unwrap(), 1);
        assert_eq!(f.companies.all().unwrap()[0].member_count(), 3);
    }

    #[test]
    fn test_review_band_pair_goes_to_queue_without_merging() {
        let f = fixture();
        let report = f.engine.run_batch(nova_pair()).unwrap();
        assert_eq!(report.auto_merges, 0);
        assert_eq!(report.review_entries, 1);
        // No state change until a reviewer decides.
        assert_eq!(f.companies.len().unwrap(), 2);

        let entries = f.queue.entries();
        assert_eq!(entries.len(), 1);
        assert!((0.85..0.95).contains(&entries[0].score));
        assert!(!entries[0].contributions.is_empty());

        // Identical names derive identical founding identities, so the
        // second company must carry a distinct minted id.
        let ids: Vec<CompanyId> = f
            .companies
            .all()
            .unwrap()
            .iter()
            .map(|c| c.company_id)
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_borderline_namesake_stays_its_own_company_across_runs() {
        let f = fixture();
        let batch = nova_pair();
        let first = vec![batch[0].clone()];
        let second = vec![batch[1].clone()];

        f.engine.run_batch(first).unwrap();
        let original = f.companies.all().unwrap().remove(0);
        assert_eq!(original.member_count(), 1);

        // The newcomer scores in the review band against the existing
        // company and shares its derived identity. It must neither fold
        // in nor displace the holder.
        let report = f.engine.run_batch(second).unwrap();
        assert_eq!(report.auto_merges, 0);
        assert_eq!(report.review_entries, 1);
        assert_eq!(report.new_companies, 1);
        assert_eq!(f.companies.len().unwrap(), 2);

        let holder = f.companies.get(original.company_id).unwrap().unwrap();
        assert_eq!(holder.member_count(), 1);
        assert_eq!(holder.member_record_ids, original.member_record_ids);
    }

    #[test]
    fn test_review_confirm_merges_the_two_companies() {
        let f = fixture();
        f.engine.run_batch(nova_pair()).unwrap();
        assert_eq!(f.companies.len().unwrap(), 2);
        let entry = f.queue.entries().remove(0);

        let outcome = f
            .engine
            .apply_review_decision(ReviewDecision::Confirm {
                entry,
                reviewer: "reviewer-7".to_string(),
            })
            .unwrap();
        let ReviewOutcome::Merged { company_id } = outcome else {
            panic!("expected a merge");
        };
        assert_eq!(f.companies.len().unwrap(), 1);
        let company = f.companies.get(company_id).unwrap().unwrap();
        assert_eq!(company.member_count(), 2);

        let trail = f.audit.entries_for(company_id).unwrap();
        assert!(trail
            .iter()
            .any(|e| e.action == AuditAction::Merge && e.actor == "reviewer-7"));
    }

    #[test]
    fn test_review_reject_changes_nothing_but_audits() {
        let f = fixture();
        f.engine.run_batch(nova_pair()).unwrap();
        let entry = f.queue.entries().remove(0);

        let outcome = f
            .engine
            .apply_review_decision(ReviewDecision::Reject {
                entry,
                reviewer: "reviewer-7".to_string(),
            })
            .unwrap();
        assert_eq!(outcome, ReviewOutcome::Rejected);
        assert_eq!(f.companies.len().unwrap(), 2);
        assert!(f
            .audit
            .all()
            .unwrap()
            .iter()
            .any(|e| e.action == AuditAction::ReviewReject));
    }

    #[test]
    fn test_suppress_then_matching_record_does_not_resurrect() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;

        let outcome = f
            .engine
            .apply_retraction(RetractionRequest {
                action: RetractionAction::Suppress,
                company_id,
                requester_ref: "RTBF-42".to_string(),
            })
            .unwrap();
        assert!(outcome.changed);

        // A new record with the same identity arrives later.
        let newcomer = record(
            8,
            SourceType::Website,
            RecordFields {
                legal_name: Some("Acme Yazılım A.Ş.".to_string()),
                city: Some("İSTANBUL".to_string()),
                website: Some("https://www.acme.com".to_string()),
                ..RecordFields::default()
            },
        );
        let newcomer_id = newcomer.record_id;
        let report = f.engine.run_batch(vec![newcomer]).unwrap();

        assert_eq!(report.suppressed_hits, 1);
        assert_eq!(report.upserts, 0);
        let company = f.companies.get(company_id).unwrap().unwrap();
        assert!(company.suppressed);
        assert_eq!(company.member_count(), 2);
        assert!(!company.is_member(newcomer_id));
        // The record is now excluded; replays skip it at intake.
        assert!(f.suppression.is_record_excluded(newcomer_id).unwrap());
    }

    #[test]
    fn test_restore_reenables_folding() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;

        f.engine
            .apply_retraction(RetractionRequest {
                action: RetractionAction::Suppress,
                company_id,
                requester_ref: "RTBF-42".to_string(),
            })
            .unwrap();
        let outcome = f
            .engine
            .apply_retraction(RetractionRequest {
                action: RetractionAction::Restore,
                company_id,
                requester_ref: "RTBF-42".to_string(),
            })
            .unwrap();
        assert!(outcome.changed);

        let newcomer = record(
            9,
            SourceType::Website,
            RecordFields {
                legal_name: Some("Acme Yazılım".to_string()),
                city: Some("İstanbul".to_string()),
                website: Some("acme.com".to_string()),
                ..RecordFields::default()
            },
        );
        let report = f.engine.run_batch(vec![newcomer]).unwrap();
        assert_eq!(report.suppressed_hits, 0);
        assert_eq!(
            f.companies.get(company_id).unwrap().unwrap().member_count(),
            3
        );
    }

    #[test]
    fn test_retraction_is_idempotent() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;
        let request = RetractionRequest {
            action: RetractionAction::Suppress,
            company_id,
            requester_ref: "RTBF-42".to_string(),
        };
        assert!(f.engine.apply_retraction(request.clone()).unwrap().changed);
        assert!(!f.engine.apply_retraction(request).unwrap().changed);
        // Only the effective suppression was audited.
        assert_eq!(
            f.audit
                .all()
                .unwrap()
                .iter()
                .filter(|e| e.action == AuditAction::Suppress)
                .count(),
            1
        );
    }

    #[test]
    fn test_delete_removes_document_and_keeps_exclusions() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company = f.companies.all().unwrap().remove(0);
        let member = company.member_record_ids[0];

        f.engine
            .apply_retraction(RetractionRequest {
                action: RetractionAction::Delete,
                company_id: company.company_id,
                requester_ref: "RTBF-43".to_string(),
            })
            .unwrap();
        assert!(f.companies.get(company.company_id).unwrap().is_none());
        assert!(f.suppression.is_record_excluded(member).unwrap());
        assert!(f
            .audit
            .all()
            .unwrap()
            .iter()
            .any(|e| e.action == AuditAction::Delete));
    }

    #[test]
    fn test_retraction_on_unknown_company_errors() {
        let f = fixture();
        let err = f
            .engine
            .apply_retraction(RetractionRequest {
                action: RetractionAction::Suppress,
                company_id: CompanyId::derive("GHOST|Ankara|"),
                requester_ref: "RTBF-99".to_string(),
            })
            .unwrap_err();
        assert!(err.is_pipeline());
    }

    /// Suppression store whose status calls can be forced to time out.
    struct TimingOutSuppression {
        inner: InMemorySuppressionStore,
        down: AtomicBool,
    }

    impl TimingOutSuppression {
        fn new() -> Self {
            Self {
                inner: InMemorySuppressionStore::new(),
                down: AtomicBool::new(false),
            }
        }
    }

    impl SuppressionStore for TimingOutSuppression {
        fn status(
            &self,
            company_id: CompanyId,
            timeout: StdDuration,
        ) -> Result<SuppressionStatus, SuppressionError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(SuppressionError::Timeout {
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            self.inner.status(company_id, timeout)
        }

        fn suppress(
            &self,
            company_id: CompanyId,
            member_ids: &[RecordId],
        ) -> Result<(), SuppressionError> {
            self.inner.suppress(company_id, member_ids)
        }

        fn restore(&self, company_id: CompanyId) -> Result<(), SuppressionError> {
            self.inner.restore(company_id)
        }

        fn is_record_excluded(&self, record_id: RecordId) -> Result<bool, SuppressionError> {
            self.inner.is_record_excluded(record_id)
        }
    }

    #[test]
    fn test_unconfirmed_suppression_holds_cluster_and_high_water_mark() {
        let companies = Arc::new(InMemoryCompanyStore::new());
        let run_state = Arc::new(InMemoryRunState::new());
        let suppression = Arc::new(TimingOutSuppression::new());
        let engine = ResolutionEngine::new(
            companies.clone(),
            run_state.clone(),
            suppression.clone(),
            Arc::new(InMemoryReviewQueue::new()),
            Arc::new(InMemoryAuditLog::new()),
            EngineConfig::default(),
        )
        .unwrap();

        suppression.down.store(true, Ordering::SeqCst);
        let report = engine.run_batch(acme_pair()).unwrap();
        // Fail closed: nothing committed, mark not advanced.
        assert_eq!(report.held_back, 1);
        assert_eq!(report.upserts, 0);
        assert!(companies.is_empty().unwrap());
        assert_eq!(run_state.high_water_mark().unwrap(), None);

        // The store recovers; the replayed batch commits normally.
        suppression.down.store(false, Ordering::SeqCst);
        let report = engine.run_batch(acme_pair()).unwrap();
        assert_eq!(report.upserts, 1);
        assert_eq!(companies.len().unwrap(), 1);
        assert!(run_state.high_water_mark().unwrap().is_some());
    }

    #[test]
    fn test_split_detaches_members_into_fresh_company() {
        let f = fixture();
        let batch = acme_pair();
        let detached_record = batch[1].clone();
        f.engine.run_batch(batch).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;

        let outcome = f
            .engine
            .split_company(company_id, vec![detached_record.clone()], "reviewer-2")
            .unwrap();
        assert_eq!(outcome.original, company_id);
        assert_ne!(outcome.detached, company_id);
        assert_eq!(f.companies.len().unwrap(), 2);

        let original = f.companies.get(outcome.original).unwrap().unwrap();
        let detached = f.companies.get(outcome.detached).unwrap().unwrap();
        assert!(!original.is_member(detached_record.record_id));
        assert!(detached.is_member(detached_record.record_id));
        assert!(f
            .audit
            .entries_for(company_id)
            .unwrap()
            .iter()
            .any(|e| e.action == AuditAction::Split));
    }

    #[test]
    fn test_split_rejects_non_member_record() {
        let f = fixture();
        f.engine.run_batch(acme_pair()).unwrap();
        let company_id = f.companies.all().unwrap()[0].company_id;

        let outsider = record(
            3,
            SourceType::Manual,
            RecordFields {
                legal_name: Some("Başka Firma".to_string()),
                city: Some("Bursa".to_string()),
                ..RecordFields::default()
            },
        );
        let err = f
            .engine
            .split_company(company_id, vec![outsider], "reviewer-2")
            .unwrap_err();
        assert!(err.is_pipeline());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let f = fixture();
        let report = f.engine.run_batch(acme_pair()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"received\":2"));
        assert!(json.contains("high_water_mark"));
    }
}
