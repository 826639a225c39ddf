//! Parallel scoring of candidate groups.
//!
//! Groups are independent until reconciliation: a worker scores all
//! pairs inside one group (new-new and new-versus-representative) and
//! emits edges and review entries without touching shared state. The
//! caller folds the per-group outcomes into the global union-find
//! single-threaded afterwards.

use std::thread;

use crossbeam_channel::bounded;
use tracing::{debug, warn};

use crate::block::CandidateGroup;
use crate::cluster::ClusterNode;
use crate::company::CanonicalCompany;
use crate::error::PipelineError;
use crate::review::{ReviewEntry, ReviewSide};
use crate::score::{MatchFields, Scorer};

/// One group plus the existing companies it must be scored against.
pub(crate) struct GroupTask {
    pub group: CandidateGroup,
    pub representatives: Vec<CanonicalCompany>,
}

/// Everything a group's scoring produced.
#[derive(Debug, Default)]
pub(crate) struct GroupOutcome {
    pub auto_edges: Vec<(ClusterNode, ClusterNode)>,
    pub review_entries: Vec<ReviewEntry>,
    pub pairs_scored: u64,
    pub scoring_errors: u64,
}

/// Score thresholds applied inside workers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Thresholds {
    pub auto_merge: f64,
    pub review: f64,
}

fn score_group(task: &GroupTask, scorer: Scorer, thresholds: Thresholds) -> GroupOutcome {
    let mut outcome = GroupOutcome::default();
    let records = &task.group.records;

    for (i, a) in records.iter().enumerate() {
        for b in records.iter().skip(i + 1) {
            match scorer.edge(a, b) {
                Ok(edge) => {
                    outcome.pairs_scored += 1;
                    debug!(
                        record_a = %edge.record_a,
                        record_b = %edge.record_b,
                        score = edge.score,
                        "scored record pair"
                    );
                    if edge.score >= thresholds.auto_merge {
                        outcome.auto_edges.push((
                            ClusterNode::Record(edge.record_a),
                            ClusterNode::Record(edge.record_b),
                        ));
                    } else if edge.score >= thresholds.review {
                        outcome.review_entries.push(ReviewEntry::new(
                            ReviewSide::of_record(a),
                            ReviewSide::of_record(b),
                            edge.score,
                            edge.contributions,
                        ));
                    }
                }
                Err(err) => {
                    outcome.scoring_errors += 1;
                    warn!(error = %err, "skipping pair after scoring failure");
                }
            }
        }
    }

    for company in &task.representatives {
        let company_fields = company.match_fields();
        for record in records {
            let pair = scorer.score_pair(
                record.record_id(),
                record.record_id(),
                &MatchFields::of_record(record),
                &company_fields,
            );
            match pair {
                Ok(pair) => {
                    outcome.pairs_scored += 1;
                    debug!(
                        record = %record.record_id(),
                        company = %company.company_id,
                        score = pair.score,
                        "scored record against representative"
                    );
                    if pair.score >= thresholds.auto_merge {
                        outcome.auto_edges.push((
                            ClusterNode::Record(record.record_id()),
                            ClusterNode::Company(company.company_id),
                        ));
                    } else if pair.score >= thresholds.review {
                        outcome.review_entries.push(ReviewEntry::new(
                            ReviewSide::of_record(record),
                            ReviewSide::of_company(company),
                            pair.score,
                            pair.contributions,
                        ));
                    }
                }
                Err(err) => {
                    outcome.scoring_errors += 1;
                    warn!(error = %err, "skipping representative pair after scoring failure");
                }
            }
        }
    }

    outcome
}

/// Scores every task, fanning out across `workers` threads when there is
/// enough work to justify it.
pub(crate) fn score_groups(
    tasks: Vec<GroupTask>,
    scorer: Scorer,
    thresholds: Thresholds,
    workers: usize,
) -> Result<Vec<GroupOutcome>, PipelineError> {
    if workers <= 1 || tasks.len() <= 1 {
        return Ok(tasks
            .iter()
            .map(|task| score_group(task, scorer, thresholds))
            .collect());
    }

    let expected = tasks.len();
    let worker_count = workers.min(expected);
    let (task_tx, task_rx) = bounded::<GroupTask>(worker_count * 2);
    let (out_tx, out_rx) = bounded::<GroupOutcome>(expected);

    let mut handles = Vec::with_capacity(worker_count);
    for i in 0..worker_count {
        let task_rx = task_rx.clone();
        let out_tx = out_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("kanon-score-{i}"))
            .spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let outcome = score_group(&task, scorer, thresholds);
                    if out_tx.send(outcome).is_err() {
                        return;
                    }
                }
            })
            .map_err(|e| PipelineError::WorkerPool {
                reason: format!("failed to spawn scoring worker: {e}"),
            })?;
        handles.push(handle);
    }
    drop(task_rx);
    drop(out_tx);

    for task in tasks {
        if task_tx.send(task).is_err() {
            break;
        }
    }
    drop(task_tx);

    let outcomes: Vec<GroupOutcome> = out_rx.iter().collect();

    for handle in handles {
        if handle.join().is_err() {
            return Err(PipelineError::WorkerPool {
                reason: "scoring worker panicked".to_string(),
            });
        }
    }

    if outcomes.len() != expected {
        return Err(PipelineError::WorkerPool {
            reason: format!(
                "expected {expected} group outcomes, got {}",
                outcomes.len()
            ),
        });
    }

    Ok(outcomes)
}
