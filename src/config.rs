//! Engine configuration.
//!
//! Thresholds and weights are defaults, not constants: the 0.95/0.85
//! bands were never validated against real data, so operators must be
//! able to tune them per corpus. Configs load from JSON with every field
//! optional; anything omitted falls back to the documented default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::score::FieldWeights;

fn default_auto_merge_threshold() -> f64 {
    0.95
}

fn default_review_threshold() -> f64 {
    0.85
}

fn default_max_block_size() -> usize {
    5000
}

fn default_keyword_cap() -> usize {
    20
}

fn default_max_alternates() -> usize {
    5
}

fn default_group_workers() -> usize {
    4
}

fn default_review_buffer_capacity() -> usize {
    4096
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Tunables for a [`crate::engine::ResolutionEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pairs at or above this score merge without a human.
    #[serde(default = "default_auto_merge_threshold")]
    pub auto_merge_threshold: f64,

    /// Pairs in `[review_threshold, auto_merge_threshold)` go to the
    /// review queue and change nothing until a reviewer decides.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,

    /// Per-field scoring weights.
    #[serde(default)]
    pub weights: FieldWeights,

    /// Candidate groups larger than this are split before scoring.
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,

    /// Canonical keyword lists are capped at this many entries.
    #[serde(default = "default_keyword_cap")]
    pub keyword_cap: usize,

    /// Losing scalar values kept per field for lineage.
    #[serde(default = "default_max_alternates")]
    pub max_alternates: usize,

    /// Worker threads scoring candidate groups in parallel.
    #[serde(default = "default_group_workers")]
    pub group_workers: usize,

    /// Review entries parked locally while the queue is down.
    #[serde(default = "default_review_buffer_capacity")]
    pub review_buffer_capacity: usize,

    /// Bound on suppression-store status calls.
    #[serde(default = "default_timeout_ms")]
    pub suppression_timeout_ms: u64,

    /// Bound on review-queue enqueue calls.
    #[serde(default = "default_timeout_ms")]
    pub review_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: default_auto_merge_threshold(),
            review_threshold: default_review_threshold(),
            weights: FieldWeights::default(),
            max_block_size: default_max_block_size(),
            keyword_cap: default_keyword_cap(),
            max_alternates: default_max_alternates(),
            group_workers: default_group_workers(),
            review_buffer_capacity: default_review_buffer_capacity(),
            suppression_timeout_ms: default_timeout_ms(),
            review_timeout_ms: default_timeout_ms(),
        }
    }
}

impl EngineConfig {
    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidThresholds`, `InvalidWeights`, or
    /// `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let thresholds = [self.auto_merge_threshold, self.review_threshold];
        if thresholds.iter().any(|t| !t.is_finite()) {
            return Err(ValidationError::InvalidThresholds {
                reason: "thresholds must be finite".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.auto_merge_threshold)
            || !(0.0..=1.0).contains(&self.review_threshold)
        {
            return Err(ValidationError::InvalidThresholds {
                reason: "thresholds must lie in [0, 1]".to_string(),
            });
        }
        if self.review_threshold > self.auto_merge_threshold {
            return Err(ValidationError::InvalidThresholds {
                reason: format!(
                    "review threshold {} exceeds auto-merge threshold {}",
                    self.review_threshold, self.auto_merge_threshold
                ),
            });
        }

        self.weights.validate()?;

        if self.max_block_size < 2 {
            return Err(ValidationError::InvalidConfig {
                reason: "max_block_size must be at least 2".to_string(),
            });
        }
        if self.group_workers == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "group_workers must be at least 1".to_string(),
            });
        }
        if self.keyword_cap == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "keyword_cap must be at least 1".to_string(),
            });
        }
        if self.review_buffer_capacity == 0 {
            return Err(ValidationError::InvalidConfig {
                reason: "review_buffer_capacity must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Bound on suppression-store calls as a [`Duration`].
    #[must_use]
    pub const fn suppression_timeout(&self) -> Duration {
        Duration::from_millis(self.suppression_timeout_ms)
    }

    /// Bound on review-queue calls as a [`Duration`].
    #[must_use]
    pub const fn review_timeout(&self) -> Duration {
        Duration::from_millis(self.review_timeout_ms)
    }
}
