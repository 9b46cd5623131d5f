//! Engine configuration.
//!
//! All knobs are serde-deserializable so deployments can override them from
//! a config file, and every field defaults to the forum's production values.
use serde::{Deserialize, Serialize};
use voting_shared::types::IntervalUnit;

use crate::scoring::{CURATED_BONUS, FRONTPAGE_BONUS, SCORE_BIAS, TIME_DECAY_FACTOR};

/// Parameters of the time-decayed ranking score.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoreParams {
    /// Exponent applied to the age term. Higher values make old content
    /// decay faster.
    pub time_decay_factor: f64,
    /// Hours added to the age before decay, so brand-new documents do not
    /// divide by zero and very young documents are not over-ranked.
    pub score_bias: f64,
    /// Score bonus for documents promoted to the frontpage.
    pub frontpage_bonus: i64,
    /// Score bonus for curated documents, on top of the frontpage bonus.
    pub curated_bonus: i64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        Self {
            time_decay_factor: TIME_DECAY_FACTOR,
            score_bias: SCORE_BIAS,
            frontpage_bonus: FRONTPAGE_BONUS,
            curated_bonus: CURATED_BONUS,
        }
    }
}

/// One voting rate-limit rule: at most `actions_per_interval` votes within
/// any trailing window of `interval_length` units.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitRule {
    pub interval_unit: IntervalUnit,
    pub interval_length: u32,
    pub actions_per_interval: u64,
}

/// Top-level engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub score: ScoreParams,
    /// Extended vote axes accepted by the caster. Selections on any other
    /// axis are rejected as invalid.
    pub extended_axes: Vec<String>,
    /// Documents older than this stop having their score recomputed by the
    /// batch updater until a new vote reactivates them.
    pub inactivity_threshold_days: i64,
    /// Rate-limit rules applied to every non-admin voter without a per-user
    /// override. All rules must pass.
    pub default_rate_limits: Vec<RateLimitRule>,
    /// Maximum length of the comment excerpt included in digests.
    pub comment_description_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            score: ScoreParams::default(),
            extended_axes: vec!["agreement".to_string()],
            inactivity_threshold_days: 60,
            default_rate_limits: vec![
                RateLimitRule {
                    interval_unit: IntervalUnit::Days,
                    interval_length: 1,
                    actions_per_interval: 200,
                },
                RateLimitRule {
                    interval_unit: IntervalUnit::Hours,
                    interval_length: 1,
                    actions_per_interval: 100,
                },
            ],
            comment_description_length: 500,
        }
    }
}
