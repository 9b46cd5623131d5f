//! # Voting Engine
//! This crate implements the forum's voting and karma machinery on top of
//! the `voting-repository` stores: resolving vote power from karma, casting
//! and retracting votes, rate limiting, time-decayed score maintenance, and
//! karma-change digests.
pub mod batch_update;
pub mod caster;
pub mod config;
pub mod errors;
pub mod karma_changes;
pub mod rate_limiter;
pub mod scoring;

pub use batch_update::{BatchOutcome, BatchScoreUpdater};
pub use caster::{VoteCaster, VoteRequest};
pub use config::{EngineConfig, ScoreParams};
pub use errors::{KarmaChangeError, VoteError};
pub use karma_changes::{karma_change_date_range, next_batch_date, KarmaChangeNotifier};
pub use rate_limiter::RateLimiter;
pub use scoring::{recalculate_score_at, vote_power};
