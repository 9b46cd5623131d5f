use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The unit a rate-limit window is expressed in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    /// The trailing window covered by `length` of this unit.
    pub fn window(&self, length: u32) -> Duration {
        let length = i64::from(length);
        match self {
            IntervalUnit::Minutes => Duration::minutes(length),
            IntervalUnit::Hours => Duration::hours(length),
            IntervalUnit::Days => Duration::days(length),
            IntervalUnit::Weeks => Duration::weeks(length),
        }
    }

    /// Singular noun used in user-facing rate-limit messages.
    pub fn singular(&self) -> &'static str {
        match self {
            IntervalUnit::Minutes => "minute",
            IntervalUnit::Hours => "hour",
            IntervalUnit::Days => "day",
            IntervalUnit::Weeks => "week",
        }
    }
}

/// Actions the rate limiter knows how to count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RateLimitedAction {
    Votes,
}

/// A moderator-configured rate-limit override for a single user. While one
/// is active it replaces the global defaults entirely; `ended_at` in the
/// past (or absent overrides) fall back to the defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserRateLimit {
    pub action: RateLimitedAction,
    pub interval_unit: IntervalUnit,
    pub interval_length: u32,
    pub actions_per_interval: u64,
    pub ended_at: Option<DateTime<Utc>>,
}

impl UserRateLimit {
    /// Whether the override is still in force at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.ended_at {
            Some(ended_at) => ended_at > now,
            None => true,
        }
    }
}
