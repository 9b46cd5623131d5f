//! Vote rate limiting.
//!
//! Limits are evaluated against the vote ledger at cast time rather than
//! tracked in counters, so a cancelled vote never burns allowance. A per-user
//! override replaces the default rules entirely while it is in force;
//! without one, admins are exempt and everyone else must pass every default
//! rule.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use voting_repository::{UsersRepository, VotesRepository};
use voting_shared::types::UserRecord;

use crate::config::RateLimitRule;
use crate::errors::VoteError;

/// Enforces voting rate limits against the vote ledger.
pub struct RateLimiter {
    votes: Arc<dyn VotesRepository>,
    users: Arc<dyn UsersRepository>,
    default_rules: Vec<RateLimitRule>,
}

impl RateLimiter {
    /// Creates a rate limiter applying `default_rules` to voters without an
    /// active override.
    pub fn new(
        votes: Arc<dyn VotesRepository>,
        users: Arc<dyn UsersRepository>,
        default_rules: Vec<RateLimitRule>,
    ) -> Self {
        Self {
            votes,
            users,
            default_rules,
        }
    }

    /// Checks whether `user` may cast one more vote at `now`.
    ///
    /// Votes on the user's own content never count against the allowance;
    /// the ledger excludes them from the recent-vote count.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The vote is allowed.
    /// * `Err(VoteError::RateLimited)` - Some applicable rule is exhausted.
    pub async fn check_at(&self, user: &UserRecord, now: DateTime<Utc>) -> Result<(), VoteError> {
        if let Some(limit) = self.users.rate_limit_override(user.id, now).await? {
            let since = now - limit.interval_unit.window(limit.interval_length);
            let count = self.votes.count_recent_votes(user.id, since).await?;
            if count >= limit.actions_per_interval {
                return Err(VoteError::RateLimited {
                    unit: limit.interval_unit.singular(),
                });
            }
            return Ok(());
        }

        if user.is_admin {
            return Ok(());
        }

        for rule in &self.default_rules {
            let since = now - rule.interval_unit.window(rule.interval_length);
            let count = self.votes.count_recent_votes(user.id, since).await?;
            if count >= rule.actions_per_interval {
                return Err(VoteError::RateLimited {
                    unit: rule.interval_unit.singular(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;
    use uuid::Uuid;
    use voting_repository::InMemoryStore;
    use voting_shared::types::{
        Collection, IntervalUnit, RateLimitedAction, UserId, UserRateLimit, Vote, VoteKind,
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn limiter_with(store: Arc<InMemoryStore>, rules: Vec<RateLimitRule>) -> RateLimiter {
        RateLimiter::new(store.clone(), store, rules)
    }

    fn hourly_rule(actions_per_interval: u64) -> RateLimitRule {
        RateLimitRule {
            interval_unit: IntervalUnit::Hours,
            interval_length: 1,
            actions_per_interval,
        }
    }

    async fn seed_votes(store: &InMemoryStore, user_id: UserId, count: usize) {
        for _ in 0..count {
            let vote = Vote {
                id: Uuid::new_v4(),
                document_id: Uuid::new_v4(),
                collection: Collection::Comments,
                user_id,
                kind: VoteKind::SmallUpvote,
                extended_vote: None,
                power: 1,
                extended_power: BTreeMap::new(),
                author_ids: vec![],
                cancelled: false,
                is_unvote: false,
                voted_at: now() - chrono::Duration::minutes(10),
                silence_notification: false,
            };
            store.cast_vote(vote).await.unwrap();
        }
    }

    #[tokio::test]
    async fn allows_votes_under_the_limit() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserRecord::new(Uuid::new_v4());
        seed_votes(&store, user.id, 2).await;

        let limiter = limiter_with(store, vec![hourly_rule(3)]);
        assert!(limiter.check_at(&user, now()).await.is_ok());
    }

    #[tokio::test]
    async fn denies_votes_at_the_limit() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserRecord::new(Uuid::new_v4());
        seed_votes(&store, user.id, 3).await;

        let limiter = limiter_with(store, vec![hourly_rule(3)]);
        let denied = limiter.check_at(&user, now()).await;
        assert!(matches!(denied, Err(VoteError::RateLimited { unit: "hour" })));
    }

    #[tokio::test]
    async fn admins_are_exempt_from_default_rules() {
        let store = Arc::new(InMemoryStore::new());
        let mut user = UserRecord::new(Uuid::new_v4());
        user.is_admin = true;
        seed_votes(&store, user.id, 10).await;

        let limiter = limiter_with(store, vec![hourly_rule(3)]);
        assert!(limiter.check_at(&user, now()).await.is_ok());
    }

    #[tokio::test]
    async fn override_replaces_default_rules() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserRecord::new(Uuid::new_v4());
        seed_votes(&store, user.id, 5).await;

        store
            .set_rate_limit_override(
                user.id,
                Some(UserRateLimit {
                    action: RateLimitedAction::Votes,
                    interval_unit: IntervalUnit::Weeks,
                    interval_length: 1,
                    actions_per_interval: 100,
                    ended_at: None,
                }),
            )
            .await
            .unwrap();

        // The default rule alone would deny; the wider override permits.
        let limiter = limiter_with(store, vec![hourly_rule(3)]);
        assert!(limiter.check_at(&user, now()).await.is_ok());
    }

    #[tokio::test]
    async fn override_can_be_stricter_than_defaults() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserRecord::new(Uuid::new_v4());
        seed_votes(&store, user.id, 2).await;

        store
            .set_rate_limit_override(
                user.id,
                Some(UserRateLimit {
                    action: RateLimitedAction::Votes,
                    interval_unit: IntervalUnit::Days,
                    interval_length: 1,
                    actions_per_interval: 2,
                    ended_at: None,
                }),
            )
            .await
            .unwrap();

        let limiter = limiter_with(store, vec![hourly_rule(100)]);
        let denied = limiter.check_at(&user, now()).await;
        assert!(matches!(denied, Err(VoteError::RateLimited { unit: "day" })));
    }
}
