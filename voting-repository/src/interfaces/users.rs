//! This module defines the `UsersRepository` trait: user records, atomic
//! karma increments, and the per-user rate-limit override store.
use chrono::{DateTime, Utc};
use voting_shared::types::{UserId, UserRateLimit, UserRecord};

use crate::errors::RepositoryError;

/// A trait that defines the interface for the user store.
#[async_trait::async_trait]
pub trait UsersRepository: Send + Sync {
    /// Fetches a user by id.
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>, RepositoryError>;

    /// Inserts or fully replaces a user record.
    async fn upsert(&self, user: UserRecord) -> Result<(), RepositoryError>;

    /// Atomically adds `delta` to the karma of each listed user. Every user
    /// receives the full delta independently (karma is not split between
    /// coauthors).
    async fn adjust_karma(&self, user_ids: &[UserId], delta: i64)
        -> Result<(), RepositoryError>;

    /// The user's voting rate-limit override, if one is in force at `now`.
    async fn rate_limit_override(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRateLimit>, RepositoryError>;

    /// Sets or clears the user's rate-limit override.
    async fn set_rate_limit_override(
        &self,
        user_id: UserId,
        limit: Option<UserRateLimit>,
    ) -> Result<(), RepositoryError>;
}
