//! This module provides `InMemoryStore`, an in-memory implementation of all
//! three repository traits backed by a single `tokio::sync::RwLock`. Every
//! multi-row mutation runs inside one write-lock section, so the store gives
//! the same atomicity guarantees as the Postgres implementation. Intended
//! for tests and local runs.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;
use voting_shared::types::{
    Collection, DocumentId, UserId, UserRateLimit, UserRecord, Vote, VoteId, VoteableDocument,
};

use crate::errors::RepositoryError;
use crate::interfaces::{
    CastOutcome, DocumentDeltas, DocumentsRepository, UsersRepository, VotesRepository,
};

#[derive(Default)]
struct State {
    votes: Vec<Vote>,
    documents: HashMap<(Collection, DocumentId), VoteableDocument>,
    users: HashMap<UserId, UserRecord>,
    rate_limit_overrides: HashMap<UserId, UserRateLimit>,
}

/// In-memory vote ledger, document store, and user store.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Builds the audit row recording the retraction of `original`: a fresh id,
/// negated powers, and the cancellation time. The row is born cancelled so
/// it never reads as an active vote.
fn unvote_row(original: &Vote, at: DateTime<Utc>) -> Vote {
    Vote {
        id: Uuid::new_v4(),
        power: -original.power,
        extended_power: original
            .extended_power
            .iter()
            .map(|(axis, value)| (axis.clone(), -value))
            .collect(),
        cancelled: true,
        is_unvote: true,
        voted_at: at,
        ..original.clone()
    }
}

#[async_trait::async_trait]
impl VotesRepository for InMemoryStore {
    async fn cast_vote(&self, vote: Vote) -> Result<CastOutcome, RepositoryError> {
        let mut state = self.state.write().await;
        let mut cancelled = Vec::new();
        for existing in state.votes.iter_mut().filter(|v| {
            !v.cancelled
                && v.document_id == vote.document_id
                && v.collection == vote.collection
                && v.user_id == vote.user_id
        }) {
            cancelled.push(existing.clone());
            existing.cancelled = true;
        }
        for old in &cancelled {
            let row = unvote_row(old, vote.voted_at);
            state.votes.push(row);
        }
        state.votes.push(vote.clone());
        Ok(CastOutcome { vote, cancelled })
    }

    async fn cancel_active_votes(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError> {
        let mut state = self.state.write().await;
        let mut cancelled = Vec::new();
        for existing in state.votes.iter_mut().filter(|v| {
            !v.cancelled
                && v.document_id == document_id
                && v.collection == collection
                && v.user_id == user_id
        }) {
            cancelled.push(existing.clone());
            existing.cancelled = true;
        }
        for old in &cancelled {
            let row = unvote_row(old, at);
            state.votes.push(row);
        }
        Ok(cancelled)
    }

    async fn cancel_vote(&self, vote_id: VoteId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if let Some(vote) = state.votes.iter_mut().find(|v| v.id == vote_id) {
            vote.cancelled = true;
        }
        Ok(())
    }

    async fn find_active_vote(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
    ) -> Result<Option<Vote>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .votes
            .iter()
            .find(|v| {
                !v.cancelled
                    && v.document_id == document_id
                    && v.collection == collection
                    && v.user_id == user_id
            })
            .cloned())
    }

    async fn count_recent_votes(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let state = self.state.read().await;
        let count = state
            .votes
            .iter()
            .filter(|v| {
                !v.cancelled
                    && !v.is_unvote
                    && v.user_id == user_id
                    && !v.author_ids.contains(&user_id)
                    && v.voted_at > since
            })
            .count();
        Ok(count as u64)
    }

    async fn votes_on_authored_content(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .votes
            .iter()
            .filter(|v| {
                !v.cancelled
                    && v.user_id != user_id
                    && v.author_ids.contains(&user_id)
                    && v.voted_at >= start
                    && v.voted_at < end
            })
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl DocumentsRepository for InMemoryStore {
    async fn get(
        &self,
        collection: Collection,
        document_id: DocumentId,
    ) -> Result<Option<VoteableDocument>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.documents.get(&(collection, document_id)).cloned())
    }

    async fn upsert(&self, document: VoteableDocument) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state
            .documents
            .insert((document.collection, document.id), document);
        Ok(())
    }

    async fn apply_deltas(
        &self,
        collection: Collection,
        document_id: DocumentId,
        deltas: &DocumentDeltas,
    ) -> Result<VoteableDocument, RepositoryError> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(&(collection, document_id))
            .ok_or(RepositoryError::DocumentNotFound(document_id, collection))?;
        document.base_score += deltas.base_score;
        document.vote_count += deltas.vote_count;
        for (axis, delta) in &deltas.extended_score {
            *document.extended_score.entry(axis.clone()).or_insert(0) += delta;
        }
        if deltas.reactivate {
            document.inactive = false;
        }
        Ok(document.clone())
    }

    async fn set_score(
        &self,
        collection: Collection,
        document_id: DocumentId,
        score: f64,
        inactive: Option<bool>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        let document = state
            .documents
            .get_mut(&(collection, document_id))
            .ok_or(RepositoryError::DocumentNotFound(document_id, collection))?;
        document.score = score;
        if let Some(inactive) = inactive {
            document.inactive = inactive;
        }
        Ok(())
    }

    async fn active_documents(
        &self,
        collection: Collection,
    ) -> Result<Vec<VoteableDocument>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.collection == collection && !d.inactive)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl UsersRepository for InMemoryStore {
    async fn get(&self, user_id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn upsert(&self, user: UserRecord) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        state.users.insert(user.id, user);
        Ok(())
    }

    async fn adjust_karma(
        &self,
        user_ids: &[UserId],
        delta: i64,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        for user_id in user_ids {
            if let Some(user) = state.users.get_mut(user_id) {
                user.karma += delta;
            }
        }
        Ok(())
    }

    async fn rate_limit_override(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<UserRateLimit>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .rate_limit_overrides
            .get(&user_id)
            .filter(|limit| limit.is_active(now))
            .cloned())
    }

    async fn set_rate_limit_override(
        &self,
        user_id: UserId,
        limit: Option<UserRateLimit>,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        match limit {
            Some(limit) => {
                state.rate_limit_overrides.insert(user_id, limit);
            }
            None => {
                state.rate_limit_overrides.remove(&user_id);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::TimeZone;
    use voting_shared::types::VoteKind;

    use super::*;

    fn sample_vote(
        user_id: UserId,
        document_id: DocumentId,
        power: i64,
        voted_at: DateTime<Utc>,
    ) -> Vote {
        Vote {
            id: Uuid::new_v4(),
            document_id,
            collection: Collection::Posts,
            user_id,
            kind: if power >= 0 {
                VoteKind::SmallUpvote
            } else {
                VoteKind::SmallDownvote
            },
            extended_vote: None,
            power,
            extended_power: BTreeMap::new(),
            author_ids: vec![],
            cancelled: false,
            is_unvote: false,
            voted_at,
            silence_notification: false,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn cast_replaces_previous_vote_and_records_unvote_row() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let document = Uuid::new_v4();

        let first = sample_vote(user, document, 1, at(10));
        store.cast_vote(first.clone()).await.unwrap();

        let second = sample_vote(user, document, -1, at(11));
        let outcome = store.cast_vote(second.clone()).await.unwrap();

        assert_eq!(outcome.cancelled.len(), 1);
        assert_eq!(outcome.cancelled[0].id, first.id);

        let active = store
            .find_active_vote(document, Collection::Posts, user)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.id, second.id);

        let state = store.state.read().await;
        let unvotes: Vec<&Vote> = state.votes.iter().filter(|v| v.is_unvote).collect();
        assert_eq!(unvotes.len(), 1);
        assert_eq!(unvotes[0].power, -1);
        assert!(unvotes[0].cancelled);
        assert_eq!(unvotes[0].voted_at, at(11));
        assert_ne!(unvotes[0].id, first.id);
    }

    #[tokio::test]
    async fn cancel_vote_is_idempotent() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let document = Uuid::new_v4();
        let vote = sample_vote(user, document, 1, at(10));
        store.cast_vote(vote.clone()).await.unwrap();

        store.cancel_vote(vote.id).await.unwrap();
        store.cancel_vote(vote.id).await.unwrap();
        store.cancel_vote(Uuid::new_v4()).await.unwrap();

        assert!(store
            .find_active_vote(document, Collection::Posts, user)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn recent_vote_count_skips_unvotes_and_self_votes() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();

        let other = sample_vote(user, Uuid::new_v4(), 1, at(10));
        store.cast_vote(other).await.unwrap();

        let mut own = sample_vote(user, Uuid::new_v4(), 1, at(10));
        own.author_ids = vec![user];
        store.cast_vote(own).await.unwrap();

        let replaced_doc = Uuid::new_v4();
        store
            .cast_vote(sample_vote(user, replaced_doc, 1, at(10)))
            .await
            .unwrap();
        store
            .cast_vote(sample_vote(user, replaced_doc, -1, at(11)))
            .await
            .unwrap();

        // One vote on someone else's document plus the live replacement.
        let count = store.count_recent_votes(user, at(9)).await.unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn concurrent_casts_leave_one_active_vote() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let document = Uuid::new_v4();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let vote = sample_vote(user, document, if i % 2 == 0 { 1 } else { -1 }, at(10));
            handles.push(tokio::spawn(async move { store.cast_vote(vote).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = store.state.read().await;
        let active = state.votes.iter().filter(|v| !v.cancelled).count();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn deltas_accumulate_and_reactivate() {
        let store = InMemoryStore::new();
        let document_id = Uuid::new_v4();
        let mut document =
            VoteableDocument::new(document_id, Collection::Comments, Uuid::new_v4(), at(0));
        document.inactive = true;
        DocumentsRepository::upsert(&store, document).await.unwrap();

        let mut extended = BTreeMap::new();
        extended.insert("agreement".to_string(), 2);
        let updated = store
            .apply_deltas(
                Collection::Comments,
                document_id,
                &DocumentDeltas {
                    base_score: 3,
                    vote_count: 1,
                    extended_score: extended,
                    reactivate: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.base_score, 3);
        assert_eq!(updated.vote_count, 1);
        assert_eq!(updated.extended_score.get("agreement"), Some(&2));
        assert!(!updated.inactive);

        let missing = store
            .apply_deltas(Collection::Posts, Uuid::new_v4(), &DocumentDeltas::default())
            .await;
        assert!(matches!(
            missing,
            Err(RepositoryError::DocumentNotFound(_, _))
        ));
    }

    #[tokio::test]
    async fn rate_limit_override_respects_end_date() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let limit = UserRateLimit {
            action: voting_shared::types::RateLimitedAction::Votes,
            interval_unit: voting_shared::types::IntervalUnit::Hours,
            interval_length: 1,
            actions_per_interval: 5,
            ended_at: Some(at(12)),
        };
        store
            .set_rate_limit_override(user, Some(limit))
            .await
            .unwrap();

        assert!(store.rate_limit_override(user, at(11)).await.unwrap().is_some());
        assert!(store.rate_limit_override(user, at(13)).await.unwrap().is_none());

        store.set_rate_limit_override(user, None).await.unwrap();
        assert!(store.rate_limit_override(user, at(11)).await.unwrap().is_none());
    }
}
