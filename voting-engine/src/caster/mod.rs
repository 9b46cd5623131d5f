//! Vote casting and retraction.
//!
//! `VoteCaster` is the single entry point through which votes change state:
//! it resolves the voter's power, enforces rate limits, applies replace
//! semantics against the ledger, keeps the document counters and author
//! karma consistent, and recomputes the ranking score.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use voting_repository::{DocumentDeltas, DocumentsRepository, UsersRepository, VotesRepository};
use voting_shared::types::{
    Collection, DocumentId, ExtendedVote, UserId, Vote, VoteKind, VoteableDocument,
};

use crate::config::EngineConfig;
use crate::errors::VoteError;
use crate::rate_limiter::RateLimiter;
use crate::scoring::{recalculate_score_at, vote_power};

/// Serializes casts per (voter, document) pair. Casts by different voters,
/// or by the same voter on different documents, proceed concurrently.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<(UserId, DocumentId), Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn acquire(&self, key: (UserId, DocumentId)) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // An entry whose only owner is the map itself has no guard held
            // and no waiter; drop it so the map stays bounded by the number
            // of in-flight casts.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// A request to cast (or, when it repeats the active vote, retract) a vote.
#[derive(Clone, Debug)]
pub struct VoteRequest {
    pub document_id: DocumentId,
    pub collection: Collection,
    pub user_id: UserId,
    pub kind: VoteKind,
    pub extended_vote: Option<ExtendedVote>,
    /// Bypasses rate limiting; used for trusted internal callers such as
    /// backfills.
    pub skip_rate_limits: bool,
    /// Excludes the resulting karma changes from the author's digest.
    pub silence_notification: bool,
}

impl VoteRequest {
    /// A plain vote request with no extended axes and default flags.
    pub fn new(
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
        kind: VoteKind,
    ) -> Self {
        Self {
            document_id,
            collection,
            user_id,
            kind,
            extended_vote: None,
            skip_rate_limits: false,
            silence_notification: false,
        }
    }
}

/// Counter deltas for retracting `cancelled` without casting a replacement.
fn retraction_deltas(cancelled: &[Vote]) -> DocumentDeltas {
    let mut deltas = DocumentDeltas {
        reactivate: true,
        ..DocumentDeltas::default()
    };
    for old in cancelled {
        deltas.base_score -= old.power;
        if old.has_effect() {
            deltas.vote_count -= 1;
        }
        for (axis, power) in &old.extended_power {
            *deltas.extended_score.entry(axis.clone()).or_insert(0) -= power;
        }
    }
    deltas
}

/// Counter deltas for casting `vote` in place of `cancelled`.
fn cast_deltas(vote: &Vote, cancelled: &[Vote]) -> DocumentDeltas {
    let mut deltas = retraction_deltas(cancelled);
    deltas.base_score += vote.power;
    if vote.has_effect() {
        deltas.vote_count += 1;
    }
    for (axis, power) in &vote.extended_power {
        *deltas.extended_score.entry(axis.clone()).or_insert(0) += power;
    }
    deltas
}

/// Applies votes end to end: power resolution, rate limiting, ledger
/// updates, document counters, author karma, and score recomputation.
pub struct VoteCaster {
    votes: Arc<dyn VotesRepository>,
    documents: Arc<dyn DocumentsRepository>,
    users: Arc<dyn UsersRepository>,
    rate_limiter: RateLimiter,
    config: EngineConfig,
    cast_locks: KeyedLocks,
}

impl VoteCaster {
    /// Creates a caster over the given stores, with rate limiting built from
    /// `config.default_rate_limits`.
    pub fn new(
        votes: Arc<dyn VotesRepository>,
        documents: Arc<dyn DocumentsRepository>,
        users: Arc<dyn UsersRepository>,
        config: EngineConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            Arc::clone(&votes),
            Arc::clone(&users),
            config.default_rate_limits.clone(),
        );
        Self {
            votes,
            documents,
            users,
            rate_limiter,
            config,
            cast_locks: KeyedLocks::default(),
        }
    }

    /// Casts `request` at the current time. See [`VoteCaster::perform_vote_at`].
    pub async fn perform_vote(
        &self,
        request: VoteRequest,
    ) -> Result<VoteableDocument, VoteError> {
        self.perform_vote_at(request, Utc::now()).await
    }

    /// Casts `request` as of `now` and returns the updated document.
    ///
    /// Re-casting a vote identical to the voter's active one (same kind and
    /// same extended selections) retracts it instead. Any other cast
    /// replaces the active vote. Votes by an author on their own document
    /// carry power but grant no karma and bypass rate limits.
    pub async fn perform_vote_at(
        &self,
        request: VoteRequest,
        now: DateTime<Utc>,
    ) -> Result<VoteableDocument, VoteError> {
        let user = self
            .users
            .get(request.user_id)
            .await?
            .ok_or_else(|| VoteError::Validation(format!("Unknown user: {}", request.user_id)))?;

        if let Some(extended) = &request.extended_vote {
            for axis in extended.keys() {
                if !self.config.extended_axes.contains(axis) {
                    return Err(VoteError::Validation(format!("Unknown vote axis: {axis}")));
                }
            }
        }

        let document = self
            .documents
            .get(request.collection, request.document_id)
            .await?
            .ok_or(VoteError::NotFound(request.document_id))?;

        let _guard = self
            .cast_locks
            .acquire((request.user_id, request.document_id))
            .await;

        let is_self_vote = document.is_authored_by(request.user_id);
        if !request.skip_rate_limits && !is_self_vote {
            self.rate_limiter.check_at(&user, now).await?;
        }

        let existing = self
            .votes
            .find_active_vote(request.document_id, request.collection, request.user_id)
            .await?;

        let is_toggle = existing
            .as_ref()
            .map(|active| {
                active.kind == request.kind && active.extended_vote == request.extended_vote
            })
            .unwrap_or(false);

        if is_toggle {
            return self.retract(&request, now).await;
        }
        self.cast(&request, user.karma, &document, now).await
    }

    /// Retracts the voter's active vote on the document.
    async fn retract(
        &self,
        request: &VoteRequest,
        now: DateTime<Utc>,
    ) -> Result<VoteableDocument, VoteError> {
        let cancelled = self
            .votes
            .cancel_active_votes(request.document_id, request.collection, request.user_id, now)
            .await?;

        self.reverse_karma(&cancelled, request.user_id).await?;

        let deltas = retraction_deltas(&cancelled);
        let mut updated = self
            .documents
            .apply_deltas(request.collection, request.document_id, &deltas)
            .await?;
        updated.score = self.refresh_score(&updated, now).await?;

        tracing::debug!(
            user = %request.user_id,
            document = %request.document_id,
            retracted = cancelled.len(),
            "vote retracted"
        );
        Ok(updated)
    }

    /// Casts a new vote, replacing whatever active vote it supersedes.
    async fn cast(
        &self,
        request: &VoteRequest,
        voter_karma: i64,
        document: &VoteableDocument,
        now: DateTime<Utc>,
    ) -> Result<VoteableDocument, VoteError> {
        let power = vote_power(voter_karma, request.kind);
        let mut extended_power = BTreeMap::new();
        if let Some(extended) = &request.extended_vote {
            for (axis, kind) in extended {
                extended_power.insert(axis.clone(), vote_power(voter_karma, *kind));
            }
        }

        let author_ids = document.karma_bearing_authors();
        let vote = Vote {
            id: Uuid::new_v4(),
            document_id: request.document_id,
            collection: request.collection,
            user_id: request.user_id,
            kind: request.kind,
            extended_vote: request.extended_vote.clone(),
            power,
            extended_power,
            author_ids: author_ids.clone(),
            cancelled: false,
            is_unvote: false,
            voted_at: now,
            silence_notification: request.silence_notification,
        };

        let outcome = self.votes.cast_vote(vote).await?;
        self.reverse_karma(&outcome.cancelled, request.user_id).await?;

        let is_self_vote = author_ids.contains(&request.user_id);
        if request.collection.karma_bearing() && !is_self_vote && power != 0 {
            self.users.adjust_karma(&author_ids, power).await?;
        }

        let deltas = cast_deltas(&outcome.vote, &outcome.cancelled);
        let mut updated = self
            .documents
            .apply_deltas(request.collection, request.document_id, &deltas)
            .await?;
        updated.score = self.refresh_score(&updated, now).await?;

        tracing::debug!(
            user = %request.user_id,
            document = %request.document_id,
            kind = ?request.kind,
            power,
            replaced = outcome.cancelled.len(),
            "vote cast"
        );
        Ok(updated)
    }

    /// Undoes the karma granted when each of `cancelled` was cast, using the
    /// author set recorded on the vote itself so later authorship changes
    /// cannot skew the reversal.
    async fn reverse_karma(
        &self,
        cancelled: &[Vote],
        voter: UserId,
    ) -> Result<(), VoteError> {
        for old in cancelled {
            if old.collection.karma_bearing()
                && !old.author_ids.contains(&voter)
                && old.power != 0
            {
                self.users.adjust_karma(&old.author_ids, -old.power).await?;
            }
        }
        Ok(())
    }

    /// Recomputes and persists the document's ranking score.
    async fn refresh_score(
        &self,
        document: &VoteableDocument,
        now: DateTime<Utc>,
    ) -> Result<f64, VoteError> {
        let score = recalculate_score_at(document, &self.config.score, now);
        self.documents
            .set_score(document.collection, document.id, score, None)
            .await?;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn vote_with_power(power: i64, agreement: Option<i64>) -> Vote {
        let mut extended_power = BTreeMap::new();
        if let Some(agreement) = agreement {
            extended_power.insert("agreement".to_string(), agreement);
        }
        Vote {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            collection: Collection::Comments,
            user_id: Uuid::new_v4(),
            kind: if power >= 0 {
                VoteKind::SmallUpvote
            } else {
                VoteKind::SmallDownvote
            },
            extended_vote: None,
            power,
            extended_power,
            author_ids: vec![],
            cancelled: false,
            is_unvote: false,
            voted_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            silence_notification: false,
        }
    }

    #[test]
    fn cast_deltas_net_out_the_replaced_vote() {
        let new = vote_with_power(2, Some(1));
        let old = vote_with_power(-1, Some(-2));
        let deltas = cast_deltas(&new, std::slice::from_ref(&old));
        assert_eq!(deltas.base_score, 3);
        assert_eq!(deltas.vote_count, 0);
        assert_eq!(deltas.extended_score.get("agreement"), Some(&3));
        assert!(deltas.reactivate);
    }

    #[test]
    fn cast_deltas_without_prior_vote_count_the_new_one() {
        let new = vote_with_power(1, None);
        let deltas = cast_deltas(&new, &[]);
        assert_eq!(deltas.base_score, 1);
        assert_eq!(deltas.vote_count, 1);
        assert!(deltas.extended_score.is_empty());
    }

    #[test]
    fn powerless_votes_do_not_move_vote_count() {
        let neutral = vote_with_power(0, None);
        let deltas = cast_deltas(&neutral, &[]);
        assert_eq!(deltas.base_score, 0);
        assert_eq!(deltas.vote_count, 0);

        // A neutral vote with a powered extended axis still counts.
        let axis_only = vote_with_power(0, Some(1));
        let deltas = cast_deltas(&axis_only, &[]);
        assert_eq!(deltas.vote_count, 1);
    }

    #[tokio::test]
    async fn keyed_locks_evict_idle_entries() {
        let locks = KeyedLocks::default();
        let first = (Uuid::new_v4(), Uuid::new_v4());
        let second = (Uuid::new_v4(), Uuid::new_v4());

        let held = locks.acquire(first).await;
        drop(locks.acquire(second).await);
        // The held entry and the just-released one are both still mapped.
        assert_eq!(locks.locks.lock().await.len(), 2);

        drop(held);
        drop(locks.acquire(second).await);
        assert_eq!(locks.locks.lock().await.len(), 1);
    }

    #[test]
    fn retraction_deltas_negate_the_cancelled_votes() {
        let old = vote_with_power(3, Some(-1));
        let deltas = retraction_deltas(std::slice::from_ref(&old));
        assert_eq!(deltas.base_score, -3);
        assert_eq!(deltas.vote_count, -1);
        assert_eq!(deltas.extended_score.get("agreement"), Some(&1));
        assert!(deltas.reactivate);
    }
}
