//! This module defines the `VotesRepository` trait: the vote ledger. It
//! abstracts the durable vote records and the replace-semantics cast and
//! cancel operations the caster builds on.
use chrono::{DateTime, Utc};
use voting_shared::types::{Collection, DocumentId, UserId, Vote, VoteId};

use crate::errors::RepositoryError;

/// Outcome of a replace-semantics cast: the inserted vote plus whichever
/// previously-active votes by the same user were cancelled in the same
/// atomic step.
#[derive(Clone, Debug)]
pub struct CastOutcome {
    pub vote: Vote,
    pub cancelled: Vec<Vote>,
}

/// A trait that defines the interface for the durable vote ledger.
///
/// Implementations must guarantee that at most one non-cancelled vote exists
/// per (user, document, collection) tuple, even under concurrent casts: the
/// cancel-old plus insert-new of `cast_vote` happens as one atomic step
/// (a single write-lock section, or a database transaction guarded by a
/// partial unique index).
#[async_trait::async_trait]
pub trait VotesRepository: Send + Sync {
    /// Inserts `vote` as the user's active vote on the target document,
    /// cancelling any existing active vote by the same user on the same
    /// document in the same atomic step (replace semantics, not additive).
    ///
    /// Each cancellation also appends an `is_unvote` audit row with negated
    /// power, timestamped with `vote.voted_at`.
    ///
    /// # Arguments
    ///
    /// * `vote` - The fully-resolved vote row to insert.
    ///
    /// # Returns
    ///
    /// A `CastOutcome` with the inserted vote and the votes that were
    /// cancelled to make room for it.
    async fn cast_vote(&self, vote: Vote) -> Result<CastOutcome, RepositoryError>;

    /// Cancels every active vote by `user_id` on the document, appending an
    /// unvote audit row per cancellation. Returns the cancelled votes as
    /// they were before cancellation; an empty vec if there was nothing to
    /// cancel.
    async fn cancel_active_votes(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError>;

    /// Marks a single vote cancelled. Idempotent: cancelling an already
    /// cancelled (or unknown) vote is a no-op.
    async fn cancel_vote(&self, vote_id: VoteId) -> Result<(), RepositoryError>;

    /// The user's active (non-cancelled) vote on the document, if any.
    async fn find_active_vote(
        &self,
        document_id: DocumentId,
        collection: Collection,
        user_id: UserId,
    ) -> Result<Option<Vote>, RepositoryError>;

    /// Number of active votes cast by `user_id` strictly after `since`,
    /// excluding votes on the user's own (authored or coauthored) content.
    /// Self-votes are excluded from the count itself, not merely exempted
    /// from any limit applied to it.
    async fn count_recent_votes(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Active votes by other users on content authored or coauthored by
    /// `user_id`, with `voted_at` in the half-open window `[start, end)`.
    async fn votes_on_authored_content(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Vote>, RepositoryError>;
}
