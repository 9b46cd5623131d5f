use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Collection, DocumentId, UserId, VoteId};

/// Represents the kind of vote a user can cast.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VoteKind {
    /// An ordinary upvote.
    SmallUpvote,
    /// An ordinary downvote.
    SmallDownvote,
    /// A strong upvote, with power scaled by the voter's karma.
    BigUpvote,
    /// A strong downvote, with power scaled by the voter's karma.
    BigDownvote,
    /// Carries no power of its own; used to cast extended-axis-only votes.
    Neutral,
}

impl VoteKind {
    /// The sign this kind contributes on its axis: +1, -1, or 0 for neutral.
    pub fn sign(&self) -> i64 {
        match self {
            VoteKind::SmallUpvote | VoteKind::BigUpvote => 1,
            VoteKind::SmallDownvote | VoteKind::BigDownvote => -1,
            VoteKind::Neutral => 0,
        }
    }

    /// Whether this is one of the strong (karma-ladder) kinds.
    pub fn is_big(&self) -> bool {
        matches!(self, VoteKind::BigUpvote | VoteKind::BigDownvote)
    }
}

/// Extended-axis selections, keyed by axis name (e.g. "agreement").
///
/// Extended axes are tracked independently of each other and of the primary
/// axis; they never influence `base_score` or karma.
pub type ExtendedVote = BTreeMap<String, VoteKind>;

/// A single vote record.
///
/// Vote rows are append-only: a superseded or retracted vote is marked
/// `cancelled` rather than deleted, and cancellation additionally appends a
/// companion row with `is_unvote` set and the power negated. This preserves
/// the full audit trail the karma-change digests are derived from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Vote {
    pub id: VoteId,
    pub document_id: DocumentId,
    pub collection: Collection,
    /// The voter.
    pub user_id: UserId,
    pub kind: VoteKind,
    /// The extended-axis selections as cast, if any.
    pub extended_vote: Option<ExtendedVote>,
    /// Signed power on the primary axis, resolved from the voter's karma at
    /// cast time.
    pub power: i64,
    /// Signed per-axis powers for the extended axes, resolved at cast time.
    /// Stored so that cancellation decrements exactly what casting
    /// incremented, regardless of how the voter's karma changes afterwards.
    pub extended_power: BTreeMap<String, i64>,
    /// Karma-bearing authors of the target document at cast time.
    pub author_ids: Vec<UserId>,
    pub cancelled: bool,
    pub is_unvote: bool,
    pub voted_at: DateTime<Utc>,
    pub silence_notification: bool,
}

impl Vote {
    /// Whether this vote has any observable effect on the document's
    /// counters (non-zero primary power, or at least one powered extended
    /// axis). Votes without effect are excluded from `vote_count`.
    pub fn has_effect(&self) -> bool {
        self.power != 0 || self.extended_power.values().any(|p| *p != 0)
    }
}
