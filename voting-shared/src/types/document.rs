use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DocumentId, UserId};

/// Collections whose documents accept votes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Collection {
    Posts,
    Comments,
    TagRevisions,
}

impl Collection {
    /// Whether votes on this collection propagate karma to the authors.
    /// Tag revisions are voteable but karma-neutral.
    pub fn karma_bearing(&self) -> bool {
        !matches!(self, Collection::TagRevisions)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Posts => write!(f, "Posts"),
            Collection::Comments => write!(f, "Comments"),
            Collection::TagRevisions => write!(f, "TagRevisions"),
        }
    }
}

/// A coauthorship entry on a document. Only confirmed coauthors share in the
/// karma from votes on the document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoauthorStatus {
    pub user_id: UserId,
    pub confirmed: bool,
}

/// Any content item that accepts votes: a post, a comment, or a tag
/// revision.
///
/// `base_score` is the signed sum of primary-axis power over non-cancelled
/// votes; `score` is the derived time-decayed ranking value; the extended
/// axes are tracked per-axis in `extended_score` and never feed either.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoteableDocument {
    pub id: DocumentId,
    pub collection: Collection,
    /// Primary author.
    pub user_id: UserId,
    pub coauthor_statuses: Vec<CoauthorStatus>,
    pub base_score: i64,
    pub score: f64,
    pub vote_count: i64,
    pub extended_score: BTreeMap<String, i64>,
    /// Frozen from periodic score recomputation; cleared by any new vote.
    pub inactive: bool,
    pub posted_at: DateTime<Utc>,
    pub frontpage_date: Option<DateTime<Utc>>,
    pub curated_date: Option<DateTime<Utc>>,
    /// Display fields denormalized for digest rendering.
    pub title: Option<String>,
    pub slug: Option<String>,
    /// For comments: the post the comment belongs to.
    pub post_id: Option<DocumentId>,
    pub post_title: Option<String>,
    pub post_slug: Option<String>,
    /// For comments: the plain-text body used for digest excerpts.
    pub body: Option<String>,
}

impl VoteableDocument {
    /// Creates a fresh, unvoted document.
    pub fn new(
        id: DocumentId,
        collection: Collection,
        user_id: UserId,
        posted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            collection,
            user_id,
            coauthor_statuses: Vec::new(),
            base_score: 0,
            score: 0.0,
            vote_count: 0,
            extended_score: BTreeMap::new(),
            inactive: false,
            posted_at,
            frontpage_date: None,
            curated_date: None,
            title: None,
            slug: None,
            post_id: None,
            post_title: None,
            post_slug: None,
            body: None,
        }
    }

    /// The users credited with karma for votes on this document: the primary
    /// author plus every confirmed coauthor.
    pub fn karma_bearing_authors(&self) -> Vec<UserId> {
        let mut authors = vec![self.user_id];
        for status in &self.coauthor_statuses {
            if status.confirmed && !authors.contains(&status.user_id) {
                authors.push(status.user_id);
            }
        }
        authors
    }

    /// Whether `user_id` is the author or a confirmed coauthor.
    pub fn is_authored_by(&self, user_id: UserId) -> bool {
        self.karma_bearing_authors().contains(&user_id)
    }
}
