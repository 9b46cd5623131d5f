//! This module defines the `DocumentsRepository` trait, the store of
//! voteable documents with the atomic counter increments vote casting
//! relies on.
use std::collections::BTreeMap;

use voting_shared::types::{Collection, DocumentId, VoteableDocument};

use crate::errors::RepositoryError;

/// Incremental counter updates produced by a single vote cast or
/// retraction. Deltas are applied as atomic increments so concurrent casts
/// by different users never lose an update.
#[derive(Clone, Debug, Default)]
pub struct DocumentDeltas {
    pub base_score: i64,
    pub vote_count: i64,
    pub extended_score: BTreeMap<String, i64>,
    /// Clears the `inactive` flag: a vote reactivates frozen content.
    pub reactivate: bool,
}

/// A trait that defines the interface for the voteable-document store.
#[async_trait::async_trait]
pub trait DocumentsRepository: Send + Sync {
    /// Fetches a document by collection and id.
    async fn get(
        &self,
        collection: Collection,
        document_id: DocumentId,
    ) -> Result<Option<VoteableDocument>, RepositoryError>;

    /// Inserts or fully replaces a document.
    async fn upsert(&self, document: VoteableDocument) -> Result<(), RepositoryError>;

    /// Applies counter deltas atomically and returns the updated document.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::DocumentNotFound` if the document does not
    /// exist.
    async fn apply_deltas(
        &self,
        collection: Collection,
        document_id: DocumentId,
        deltas: &DocumentDeltas,
    ) -> Result<VoteableDocument, RepositoryError>;

    /// Writes a recomputed ranking score, optionally setting the `inactive`
    /// flag in the same write. `inactive: None` leaves the flag untouched.
    async fn set_score(
        &self,
        collection: Collection,
        document_id: DocumentId,
        score: f64,
        inactive: Option<bool>,
    ) -> Result<(), RepositoryError>;

    /// All documents in `collection` not flagged inactive.
    async fn active_documents(
        &self,
        collection: Collection,
    ) -> Result<Vec<VoteableDocument>, RepositoryError>;
}
