//! Error types for the voting stores.
//! Defines specific errors that can occur during persistence and retrieval
//! of votes, documents, and users.
use thiserror::Error;
use voting_shared::types::{Collection, DocumentId, UserId};

/// Represents errors that can occur within the voting stores.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Document not found: {0} in {1}")]
    DocumentNotFound(DocumentId, Collection),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Invalid vote kind: {0}")]
    InvalidVoteKind(i16),

    #[error("Invalid collection: {0}")]
    InvalidCollection(i16),
}
