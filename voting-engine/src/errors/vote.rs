//! Error types for vote casting.
//! Defines specific errors that can occur while resolving and applying a
//! vote.
use thiserror::Error;
use voting_repository::RepositoryError;
use voting_shared::types::DocumentId;

/// Represents errors that can occur while casting a vote.
#[derive(Debug, Error)]
pub enum VoteError {
    /// The voter has exhausted their allowance for the named interval.
    /// The message is user-facing, so it names the window in words.
    #[error("Voting rate limit exceeded: too many votes in one {unit}")]
    RateLimited { unit: &'static str },

    #[error("Invalid vote: {0}")]
    Validation(String),

    #[error("Document not found: {0}")]
    NotFound(DocumentId),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
