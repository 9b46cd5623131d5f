//! Error types for karma-change digests.
use thiserror::Error;
use voting_repository::RepositoryError;
use voting_shared::types::UserId;

/// Represents errors that can occur while assembling a karma-change digest.
#[derive(Debug, Error)]
pub enum KarmaChangeError {
    #[error("Invalid karma change query: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
