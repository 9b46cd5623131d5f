use uuid::Uuid;

/// Unique identifier of a vote row.
pub type VoteId = Uuid;

/// Unique identifier of a voteable document.
pub type DocumentId = Uuid;

/// Unique identifier of a user.
pub type UserId = Uuid;
