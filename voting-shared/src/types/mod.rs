mod document;
mod ids;
mod karma;
mod rate_limit;
mod user;
mod vote;

pub use document::{CoauthorStatus, Collection, VoteableDocument};
pub use ids::{DocumentId, UserId, VoteId};
pub use karma::{
    CommentKarmaChange, DateRange, KarmaChangeReport, KarmaChangeSettings, PostKarmaChange,
    UpdateFrequency,
};
pub use rate_limit::{IntervalUnit, RateLimitedAction, UserRateLimit};
pub use user::UserRecord;
pub use vote::{ExtendedVote, Vote, VoteKind};
