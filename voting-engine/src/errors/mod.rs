mod karma;
mod vote;

pub use karma::KarmaChangeError;
pub use vote::VoteError;
