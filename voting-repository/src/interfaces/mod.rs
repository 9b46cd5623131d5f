mod documents;
mod users;
mod votes;

pub use documents::{DocumentDeltas, DocumentsRepository};
pub use users::UsersRepository;
pub use votes::{CastOutcome, VotesRepository};
