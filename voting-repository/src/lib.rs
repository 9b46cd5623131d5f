//! # Voting Repository
//! This crate provides traits and implementations for the voting engine's
//! data stores: the vote ledger, the voteable-document store, and the user
//! store. It includes definitions for errors, interfaces, an in-process
//! implementation, and a concrete implementation for PostgreSQL.
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;

pub use errors::RepositoryError;
pub use interfaces::{
    CastOutcome, DocumentDeltas, DocumentsRepository, UsersRepository, VotesRepository,
};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
