//! # Voting Shared
//! This crate defines the data structures shared across the voting and karma
//! engine: vote records, voteable documents, user records, rate-limit
//! overrides, and karma-change digest types.
pub mod types;
