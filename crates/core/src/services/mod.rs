//! Business logic services.

#![allow(missing_docs)]

pub mod poll;
pub mod vote;

pub use poll::{CreatePollInput, PollService, PollWithTally};
pub use vote::{Tally, VoteService};
