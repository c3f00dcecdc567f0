//! Database repositories.

mod poll;
mod vote;

pub use poll::PollRepository;
pub use vote::{OptionTally, VoteRepository};
