//! Per-issue vote ledger.
//!
//! A voter is in exactly one of three states relative to an issue. Asking for
//! the direction you already hold retracts the vote; asking for the other
//! direction switches it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteDirection {
    #[serde(rename = "upvote", alias = "up")]
    Up,
    #[serde(rename = "downvote", alias = "down")]
    Down,
}

impl VoteDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteDirection::Up => "up",
            VoteDirection::Down => "down",
        }
    }
}

impl fmt::Display for VoteDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" | "upvote" => Ok(VoteDirection::Up),
            "down" | "downvote" => Ok(VoteDirection::Down),
            other => Err(format!(
                "Invalid vote type '{}'. Must be one of: upvote, downvote",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteState {
    #[default]
    Unvoted,
    Upvoted,
    Downvoted,
}

impl VoteState {
    pub fn apply(self, direction: VoteDirection) -> VoteState {
        transition(self, direction).0
    }

    /// The direction this state is stored as, `None` when unvoted.
    pub fn direction(self) -> Option<VoteDirection> {
        match self {
            VoteState::Unvoted => None,
            VoteState::Upvoted => Some(VoteDirection::Up),
            VoteState::Downvoted => Some(VoteDirection::Down),
        }
    }

    pub fn from_direction(direction: Option<VoteDirection>) -> VoteState {
        match direction {
            None => VoteState::Unvoted,
            Some(VoteDirection::Up) => VoteState::Upvoted,
            Some(VoteDirection::Down) => VoteState::Downvoted,
        }
    }
}

/// Counter changes produced by one transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteDelta {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteDelta {
    const fn new(upvotes: i64, downvotes: i64) -> Self {
        VoteDelta { upvotes, downvotes }
    }
}

pub fn transition(current: VoteState, direction: VoteDirection) -> (VoteState, VoteDelta) {
    use VoteDirection::{Down, Up};
    use VoteState::{Downvoted, Unvoted, Upvoted};

    match (current, direction) {
        (Unvoted, Up) => (Upvoted, VoteDelta::new(1, 0)),
        (Unvoted, Down) => (Downvoted, VoteDelta::new(0, 1)),
        (Upvoted, Up) => (Unvoted, VoteDelta::new(-1, 0)),
        (Upvoted, Down) => (Downvoted, VoteDelta::new(-1, 1)),
        (Downvoted, Down) => (Unvoted, VoteDelta::new(0, -1)),
        (Downvoted, Up) => (Upvoted, VoteDelta::new(1, -1)),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteLedger {
    pub upvotes: u32,
    pub downvotes: u32,
    pub upvoted_by: BTreeSet<String>,
    pub downvoted_by: BTreeSet<String>,
}

impl VoteLedger {
    pub fn state_of(&self, identity: &str) -> VoteState {
        if self.upvoted_by.contains(identity) {
            VoteState::Upvoted
        } else if self.downvoted_by.contains(identity) {
            VoteState::Downvoted
        } else {
            VoteState::Unvoted
        }
    }

    /// Applies `direction` for `identity` and returns the identity's new state.
    pub fn apply(&mut self, identity: &str, direction: VoteDirection) -> VoteState {
        let current = self.state_of(identity);
        let (next, _) = transition(current, direction);

        self.upvoted_by.remove(identity);
        self.downvoted_by.remove(identity);
        match next {
            VoteState::Upvoted => {
                self.upvoted_by.insert(identity.to_string());
            }
            VoteState::Downvoted => {
                self.downvoted_by.insert(identity.to_string());
            }
            VoteState::Unvoted => {}
        }

        // Counts are the cardinality of the sets, never adjusted independently.
        self.upvotes = self.upvoted_by.len() as u32;
        self.downvotes = self.downvoted_by.len() as u32;
        next
    }

    pub fn is_consistent(&self) -> bool {
        self.upvotes as usize == self.upvoted_by.len()
            && self.downvotes as usize == self.downvoted_by.len()
            && self.upvoted_by.is_disjoint(&self.downvoted_by)
    }
}
