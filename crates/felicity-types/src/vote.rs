use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A vote value. Serialized as a bare integer: -1, 0 or 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteValue {
    Down,
    Clear,
    Up,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("vote value must be -1, 0 or 1, got {0}")]
pub struct InvalidVote(pub i8);

impl TryFrom<i8> for VoteValue {
    type Error = InvalidVote;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Down),
            0 => Ok(Self::Clear),
            1 => Ok(Self::Up),
            other => Err(InvalidVote(other)),
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Down => -1,
            VoteValue::Clear => 0,
            VoteValue::Up => 1,
        }
    }
}

/// Outcome of applying a vote request on top of the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub value: VoteValue,
    /// Amount to add to the message's tally.
    pub delta: i64,
}

/// Re-submitting the value already held clears it; anything else replaces it.
pub fn transition(previous: VoteValue, requested: VoteValue) -> Transition {
    let value = if requested == previous {
        VoteValue::Clear
    } else {
        requested
    };
    Transition {
        value,
        delta: i64::from(i8::from(value)) - i64::from(i8::from(previous)),
    }
}
