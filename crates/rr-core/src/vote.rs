//! # Vote Engine
//!
//! Decides what a new vote request does to the (at most one) existing vote of
//! the same caster on the same target, and what that means for the target's
//! counters. Storage adapters run this inside the transaction that reads the
//! prior vote, so the read-decide-write sequence is atomic per (caster, target).

use serde::Serialize;

use crate::models::{ProfileId, Tally, VoteValue};

/// The state change a vote request causes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum VoteTransition {
    /// No prior vote: store `value`.
    Create { value: VoteValue },
    /// Prior vote equal to the request: delete it.
    Cancel { value: VoteValue },
    /// Prior vote opposite to the request: flip it.
    Reverse { from: VoteValue, to: VoteValue },
}

impl VoteTransition {
    pub fn resolve(prior: Option<VoteValue>, requested: VoteValue) -> Self {
        match prior {
            None => VoteTransition::Create { value: requested },
            Some(prior) if prior == requested => VoteTransition::Cancel { value: prior },
            Some(prior) => VoteTransition::Reverse { from: prior, to: requested },
        }
    }

    /// Score change observed by the caller.
    pub fn delta(&self) -> i64 {
        match *self {
            VoteTransition::Create { value } => value.as_i64(),
            VoteTransition::Cancel { value } => -value.as_i64(),
            VoteTransition::Reverse { from, to } => to.as_i64() - from.as_i64(),
        }
    }

    /// Vote value stored after the transition; `None` means the row is deleted.
    pub fn stored_value(&self) -> Option<VoteValue> {
        match *self {
            VoteTransition::Create { value } => Some(value),
            VoteTransition::Cancel { .. } => None,
            VoteTransition::Reverse { to, .. } => Some(to),
        }
    }

    /// Relative counter change to apply to the target.
    pub fn change(&self) -> TallyChange {
        let mut change = TallyChange::default();
        match *self {
            VoteTransition::Create { value } => change.add(value, 1),
            VoteTransition::Cancel { value } => change.add(value, -1),
            VoteTransition::Reverse { from, to } => {
                change.add(from, -1);
                change.add(to, 1);
            }
        }
        change
    }
}

/// Relative adjustment of a [`Tally`].
///
/// Stores apply it as `col = col + ?` so concurrent writers on other
/// (caster, target) pairs never overwrite each other's counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyChange {
    pub ups: i64,
    pub downs: i64,
    pub score: i64,
}

impl TallyChange {
    fn add(&mut self, value: VoteValue, times: i64) {
        match value {
            VoteValue::Up => self.ups += times,
            VoteValue::Down => self.downs += times,
        }
        self.score += value.as_i64() * times;
    }

    pub fn apply(&self, tally: &mut Tally) {
        tally.ups += self.ups;
        tally.downs += self.downs;
        tally.score += self.score;
    }
}

/// Result of a cast, as committed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    #[serde(flatten)]
    pub transition: VoteTransition,
    /// Counters of the target after the commit
    pub tally: Tally,
    /// Author of the target, credited with the karma change
    pub author_id: ProfileId,
}

impl VoteOutcome {
    pub fn delta(&self) -> i64 {
        self.transition.delta()
    }
}
