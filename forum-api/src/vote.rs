use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer};

use crate::SubjectId;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteAction {
    Upvote,
    Downvote,
}

impl VoteAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteAction::Upvote => "upvote",
            VoteAction::Downvote => "downvote",
        }
    }
}

impl fmt::Display for VoteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteAction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<VoteAction> {
        match s {
            "upvote" | "up" => Ok(VoteAction::Upvote),
            "downvote" | "down" => Ok(VoteAction::Downvote),
            _ => Err(anyhow::anyhow!("unknown vote action {s:?}")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VoteOutcome {
    /// The subject had no vote on the target
    Cast,

    /// The subject had the opposite vote, which got moved over
    Switched { from: VoteAction },

    /// The subject repeated its vote, which undid it
    Retracted,
}

/// Counters and per-subject vote map of one comment or one reply.
///
/// `votes` counts the `Upvote` entries of `voters` and `downvotes` the
/// `Downvote` ones, as long as every writer goes through [`VoteTally::apply`]
/// on a fresh copy. Lost updates between concurrent writers can break this,
/// in which case counters are clamped at zero rather than going negative.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct VoteTally {
    #[serde(default, deserialize_with = "deserialize_counter")]
    pub votes: u64,

    #[serde(default, deserialize_with = "deserialize_counter")]
    pub downvotes: u64,

    #[serde(default, deserialize_with = "deserialize_voters")]
    pub voters: BTreeMap<SubjectId, VoteAction>,
}

impl VoteTally {
    pub fn vote_of(&self, subject: &SubjectId) -> Option<VoteAction> {
        self.voters.get(subject).copied()
    }

    pub fn score(&self) -> i64 {
        self.votes as i64 - self.downvotes as i64
    }

    fn counter_mut(&mut self, action: VoteAction) -> &mut u64 {
        match action {
            VoteAction::Upvote => &mut self.votes,
            VoteAction::Downvote => &mut self.downvotes,
        }
    }

    fn decrement(&mut self, action: VoteAction) {
        let counter = self.counter_mut(action);
        match counter.checked_sub(1) {
            Some(c) => *counter = c,
            None => tracing::warn!(%action, "vote counter already at zero, not decrementing"),
        }
    }

    /// Applies `action` by `subject`: repeating the current vote retracts it,
    /// anything else casts it (moving the opposite vote over if there was one)
    pub fn apply(&mut self, subject: &SubjectId, action: VoteAction) -> VoteOutcome {
        match self.vote_of(subject) {
            Some(current) if current == action => {
                self.decrement(action);
                self.voters.remove(subject);
                VoteOutcome::Retracted
            }
            current => {
                if let Some(current) = current {
                    self.decrement(current);
                }
                *self.counter_mut(action) += 1;
                self.voters.insert(subject.clone(), action);
                match current {
                    Some(from) => VoteOutcome::Switched { from },
                    None => VoteOutcome::Cast,
                }
            }
        }
    }

    /// Counter deltas `(votes, downvotes)` that turn `before` into `self`
    pub fn delta_since(&self, before: &VoteTally) -> (i64, i64) {
        (
            self.votes as i64 - before.votes as i64,
            self.downvotes as i64 - before.downvotes as i64,
        )
    }
}

// Counters written through concurrent increments may have gone negative or be
// stored as floats, neither of which should make the whole document unreadable
fn deserialize_counter<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let v = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match v {
        Some(serde_json::Value::Number(n)) => match (n.as_u64(), n.as_f64()) {
            (Some(n), _) => n,
            (None, Some(f)) if f > 0.0 => f as u64,
            _ => 0,
        },
        _ => 0,
    })
}

// Older writers stored `null` for a retracted vote instead of removing the key
fn deserialize_voters<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<BTreeMap<SubjectId, VoteAction>, D::Error> {
    let raw = Option::<BTreeMap<SubjectId, Option<VoteAction>>>::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(s, v)| v.map(|v| (s, v)))
        .collect())
}
