use std::{cmp::Reverse, sync::Arc};

use crate::api::{Comment, SortMode};

pub trait SortExt {
    fn sort(&self, comments: &mut [Arc<Comment>]);
}

// Comments whose timestamp the store did not resolve yet count as the oldest
fn millis(c: &Comment) -> i64 {
    c.timestamp.map(|t| t.timestamp_millis()).unwrap_or(0)
}

impl SortExt for SortMode {
    fn sort(&self, comments: &mut [Arc<Comment>]) {
        match self {
            SortMode::Recency => {
                comments.sort_unstable_by(|a, b| {
                    (Reverse(millis(a)), &a.id).cmp(&(Reverse(millis(b)), &b.id))
                })
            }
            // Equal scores fall back to recency, so the listing does not jitter
            // between snapshots
            SortMode::Votes => comments.sort_unstable_by(|a, b| {
                (Reverse(a.score()), Reverse(millis(a)), &a.id).cmp(&(
                    Reverse(b.score()),
                    Reverse(millis(b)),
                    &b.id,
                ))
            }),
        }
    }
}

/// Display order of `comments`, leaving the input untouched
pub fn render_order(comments: &[Arc<Comment>], mode: SortMode) -> Vec<Arc<Comment>> {
    let mut res = comments.to_vec();
    mode.sort(&mut res);
    res
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::api::{DocId, VoteTally};

    fn comment(id: &str, votes: u64, downvotes: u64, at: Option<i64>) -> Arc<Comment> {
        Arc::new(Comment {
            id: DocId(String::from(id)),
            author_id: None,
            username: None,
            text: String::from(id),
            tally: VoteTally {
                votes,
                downvotes,
                ..VoteTally::default()
            },
            replies: Vec::new(),
            timestamp: at.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        })
    }

    fn ids(v: &[Arc<Comment>]) -> Vec<&str> {
        v.iter().map(|c| c.id.0.as_str()).collect()
    }

    #[test]
    fn votes_order_by_score() {
        let input = vec![comment("a", 5, 1, Some(1)), comment("b", 2, 0, Some(2))];
        assert_eq!(ids(&render_order(&input, SortMode::Votes)), ["a", "b"]);

        let input = vec![comment("neg", 1, 3, Some(2)), comment("zero", 0, 0, Some(1))];
        assert_eq!(ids(&render_order(&input, SortMode::Votes)), ["zero", "neg"]);
    }

    #[test]
    fn votes_ties_prefer_newer() {
        let input = vec![
            comment("old", 3, 1, Some(10)),
            comment("new", 2, 0, Some(20)),
            comment("top", 9, 0, Some(5)),
        ];
        assert_eq!(
            ids(&render_order(&input, SortMode::Votes)),
            ["top", "new", "old"]
        );
    }

    #[test]
    fn recency_puts_unresolved_last() {
        let input = vec![
            comment("pending", 0, 0, None),
            comment("old", 0, 0, Some(100)),
            comment("new", 0, 0, Some(200)),
        ];
        assert_eq!(
            ids(&render_order(&input, SortMode::Recency)),
            ["new", "old", "pending"]
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let input = vec![comment("a", 0, 0, Some(1)), comment("b", 0, 0, Some(2))];
        let sorted = render_order(&input, SortMode::Recency);
        assert_eq!(ids(&sorted), ["b", "a"]);
        assert_eq!(ids(&input), ["a", "b"]);
    }
}
