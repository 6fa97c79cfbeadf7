use std::sync::Arc;

use crate::{
    api::{Comment, CommentId, ReplyId, SortMode, SubjectId, VoteAction},
    order::render_order,
};

/// Display-ready projection of the comment cache for one viewer
#[derive(Clone, Debug, PartialEq)]
pub struct RenderView {
    pub sort: SortMode,
    pub viewer: Option<SubjectId>,
    pub comments: Vec<RenderedComment>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedComment {
    pub comment: Arc<Comment>,
    pub score: i64,
    pub my_vote: Option<VoteAction>,
    pub can_delete: bool,
    pub replies: Vec<RenderedReply>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedReply {
    /// Position in the parent, only valid for the snapshot this was built from
    pub index: usize,
    pub id: Option<ReplyId>,
    pub username: String,
    pub reply_to: String,
    pub text: String,
    pub votes: u64,
    pub downvotes: u64,
    pub my_vote: Option<VoteAction>,
    pub can_delete: bool,
}

impl RenderView {
    pub fn empty(sort: SortMode) -> RenderView {
        RenderView {
            sort,
            viewer: None,
            comments: Vec::new(),
        }
    }

    pub fn build(
        comments: &[Arc<Comment>],
        sort: SortMode,
        viewer: Option<&SubjectId>,
    ) -> RenderView {
        let my_vote = |tally: &crate::api::VoteTally| viewer.and_then(|v| tally.vote_of(v));
        let comments = render_order(comments, sort)
            .into_iter()
            .map(|c| {
                let replies = c
                    .replies
                    .iter()
                    .enumerate()
                    .map(|(index, r)| RenderedReply {
                        index,
                        id: r.id,
                        username: String::from(r.display_name()),
                        reply_to: String::from(r.reply_to_display(&c)),
                        text: r.text.clone(),
                        votes: r.tally.votes,
                        downvotes: r.tally.downvotes,
                        my_vote: my_vote(&r.tally),
                        can_delete: viewer.map_or(false, |v| r.is_authored_by(v)),
                    })
                    .collect();
                RenderedComment {
                    score: c.score(),
                    my_vote: my_vote(&c.tally),
                    can_delete: viewer.map_or(false, |v| c.is_authored_by(v)),
                    replies,
                    comment: c,
                }
            })
            .collect();
        RenderView {
            sort,
            viewer: viewer.cloned(),
            comments,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    pub fn get(&self, id: &CommentId) -> Option<&RenderedComment> {
        self.comments.iter().find(|c| c.comment.id == *id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DocId, Reply, VoteTally};

    #[test]
    fn viewer_flags() {
        let me = SubjectId::from("me");
        let other = SubjectId::from("other");
        let mut reply = Reply::new(
            ReplyId::new(),
            other.clone(),
            String::from("o"),
            String::from("hey"),
            String::from("m"),
        );
        reply.tally.apply(&me, VoteAction::Downvote);
        let mut tally = VoteTally::default();
        tally.apply(&me, VoteAction::Upvote);
        let c = Arc::new(Comment {
            id: DocId(String::from("c")),
            author_id: Some(me.clone()),
            username: Some(String::from("m")),
            text: String::from("hello"),
            tally,
            replies: vec![reply],
            timestamp: None,
        });

        let view = RenderView::build(&[c.clone()], SortMode::Recency, Some(&me));
        let rc = view.get(&c.id).unwrap();
        assert!(rc.can_delete);
        assert_eq!(rc.score, 1);
        assert_eq!(rc.my_vote, Some(VoteAction::Upvote));
        assert_eq!(rc.replies[0].index, 0);
        assert_eq!(rc.replies[0].reply_to, "m");
        assert!(!rc.replies[0].can_delete);
        assert_eq!(rc.replies[0].my_vote, Some(VoteAction::Downvote));

        let view = RenderView::build(&[c.clone()], SortMode::Recency, Some(&other));
        let rc = view.get(&c.id).unwrap();
        assert!(!rc.can_delete);
        assert_eq!(rc.my_vote, None);
        assert!(rc.replies[0].can_delete);

        let view = RenderView::build(&[c], SortMode::Votes, None);
        assert!(!view.comments[0].can_delete);
        assert!(!view.comments[0].replies[0].can_delete);
    }
}
