//! Store-level comment operations, each a read-modify-write against the
//! document store with no local state involved.
//!
//! Nothing here guards against concurrent writers: two clients modifying the
//! same comment from the same read will have the last write win. This is
//! observable with any store that does not serialize them, and is accepted.

use anyhow::Context;
use forum_api::{
    validate_string, validate_text, Comment, CommentId, DocStore, FieldOp, FieldPath, Reply,
    ReplyId, ReplyRef, SubjectId, VoteAction, VoteOutcome, Write, ANONYMOUS_NAME,
};
use serde_json::json;

use crate::{Error, ReplyAppend, Result};

async fn fetch_comment<S>(store: &S, collection: &str, id: &CommentId) -> Result<Comment>
where
    S: DocStore + ?Sized,
{
    let doc = store
        .read(collection, id)
        .await?
        .ok_or_else(|| Error::comment_not_found(id))?;
    Ok(Comment::from_document(&doc)?)
}

fn replies_write(replies: &[Reply]) -> Result<Write> {
    let replies = serde_json::to_value(replies).context("serializing replies")?;
    Ok(vec![(FieldPath::field("replies"), FieldOp::Set(replies))])
}

fn require_subject(subject: Option<&SubjectId>) -> Result<&SubjectId> {
    subject.ok_or_else(Error::missing_subject)
}

/// Creates a new top-level comment. It shows up in the cache only once the
/// store delivered the snapshot containing it.
pub async fn post_comment<S>(
    store: &S,
    collection: &str,
    author_id: &SubjectId,
    username: &str,
    text: &str,
) -> Result<CommentId>
where
    S: DocStore + ?Sized,
{
    let text = validate_text(text)?;
    validate_string(username)?;
    let id = store
        .create(
            collection,
            vec![
                (FieldPath::field("authorId"), FieldOp::Set(json!(author_id))),
                (FieldPath::field("username"), FieldOp::Set(json!(username))),
                (FieldPath::field("text"), FieldOp::Set(json!(text))),
                (FieldPath::field("votes"), FieldOp::Set(json!(0))),
                (FieldPath::field("downvotes"), FieldOp::Set(json!(0))),
                (FieldPath::field("replies"), FieldOp::Set(json!([]))),
                (FieldPath::field("voters"), FieldOp::Set(json!({}))),
                (FieldPath::field("timestamp"), FieldOp::ServerTimestamp),
            ],
        )
        .await?;
    tracing::info!(%id, %author_id, "posted comment");
    Ok(id)
}

/// Appends a reply to `comment_id`, answering `target` if given or the
/// comment itself otherwise.
///
/// `replyTo` is resolved from the parent as read here. A target that cannot be
/// found any more gets answered as "Anonymous", as the reply still makes sense.
#[allow(clippy::too_many_arguments)]
pub async fn post_reply<S>(
    store: &S,
    collection: &str,
    comment_id: &CommentId,
    target: Option<ReplyRef>,
    author_id: &SubjectId,
    username: &str,
    text: &str,
    append: ReplyAppend,
) -> Result<ReplyId>
where
    S: DocStore + ?Sized,
{
    let text = validate_text(text)?;
    validate_string(username)?;
    let parent = fetch_comment(store, collection, comment_id).await?;
    let reply_to = match target {
        None => String::from(parent.display_name()),
        Some(r) => match parent.find_reply(&r) {
            Some((_, target)) => String::from(target.display_name()),
            None => {
                tracing::warn!(comment = %comment_id, reply = %r, "reply target vanished");
                String::from(ANONYMOUS_NAME)
            }
        },
    };
    let reply_id = ReplyId::new();
    let reply = Reply::new(
        reply_id,
        author_id.clone(),
        String::from(username),
        String::from(text),
        reply_to,
    );
    let write = match append {
        ReplyAppend::Rewrite => {
            let mut replies = parent.replies;
            replies.push(reply);
            replies_write(&replies)?
        }
        ReplyAppend::ArrayUnion => {
            let reply = serde_json::to_value(&reply).context("serializing reply")?;
            vec![(FieldPath::field("replies"), FieldOp::ArrayUnion(vec![reply]))]
        }
    };
    tracing::debug!(comment = %comment_id, ?append, "writing reply");
    store.update(collection, comment_id, write).await?;
    tracing::info!(comment = %comment_id, reply = %reply_id.0, %author_id, "posted reply");
    Ok(reply_id)
}

/// Toggles `subject`'s `action` vote on a comment, or on one of its replies if
/// `reply` is set.
///
/// The current vote is read from the store right before writing. A comment's
/// counters and voter entry go out as one partial update; a reply's require
/// rewriting the whole reply array.
pub async fn vote<S>(
    store: &S,
    collection: &str,
    comment_id: &CommentId,
    reply: Option<ReplyRef>,
    subject: Option<&SubjectId>,
    action: VoteAction,
) -> Result<VoteOutcome>
where
    S: DocStore + ?Sized,
{
    let subject = require_subject(subject)?;
    let parent = fetch_comment(store, collection, comment_id).await?;
    let (outcome, write) = match reply {
        None => {
            let before = parent.tally;
            let mut after = before.clone();
            let outcome = after.apply(subject, action);
            let (votes, downvotes) = after.delta_since(&before);
            let mut write = Vec::with_capacity(3);
            if votes != 0 {
                write.push((FieldPath::field("votes"), FieldOp::Increment(votes)));
            }
            if downvotes != 0 {
                write.push((FieldPath::field("downvotes"), FieldOp::Increment(downvotes)));
            }
            let voter = FieldPath::nested("voters", subject.as_str());
            write.push(match after.vote_of(subject) {
                Some(a) => (voter, FieldOp::Set(json!(a))),
                None => (voter, FieldOp::Remove),
            });
            (outcome, write)
        }
        Some(r) => {
            let index = parent
                .find_reply(&r)
                .map(|(i, _)| i)
                .ok_or_else(|| Error::reply_not_found(comment_id, r))?;
            let mut replies = parent.replies;
            let outcome = replies[index].tally.apply(subject, action);
            (outcome, replies_write(&replies)?)
        }
    };
    tracing::debug!(comment = %comment_id, ?reply, %subject, %action, ?outcome, "writing vote");
    store.update(collection, comment_id, write).await?;
    Ok(outcome)
}

/// Deletes a comment along with its replies, if `requester` wrote it
pub async fn delete_comment<S>(
    store: &S,
    collection: &str,
    comment_id: &CommentId,
    requester: Option<&SubjectId>,
) -> Result<()>
where
    S: DocStore + ?Sized,
{
    let requester = require_subject(requester)?;
    let comment = fetch_comment(store, collection, comment_id).await?;
    if !comment.is_authored_by(requester) {
        tracing::info!(comment = %comment_id, %requester, "refusing to delete comment of someone else");
        return Err(Error::permission_denied());
    }
    store.delete(collection, comment_id).await?;
    tracing::info!(comment = %comment_id, "deleted comment");
    Ok(())
}

/// Removes a reply from its parent, if `requester` wrote it, and returns it.
///
/// Every reply after the removed one moves down one position.
pub async fn delete_reply<S>(
    store: &S,
    collection: &str,
    comment_id: &CommentId,
    reply: ReplyRef,
    requester: Option<&SubjectId>,
) -> Result<Reply>
where
    S: DocStore + ?Sized,
{
    let requester = require_subject(requester)?;
    let parent = fetch_comment(store, collection, comment_id).await?;
    let index = match parent.find_reply(&reply) {
        None => return Err(Error::reply_not_found(comment_id, reply)),
        Some((i, r)) if r.is_authored_by(requester) => i,
        Some(_) => {
            tracing::info!(comment = %comment_id, %reply, %requester, "refusing to delete reply of someone else");
            return Err(Error::permission_denied());
        }
    };
    let mut replies = parent.replies;
    let removed = replies.remove(index);
    store
        .update(collection, comment_id, replies_write(&replies)?)
        .await?;
    tracing::info!(comment = %comment_id, %reply, "deleted reply");
    Ok(removed)
}
