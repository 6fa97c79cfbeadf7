//! Prints a store dump, loadable by `forum-ctl --store`, filled with random
//! comments, replies and votes

use anyhow::Context;
use forum_api::{CommentId, ReplyRef, SubjectId, VoteAction, ANONYMOUS_NAME, DEFAULT_COLLECTION};
use forum_client::{ops, ReplyAppend};
use forum_mock_store::MemoryStore;
use rand::{seq::SliceRandom, Rng};
use serde_json::json;

const NUM_USERS: usize = 6;
const NUM_COMMENTS: usize = 40;
const NUM_LEGACY_COMMENTS: usize = 5;
const NUM_REPLIES: usize = 80;
const NUM_VOTES: usize = 300;
const NUM_DELETES: usize = 10;

const COMMENT_WORD_COUNT: usize = 25;
const REPLY_WORD_COUNT: usize = 10;

fn gen_text(words: usize) -> String {
    lipsum::lipsum_words(rand::thread_rng().gen_range(1..=words))
}

// Legacy documents may lack any field
fn num_replies(doc: &serde_json::Map<String, serde_json::Value>) -> usize {
    doc.get("replies")
        .and_then(serde_json::Value::as_array)
        .map_or(0, Vec::len)
}

/// Deletes `id` on behalf of its author, returning whether there was one
async fn delete_as_author(store: &MemoryStore, id: &CommentId) -> anyhow::Result<bool> {
    let Some(raw) = store.test_read_raw(DEFAULT_COLLECTION, id) else {
        return Ok(false);
    };
    let Some(author) = raw.get("authorId").and_then(serde_json::Value::as_str) else {
        return Ok(false);
    };
    let author = SubjectId::from(author);
    ops::delete_comment(store, DEFAULT_COLLECTION, id, Some(&author)).await?;
    Ok(true)
}

fn gen_action() -> VoteAction {
    match rand::random() {
        true => VoteAction::Upvote,
        false => VoteAction::Downvote,
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let store = MemoryStore::new();
    let c = DEFAULT_COLLECTION;
    let mut rng = rand::thread_rng();

    // Generate users, the last one being anonymous
    let users = (0..NUM_USERS)
        .map(|i| match i + 1 == NUM_USERS {
            true => (SubjectId(format!("anon-{:08}", i)), String::from(ANONYMOUS_NAME)),
            false => (SubjectId(format!("user-{i}")), lipsum::lipsum_title()),
        })
        .collect::<Vec<_>>();
    let gen_user = || users.choose(&mut rand::thread_rng()).expect("no users");

    // Generate comments
    let mut comments: Vec<CommentId> = Vec::new();
    for _ in 0..NUM_COMMENTS {
        let (id, name) = gen_user();
        let text = gen_text(COMMENT_WORD_COUNT);
        comments.push(ops::post_comment(&store, c, id, name, &text).await?);
    }

    // Some comments in the shape older clients wrote them
    for _ in 0..NUM_LEGACY_COMMENTS {
        comments.push(store.test_insert_raw(
            c,
            json!({
                "username": lipsum::lipsum_title(),
                "text": gen_text(COMMENT_WORD_COUNT),
                "votes": rng.gen_range(0..5),
                "replies": [{
                    "username": lipsum::lipsum_title(),
                    "text": gen_text(REPLY_WORD_COUNT),
                }],
            }),
        ));
    }
    let gen_comment = || comments.choose(&mut rand::thread_rng()).expect("no comments");

    // Generate replies, half of them answering another reply
    for _ in 0..NUM_REPLIES {
        let (id, name) = gen_user();
        let parent = gen_comment();
        let target = match rand::random() {
            true => None,
            false => {
                let raw = store.test_read_raw(c, parent).context("comment vanished")?;
                let len = num_replies(&raw);
                (len > 0).then(|| ReplyRef::Index(rand::thread_rng().gen_range(0..len)))
            }
        };
        ops::post_reply(
            &store,
            c,
            parent,
            target,
            id,
            name,
            &gen_text(REPLY_WORD_COUNT),
            ReplyAppend::Rewrite,
        )
        .await?;
    }

    // Generate votes, on comments and replies alike
    for _ in 0..NUM_VOTES {
        let (id, _) = gen_user();
        let parent = gen_comment();
        let raw = store.test_read_raw(c, parent).context("comment vanished")?;
        let len = num_replies(&raw);
        let reply = match rng.gen_bool(0.3) && len > 0 {
            true => Some(ReplyRef::Index(rng.gen_range(0..len))),
            false => None,
        };
        ops::vote(&store, c, parent, reply, Some(id), gen_action()).await?;
    }

    // Delete a few comments, by their authors
    for _ in 0..NUM_DELETES {
        delete_as_author(&store, gen_comment()).await?;
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&store.dump()).context("serializing store dump")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_shapes_have_no_replies() {
        let doc = |v: serde_json::Value| match v {
            serde_json::Value::Object(m) => m,
            _ => panic!("not an object"),
        };
        assert_eq!(num_replies(&doc(json!({ "text": "old" }))), 0);
        assert_eq!(num_replies(&doc(json!({ "replies": null }))), 0);
        assert_eq!(num_replies(&doc(json!({ "replies": [{}, {}] }))), 2);
    }

    #[tokio::test]
    async fn authorless_comments_are_skipped_when_deleting() {
        let store = MemoryStore::new();
        let legacy = store.test_insert_raw(DEFAULT_COLLECTION, json!({ "text": "old" }));
        let owned = store.test_insert_raw(
            DEFAULT_COLLECTION,
            json!({ "authorId": "u1", "text": "new" }),
        );
        assert!(!delete_as_author(&store, &legacy).await.unwrap());
        assert!(store.test_read_raw(DEFAULT_COLLECTION, &legacy).is_some());
        assert!(delete_as_author(&store, &owned).await.unwrap());
        assert!(store.test_read_raw(DEFAULT_COLLECTION, &owned).is_none());
        assert!(!delete_as_author(&store, &owned).await.unwrap());
    }
}
