use std::{fmt, str::FromStr};

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::{DocId, Document, SubjectId, Time, VoteTally, ANONYMOUS_NAME};

pub type CommentId = DocId;

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct ReplyId(pub Uuid);

impl ReplyId {
    pub fn new() -> ReplyId {
        ReplyId(Uuid::new_v4())
    }
}

/// How an operation designates a reply within its parent comment.
///
/// `Index` is the positional addressing older clients used: deleting a reply
/// shifts every later index down by one, so an index is only meaningful
/// against the snapshot it was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplyRef {
    Id(ReplyId),
    Index(usize),
}

impl fmt::Display for ReplyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyRef::Id(id) => write!(f, "{}", id.0),
            ReplyRef::Index(i) => write!(f, "#{i}"),
        }
    }
}

impl FromStr for ReplyRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<ReplyRef> {
        let s = s.strip_prefix('#').unwrap_or(s);
        if let Ok(i) = s.parse::<usize>() {
            return Ok(ReplyRef::Index(i));
        }
        let id = Uuid::try_parse(s).with_context(|| format!("parsing reply reference {s:?}"))?;
        Ok(ReplyRef::Id(ReplyId(id)))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(skip)]
    pub id: CommentId,

    /// Absent on documents written before authorship was recorded
    #[serde(default)]
    pub author_id: Option<SubjectId>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub text: String,

    #[serde(flatten)]
    pub tally: VoteTally,

    /// In creation order
    #[serde(default, deserialize_with = "deserialize_replies")]
    pub replies: Vec<Reply>,

    /// Server-assigned, None until the store resolved it
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub timestamp: Option<Time>,
}

impl Comment {
    pub fn from_document(doc: &Document) -> anyhow::Result<Comment> {
        let mut c: Comment = serde_json::from_value(serde_json::Value::Object(doc.data.clone()))
            .with_context(|| format!("decoding comment document {}", doc.id))?;
        c.id = doc.id.clone();
        Ok(c)
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(ANONYMOUS_NAME)
    }

    pub fn is_authored_by(&self, subject: &SubjectId) -> bool {
        self.author_id.as_ref() == Some(subject)
    }

    pub fn score(&self) -> i64 {
        self.tally.score()
    }

    /// Resolves `r` against the current reply list
    pub fn find_reply(&self, r: &ReplyRef) -> Option<(usize, &Reply)> {
        match r {
            ReplyRef::Index(i) => self.replies.get(*i).map(|reply| (*i, reply)),
            ReplyRef::Id(id) => self
                .replies
                .iter()
                .enumerate()
                .find(|(_, reply)| reply.id.as_ref() == Some(id)),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// Absent on replies written by positional-only clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ReplyId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<SubjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default)]
    pub text: String,

    /// Username of the comment or reply this answers, copied at creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,

    #[serde(flatten)]
    pub tally: VoteTally,

    /// Fields written by other clients, kept as-is when the reply array gets
    /// rewritten. Must stay after every other flattened field.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Reply {
    pub fn new(
        id: ReplyId,
        author_id: SubjectId,
        username: String,
        text: String,
        reply_to: String,
    ) -> Reply {
        Reply {
            id: Some(id),
            author_id: Some(author_id),
            username: Some(username),
            text,
            reply_to: Some(reply_to),
            tally: VoteTally::default(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(ANONYMOUS_NAME)
    }

    pub fn reply_to_display<'a>(&'a self, parent: &'a Comment) -> &'a str {
        self.reply_to
            .as_deref()
            .unwrap_or_else(|| parent.display_name())
    }

    pub fn is_authored_by(&self, subject: &SubjectId) -> bool {
        self.author_id.as_ref() == Some(subject)
    }
}

fn deserialize_replies<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Reply>, D::Error> {
    Ok(Option::<Vec<Reply>>::deserialize(d)?.unwrap_or_default())
}

// Unresolved timestamps come back as null; some exports carry epoch millis
fn deserialize_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Time>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        Some(serde_json::Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::VoteAction;

    fn doc(id: &str, data: serde_json::Value) -> Document {
        match data {
            serde_json::Value::Object(data) => Document {
                id: DocId(String::from(id)),
                data,
            },
            _ => panic!("document data must be an object"),
        }
    }

    #[test]
    fn decodes_full_document() {
        let c = Comment::from_document(&doc(
            "c1",
            json!({
                "authorId": "u1",
                "username": "alice",
                "text": "hello",
                "votes": 2,
                "downvotes": 1,
                "voters": { "u2": "upvote", "u3": "upvote", "u4": "downvote" },
                "timestamp": "2024-03-01T10:00:00Z",
                "replies": [{
                    "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
                    "authorId": "u2",
                    "username": "bob",
                    "text": "hi",
                    "replyTo": "alice",
                    "votes": 1,
                    "voters": { "u1": "upvote" },
                }],
            }),
        ))
        .unwrap();
        assert_eq!(c.id, DocId(String::from("c1")));
        assert!(c.is_authored_by(&SubjectId::from("u1")));
        assert_eq!(c.score(), 1);
        assert_eq!(c.tally.vote_of(&SubjectId::from("u4")), Some(VoteAction::Downvote));
        assert_eq!(
            c.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(c.replies.len(), 1);
        assert_eq!(c.replies[0].tally.votes, 1);
        assert_eq!(c.replies[0].reply_to_display(&c), "alice");
    }

    #[test]
    fn decodes_legacy_document() {
        let c = Comment::from_document(&doc(
            "c2",
            json!({
                "text": "old",
                "timestamp": null,
                "replies": [{ "username": "bob", "text": "hi" }],
            }),
        ))
        .unwrap();
        assert_eq!(c.author_id, None);
        assert_eq!(c.display_name(), ANONYMOUS_NAME);
        assert_eq!(c.tally, VoteTally::default());
        assert_eq!(c.timestamp, None);
        assert_eq!(c.replies[0].id, None);
        assert_eq!(c.replies[0].reply_to_display(&c), ANONYMOUS_NAME);
        assert!(!c.is_authored_by(&SubjectId::default()));
    }

    #[test]
    fn reply_refs_resolve() {
        let mut c = Comment::from_document(&doc("c3", json!({ "text": "t" }))).unwrap();
        let reply = |who: &str, text: &str| {
            Reply::new(
                ReplyId::new(),
                SubjectId::from(who),
                String::from(who),
                String::from(text),
                String::from("x"),
            )
        };
        let a = reply("a", "1");
        let b = reply("b", "2");
        let b_id = b.id.unwrap();
        c.replies = vec![a, b];
        assert_eq!(c.find_reply(&ReplyRef::Index(1)).map(|(i, _)| i), Some(1));
        assert_eq!(c.find_reply(&ReplyRef::Id(b_id)).map(|(i, _)| i), Some(1));
        assert!(c.find_reply(&ReplyRef::Index(2)).is_none());
        c.replies.remove(0);
        assert_eq!(c.find_reply(&ReplyRef::Id(b_id)).map(|(i, _)| i), Some(0));
    }

    #[test]
    fn unknown_reply_fields_survive_a_rewrite() {
        let raw = json!({
            "username": "bob",
            "text": "hi",
            "timestamp": "2024-03-01T10:00:00Z",
            "avatar": { "url": "https://example.org/bob.png" },
            "votes": 2,
            "voters": { "a": "upvote", "c": "upvote" },
        });
        let mut reply: Reply = serde_json::from_value(raw).unwrap();
        assert_eq!(reply.tally.votes, 2);
        assert_eq!(reply.extra.len(), 2);
        assert!(!reply.extra.contains_key("votes"));

        reply.tally.apply(&SubjectId::from("b"), VoteAction::Upvote);
        let written = serde_json::to_value(&reply).unwrap();
        assert_eq!(written["timestamp"], "2024-03-01T10:00:00Z");
        assert_eq!(written["avatar"]["url"], "https://example.org/bob.png");
        assert_eq!(written["votes"], 3);
        assert_eq!(written["voters"]["b"], "upvote");
    }

    #[test]
    fn reply_refs_parse() {
        assert_eq!("3".parse::<ReplyRef>().unwrap(), ReplyRef::Index(3));
        assert_eq!("#0".parse::<ReplyRef>().unwrap(), ReplyRef::Index(0));
        assert_eq!(
            "67e55044-10b1-426f-9247-bb680e5fe0c8".parse::<ReplyRef>().unwrap(),
            ReplyRef::Id(ReplyId(uuid::uuid!("67e55044-10b1-426f-9247-bb680e5fe0c8")))
        );
        assert!("nope".parse::<ReplyRef>().is_err());
    }
}
