use chrono::Utc;

pub use uuid::Uuid;
pub type Time = chrono::DateTime<Utc>;

mod comment;
pub use comment::{Comment, CommentId, Reply, ReplyId, ReplyRef};

mod error;
pub use error::{Error, ErrorKind};

mod sort;
pub use sort::SortMode;

mod store;
pub use store::{DocId, DocStore, Document, FieldOp, FieldPath, StoreEvent, Write};

mod user;
pub use user::{Subject, SubjectId};

mod vote;
pub use vote::{VoteAction, VoteOutcome, VoteTally};

/// Label displayed for anything written without a username
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Collection the comment engine watches unless configured otherwise
pub const DEFAULT_COLLECTION: &str = "forumComments";

// Each `validate` function in this crate checks what the store would otherwise
// accept blindly. Callers run them before issuing any write.

/// Returns the trimmed text, or an error if nothing is left after trimming
pub fn validate_text(s: &str) -> Result<&str, Error> {
    validate_string(s)?;
    match s.trim() {
        "" => Err(Error::EmptyText),
        t => Ok(t),
    }
}

pub fn validate_string(s: &str) -> Result<(), Error> {
    match s.contains('\0') {
        true => Err(Error::NullByteInString(String::from(s))),
        false => Ok(()),
    }
}
