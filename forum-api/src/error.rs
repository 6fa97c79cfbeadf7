use crate::{CommentId, ReplyRef};

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Text must not be empty")]
    EmptyText,

    #[error("No subject identity is available for this action")]
    MissingSubject,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Comment not found {0}")]
    CommentNotFound(CommentId),

    #[error("Reply {reply} not found in comment {comment}")]
    ReplyNotFound { comment: CommentId, reply: ReplyRef },

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Rejected before any store call
    Validation,

    /// Rejected after a read-check, nothing was written
    Authorization,

    /// The target vanished between display and action
    NotFound,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EmptyText | Error::MissingSubject | Error::NullByteInString(_) => {
                ErrorKind::Validation
            }
            Error::PermissionDenied => ErrorKind::Authorization,
            Error::CommentNotFound(_) | Error::ReplyNotFound { .. } => ErrorKind::NotFound,
        }
    }
}
