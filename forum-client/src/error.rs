use std::time::Duration;

use forum_api::{CommentId, Error as ApiError, ErrorKind, ReplyRef};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transport or store-side failure. Never retried by the engine.
    #[error("document store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("document store did not answer within {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn missing_subject() -> Error {
        Error::Api(ApiError::MissingSubject)
    }

    pub fn comment_not_found(id: &CommentId) -> Error {
        Error::Api(ApiError::CommentNotFound(id.clone()))
    }

    pub fn reply_not_found(comment: &CommentId, reply: ReplyRef) -> Error {
        Error::Api(ApiError::ReplyNotFound {
            comment: comment.clone(),
            reply,
        })
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.api().map(ApiError::kind)
    }

    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    /// Whether re-invoking the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Api(_) => false,
            Error::Store(_) | Error::Timeout(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
