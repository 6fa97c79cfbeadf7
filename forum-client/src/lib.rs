mod config;
pub use config::{EngineConfig, ReplyAppend};

mod engine;
pub use engine::{CommentEngine, EngineEvent, SnapshotFeed};

mod error;
pub use error::{Error, Result};

mod identity;
pub use identity::{
    Actor, IdentityProvider, IdentityResolver, StaticIdentity, ANON_ID_KEY, ANON_NAME_KEY,
};

pub mod ops;

mod order;
pub use order::{render_order, SortExt};

mod render;
pub use render::{RenderView, RenderedComment, RenderedReply};

mod storage;
pub use storage::{FileStorage, LocalStorage, MemoryStorage};


pub mod api {
    pub use forum_api::*;
}
