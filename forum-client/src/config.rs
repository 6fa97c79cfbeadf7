use std::time::Duration;

use anyhow::Context;
use forum_api::DEFAULT_COLLECTION;

/// How a new reply gets into its parent's reply array
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyAppend {
    /// Read the parent, push, write the whole array back. Two clients
    /// appending from the same read lose one of the replies.
    #[default]
    Rewrite,

    /// Let the store add the reply atomically
    ArrayUnion,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub collection: String,

    /// None waits on the store forever
    pub store_timeout_ms: Option<u64>,

    pub reply_append: ReplyAppend,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            collection: String::from(DEFAULT_COLLECTION),
            store_timeout_ms: None,
            reply_append: ReplyAppend::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> anyhow::Result<EngineConfig> {
        serde_json::from_str(json).context("parsing engine configuration")
    }

    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}
