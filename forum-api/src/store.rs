use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Store-assigned identifier of a document, opaque to the engine
#[derive(
    Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[serde(transparent)]
pub struct DocId(pub String);

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Document {
    pub id: DocId,
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Path to a (possibly nested) field, one map key per segment
#[derive(Clone, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn field(name: &str) -> FieldPath {
        FieldPath(vec![String::from(name)])
    }

    pub fn nested(parent: &str, key: &str) -> FieldPath {
        FieldPath(vec![String::from(parent), String::from(key)])
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

#[derive(Clone, Debug, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FieldOp {
    Set(serde_json::Value),
    Remove,

    /// Atomic add, treating a missing or non-numeric field as 0
    Increment(i64),

    /// Atomic set-add of each element not already present in the array
    ArrayUnion(Vec<serde_json::Value>),

    /// Atomic removal of every element equal to one of these
    ArrayRemove(Vec<serde_json::Value>),

    /// Replaced by the store with the RFC 3339 time of the write. Times issued
    /// by one store are strictly increasing.
    ServerTimestamp,
}

/// One logical write: all the field operations are applied together
pub type Write = Vec<(FieldPath, FieldOp)>;

#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// The full current content of the watched collection
    Snapshot(Vec<Document>),

    /// The subscription hit an error; later snapshots may still follow
    Error(String),
}

/// A schemaless document collection with realtime snapshots.
///
/// No ordering is guaranteed between a write completing and the snapshot that
/// reflects it reaching subscribers.
#[async_trait]
pub trait DocStore: Send + Sync {
    async fn create(&self, collection: &str, write: Write) -> anyhow::Result<DocId>;

    /// Fails if the document does not exist
    async fn update(&self, collection: &str, id: &DocId, write: Write) -> anyhow::Result<()>;

    async fn read(&self, collection: &str, id: &DocId) -> anyhow::Result<Option<Document>>;

    /// Deleting an absent document is not an error
    async fn delete(&self, collection: &str, id: &DocId) -> anyhow::Result<()>;

    /// The first event delivered is the current snapshot
    async fn subscribe(
        &self,
        collection: &str,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<StoreEvent>>;
}
