use std::collections::{BTreeMap, HashMap};

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use forum_api::{DocId, DocStore, Document, FieldOp, StoreEvent, Time, Uuid, Write};
use parking_lot::Mutex;
use tokio::sync::mpsc;

type Data = serde_json::Map<String, serde_json::Value>;

/// Serializable content of a whole store, by collection then document id
pub type StoreDump = BTreeMap<String, BTreeMap<DocId, Data>>;

/// In-memory document store that behaves like a naive realtime backend:
/// last writer wins per document, and every change broadcasts the full
/// collection to its subscribers.
pub struct MemoryStore(Mutex<Inner>);

#[derive(Default)]
struct Inner {
    collections: BTreeMap<String, Collection>,
    last_timestamp: Option<Time>,
    num_writes: usize,
    faults: Faults,
}

#[derive(Default)]
struct Collection {
    docs: BTreeMap<DocId, Data>,
    feeds: Vec<mpsc::UnboundedSender<StoreEvent>>,
}

impl Collection {
    fn snapshot(&self) -> Vec<Document> {
        self.docs
            .iter()
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect()
    }

    fn relay_snapshot(&mut self) {
        let snapshot = self.snapshot();
        self.feeds
            .retain_mut(|f| matches!(f.send(StoreEvent::Snapshot(snapshot.clone())), Ok(())));
    }
}

#[derive(Default)]
struct Faults {
    offline: bool,
    hung: bool,
    frozen: HashMap<(String, DocId), Option<Document>>,
}

impl Inner {
    fn collection(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(String::from(name)).or_default()
    }

    // Strictly increasing even when two writes land within the clock resolution
    fn next_timestamp(&mut self) -> Time {
        let now = Utc::now();
        let t = match self.last_timestamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(t);
        t
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore(Mutex::new(Inner::default()))
    }

    pub fn load(dump: StoreDump) -> MemoryStore {
        let mut inner = Inner::default();
        for (name, docs) in dump {
            inner.collection(&name).docs = docs;
        }
        MemoryStore(Mutex::new(inner))
    }

    pub fn dump(&self) -> StoreDump {
        self.0
            .lock()
            .collections
            .iter()
            .map(|(name, c)| (name.clone(), c.docs.clone()))
            .collect()
    }

    /// Every operation fails until brought back online
    pub fn set_offline(&self, offline: bool) {
        self.0.lock().faults.offline = offline;
    }

    /// Every operation started from now on never completes
    pub fn set_hung(&self, hung: bool) {
        self.0.lock().faults.hung = hung;
    }

    /// Reads of this document keep returning its current content, whatever
    /// gets written afterwards, until [`MemoryStore::thaw_reads`]
    pub fn freeze_reads(&self, collection: &str, id: &DocId) {
        let mut inner = self.0.lock();
        let current = inner.collection(collection).docs.get(id).map(|data| Document {
            id: id.clone(),
            data: data.clone(),
        });
        inner
            .faults
            .frozen
            .insert((String::from(collection), id.clone()), current);
    }

    pub fn thaw_reads(&self) {
        self.0.lock().faults.frozen.clear();
    }

    /// Number of successful writes since creation
    pub fn test_num_writes(&self) -> usize {
        self.0.lock().num_writes
    }

    /// Inserts a document as-is, eg. in a shape older clients wrote
    pub fn test_insert_raw(&self, collection: &str, data: serde_json::Value) -> DocId {
        let data = match data {
            serde_json::Value::Object(data) => data,
            other => panic!("raw document must be a json object, got {other:?}"),
        };
        let id = new_doc_id();
        let mut inner = self.0.lock();
        let c = inner.collection(collection);
        c.docs.insert(id.clone(), data);
        c.relay_snapshot();
        id
    }

    pub fn test_read_raw(&self, collection: &str, id: &DocId) -> Option<Data> {
        self.0.lock().collection(collection).docs.get(id).cloned()
    }

    async fn check_faults(&self) -> anyhow::Result<()> {
        let (offline, hung) = {
            let inner = self.0.lock();
            (inner.faults.offline, inner.faults.hung)
        };
        if hung {
            futures::future::pending::<()>().await;
        }
        if offline {
            return Err(anyhow!("document store is unreachable"));
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> MemoryStore {
        MemoryStore::new()
    }
}

fn new_doc_id() -> DocId {
    DocId(Uuid::new_v4().simple().to_string())
}

/// Applies `write` onto `data`, creating intermediate maps as needed
pub fn apply_write(data: &mut Data, write: Write, now: Time) {
    for (path, op) in write {
        let Some((last, parents)) = path.0.split_last() else {
            tracing::warn!("ignoring write to an empty field path");
            continue;
        };
        let mut target = &mut *data;
        for key in parents {
            let entry = target
                .entry(key.clone())
                .or_insert_with(|| serde_json::Value::Object(Data::new()));
            if !entry.is_object() {
                *entry = serde_json::Value::Object(Data::new());
            }
            target = match entry {
                serde_json::Value::Object(m) => m,
                _ => unreachable!("entry was just made into an object"),
            };
        }
        match op {
            FieldOp::Set(v) => {
                target.insert(last.clone(), v);
            }
            FieldOp::Remove => {
                target.remove(last);
            }
            FieldOp::Increment(n) => {
                // Numbers other writers stored as floats count as their integer part
                let current = target
                    .get(last)
                    .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                    .unwrap_or(0);
                let next = current.checked_add(n).unwrap_or_else(|| {
                    tracing::warn!(%path, current, n, "saturating overflowing increment");
                    if n > 0 {
                        i64::MAX
                    } else {
                        i64::MIN
                    }
                });
                target.insert(last.clone(), serde_json::Value::from(next));
            }
            FieldOp::ArrayUnion(values) => {
                let mut array = match target.remove(last) {
                    Some(serde_json::Value::Array(a)) => a,
                    _ => Vec::new(),
                };
                for v in values {
                    if !array.contains(&v) {
                        array.push(v);
                    }
                }
                target.insert(last.clone(), serde_json::Value::Array(array));
            }
            FieldOp::ArrayRemove(values) => {
                let mut array = match target.remove(last) {
                    Some(serde_json::Value::Array(a)) => a,
                    _ => Vec::new(),
                };
                array.retain(|v| !values.contains(v));
                target.insert(last.clone(), serde_json::Value::Array(array));
            }
            FieldOp::ServerTimestamp => {
                target.insert(last.clone(), serde_json::Value::String(now.to_rfc3339()));
            }
        }
    }
}

#[async_trait]
impl DocStore for MemoryStore {
    async fn create(&self, collection: &str, write: Write) -> anyhow::Result<DocId> {
        self.check_faults().await?;
        let mut inner = self.0.lock();
        let now = inner.next_timestamp();
        let id = new_doc_id();
        let mut data = Data::new();
        apply_write(&mut data, write, now);
        inner.num_writes += 1;
        let c = inner.collection(collection);
        c.docs.insert(id.clone(), data);
        c.relay_snapshot();
        Ok(id)
    }

    async fn update(&self, collection: &str, id: &DocId, write: Write) -> anyhow::Result<()> {
        self.check_faults().await?;
        let mut inner = self.0.lock();
        let now = inner.next_timestamp();
        let c = inner.collection(collection);
        let data = c
            .docs
            .get_mut(id)
            .ok_or_else(|| anyhow!("no document {id} to update in {collection}"))?;
        apply_write(data, write, now);
        c.relay_snapshot();
        inner.num_writes += 1;
        Ok(())
    }

    async fn read(&self, collection: &str, id: &DocId) -> anyhow::Result<Option<Document>> {
        self.check_faults().await?;
        let mut inner = self.0.lock();
        if let Some(frozen) = inner.faults.frozen.get(&(String::from(collection), id.clone())) {
            return Ok(frozen.clone());
        }
        Ok(inner.collection(collection).docs.get(id).map(|data| Document {
            id: id.clone(),
            data: data.clone(),
        }))
    }

    async fn delete(&self, collection: &str, id: &DocId) -> anyhow::Result<()> {
        self.check_faults().await?;
        let mut inner = self.0.lock();
        let c = inner.collection(collection);
        if c.docs.remove(id).is_some() {
            c.relay_snapshot();
            inner.num_writes += 1;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &str,
    ) -> anyhow::Result<mpsc::UnboundedReceiver<StoreEvent>> {
        self.check_faults().await?;
        let mut inner = self.0.lock();
        let c = inner.collection(collection);
        let (sender, receiver) = mpsc::unbounded_channel();
        sender
            .send(StoreEvent::Snapshot(c.snapshot()))
            .map_err(|_| anyhow!("subscription receiver dropped during creation"))?;
        c.feeds.push(sender);
        Ok(receiver)
    }
}
