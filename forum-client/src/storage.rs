use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use parking_lot::Mutex;

/// Small client-local key/value storage that outlives a session, the way a
/// browser's local storage does
pub trait LocalStorage: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

impl<T: LocalStorage + ?Sized> LocalStorage for Arc<T> {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        (**self).remove(key)
    }
}

#[derive(Default)]
pub struct MemoryStorage(Mutex<BTreeMap<String, String>>);

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }
}

impl LocalStorage for MemoryStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.0.lock().insert(String::from(key), String::from(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.0.lock().remove(key);
        Ok(())
    }
}

/// Storage kept as a single JSON object file, replaced on every change
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> FileStorage {
        FileStorage {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Storage file `local-storage.json` inside `dir`, creating `dir` if needed
    pub fn in_dir(dir: &Path) -> anyhow::Result<FileStorage> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating local storage directory {dir:?}"))?;
        Ok(FileStorage::new(dir.join("local-storage.json")))
    }

    fn load(&self) -> anyhow::Result<BTreeMap<String, String>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing local storage file {:?}", self.path)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => {
                Err(e).with_context(|| format!("reading local storage file {:?}", self.path))
            }
        }
    }

    // Readers see either the old file or the new one, never a partial write
    fn save(&self, map: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(map).context("serializing local storage")?;
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temporary file in {dir:?}"))?;
        file.write_all(&json)
            .and_then(|()| file.as_file().sync_all())
            .with_context(|| format!("writing temporary file {:?}", file.path()))?;
        file.persist(&self.path)
            .map_err(|e| e.error)
            .with_context(|| format!("replacing local storage file {:?}", self.path))?;
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> anyhow::Result<()> {
        let _guard = self.lock.lock();
        let mut map = self.load()?;
        f(&mut map);
        self.save(&map)
    }
}

impl LocalStorage for FileStorage {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.modify(|map| {
            map.insert(String::from(key), String::from(value));
        })
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.modify(|map| {
            map.remove(key);
        })
    }
}
