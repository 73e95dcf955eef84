use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use super::{ContentId, ProgressRecord, clamp_percent};

pub(crate) const DEFAULT_NAMESPACE: &str = "movieapp_progress";

#[derive(Debug, Error)]
pub(crate) enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[cfg(test)]
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Device-local string key-value storage.
pub(crate) trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

pub(crate) type ProgressTable = BTreeMap<ContentId, ProgressRecord>;

/// Progress records stored one per key, as JSON, under
/// `<namespace>_<contentId>`.
///
/// Every operation is best-effort: storage and decoding failures are logged
/// and degrade to "nothing written" or "nothing found".
pub(crate) struct ProgressStore {
    storage: Box<dyn KeyValueStorage>,
    namespace: String,
}

impl ProgressStore {
    pub(crate) fn new(storage: Box<dyn KeyValueStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
        }
    }

    pub(crate) fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key_prefix(&self) -> String {
        format!("{}_", self.namespace)
    }

    fn key_for(&self, id: &ContentId) -> String {
        format!("{}_{}", self.namespace, id)
    }

    pub(crate) fn save(&self, record: &ProgressRecord) {
        let mut stored = record.clone();
        stored.progress = clamp_percent(stored.progress);

        let key = self.key_for(&stored.id);
        let result = serde_json::to_string(&stored)
            .map_err(StorageError::from)
            .and_then(|encoded| self.storage.set_item(&key, &encoded));
        match result {
            Ok(()) => debug!(content_id = %stored.id, progress = stored.progress, "progress saved"),
            Err(err) => warn!(content_id = %stored.id, "failed to save progress: {err}"),
        }
    }

    pub(crate) fn load(&self, id: &ContentId) -> Option<ProgressRecord> {
        let key = self.key_for(id);
        let raw = match self.storage.get_item(&key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(content_id = %id, "failed to read progress: {err}");
                return None;
            }
        };
        decode_record(&key, &raw)
    }

    /// Whether anything is stored under `id`, readable or not.
    pub(crate) fn contains(&self, id: &ContentId) -> bool {
        match self.storage.get_item(&self.key_for(id)) {
            Ok(raw) => raw.is_some(),
            Err(err) => {
                warn!(content_id = %id, "failed to read progress: {err}");
                false
            }
        }
    }

    pub(crate) fn clear(&self, id: &ContentId) {
        if let Err(err) = self.storage.remove_item(&self.key_for(id)) {
            warn!(content_id = %id, "failed to clear progress: {err}");
        }
    }

    /// Keys in this namespace. A key only counts when the rest of it is a
    /// content id, so `movieapp` never claims `movieapp_progress_*` entries.
    fn namespace_keys(&self) -> Option<Vec<String>> {
        let prefix = self.key_prefix();
        match self.storage.keys_with_prefix(&prefix) {
            Ok(keys) => Some(
                keys.into_iter()
                    .filter(|key| {
                        key.strip_prefix(prefix.as_str())
                            .is_some_and(|rest| ContentId::parse(rest).is_ok())
                    })
                    .collect(),
            ),
            Err(err) => {
                warn!(namespace = %self.namespace, "failed to list progress keys: {err}");
                None
            }
        }
    }

    pub(crate) fn clear_all(&self) {
        let Some(keys) = self.namespace_keys() else {
            return;
        };
        for key in keys {
            if let Err(err) = self.storage.remove_item(&key) {
                warn!(key = %key, "failed to clear progress: {err}");
            }
        }
    }

    pub(crate) fn get_all(&self) -> ProgressTable {
        let Some(keys) = self.namespace_keys() else {
            return ProgressTable::new();
        };

        let mut table = ProgressTable::new();
        for key in keys {
            let raw = match self.storage.get_item(&key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(err) => {
                    warn!(key = %key, "failed to read progress: {err}");
                    continue;
                }
            };
            if let Some(record) = decode_record(&key, &raw) {
                table.insert(record.id.clone(), record);
            }
        }
        table
    }
}

fn decode_record(key: &str, raw: &str) -> Option<ProgressRecord> {
    match serde_json::from_str::<ProgressRecord>(raw) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(key = %key, "ignoring unreadable progress entry: {err}");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use super::{KeyValueStorage, StorageError};

    /// In-memory storage whose state is shared between clones, so a test can
    /// keep a handle after boxing one into a store.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryStorage {
        items: Rc<RefCell<BTreeMap<String, String>>>,
        fail_writes: Rc<Cell<bool>>,
        fail_reads: Rc<Cell<bool>>,
    }

    impl MemoryStorage {
        pub(crate) fn fail_writes(&self, fail: bool) {
            self.fail_writes.set(fail);
        }

        pub(crate) fn fail_reads(&self, fail: bool) {
            self.fail_reads.set(fail);
        }

        pub(crate) fn raw(&self, key: &str) -> Option<String> {
            self.items.borrow().get(key).cloned()
        }

        pub(crate) fn insert_raw(&self, key: &str, value: &str) {
            self.items
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
        }

        pub(crate) fn len(&self) -> usize {
            self.items.borrow().len()
        }
    }

    impl KeyValueStorage for MemoryStorage {
        fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_reads.get() {
                return Err(StorageError::Unavailable("reads disabled".to_string()));
            }
            Ok(self.items.borrow().get(key).cloned())
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_writes.get() {
                return Err(StorageError::Unavailable("writes disabled".to_string()));
            }
            self.items
                .borrow_mut()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_writes.get() {
                return Err(StorageError::Unavailable("writes disabled".to_string()));
            }
            self.items.borrow_mut().remove(key);
            Ok(())
        }

        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            if self.fail_reads.get() {
                return Err(StorageError::Unavailable("reads disabled".to_string()));
            }
            Ok(self
                .items
                .borrow()
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect())
        }
    }
}
