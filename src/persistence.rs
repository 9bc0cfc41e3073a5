//! # Persistent Store
//!
//! RocksDB-backed [`ReconStore`]. Contacts, queue items, and metadata live
//! in separate column families; queue keys are big-endian item ids so
//! on-disk iteration order equals enqueue order. An in-memory [`Store`]
//! mirror is loaded at open and written through on every mutation, and a
//! small LRU cache fronts contact reads.

use crate::model::{ContactId, ContactRecord};
use crate::queue::{QueueFilter, QueueItem, QueueItemId, ReconStore};
use crate::store::Store;
use anyhow::{anyhow, Result};
use lru::LruCache;
use rocksdb::{checkpoint::Checkpoint, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;

const CF_CONTACTS: &str = "contacts";
const CF_QUEUE: &str = "queue";
const CF_METADATA: &str = "metadata";

const KEY_NEXT_ITEM_ID: &[u8] = b"next_item_id";
const KEY_MANIFEST: &[u8] = b"manifest";

const STORAGE_FORMAT_VERSION: u32 = 1;
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StorageManifest {
    format_version: u32,
    app_version: String,
}

/// Durable storage backend for contacts and the change queue.
pub struct PersistentStore {
    inner: Store,
    db: DB,
    cache: Mutex<LruCache<ContactId, ContactRecord>>,
}

/// Options for opening a persistent store.
#[derive(Debug, Clone, Copy)]
pub struct PersistentOpenOptions {
    /// Run a RocksDB repair pass before opening
    pub repair: bool,
}

impl Default for PersistentOpenOptions {
    fn default() -> Self {
        Self { repair: false }
    }
}

impl PersistentStore {
    /// Open (or create) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, PersistentOpenOptions::default())
    }

    /// Open with explicit options.
    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: PersistentOpenOptions,
    ) -> Result<Self> {
        if options.repair {
            repair_db(path.as_ref())?;
        }
        let db = open_db(path)?;
        validate_or_init_manifest(&db)?;

        let mut instance = Self {
            inner: Store::new(),
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("cache capacity"),
            )),
        };
        instance.load_into_inner()?;
        Ok(instance)
    }

    /// The in-memory mirror (read-only view)
    pub fn inner(&self) -> &Store {
        &self.inner
    }

    /// Flush RocksDB write buffers to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Write a consistent checkpoint of the database to `path`.
    pub fn checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let checkpoint = Checkpoint::new(&self.db)?;
        checkpoint.create_checkpoint(path)?;
        Ok(())
    }

    fn load_into_inner(&mut self) -> Result<()> {
        let contacts_cf = cf_handle(&self.db, CF_CONTACTS)?;
        for entry in self.db.iterator_cf(contacts_cf, IteratorMode::Start) {
            let (_, value) = entry?;
            let record: ContactRecord = bincode::deserialize(&value)?;
            self.inner.save_contact(&record)?;
        }

        let queue_cf = cf_handle(&self.db, CF_QUEUE)?;
        for entry in self.db.iterator_cf(queue_cf, IteratorMode::Start) {
            let (_, value) = entry?;
            let item: QueueItem = bincode::deserialize(&value)?;
            self.inner.insert_item(item)?;
        }

        if let Some(next) = load_metadata::<u64>(&self.db, KEY_NEXT_ITEM_ID)? {
            self.inner.set_next_item_id(next);
        }
        Ok(())
    }

    fn persist_contact(&self, record: &ContactRecord) -> Result<()> {
        let contacts_cf = cf_handle(&self.db, CF_CONTACTS)?;
        let bytes = bincode::serialize(record)?;
        self.db
            .put_cf(contacts_cf, record.id.as_str().as_bytes(), bytes)?;
        Ok(())
    }

    fn delete_persisted_contact(&self, id: &ContactId) -> Result<()> {
        let contacts_cf = cf_handle(&self.db, CF_CONTACTS)?;
        self.db.delete_cf(contacts_cf, id.as_str().as_bytes())?;
        Ok(())
    }

    fn persist_item(&self, item: &QueueItem) -> Result<()> {
        let queue_cf = cf_handle(&self.db, CF_QUEUE)?;
        let bytes = bincode::serialize(item)?;
        self.db.put_cf(queue_cf, item.id.0.to_be_bytes(), bytes)?;
        Ok(())
    }

    fn delete_persisted_item(&self, id: QueueItemId) -> Result<()> {
        let queue_cf = cf_handle(&self.db, CF_QUEUE)?;
        self.db.delete_cf(queue_cf, id.0.to_be_bytes())?;
        Ok(())
    }

    fn persist_next_item_id(&self) -> Result<()> {
        save_metadata(&self.db, KEY_NEXT_ITEM_ID, self.inner.peek_next_item_id())
    }

    fn cache_put(&self, record: &ContactRecord) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(record.id.clone(), record.clone());
        }
    }

    fn cache_pop(&self, id: &ContactId) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.pop(id);
        }
    }
}

impl ReconStore for PersistentStore {
    fn get_contact(&self, id: &ContactId) -> Option<ContactRecord> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(record) = cache.get(id) {
                return Some(record.clone());
            }
        }
        let record = self.inner.get_contact(id)?;
        self.cache_put(&record);
        Some(record)
    }

    fn save_contact(&mut self, record: &ContactRecord) -> Result<()> {
        self.inner.save_contact(record)?;
        self.persist_contact(record)?;
        self.cache_put(record);
        Ok(())
    }

    fn remove_contact(&mut self, id: &ContactId) -> Result<bool> {
        let existed = self.inner.remove_contact(id)?;
        if existed {
            self.delete_persisted_contact(id)?;
        }
        self.cache_pop(id);
        Ok(existed)
    }

    fn all_contacts(&self) -> Vec<ContactRecord> {
        self.inner.all_contacts()
    }

    fn contact_count(&self) -> usize {
        self.inner.contact_count()
    }

    fn next_item_id(&mut self) -> QueueItemId {
        let id = self.inner.next_item_id();
        // The counter is re-derived from stored items at open; losing this
        // write only matters if every higher item is pruned before restart.
        if let Err(error) = self.persist_next_item_id() {
            warn!(%error, "failed to persist queue id counter");
        }
        id
    }

    fn insert_item(&mut self, item: QueueItem) -> Result<()> {
        self.inner.insert_item(item.clone())?;
        self.persist_item(&item)?;
        self.persist_next_item_id()?;
        Ok(())
    }

    fn get_item(&self, id: QueueItemId) -> Option<QueueItem> {
        self.inner.get_item(id)
    }

    fn put_item(&mut self, item: &QueueItem) -> Result<()> {
        self.inner.put_item(item)?;
        self.persist_item(item)?;
        Ok(())
    }

    fn remove_item(&mut self, id: QueueItemId) -> Result<bool> {
        let existed = self.inner.remove_item(id)?;
        if existed {
            self.delete_persisted_item(id)?;
        }
        Ok(existed)
    }

    fn list_items(&self, filter: &QueueFilter) -> Vec<QueueItem> {
        self.inner.list_items(filter)
    }

    fn item_count(&self) -> usize {
        self.inner.item_count()
    }
}

impl Drop for PersistentStore {
    fn drop(&mut self) {
        let _ = self.db.flush();
    }
}

fn open_db(path: impl AsRef<Path>) -> Result<DB> {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);

    let cf_descriptors = vec![
        ColumnFamilyDescriptor::new(CF_CONTACTS, Options::default()),
        ColumnFamilyDescriptor::new(CF_QUEUE, Options::default()),
        ColumnFamilyDescriptor::new(CF_METADATA, Options::default()),
    ];

    DB::open_cf_descriptors(&options, path, cf_descriptors)
        .map_err(|error| anyhow!("failed to open database: {error}"))
}

fn repair_db(path: &Path) -> Result<()> {
    DB::repair(&Options::default(), path)
        .map_err(|error| anyhow!("failed to repair database: {error}"))
}

fn cf_handle<'a>(db: &'a DB, name: &str) -> Result<&'a rocksdb::ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| anyhow!("missing column family: {name}"))
}

fn save_metadata<T: serde::Serialize>(db: &DB, key: &[u8], value: T) -> Result<()> {
    let metadata_cf = cf_handle(db, CF_METADATA)?;
    let bytes = bincode::serialize(&value)?;
    db.put_cf(metadata_cf, key, bytes)?;
    Ok(())
}

fn load_metadata<T: serde::de::DeserializeOwned>(db: &DB, key: &[u8]) -> Result<Option<T>> {
    let metadata_cf = cf_handle(db, CF_METADATA)?;
    match db.get_cf(metadata_cf, key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

// The manifest is stored as JSON so a stray database directory can be
// identified with ordinary tools; everything else uses bincode.
fn validate_or_init_manifest(db: &DB) -> Result<()> {
    let metadata_cf = cf_handle(db, CF_METADATA)?;
    match db.get_cf(metadata_cf, KEY_MANIFEST)? {
        Some(bytes) => {
            let manifest: StorageManifest = serde_json::from_slice(&bytes)?;
            if manifest.format_version != STORAGE_FORMAT_VERSION {
                anyhow::bail!(
                    "unsupported storage format {} (expected {})",
                    manifest.format_version,
                    STORAGE_FORMAT_VERSION
                );
            }
            Ok(())
        }
        None => {
            let manifest = StorageManifest {
                format_version: STORAGE_FORMAT_VERSION,
                app_version: env!("CARGO_PKG_VERSION").to_string(),
            };
            db.put_cf(metadata_cf, KEY_MANIFEST, serde_json::to_vec(&manifest)?)?;
            Ok(())
        }
    }
}
