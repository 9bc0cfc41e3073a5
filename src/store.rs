//! # In-Memory Store
//!
//! Reference [`ReconStore`] backend. The queue lives in a `BTreeMap` keyed
//! by item id, so listings come back in enqueue order without sorting.

use crate::model::{ContactId, ContactRecord};
use crate::queue::{QueueFilter, QueueItem, QueueItemId, ReconStore};
use anyhow::Result;
use hashbrown::HashMap;
use std::collections::BTreeMap;

/// In-memory storage for contacts and the change queue.
#[derive(Debug, Clone, Default)]
pub struct Store {
    contacts: HashMap<ContactId, ContactRecord>,
    queue: BTreeMap<QueueItemId, QueueItem>,
    next_item_id: u64,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            contacts: HashMap::new(),
            queue: BTreeMap::new(),
            next_item_id: 1,
        }
    }

    /// Create a store pre-populated with contacts
    pub fn with_contacts(records: impl IntoIterator<Item = ContactRecord>) -> Self {
        let mut store = Self::new();
        for record in records {
            store.contacts.insert(record.id.clone(), record);
        }
        store
    }

    /// The id the next enqueued item will receive.
    pub fn peek_next_item_id(&self) -> u64 {
        self.next_item_id
    }

    /// Restore the id counter (used by persistence on reopen). Never moves
    /// the counter backwards.
    pub fn set_next_item_id(&mut self, next: u64) {
        self.next_item_id = self.next_item_id.max(next);
    }
}

impl ReconStore for Store {
    fn get_contact(&self, id: &ContactId) -> Option<ContactRecord> {
        self.contacts.get(id).cloned()
    }

    fn save_contact(&mut self, record: &ContactRecord) -> Result<()> {
        self.contacts.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn remove_contact(&mut self, id: &ContactId) -> Result<bool> {
        Ok(self.contacts.remove(id).is_some())
    }

    fn all_contacts(&self) -> Vec<ContactRecord> {
        let mut records: Vec<ContactRecord> = self.contacts.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    fn next_item_id(&mut self) -> QueueItemId {
        let id = QueueItemId(self.next_item_id);
        self.next_item_id += 1;
        id
    }

    fn insert_item(&mut self, item: QueueItem) -> Result<()> {
        self.set_next_item_id(item.id.0 + 1);
        self.queue.insert(item.id, item);
        Ok(())
    }

    fn get_item(&self, id: QueueItemId) -> Option<QueueItem> {
        self.queue.get(&id).cloned()
    }

    fn put_item(&mut self, item: &QueueItem) -> Result<()> {
        self.queue.insert(item.id, item.clone());
        Ok(())
    }

    fn remove_item(&mut self, id: QueueItemId) -> Result<bool> {
        Ok(self.queue.remove(&id).is_some())
    }

    fn list_items(&self, filter: &QueueFilter) -> Vec<QueueItem> {
        self.queue
            .values()
            .filter(|item| filter.matches(item))
            .cloned()
            .collect()
    }

    fn item_count(&self) -> usize {
        self.queue.len()
    }
}
