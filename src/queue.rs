//! # Change Queue
//!
//! Durable, ordered collection of pending change operations with status and
//! retry metadata, plus the [`ReconStore`] contract both storage backends
//! implement. Every queue and contact mutation flows through this API; the
//! workflow operations are provided methods on the trait so each backend
//! runs the same state machine.

use crate::model::{ContactId, ContactRecord};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Compact identifier for queue items, assigned monotonically at enqueue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct QueueItemId(pub u64);

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{}", self.0)
    }
}

/// The remote operation a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOperation {
    Create,
    Update,
    Delete,
}

impl fmt::Display for QueueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueOperation::Create => "create",
            QueueOperation::Update => "update",
            QueueOperation::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of a queue item.
///
/// `Pending → Approved → Syncing → {Synced | Failed}`. Failed items may be
/// re-approved while their retry count is below the ceiling. `Synced` is
/// terminal and prunable; `Rejected` is terminal. `Syncing` is held by
/// exactly one executing attempt at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Approved,
    Syncing,
    Synced,
    Failed,
    Rejected,
}

impl QueueStatus {
    /// Whether the status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Synced | QueueStatus::Rejected)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Approved => "approved",
            QueueStatus::Syncing => "syncing",
            QueueStatus::Synced => "synced",
            QueueStatus::Failed => "failed",
            QueueStatus::Rejected => "rejected",
        };
        write!(f, "{name}")
    }
}

/// A pending change operation against the remote store.
///
/// `data_after` carries the full proposed record for create/update;
/// `data_before` carries the prior record for update/delete, both for
/// display and for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub subject: ContactId,
    pub operation: QueueOperation,
    pub data_before: Option<ContactRecord>,
    pub data_after: Option<ContactRecord>,
    pub status: QueueStatus,
    pub reviewed: bool,
    pub approved: Option<bool>,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub origin: String,
}

/// Filter for queue listings; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    pub status: Option<QueueStatus>,
    pub subject: Option<ContactId>,
    pub origin: Option<String>,
}

impl QueueFilter {
    /// Filter to a single status
    pub fn by_status(status: QueueStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Filter to a single subject record
    pub fn by_subject(subject: ContactId) -> Self {
        Self {
            subject: Some(subject),
            ..Default::default()
        }
    }

    /// Whether an item passes the filter
    pub fn matches(&self, item: &QueueItem) -> bool {
        if let Some(status) = self.status {
            if item.status != status {
                return false;
            }
        }
        if let Some(subject) = &self.subject {
            if item.subject != *subject {
                return false;
            }
        }
        if let Some(origin) = &self.origin {
            if item.origin != *origin {
                return false;
            }
        }
        true
    }
}

/// Outcome of an enqueue request.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// A new item was inserted
    Inserted(QueueItem),
    /// An equivalent pending or approved change already exists
    Duplicate(QueueItemId),
}

impl EnqueueOutcome {
    /// The id of the inserted or pre-existing item
    pub fn item_id(&self) -> QueueItemId {
        match self {
            EnqueueOutcome::Inserted(item) => item.id,
            EnqueueOutcome::Duplicate(id) => *id,
        }
    }

    /// Whether a new item was inserted
    pub fn is_inserted(&self) -> bool {
        matches!(self, EnqueueOutcome::Inserted(_))
    }
}

/// Outcome of a syncing claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim succeeded; the caller holds the only syncing attempt
    Claimed,
    /// Another attempt already holds the item
    AlreadySyncing,
    /// The item is missing or not approved
    Ineligible,
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}

/// Storage contract shared by the in-memory and persistent backends: simple
/// get/save for contact records plus the queue primitives. Listings are
/// always in ascending item-id order.
pub trait ReconStore {
    // ---- contact records ----

    /// Get a contact by id
    fn get_contact(&self, id: &ContactId) -> Option<ContactRecord>;

    /// Save (insert or replace) a contact
    fn save_contact(&mut self, record: &ContactRecord) -> Result<()>;

    /// Remove a contact; returns whether it existed
    fn remove_contact(&mut self, id: &ContactId) -> Result<bool>;

    /// All contacts in ascending id order
    fn all_contacts(&self) -> Vec<ContactRecord>;

    /// Number of stored contacts
    fn contact_count(&self) -> usize;

    // ---- queue primitives ----

    /// Allocate the next queue item id
    fn next_item_id(&mut self) -> QueueItemId;

    /// Insert a fully-formed item
    fn insert_item(&mut self, item: QueueItem) -> Result<()>;

    /// Get an item by id
    fn get_item(&self, id: QueueItemId) -> Option<QueueItem>;

    /// Replace a stored item
    fn put_item(&mut self, item: &QueueItem) -> Result<()>;

    /// Remove an item; returns whether it existed
    fn remove_item(&mut self, id: QueueItemId) -> Result<bool>;

    /// Items matching the filter, in ascending id order
    fn list_items(&self, filter: &QueueFilter) -> Vec<QueueItem>;

    /// Number of queued items
    fn item_count(&self) -> usize;

    // ---- workflow operations ----

    /// Enqueue a change operation.
    ///
    /// Idempotent in effect: an existing pending or approved item for the
    /// same subject with an equal operation and equal proposed data
    /// suppresses insertion, so duplicate tool runs or repeated analyses do
    /// not flood the queue.
    fn enqueue(
        &mut self,
        subject: ContactId,
        operation: QueueOperation,
        data_after: Option<ContactRecord>,
        data_before: Option<ContactRecord>,
        origin: &str,
    ) -> Result<EnqueueOutcome> {
        match operation {
            QueueOperation::Create | QueueOperation::Update if data_after.is_none() => {
                bail!("{operation} for {subject} requires proposed data")
            }
            QueueOperation::Update | QueueOperation::Delete if data_before.is_none() => {
                bail!("{operation} for {subject} requires prior data")
            }
            _ => {}
        }

        for item in self.list_items(&QueueFilter::by_subject(subject.clone())) {
            if !matches!(item.status, QueueStatus::Pending | QueueStatus::Approved) {
                continue;
            }
            if item.operation == operation && item.data_after == data_after {
                debug!(item = %item.id, subject = %subject, "skipping duplicate enqueue");
                return Ok(EnqueueOutcome::Duplicate(item.id));
            }
        }

        let item = QueueItem {
            id: self.next_item_id(),
            subject,
            operation,
            data_before,
            data_after,
            status: QueueStatus::Pending,
            reviewed: false,
            approved: None,
            retry_count: 0,
            error_message: None,
            created_at: unix_now(),
            origin: origin.to_string(),
        };
        self.insert_item(item.clone())?;
        Ok(EnqueueOutcome::Inserted(item))
    }

    /// Bulk-approve items for sync.
    ///
    /// Eligible states are pending and failed below the retry ceiling; items
    /// in any other state are skipped, not errors. Returns the number of
    /// items transitioned.
    fn approve_items(&mut self, ids: &[QueueItemId], retry_ceiling: u32) -> Result<usize> {
        let mut transitioned = 0;
        for &id in ids {
            let Some(mut item) = self.get_item(id) else {
                continue;
            };
            let eligible = match item.status {
                QueueStatus::Pending => true,
                QueueStatus::Failed => item.retry_count < retry_ceiling,
                _ => false,
            };
            if !eligible {
                debug!(item = %id, status = %item.status, "approve is a no-op");
                continue;
            }
            item.status = QueueStatus::Approved;
            item.reviewed = true;
            item.approved = Some(true);
            self.put_item(&item)?;
            transitioned += 1;
        }
        Ok(transitioned)
    }

    /// Bulk-reject items.
    ///
    /// Same eligibility as approval; rejected items are terminal. Returns
    /// the number of items transitioned.
    fn reject_items(&mut self, ids: &[QueueItemId], retry_ceiling: u32) -> Result<usize> {
        let mut transitioned = 0;
        for &id in ids {
            let Some(mut item) = self.get_item(id) else {
                continue;
            };
            let eligible = match item.status {
                QueueStatus::Pending => true,
                QueueStatus::Failed => item.retry_count < retry_ceiling,
                _ => false,
            };
            if !eligible {
                debug!(item = %id, status = %item.status, "reject is a no-op");
                continue;
            }
            item.status = QueueStatus::Rejected;
            item.reviewed = true;
            item.approved = Some(false);
            self.put_item(&item)?;
            transitioned += 1;
        }
        Ok(transitioned)
    }

    /// Claim exclusive syncing status via check-and-set.
    ///
    /// The status is set before any asynchronous remote call begins, so of
    /// two racing attempts only one proceeds; the loser observes
    /// [`ClaimOutcome::AlreadySyncing`].
    fn claim_syncing(&mut self, id: QueueItemId) -> Result<ClaimOutcome> {
        let Some(mut item) = self.get_item(id) else {
            return Ok(ClaimOutcome::Ineligible);
        };
        match item.status {
            QueueStatus::Syncing => Ok(ClaimOutcome::AlreadySyncing),
            QueueStatus::Approved => {
                item.status = QueueStatus::Syncing;
                self.put_item(&item)?;
                Ok(ClaimOutcome::Claimed)
            }
            _ => Ok(ClaimOutcome::Ineligible),
        }
    }

    /// Mark a syncing item as synced, clearing any stale error message.
    /// Items not in syncing status are left untouched: synced is only
    /// reachable through a held claim.
    fn mark_synced(&mut self, id: QueueItemId) -> Result<()> {
        if let Some(mut item) = self.get_item(id) {
            if item.status != QueueStatus::Syncing {
                debug!(item = %id, status = %item.status, "mark_synced is a no-op");
                return Ok(());
            }
            item.status = QueueStatus::Synced;
            item.error_message = None;
            self.put_item(&item)?;
        }
        Ok(())
    }

    /// Record a failed attempt: increments the retry count and stores the
    /// message. The contact data on the item is left untouched, and only a
    /// held claim can record a failure.
    fn mark_failed(&mut self, id: QueueItemId, message: &str) -> Result<()> {
        if let Some(mut item) = self.get_item(id) {
            if item.status != QueueStatus::Syncing {
                debug!(item = %id, status = %item.status, "mark_failed is a no-op");
                return Ok(());
            }
            item.status = QueueStatus::Failed;
            item.retry_count += 1;
            item.error_message = Some(message.to_string());
            self.put_item(&item)?;
        }
        Ok(())
    }

    /// Remove terminal synced items to bound queue growth; returns how many
    /// were pruned.
    fn prune_synced(&mut self) -> Result<usize> {
        let synced = self.list_items(&QueueFilter::by_status(QueueStatus::Synced));
        let mut pruned = 0;
        for item in synced {
            if self.remove_item(item.id)? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonName;
    use crate::store::Store;

    fn contact(id: &str) -> ContactRecord {
        ContactRecord::new(id, PersonName::new("John", "Smith"))
    }

    fn enqueue_update(store: &mut Store, subject: &str) -> QueueItem {
        let before = contact(subject);
        let after = before.clone().with_email("john@x.com");
        match store
            .enqueue(
                ContactId::from(subject),
                QueueOperation::Update,
                Some(after),
                Some(before),
                "test",
            )
            .unwrap()
        {
            EnqueueOutcome::Inserted(item) => item,
            EnqueueOutcome::Duplicate(id) => panic!("unexpected duplicate {id}"),
        }
    }

    #[test]
    fn test_enqueue_assigns_monotonic_ids() {
        let mut store = Store::new();
        let first = enqueue_update(&mut store, "a");
        let second = enqueue_update(&mut store, "b");
        assert!(second.id > first.id);
    }

    #[test]
    fn test_enqueue_requires_data_for_operation() {
        let mut store = Store::new();

        let missing_after = store.enqueue(
            ContactId::from("a"),
            QueueOperation::Create,
            None,
            None,
            "test",
        );
        assert!(missing_after.is_err());

        let missing_before = store.enqueue(
            ContactId::from("a"),
            QueueOperation::Delete,
            None,
            None,
            "test",
        );
        assert!(missing_before.is_err());
    }

    #[test]
    fn test_duplicate_enqueue_is_suppressed() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");

        let again = store
            .enqueue(
                item.subject.clone(),
                item.operation,
                item.data_after.clone(),
                item.data_before.clone(),
                "test",
            )
            .unwrap();
        assert_eq!(again, EnqueueOutcome::Duplicate(item.id));
        assert_eq!(store.item_count(), 1);
    }

    #[test]
    fn test_different_proposed_data_is_not_a_duplicate() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");

        let different_after = contact("a").with_email("other@x.com");
        let outcome = store
            .enqueue(
                item.subject.clone(),
                item.operation,
                Some(different_after),
                item.data_before.clone(),
                "test",
            )
            .unwrap();
        assert!(outcome.is_inserted());
        assert_eq!(store.item_count(), 2);
    }

    #[test]
    fn test_approve_transitions_pending_items() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");

        let transitioned = store.approve_items(&[item.id], 3).unwrap();
        assert_eq!(transitioned, 1);

        let approved = store.get_item(item.id).unwrap();
        assert_eq!(approved.status, QueueStatus::Approved);
        assert!(approved.reviewed);
        assert_eq!(approved.approved, Some(true));
    }

    #[test]
    fn test_approve_is_noop_for_ineligible_states() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");
        store.reject_items(&[item.id], 3).unwrap();

        let transitioned = store.approve_items(&[item.id], 3).unwrap();
        assert_eq!(transitioned, 0);
        assert_eq!(store.get_item(item.id).unwrap().status, QueueStatus::Rejected);
    }

    #[test]
    fn test_failed_item_below_ceiling_can_be_reapproved() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");
        store.approve_items(&[item.id], 3).unwrap();
        store.claim_syncing(item.id).unwrap();
        store.mark_failed(item.id, "remote unavailable").unwrap();

        let transitioned = store.approve_items(&[item.id], 3).unwrap();
        assert_eq!(transitioned, 1);
        let reapproved = store.get_item(item.id).unwrap();
        assert_eq!(reapproved.status, QueueStatus::Approved);
        assert_eq!(reapproved.retry_count, 1);
    }

    #[test]
    fn test_failed_item_at_ceiling_cannot_be_reapproved() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");
        for _ in 0..3 {
            store.approve_items(&[item.id], 3).unwrap();
            store.claim_syncing(item.id).unwrap();
            store.mark_failed(item.id, "remote unavailable").unwrap();
        }

        let transitioned = store.approve_items(&[item.id], 3).unwrap();
        assert_eq!(transitioned, 0);
        assert_eq!(store.get_item(item.id).unwrap().retry_count, 3);
    }

    #[test]
    fn test_claim_syncing_is_single_flight() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");
        store.approve_items(&[item.id], 3).unwrap();

        assert_eq!(store.claim_syncing(item.id).unwrap(), ClaimOutcome::Claimed);
        assert_eq!(
            store.claim_syncing(item.id).unwrap(),
            ClaimOutcome::AlreadySyncing
        );
    }

    #[test]
    fn test_claim_syncing_requires_approval() {
        let mut store = Store::new();
        let item = enqueue_update(&mut store, "a");
        assert_eq!(
            store.claim_syncing(item.id).unwrap(),
            ClaimOutcome::Ineligible
        );
    }

    #[test]
    fn test_prune_removes_only_synced_items() {
        let mut store = Store::new();
        let done = enqueue_update(&mut store, "a");
        let open = enqueue_update(&mut store, "b");

        store.approve_items(&[done.id], 3).unwrap();
        store.claim_syncing(done.id).unwrap();
        store.mark_synced(done.id).unwrap();

        let pruned = store.prune_synced().unwrap();
        assert_eq!(pruned, 1);
        assert!(store.get_item(done.id).is_none());
        assert!(store.get_item(open.id).is_some());
    }

    #[test]
    fn test_list_items_is_id_ordered() {
        let mut store = Store::new();
        for subject in ["c", "a", "b"] {
            enqueue_update(&mut store, subject);
        }

        let items = store.list_items(&QueueFilter::default());
        let ids: Vec<u64> = items.iter().map(|item| item.id.0).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }
}
