//! # Mergedex
//!
//! The reconciliation core of a contact-management tool. It decides which
//! imported or externally-sourced contact records represent the same
//! real-world person, proposes a merged record, and governs how every
//! pending change is queued, approved, retried, and applied against a
//! remote record store.
//!
//! Flow: records → blocking index → candidate pairs → similarity scorer →
//! human/default decision → merge planner → change queue → sync executor →
//! remote store.
//!
//! Convergence with the remote system is eventual and human-gated: nothing
//! leaves the queue without an approval, and the executor enforces
//! single-flight execution, bounded retries, and a consecutive-failure
//! circuit breaker.

pub mod blocking;
pub mod config;
pub mod executor;
pub mod merge;
pub mod model;
pub mod persistence;
pub mod queue;
pub mod scorer;
pub mod store;
pub mod test_support;

// Re-export main types for convenience
pub use blocking::{blocking_keys, BlockingIndex, BlockingKey, MatchCandidate};
pub use config::{MatchTuning, SyncTuning};
pub use executor::{
    BatchResult, CancelFlag, ItemOutcome, ItemResult, RemoteApply, RunTermination, SyncExecutor,
};
pub use model::{ContactId, ContactRecord, Organization, PersonName, PostalAddress};
pub use persistence::{PersistentOpenOptions, PersistentStore};
pub use queue::{
    ClaimOutcome, EnqueueOutcome, QueueFilter, QueueItem, QueueItemId, QueueOperation,
    QueueStatus, ReconStore,
};
pub use scorer::{FieldEvidence, MatchBand, MatchDecision, ScoredMatch};
pub use store::Store;

use anyhow::{bail, Result};

/// Main API for contact reconciliation.
///
/// Owns the storage backend, the tuning, and the sync executor; run state
/// (the single-flight run flag and the cancel flag) lives on the executor
/// rather than in globals.
pub struct Mergedex {
    store: Box<dyn ReconStore>,
    match_tuning: MatchTuning,
    executor: SyncExecutor,
}

impl Mergedex {
    /// Create an instance backed by an in-memory store
    pub fn new() -> Self {
        Self::with_store(Store::new())
    }

    /// Create an instance backed by the given store
    pub fn with_store(store: impl ReconStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            match_tuning: MatchTuning::default(),
            executor: SyncExecutor::default(),
        }
    }

    /// Replace the default tunings
    pub fn with_tuning(mut self, match_tuning: MatchTuning, sync_tuning: SyncTuning) -> Self {
        self.match_tuning = match_tuning;
        self.executor = SyncExecutor::new(sync_tuning);
        self
    }

    /// The storage backend (read-only view)
    pub fn store(&self) -> &dyn ReconStore {
        self.store.as_ref()
    }

    /// The storage backend
    pub fn store_mut(&mut self) -> &mut dyn ReconStore {
        self.store.as_mut()
    }

    /// Save records handed over by the record source.
    pub fn add_contacts(
        &mut self,
        records: impl IntoIterator<Item = ContactRecord>,
    ) -> Result<()> {
        for record in records {
            self.store.save_contact(&record)?;
        }
        Ok(())
    }

    /// Get a contact by id
    pub fn contact(&self, id: &ContactId) -> Option<ContactRecord> {
        self.store.get_contact(id)
    }

    /// Number of stored contacts
    pub fn contact_count(&self) -> usize {
        self.store.contact_count()
    }

    /// Run the full matching pipeline over every stored contact.
    ///
    /// Returns pairs at or above the review threshold, highest score first.
    /// Candidate ordering, and therefore the tie-break among bit-identical
    /// scores, follows ascending contact id order.
    pub fn scan_for_matches(&self) -> Vec<ScoredMatch> {
        scorer::scan(&self.store.all_contacts(), &self.match_tuning)
    }

    /// Find the best stored candidate for an incoming (not yet stored)
    /// record.
    ///
    /// Returns the winning match when it clears the review threshold; the
    /// stored record is the surviving side. `None` means the incoming record
    /// looks distinct from everything stored, and a default policy would
    /// treat it as new.
    pub fn match_incoming(&self, record: &ContactRecord) -> Option<ScoredMatch> {
        let contacts = self.store.all_contacts();
        let index = BlockingIndex::build(&contacts);
        let candidates = index.candidates(record);
        let best = scorer::best_match(record, &candidates, &self.match_tuning)?;
        (best.band(&self.match_tuning) != MatchBand::Distinct).then_some(best)
    }

    /// Apply a review decision for an incoming record.
    ///
    /// `Merge` queues an update folding the incoming data into the matched
    /// stored record; `New` queues a create for the incoming record; `Skip`
    /// queues nothing.
    pub fn apply_decision(
        &mut self,
        incoming: &ContactRecord,
        matched: Option<&ScoredMatch>,
        decision: MatchDecision,
        origin: &str,
    ) -> Result<Option<EnqueueOutcome>> {
        match (decision, matched) {
            (MatchDecision::Merge, Some(matched)) => self
                .store
                .enqueue(
                    matched.a.id.clone(),
                    QueueOperation::Update,
                    Some(matched.merged.clone()),
                    Some(matched.a.clone()),
                    origin,
                )
                .map(Some),
            (MatchDecision::Merge, None) => {
                bail!("merge decision for {} without a matched pair", incoming.id)
            }
            (MatchDecision::New, _) => self
                .store
                .enqueue(
                    incoming.id.clone(),
                    QueueOperation::Create,
                    Some(incoming.clone()),
                    None,
                    origin,
                )
                .map(Some),
            (MatchDecision::Skip, _) => Ok(None),
        }
    }

    /// Queue the two operations a merge decision implies: an update carrying
    /// the merged data for the surviving record, and a delete for the
    /// absorbed record.
    pub fn enqueue_merge(
        &mut self,
        matched: &ScoredMatch,
        origin: &str,
    ) -> Result<Vec<EnqueueOutcome>> {
        let update = self.store.enqueue(
            matched.a.id.clone(),
            QueueOperation::Update,
            Some(matched.merged.clone()),
            Some(matched.a.clone()),
            origin,
        )?;
        let delete = self.store.enqueue(
            matched.b.id.clone(),
            QueueOperation::Delete,
            None,
            Some(matched.b.clone()),
            origin,
        )?;
        Ok(vec![update, delete])
    }

    /// Queue a change proposed by a heuristic field-fix tool.
    pub fn enqueue_change(
        &mut self,
        subject: ContactId,
        operation: QueueOperation,
        data_after: Option<ContactRecord>,
        data_before: Option<ContactRecord>,
        origin: &str,
    ) -> Result<EnqueueOutcome> {
        self.store
            .enqueue(subject, operation, data_after, data_before, origin)
    }

    /// Bulk-approve queue items; returns how many transitioned
    pub fn approve(&mut self, ids: &[QueueItemId]) -> Result<usize> {
        let ceiling = self.executor.tuning().retry_ceiling;
        self.store.approve_items(ids, ceiling)
    }

    /// Bulk-reject queue items; returns how many transitioned
    pub fn reject(&mut self, ids: &[QueueItemId]) -> Result<usize> {
        let ceiling = self.executor.tuning().retry_ceiling;
        self.store.reject_items(ids, ceiling)
    }

    /// Queue items matching a filter, in enqueue order
    pub fn queue_items(&self, filter: &QueueFilter) -> Vec<QueueItem> {
        self.store.list_items(filter)
    }

    /// Items awaiting review
    pub fn pending_items(&self) -> Vec<QueueItem> {
        self.store
            .list_items(&QueueFilter::by_status(QueueStatus::Pending))
    }

    /// Remove a queue item outright; returns whether it existed
    pub fn delete_item(&mut self, id: QueueItemId) -> Result<bool> {
        self.store.remove_item(id)
    }

    /// Handle for cancelling an in-flight sync run
    pub fn cancel_handle(&self) -> CancelFlag {
        self.executor.cancel_handle()
    }

    /// Drain approved items against the remote store.
    pub async fn run_sync(&mut self, remote: &dyn RemoteApply) -> Result<BatchResult> {
        self.executor.run(self.store.as_mut(), remote).await
    }
}

impl Default for Mergedex {
    fn default() -> Self {
        Self::new()
    }
}
