//! # Sync Executor
//!
//! Drains approved queue items against the remote store: single-flight per
//! item and per run, fixed-size batches, a bounded retry ceiling, and a
//! consecutive-failure circuit breaker. Execution is single-threaded
//! cooperative; the batch loop yields back to the scheduler between batches
//! so cancellation is observed promptly.

use crate::config::SyncTuning;
use crate::model::ContactId;
use crate::queue::{ClaimOutcome, QueueFilter, QueueItem, QueueItemId, QueueStatus, ReconStore};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Remote apply collaborator.
///
/// Owns its own timeout and transport-retry semantics; any error it returns
/// is treated by this core as retryable, up to the core's own ceiling.
#[async_trait]
pub trait RemoteApply {
    async fn apply(&self, item: &QueueItem) -> Result<()>;
}

/// Cooperative cancellation handle.
///
/// Advisory: observed at batch boundaries only, so an in-flight apply always
/// completes before cancellation takes effect and no write is torn.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the current run
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Per-item outcome within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Synced,
    Failed(String),
    /// Lost the single-flight claim to a concurrent attempt
    AlreadySyncing,
}

/// One item's result within a [`BatchResult`].
#[derive(Debug, Clone)]
pub struct ItemResult {
    pub item_id: QueueItemId,
    pub subject: ContactId,
    pub outcome: ItemOutcome,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTermination {
    /// All eligible items were attempted
    Completed,
    /// The cancel flag was observed at a batch boundary
    Cancelled,
    /// Too many consecutive failures; remaining items were left untouched
    CircuitBroken { consecutive_failures: u32 },
    /// Every approved item had exhausted its retries; nothing was attempted
    MaxRetriesExceeded { excluded: usize },
}

impl fmt::Display for RunTermination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTermination::Completed => write!(f, "completed"),
            RunTermination::Cancelled => write!(f, "cancelled"),
            RunTermination::CircuitBroken {
                consecutive_failures,
            } => write!(f, "too many consecutive failures ({consecutive_failures})"),
            RunTermination::MaxRetriesExceeded { excluded } => {
                write!(f, "{excluded} items exceeded maximum retries")
            }
        }
    }
}

/// Aggregate result of one executor run.
///
/// Individual item failures are reported here, never raised; a returned
/// error from [`SyncExecutor::run`] means total inability to proceed.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub results: Vec<ItemResult>,
    pub synced: usize,
    pub failed: usize,
    /// Approved items excluded up front because their retry count reached
    /// the ceiling
    pub excluded_max_retries: usize,
    pub termination: RunTermination,
}

impl BatchResult {
    /// Number of items the run attempted
    pub fn attempted(&self) -> usize {
        self.results.len()
    }

    fn empty(termination: RunTermination, excluded: usize) -> Self {
        Self {
            results: Vec::new(),
            synced: 0,
            failed: 0,
            excluded_max_retries: excluded,
            termination,
        }
    }
}

/// Coordinates sync runs.
///
/// Owns the run-in-progress flag and the cancel flag, so no run state is
/// ambient: two tasks sharing one executor cannot start overlapping runs,
/// and callers cancel through a handle they were explicitly given.
#[derive(Debug)]
pub struct SyncExecutor {
    tuning: SyncTuning,
    run_in_progress: Arc<AtomicBool>,
    cancel: CancelFlag,
}

impl SyncExecutor {
    pub fn new(tuning: SyncTuning) -> Self {
        Self {
            tuning,
            run_in_progress: Arc::new(AtomicBool::new(false)),
            cancel: CancelFlag::new(),
        }
    }

    pub fn tuning(&self) -> &SyncTuning {
        &self.tuning
    }

    /// Whether a run currently holds the executor
    pub fn is_running(&self) -> bool {
        self.run_in_progress.load(Ordering::SeqCst)
    }

    /// Handle callers use to request cancellation of the current run
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Drain approved items against the remote store.
    ///
    /// Filters out items at the retry ceiling (reporting, never silently
    /// skipping), processes the rest in fixed-size batches, and prunes
    /// synced items after any run with at least one success. Errors are
    /// reserved for systemic failure: an overlapping run or an unavailable
    /// store.
    pub async fn run(
        &self,
        store: &mut dyn ReconStore,
        remote: &dyn RemoteApply,
    ) -> Result<BatchResult> {
        let _guard = RunGuard::acquire(&self.run_in_progress)?;
        self.cancel.reset();

        let approved = store.list_items(&QueueFilter::by_status(QueueStatus::Approved));
        let (eligible, exhausted): (Vec<QueueItem>, Vec<QueueItem>) = approved
            .into_iter()
            .partition(|item| item.retry_count < self.tuning.retry_ceiling);
        let excluded = exhausted.len();

        if eligible.is_empty() {
            if excluded > 0 {
                warn!(excluded, "all approved items exceeded maximum retries");
                return Ok(BatchResult::empty(
                    RunTermination::MaxRetriesExceeded { excluded },
                    excluded,
                ));
            }
            return Ok(BatchResult::empty(RunTermination::Completed, 0));
        }

        let mut results = Vec::with_capacity(eligible.len());
        let mut synced = 0;
        let mut failed = 0;
        let mut consecutive_failures = 0u32;
        let mut termination = RunTermination::Completed;

        'batches: for batch in eligible.chunks(self.tuning.batch_size.max(1)) {
            if self.cancel.is_cancelled() {
                debug!("cancellation observed at batch boundary");
                termination = RunTermination::Cancelled;
                break;
            }

            for item in batch {
                match store.claim_syncing(item.id)? {
                    ClaimOutcome::Claimed => {}
                    ClaimOutcome::AlreadySyncing => {
                        debug!(item = %item.id, "item held by a concurrent attempt");
                        results.push(ItemResult {
                            item_id: item.id,
                            subject: item.subject.clone(),
                            outcome: ItemOutcome::AlreadySyncing,
                        });
                        continue;
                    }
                    ClaimOutcome::Ineligible => continue,
                }

                // Re-read so the collaborator sees the claimed item.
                let claimed = store.get_item(item.id).unwrap_or_else(|| item.clone());

                match remote.apply(&claimed).await {
                    Ok(()) => {
                        store.mark_synced(item.id)?;
                        synced += 1;
                        consecutive_failures = 0;
                        results.push(ItemResult {
                            item_id: item.id,
                            subject: item.subject.clone(),
                            outcome: ItemOutcome::Synced,
                        });
                    }
                    Err(error) => {
                        let message = error.to_string();
                        store.mark_failed(item.id, &message)?;
                        failed += 1;
                        consecutive_failures += 1;
                        results.push(ItemResult {
                            item_id: item.id,
                            subject: item.subject.clone(),
                            outcome: ItemOutcome::Failed(message),
                        });

                        if consecutive_failures >= self.tuning.breaker_threshold {
                            warn!(
                                consecutive_failures,
                                "circuit breaker tripped, aborting run"
                            );
                            termination = RunTermination::CircuitBroken {
                                consecutive_failures,
                            };
                            break 'batches;
                        }
                    }
                }
            }

            // Yield so a single-threaded scheduler stays responsive between
            // batches.
            tokio::task::yield_now().await;
        }

        if synced > 0 {
            let pruned = store.prune_synced()?;
            debug!(pruned, "pruned synced items after run");
        }

        Ok(BatchResult {
            results,
            synced,
            failed,
            excluded_max_retries: excluded,
            termination,
        })
    }
}

impl Default for SyncExecutor {
    fn default() -> Self {
        Self::new(SyncTuning::default())
    }
}

/// Holds the run flag for the duration of a run; cleared on every exit path.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("a sync run is already in progress");
        }
        Ok(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
