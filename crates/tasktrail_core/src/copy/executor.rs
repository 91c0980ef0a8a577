//! Bounded worker pool running the coordinator over a batch.
//!
//! # Responsibility
//! - Schedule resolved items onto `worker_count` workers pulling from a
//!   shared index.
//! - Apply the failure policy and caller cancellation between items.
//!
//! # Invariants
//! - Workers never share a connection; each opens its own on first use.
//! - Workers only send messages; the calling thread is the single owner of
//!   the outcome list.
//! - Cancellation and fail-fast stop scheduling only. An item that was
//!   claimed always runs to commit or rollback.

use crate::copy::coordinator::{CopiedTask, CopyCoordinator, CopyItem};
use crate::copy::error::CopyError;
use crate::copy::options::FailurePolicy;
use crate::db::ConnectionSource;
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Batch lifecycle: `Pending -> Running -> {Completed, PartiallyFailed, Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    Running,
    /// Every item succeeded.
    Completed,
    /// Every item was attempted and at least one failed.
    PartiallyFailed,
    /// Scheduling stopped early; some items were never attempted.
    Aborted,
}

impl BatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PartiallyFailed | Self::Aborted
        )
    }

    /// Terminal state for a finished run.
    pub fn settle(policy: FailurePolicy, failed: usize, not_attempted: usize) -> Self {
        if failed == 0 && not_attempted == 0 {
            return Self::Completed;
        }
        if not_attempted > 0 || policy == FailurePolicy::FailFast {
            return Self::Aborted;
        }
        Self::PartiallyFailed
    }
}

/// Outcome of one scheduled item.
#[derive(Debug)]
pub enum ItemOutcome {
    Copied(CopiedTask),
    Failed(CopyError),
    /// Scheduling stopped before a worker claimed the item.
    NotAttempted,
}

/// Cooperative stop signal shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops scheduling further items. In-flight items still finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

struct WorkerMessage {
    index: usize,
    worker_id: usize,
    outcome: Result<CopiedTask, CopyError>,
}

/// State shared by reference between workers.
struct WorkerContext<'a, S: ConnectionSource> {
    source: &'a S,
    coordinator: &'a CopyCoordinator<'a>,
    items: &'a [CopyItem],
    policy: FailurePolicy,
    cancel: &'a CancelHandle,
    next: AtomicUsize,
    halted: AtomicBool,
}

impl<S: ConnectionSource> WorkerContext<'_, S> {
    fn should_stop(&self) -> bool {
        self.halted.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    fn run_worker(&self, worker_id: usize, sender: Sender<WorkerMessage>) {
        let mut connection: Option<Connection> = None;
        while !self.should_stop() {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            let Some(item) = self.items.get(index) else {
                break;
            };
            let outcome = self.run_item(&mut connection, item);
            if outcome.is_err() && self.policy == FailurePolicy::FailFast {
                self.halted.store(true, Ordering::SeqCst);
            }
            let message = WorkerMessage {
                index,
                worker_id,
                outcome,
            };
            if sender.send(message).is_err() {
                break;
            }
        }
    }

    fn run_item(
        &self,
        slot: &mut Option<Connection>,
        item: &CopyItem,
    ) -> Result<CopiedTask, CopyError> {
        let conn = match slot.take() {
            Some(conn) => conn,
            None => self.source.open_connection()?,
        };
        let result = self.coordinator.copy_item(&conn, item);
        *slot = Some(conn);
        result
    }
}

/// Runs a batch of items with a fixed number of workers.
pub struct BatchExecutor<'a, S: ConnectionSource> {
    source: &'a S,
    coordinator: &'a CopyCoordinator<'a>,
    policy: FailurePolicy,
    workers: usize,
}

impl<'a, S: ConnectionSource> BatchExecutor<'a, S> {
    pub fn new(
        source: &'a S,
        coordinator: &'a CopyCoordinator<'a>,
        policy: FailurePolicy,
        workers: usize,
    ) -> Self {
        Self {
            source,
            coordinator,
            policy,
            workers: workers.max(1),
        }
    }

    /// Runs `items` and returns one outcome per item, in item order.
    pub fn run(&self, items: &[CopyItem], cancel: &CancelHandle) -> Vec<ItemOutcome> {
        let context = WorkerContext {
            source: self.source,
            coordinator: self.coordinator,
            items,
            policy: self.policy,
            cancel,
            next: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
        };
        let workers = self.workers.min(items.len()).max(1);
        info!(
            "event=copy_batch module=copy status={} items={} workers={}",
            BatchState::Running.as_str(),
            items.len(),
            workers
        );

        let (sender, receiver) = mpsc::channel();
        if workers == 1 {
            context.run_worker(0, sender);
        } else {
            self.run_pool(&context, workers, sender);
        }
        collect_outcomes(receiver, items)
    }

    fn run_pool(
        &self,
        context: &WorkerContext<'_, S>,
        workers: usize,
        sender: Sender<WorkerMessage>,
    ) {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("tasktrail-copy-{index}"))
            .build();
        let Ok(pool) = pool else {
            warn!(
                "event=copy_batch module=copy status=degraded workers={} fallback=serial",
                workers
            );
            context.run_worker(0, sender);
            return;
        };

        pool.in_place_scope(|scope| {
            for worker_id in 0..workers {
                let sender = sender.clone();
                scope.spawn(move |_| context.run_worker(worker_id, sender));
            }
        });
    }
}

/// Drains worker messages into an outcome list ordered like `items`.
fn collect_outcomes(receiver: Receiver<WorkerMessage>, items: &[CopyItem]) -> Vec<ItemOutcome> {
    let mut outcomes: Vec<ItemOutcome> = items.iter().map(|_| ItemOutcome::NotAttempted).collect();
    for message in receiver {
        let Some(item) = items.get(message.index) else {
            continue;
        };
        match &message.outcome {
            Ok(copied) => info!(
                "event=copy_item module=copy status=ok worker={} source={} destination={} overwritten={} attachments={}",
                message.worker_id,
                item.source_uuid,
                copied.task_uuid,
                copied.overwritten,
                copied.attachments
            ),
            Err(err) => warn!(
                "event=copy_item module=copy status=error worker={} source={} error_code={}",
                message.worker_id,
                item.source_uuid,
                err.kind().code()
            ),
        }
        outcomes[message.index] = match message.outcome {
            Ok(copied) => ItemOutcome::Copied(copied),
            Err(err) => ItemOutcome::Failed(err),
        };
    }
    outcomes
}

#[cfg(test)]
mod tests {
    use super::{BatchState, CancelHandle};
    use crate::copy::options::FailurePolicy;

    #[test]
    fn settle_maps_counts_to_terminal_state() {
        assert_eq!(
            BatchState::settle(FailurePolicy::FailFast, 0, 0),
            BatchState::Completed
        );
        assert_eq!(
            BatchState::settle(FailurePolicy::ContinueOnError, 1, 0),
            BatchState::PartiallyFailed
        );
        assert_eq!(
            BatchState::settle(FailurePolicy::FailFast, 1, 2),
            BatchState::Aborted
        );
        assert_eq!(
            BatchState::settle(FailurePolicy::FailFast, 1, 0),
            BatchState::Aborted
        );
        assert_eq!(
            BatchState::settle(FailurePolicy::ContinueOnError, 0, 3),
            BatchState::Aborted
        );
        assert!(BatchState::Aborted.is_terminal());
        assert!(!BatchState::Running.is_terminal());
    }

    #[test]
    fn cancel_handle_is_shared_between_clones() {
        let handle = CancelHandle::new();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());
        handle.cancel();
        assert!(observer.is_cancelled());
    }
}
