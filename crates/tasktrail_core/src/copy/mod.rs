//! Concurrent bulk copy engine.
//!
//! # Responsibility
//! - Resolve source and destination references on a planning connection.
//! - Preview (dry run) or schedule resolved items onto the worker pool.
//! - Aggregate per-item outcomes into an ordered report.
//!
//! # Invariants
//! - Behaviour is driven only by the `CopyOptions` value passed in.
//! - Zero resolved sources fail the whole batch with `NotFound` before any
//!   transaction starts, unless zero matches are allowed.
//! - Each item commits independently; there is no batch-wide transaction.
//! - An unresolved reference counts as a failure at its input position:
//!   under fail-fast, items before it still run and items after it are not
//!   attempted.

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod guard;
pub mod options;
pub mod replicator;
pub mod report;

use crate::copy::coordinator::{CopyCoordinator, CopyItem};
use crate::copy::error::CopyError;
use crate::copy::executor::{BatchExecutor, BatchState, CancelHandle, ItemOutcome};
use crate::copy::options::{CopyOptions, CopySource, FailurePolicy};
use crate::copy::replicator::AttachmentReplicator;
use crate::copy::report::{CopyReport, CopyReportBuilder};
use crate::db::{ConnectionSource, StoreConfig};
use crate::model::container::Container;
use crate::model::task::TaskId;
use crate::repo::attachment_repo::SqliteAttachmentRepository;
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::service::resolver::{PathResolver, ResolveError};
use crate::storage::AttachmentStorage;
use log::{error, info};
use rusqlite::Connection;
use std::collections::HashSet;
use std::time::Instant;

/// One source reference after resolution, in input order.
enum Resolved {
    /// Indices into the batch item list.
    Items(Vec<usize>),
    Unresolved { reference: String, error: CopyError },
}

/// Output of the planning phase.
struct Plan {
    destination: Container,
    entries: Vec<Resolved>,
    items: Vec<CopyItem>,
}

impl Plan {
    fn unresolved(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Resolved::Unresolved { .. }))
            .count()
    }

    /// Number of items listed ahead of the first unresolved reference.
    fn items_before_first_unresolved(&self) -> usize {
        self.entries
            .iter()
            .map_while(|entry| match entry {
                Resolved::Items(indices) => Some(indices.len()),
                Resolved::Unresolved { .. } => None,
            })
            .sum()
    }
}

/// Batch copy entrypoint over one store and one attachment root.
pub struct CopyEngine<S: ConnectionSource = StoreConfig> {
    source: S,
    storage: AttachmentStorage,
}

impl CopyEngine<StoreConfig> {
    /// Engine over the store and attachment root named by `config`.
    pub fn open(config: StoreConfig) -> Self {
        let storage = AttachmentStorage::new(config.attachments_root.clone());
        Self::with_source(config, storage)
    }
}

impl<S: ConnectionSource> CopyEngine<S> {
    pub fn with_source(source: S, storage: AttachmentStorage) -> Self {
        Self { source, storage }
    }

    pub fn storage(&self) -> &AttachmentStorage {
        &self.storage
    }

    /// Copies `sources` into the container named by `destination`.
    ///
    /// # Errors
    /// - `NotFound` when the destination does not resolve, or when no source
    ///   resolves and `allow_zero_matches` is off.
    /// - `StoreFailure` when the planning connection cannot be used.
    ///
    /// Per-item failures are reported in the returned `CopyReport`.
    pub fn copy(
        &self,
        sources: &[CopySource],
        destination: &str,
        options: &CopyOptions,
    ) -> Result<CopyReport, CopyError> {
        self.copy_cancellable(sources, destination, options, &CancelHandle::new())
    }

    /// Like [`CopyEngine::copy`], stopping between items once `cancel` fires.
    pub fn copy_cancellable(
        &self,
        sources: &[CopySource],
        destination: &str,
        options: &CopyOptions,
        cancel: &CancelHandle,
    ) -> Result<CopyReport, CopyError> {
        let started = Instant::now();
        info!(
            "event=copy_batch module=copy status=start sources={} workers={} mode={} dry_run={} overwrite={}",
            sources.len(),
            options.effective_workers(),
            options.attachment_mode.as_str(),
            options.dry_run,
            options.overwrite_existing
        );

        let result = self.run(sources, destination, options, cancel, started);
        match &result {
            Ok(report) => info!(
                "event=copy_batch module=copy status=ok state={} total={} succeeded={} failed={} not_attempted={} duration_ms={}",
                report.summary.state.as_str(),
                report.summary.total,
                report.summary.succeeded,
                report.summary.failed,
                report.summary.not_attempted,
                started.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=copy_batch module=copy status=error error_code={} duration_ms={}",
                err.kind().code(),
                started.elapsed().as_millis()
            ),
        }
        result
    }

    fn run(
        &self,
        sources: &[CopySource],
        destination: &str,
        options: &CopyOptions,
        cancel: &CancelHandle,
        started: Instant,
    ) -> Result<CopyReport, CopyError> {
        let conn = self.source.open_connection()?;
        let plan = resolve_plan(&conn, sources, destination)?;

        if plan.items.is_empty() && !options.allow_zero_matches {
            let references: Vec<&str> = sources
                .iter()
                .map(|source| source.reference.as_str())
                .collect();
            return Err(CopyError::NotFound(references.join(", ")));
        }

        if options.dry_run {
            return self.preview(&conn, &plan, options, started);
        }
        drop(conn);

        let policy = options.failure_policy();
        let runnable = match policy {
            FailurePolicy::FailFast => plan.items_before_first_unresolved(),
            FailurePolicy::ContinueOnError => plan.items.len(),
        };
        info!(
            "event=copy_batch module=copy status={} items={} unresolved={} runnable={}",
            BatchState::Pending.as_str(),
            plan.items.len(),
            plan.unresolved(),
            runnable
        );

        let coordinator = CopyCoordinator::new(&self.storage, options, plan.destination.uuid);
        let executor = BatchExecutor::new(
            &self.source,
            &coordinator,
            policy,
            options.effective_workers(),
        );
        let mut outcomes: Vec<Option<ItemOutcome>> = executor
            .run(&plan.items[..runnable], cancel)
            .into_iter()
            .map(Some)
            .collect();

        let mut builder = CopyReportBuilder::new(options.attachment_mode, false);
        for entry in &plan.entries {
            match entry {
                Resolved::Unresolved { reference, error } => {
                    builder.add_unresolved(reference, error)
                }
                Resolved::Items(indices) => {
                    for index in indices {
                        let item = &plan.items[*index];
                        match outcomes.get_mut(*index).and_then(Option::take) {
                            Some(ItemOutcome::Copied(copied)) => builder.add_copied(item, copied),
                            Some(ItemOutcome::Failed(err)) => builder.add_failed(item, &err),
                            Some(ItemOutcome::NotAttempted) | None => {
                                builder.add_not_attempted(item)
                            }
                        }
                    }
                }
            }
        }

        Ok(builder.build(policy, started.elapsed()))
    }

    /// Read-only preview: guard evaluation and attachment totals per item.
    fn preview(
        &self,
        conn: &Connection,
        plan: &Plan,
        options: &CopyOptions,
        started: Instant,
    ) -> Result<CopyReport, CopyError> {
        let tasks = SqliteTaskRepository::new(conn);
        let attachments = SqliteAttachmentRepository::new(conn);
        let replicator = AttachmentReplicator::new(&self.storage, options.attachment_mode);
        let container_path =
            PathResolver::new(conn).container_display_path(plan.destination.uuid)?;

        let mut builder = CopyReportBuilder::new(options.attachment_mode, true);
        for entry in &plan.entries {
            let indices = match entry {
                Resolved::Unresolved { reference, error } => {
                    builder.add_unresolved(reference, error);
                    continue;
                }
                Resolved::Items(indices) => indices,
            };
            for index in indices {
                let item = &plan.items[*index];
                let planned = tasks
                    .get_task(item.source_uuid)?
                    .ok_or_else(|| CopyError::NotFound(item.source_ref.clone()))
                    .and_then(|source| {
                        let target = guard::evaluate(
                            &tasks,
                            &source,
                            item.expected_version,
                            plan.destination.uuid,
                            options.overwrite_existing,
                        )?;
                        let summary = replicator.preview(&attachments, source.uuid)?;
                        Ok((target.action(), source, summary))
                    });
                match planned {
                    Ok((action, source, summary)) => builder.add_planned(
                        item,
                        action,
                        format!("{container_path}/{}", source.slug()),
                        summary.count,
                        summary.total_bytes,
                    ),
                    Err(err) => builder.add_failed(item, &err),
                }
            }
        }

        let report = builder.build(options.failure_policy(), started.elapsed());
        info!(
            "event=copy_dry_run module=copy status=ok items={} attachments={} bytes={}",
            plan.items.len(),
            report.summary.attachments,
            report.summary.attachment_bytes
        );
        Ok(report)
    }
}

/// Resolves the destination and every source reference.
///
/// Sources resolving to an already scheduled task are dropped. Store
/// failures abort planning; unresolvable references are kept as entries.
fn resolve_plan(
    conn: &Connection,
    sources: &[CopySource],
    destination: &str,
) -> Result<Plan, CopyError> {
    let resolver = PathResolver::new(conn);
    let destination = resolver.resolve_container(destination)?;

    let mut seen: HashSet<TaskId> = HashSet::new();
    let mut entries = Vec::with_capacity(sources.len());
    let mut items = Vec::new();
    for source in sources {
        let tasks = match resolver.resolve_tasks(&source.reference) {
            Ok(tasks) => tasks,
            Err(ResolveError::Repo(err)) => return Err(err.into()),
            Err(err) => {
                entries.push(Resolved::Unresolved {
                    reference: source.reference.clone(),
                    error: err.into(),
                });
                continue;
            }
        };
        let mut indices = Vec::with_capacity(tasks.len());
        for task in tasks {
            if !seen.insert(task.uuid) {
                continue;
            }
            indices.push(items.len());
            items.push(CopyItem {
                index: items.len(),
                source_ref: source.reference.clone(),
                source_uuid: task.uuid,
                source_label: task.label,
                expected_version: source.expected_version,
            });
        }
        entries.push(Resolved::Items(indices));
    }

    Ok(Plan {
        destination,
        entries,
        items,
    })
}
