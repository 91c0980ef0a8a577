//! Optimistic-concurrency and destination-collision checks.
//!
//! Both checks run inside the item's transaction and only read. The unique
//! `(container, slug)` constraint stays the final arbiter when two workers
//! pass the collision read for the same slug.

use crate::copy::error::CopyError;
use crate::model::container::ContainerId;
use crate::model::task::Task;
use crate::repo::task_repo::TaskRepository;

/// Where the destination row will be written.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteTarget {
    /// No task with the slug exists; insert a fresh row.
    Insert,
    /// Update this existing task in place, keeping its identity and label.
    Overwrite(Task),
}

impl WriteTarget {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Insert => "create",
            Self::Overwrite(_) => "overwrite",
        }
    }
}

/// Fails with `PreconditionFailed` when the source moved past `expected`.
pub fn check_version(source: &Task, expected: Option<i64>) -> Result<(), CopyError> {
    match expected {
        Some(expected) if expected != source.version => Err(CopyError::PreconditionFailed {
            task_uuid: source.uuid,
            expected,
            actual: source.version,
        }),
        _ => Ok(()),
    }
}

/// Looks for a task with the source slug under `destination`.
pub fn check_destination(
    tasks: &dyn TaskRepository,
    source: &Task,
    destination: ContainerId,
    overwrite_existing: bool,
) -> Result<WriteTarget, CopyError> {
    let Some(existing) = tasks.find_task_by_slug(destination, source.slug())? else {
        return Ok(WriteTarget::Insert);
    };
    if !overwrite_existing {
        return Err(CopyError::AlreadyExists {
            container_uuid: destination,
            slug: existing.fields.slug,
        });
    }
    if existing.uuid == source.uuid {
        return Err(CopyError::SelfOverwrite(source.uuid));
    }
    Ok(WriteTarget::Overwrite(existing))
}

/// Runs both checks in order: version first, then collision.
pub fn evaluate(
    tasks: &dyn TaskRepository,
    source: &Task,
    expected_version: Option<i64>,
    destination: ContainerId,
    overwrite_existing: bool,
) -> Result<WriteTarget, CopyError> {
    check_version(source, expected_version)?;
    check_destination(tasks, source, destination, overwrite_existing)
}
