//! Task and container use-case service.
//!
//! # Responsibility
//! - Create containers and tasks, update and transition tasks, attach files.
//! - Append one audit event per mutation in the same transaction.
//!
//! # Invariants
//! - Slugs and labels are normalized before reaching repositories.
//! - `completed_at` is stamped when a task enters `completed` and cleared
//!   when it leaves it.
//! - Attachment content lands in storage before its metadata row commits.

use crate::model::attachment::{Attachment, NewAttachment};
use crate::model::container::{Container, ContainerId};
use crate::model::event::{
    NewEvent, ResourceType, EVENT_ATTACHED, EVENT_CREATED, EVENT_STATE_CHANGED, EVENT_UPDATED,
};
use crate::model::slug::normalize_slug;
use crate::model::task::{Task, TaskFields, TaskId, TaskState};
use crate::repo::attachment_repo::{AttachmentRepository, SqliteAttachmentRepository};
use crate::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use crate::repo::event_repo::{EventRepository, SqliteEventRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::{RepoError, RepoResult};
use crate::storage::{AttachmentStorage, StorageError, StoredContent};
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::json;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Errors from task service operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Name normalizes to an empty slug.
    InvalidName(String),
    /// Label is blank after trim.
    InvalidLabel(String),
    /// Target task does not exist.
    TaskNotFound(TaskId),
    /// Caller's expected version does not match the stored one.
    VersionMismatch {
        task_uuid: TaskId,
        expected: i64,
        actual: i64,
    },
    /// Attachment source has no usable file name.
    InvalidAttachmentSource(String),
    /// Task already has an attachment with this filename.
    DuplicateAttachment { task_uuid: TaskId, filename: String },
    /// Attachment content could not be written.
    Storage(StorageError),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "name `{name}` has no usable slug characters"),
            Self::InvalidLabel(label) => write!(f, "invalid label: `{label}`"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::VersionMismatch {
                task_uuid,
                expected,
                actual,
            } => write!(
                f,
                "task {task_uuid} is at version {actual}, expected {expected}"
            ),
            Self::InvalidAttachmentSource(path) => {
                write!(f, "attachment source `{path}` has no file name")
            }
            Self::DuplicateAttachment {
                task_uuid,
                filename,
            } => write!(f, "task {task_uuid} already has an attachment `{filename}`"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::TaskNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(value.into())
    }
}

impl From<StorageError> for ServiceError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Task/container service facade acting on behalf of one actor.
pub struct TaskService<'conn> {
    conn: &'conn Connection,
    actor: String,
}

impl<'conn> TaskService<'conn> {
    pub fn new(conn: &'conn Connection, actor: impl Into<String>) -> Self {
        Self {
            conn,
            actor: actor.into(),
        }
    }

    /// Creates a container whose slug is derived from `name`.
    pub fn create_container(
        &self,
        parent_uuid: Option<ContainerId>,
        name: &str,
    ) -> ServiceResult<Container> {
        let slug = normalize_slug(name);
        if slug.is_empty() {
            return Err(ServiceError::InvalidName(name.to_string()));
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let container = SqliteContainerRepository::new(&tx)
            .create_container(parent_uuid, &slug, name)
            .map_err(ServiceError::Repo)?;
        self.append(
            &tx,
            ResourceType::Container,
            container.uuid,
            EVENT_CREATED,
            json!({ "label": container.label, "slug": container.slug }),
        )?;
        tx.commit()?;
        Ok(container)
    }

    /// Creates a task in `container_uuid`.
    ///
    /// Slug and labels are normalized; a `completed` state is stamped with
    /// the current time.
    pub fn create_task(
        &self,
        container_uuid: ContainerId,
        fields: TaskFields,
    ) -> ServiceResult<Task> {
        let fields = normalize_fields(fields)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let completed_at = (fields.state == TaskState::Completed).then(now_epoch_ms);
        let task = SqliteTaskRepository::new(&tx)
            .insert_task(container_uuid, &fields, completed_at)
            .map_err(ServiceError::Repo)?;
        self.append(
            &tx,
            ResourceType::Task,
            task.uuid,
            EVENT_CREATED,
            json!({ "label": task.label, "container_uuid": container_uuid }),
        )?;
        tx.commit()?;
        Ok(task)
    }

    /// Replaces the caller-controlled fields of a task.
    ///
    /// # Errors
    /// - `VersionMismatch` when `expected_version` is set and stale.
    pub fn update_task(
        &self,
        task_uuid: TaskId,
        expected_version: Option<i64>,
        fields: TaskFields,
    ) -> ServiceResult<Task> {
        let fields = normalize_fields(fields)?;
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteTaskRepository::new(&tx);
        let current = load_checked(&repo, task_uuid, expected_version)?;

        let completed_at = completion_for(&current, fields.state);
        let task = repo.update_task(task_uuid, &fields, completed_at)?;
        self.append(
            &tx,
            ResourceType::Task,
            task.uuid,
            EVENT_UPDATED,
            json!({ "from_version": current.version, "to_version": task.version }),
        )?;
        tx.commit()?;
        Ok(task)
    }

    /// Moves a task to another lifecycle state.
    pub fn set_state(&self, task_uuid: TaskId, state: TaskState) -> ServiceResult<Task> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let repo = SqliteTaskRepository::new(&tx);
        let current = load_checked(&repo, task_uuid, None)?;

        let mut fields = current.copy_fields();
        fields.state = state;
        let task = repo.update_task(task_uuid, &fields, completion_for(&current, state))?;
        self.append(
            &tx,
            ResourceType::Task,
            task.uuid,
            EVENT_STATE_CHANGED,
            json!({ "from": current.fields.state, "to": state }),
        )?;
        tx.commit()?;
        Ok(task)
    }

    /// Imports an external file as an attachment of `task_uuid`.
    ///
    /// The file name of `source` becomes the attachment filename and must not
    /// already be attached to the task. Content is stored before the metadata
    /// row commits; on failure newly created content is removed again.
    pub fn add_attachment(
        &self,
        storage: &AttachmentStorage,
        task_uuid: TaskId,
        source: &Path,
        mime_type: Option<&str>,
    ) -> ServiceResult<Attachment> {
        let filename = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ServiceError::InvalidAttachmentSource(source.display().to_string()))?
            .to_string();

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        if SqliteTaskRepository::new(&tx).get_task(task_uuid)?.is_none() {
            return Err(ServiceError::TaskNotFound(task_uuid));
        }
        let taken = SqliteAttachmentRepository::new(&tx)
            .list_attachments(task_uuid)?
            .iter()
            .any(|attachment| attachment.filename == filename);
        if taken {
            return Err(ServiceError::DuplicateAttachment {
                task_uuid,
                filename,
            });
        }

        let stored = storage.import_file(task_uuid, &filename, source)?;
        let recorded = self.record_attachment(&tx, task_uuid, &filename, mime_type, &stored);
        let committed = recorded.and_then(|attachment| {
            tx.commit()?;
            Ok(attachment)
        });
        let cleanup = match (&committed, &stored.backup) {
            (Ok(_), Some(backup)) => storage.remove_file(backup),
            (Ok(_), None) => Ok(()),
            (Err(_), Some(backup)) => storage.restore_backup(backup, &stored.rel_path),
            (Err(_), None) => storage.remove_file(&stored.rel_path),
        };
        if let Err(cleanup_err) = cleanup {
            warn!(
                "event=attachment_cleanup module=service status=error task={} error={}",
                task_uuid, cleanup_err
            );
        }
        committed
    }

    fn record_attachment(
        &self,
        tx: &Transaction<'_>,
        task_uuid: TaskId,
        filename: &str,
        mime_type: Option<&str>,
        stored: &StoredContent,
    ) -> ServiceResult<Attachment> {
        let attachment = SqliteAttachmentRepository::new(tx).insert_attachment(&NewAttachment {
            task_uuid,
            filename: filename.to_string(),
            mime_type: mime_type.unwrap_or(DEFAULT_MIME_TYPE).to_string(),
            size_bytes: stored.size_bytes,
            checksum: stored.checksum.clone(),
        })?;
        self.append(
            tx,
            ResourceType::Attachment,
            attachment.uuid,
            EVENT_ATTACHED,
            json!({ "task_uuid": task_uuid, "size_bytes": attachment.size_bytes }),
        )?;
        Ok(attachment)
    }

    fn append(
        &self,
        conn: &Connection,
        resource_type: ResourceType,
        resource_uuid: Uuid,
        event_type: &'static str,
        payload: serde_json::Value,
    ) -> RepoResult<i64> {
        SqliteEventRepository::new(conn).append_event(&NewEvent {
            actor: self.actor.clone(),
            resource_type,
            resource_uuid,
            event_type,
            payload,
        })
    }
}

fn load_checked(
    repo: &SqliteTaskRepository<'_>,
    task_uuid: TaskId,
    expected_version: Option<i64>,
) -> ServiceResult<Task> {
    let current = repo
        .get_task(task_uuid)?
        .ok_or(ServiceError::TaskNotFound(task_uuid))?;
    if let Some(expected) = expected_version {
        if current.version != expected {
            return Err(ServiceError::VersionMismatch {
                task_uuid,
                expected,
                actual: current.version,
            });
        }
    }
    Ok(current)
}

fn completion_for(current: &Task, next_state: TaskState) -> Option<i64> {
    if next_state != TaskState::Completed {
        return None;
    }
    current.completed_at.or_else(|| Some(now_epoch_ms()))
}

fn normalize_fields(mut fields: TaskFields) -> ServiceResult<TaskFields> {
    let slug = normalize_slug(&fields.slug);
    if slug.is_empty() {
        return Err(ServiceError::InvalidName(fields.slug));
    }
    fields.slug = slug;
    fields.labels = normalize_labels(&fields.labels)?;
    Ok(fields)
}

fn normalize_labels(labels: &BTreeSet<String>) -> ServiceResult<BTreeSet<String>> {
    let mut normalized = BTreeSet::new();
    for label in labels {
        let value = label.trim().to_lowercase();
        if value.is_empty() {
            return Err(ServiceError::InvalidLabel(label.clone()));
        }
        normalized.insert(value);
    }
    Ok(normalized)
}

fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::{normalize_fields, normalize_labels, ServiceError};
    use crate::model::task::TaskFields;
    use std::collections::BTreeSet;

    #[test]
    fn normalize_fields_slugifies_and_lowercases_labels() {
        let mut fields = TaskFields::new("Ship Release", "Ship release");
        fields.labels = BTreeSet::from(["Backend ".to_string(), "backend".to_string()]);
        let normalized = normalize_fields(fields).unwrap();
        assert_eq!(normalized.slug, "ship-release");
        assert_eq!(
            normalized.labels,
            BTreeSet::from(["backend".to_string()])
        );
    }

    #[test]
    fn blank_label_is_rejected() {
        let labels = BTreeSet::from(["  ".to_string()]);
        assert!(matches!(
            normalize_labels(&labels),
            Err(ServiceError::InvalidLabel(_))
        ));
    }
}
