//! Per-item copy transaction.
//!
//! # Responsibility
//! - Read the source, run the guard, write the destination row, replicate
//!   attachments and append audit events as one unit.
//!
//! # Invariants
//! - One `IMMEDIATE` transaction per item; any failure rolls back every row
//!   the item wrote, events included.
//! - The destination completion timestamp is always unset.
//! - The source task and the destination container are only read.

use crate::copy::error::CopyError;
use crate::copy::guard::{self, WriteTarget};
use crate::copy::options::CopyOptions;
use crate::copy::replicator::{
    AttachmentReplicator, FileEffects, ReplacedFile, ReplicatedAttachment,
};
use crate::model::container::ContainerId;
use crate::model::event::{NewEvent, ResourceType, EVENT_COPIED};
use crate::model::task::{Task, TaskId};
use crate::repo::attachment_repo::SqliteAttachmentRepository;
use crate::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use crate::repo::event_repo::{EventRepository, SqliteEventRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::RepoResult;
use crate::service::resolver::PathResolver;
use crate::storage::AttachmentStorage;
use log::warn;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::json;

/// One resolved source scheduled for copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyItem {
    /// Position in the resolved batch; results are reported in this order.
    pub index: usize,
    /// Reference the caller supplied.
    pub source_ref: String,
    pub source_uuid: TaskId,
    pub source_label: String,
    pub expected_version: Option<i64>,
}

/// Committed result of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedTask {
    pub task_uuid: TaskId,
    pub label: String,
    pub display_path: String,
    /// `true` when an existing destination task was updated in place.
    pub overwritten: bool,
    pub attachments: usize,
    pub attachment_bytes: u64,
}

/// Copies single items into one destination container.
pub struct CopyCoordinator<'a> {
    storage: &'a AttachmentStorage,
    options: &'a CopyOptions,
    destination: ContainerId,
}

impl<'a> CopyCoordinator<'a> {
    pub fn new(
        storage: &'a AttachmentStorage,
        options: &'a CopyOptions,
        destination: ContainerId,
    ) -> Self {
        Self {
            storage,
            options,
            destination,
        }
    }

    pub fn destination(&self) -> ContainerId {
        self.destination
    }

    /// Runs one item to commit or rollback.
    ///
    /// Files written for an item that rolls back are removed, and files it
    /// overwrote get their previous content back, before this returns.
    /// Files of replaced attachment rows are removed after commit.
    pub fn copy_item(&self, conn: &Connection, item: &CopyItem) -> Result<CopiedTask, CopyError> {
        let mut effects = FileEffects::default();
        let result = self.run_transaction(conn, item, &mut effects);
        match &result {
            Ok(_) => {
                let backups: Vec<String> = effects
                    .replaced
                    .iter()
                    .map(|file| file.backup.clone())
                    .collect();
                self.remove_files(&backups, item, "backup");
                self.remove_files(&effects.stale, item, "stale");
            }
            Err(_) => {
                self.remove_files(&effects.created, item, "rollback");
                self.restore_files(&effects.replaced, item);
            }
        }
        result
    }

    fn run_transaction(
        &self,
        conn: &Connection,
        item: &CopyItem,
        effects: &mut FileEffects,
    ) -> Result<CopiedTask, CopyError> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        let tasks = SqliteTaskRepository::new(&tx);

        let source = tasks
            .get_task(item.source_uuid)?
            .ok_or_else(|| CopyError::NotFound(item.source_ref.clone()))?;
        if SqliteContainerRepository::new(&tx)
            .get_container(self.destination)?
            .is_none()
        {
            return Err(CopyError::NotFound(self.destination.to_string()));
        }

        let target = guard::evaluate(
            &tasks,
            &source,
            item.expected_version,
            self.destination,
            self.options.overwrite_existing,
        )?;
        let fields = source.copy_fields();
        let (written, overwritten) = match target {
            WriteTarget::Insert => (tasks.insert_task(self.destination, &fields, None)?, false),
            WriteTarget::Overwrite(existing) => {
                (tasks.update_task(existing.uuid, &fields, None)?, true)
            }
        };

        let replicator = AttachmentReplicator::new(self.storage, self.options.attachment_mode);
        let replicated = replicator.replicate(
            &SqliteAttachmentRepository::new(&tx),
            source.uuid,
            written.uuid,
            effects,
        )?;

        let events = SqliteEventRepository::new(&tx);
        self.append_task_event(&events, &source, &written, overwritten, replicated.len())?;
        for attachment in &replicated {
            self.append_attachment_event(&events, attachment)?;
        }

        let display_path = PathResolver::new(&tx).task_display_path(&written)?;
        tx.commit()?;

        Ok(CopiedTask {
            task_uuid: written.uuid,
            label: written.label,
            display_path,
            overwritten,
            attachments: replicated.len(),
            attachment_bytes: replicated
                .iter()
                .map(|item| item.attachment.size_bytes)
                .sum(),
        })
    }

    fn append_task_event(
        &self,
        events: &SqliteEventRepository<'_>,
        source: &Task,
        written: &Task,
        overwritten: bool,
        attachment_count: usize,
    ) -> RepoResult<i64> {
        let mut payload = json!({
            "source_uuid": source.uuid,
            "source_label": source.label,
            "overwrite": overwritten,
        });
        let mode = self.options.attachment_mode;
        if mode.replicates() {
            payload["attachments"] = json!({ "count": attachment_count, "mode": mode });
        }
        events.append_event(&NewEvent {
            actor: self.options.actor.clone(),
            resource_type: ResourceType::Task,
            resource_uuid: written.uuid,
            event_type: EVENT_COPIED,
            payload,
        })
    }

    fn append_attachment_event(
        &self,
        events: &SqliteEventRepository<'_>,
        replicated: &ReplicatedAttachment,
    ) -> RepoResult<i64> {
        events.append_event(&NewEvent {
            actor: self.options.actor.clone(),
            resource_type: ResourceType::Attachment,
            resource_uuid: replicated.attachment.uuid,
            event_type: EVENT_COPIED,
            payload: json!({
                "source_uuid": replicated.source_uuid,
                "task_uuid": replicated.attachment.task_uuid,
                "mode": self.options.attachment_mode,
            }),
        })
    }

    fn restore_files(&self, replaced: &[ReplacedFile], item: &CopyItem) {
        for file in replaced {
            if let Err(err) = self.storage.restore_backup(&file.backup, &file.rel_path) {
                warn!(
                    "event=copy_cleanup module=copy status=error source={} reason=restore error={}",
                    item.source_uuid, err
                );
            }
        }
    }

    fn remove_files(&self, rel_paths: &[String], item: &CopyItem, reason: &str) {
        for rel_path in rel_paths {
            if let Err(err) = self.storage.remove_file(rel_path) {
                warn!(
                    "event=copy_cleanup module=copy status=error source={} reason={} error={}",
                    item.source_uuid, reason, err
                );
            }
        }
    }
}
