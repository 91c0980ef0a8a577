//! Attachment replication for one copied task.
//!
//! # Invariants
//! - Every replicated row is rooted under the destination task identity,
//!   whatever the mode.
//! - In `Full` mode the content is on disk before the metadata row is
//!   inserted, so a committed row never references a file that was not
//!   written.
//! - Files this replicator creates or replaces are reported back to the
//!   caller. On rollback created files are removed and replaced files get
//!   their previous content back.

use crate::copy::error::CopyError;
use crate::copy::options::AttachmentMode;
use crate::model::attachment::{attachment_rel_path, Attachment, AttachmentId, NewAttachment};
use crate::model::task::TaskId;
use crate::repo::attachment_repo::{AttachmentRepository, AttachmentSummary};
use crate::storage::AttachmentStorage;
use log::debug;
use std::collections::BTreeSet;

/// One attachment row written for the destination task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicatedAttachment {
    pub source_uuid: AttachmentId,
    pub attachment: Attachment,
}

/// Existing file overwritten in place, with its previous content parked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacedFile {
    pub rel_path: String,
    pub backup: String,
}

/// Filesystem effects of one replication, settled after commit/rollback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileEffects {
    /// Files that did not exist before this item; removed on rollback.
    pub created: Vec<String>,
    /// Files overwritten by this item; restored on rollback, backups
    /// discarded on commit.
    pub replaced: Vec<ReplacedFile>,
    /// Files of replaced rows that no new row points at; removed on commit.
    pub stale: Vec<String>,
}

/// Replicates attachments of one source task to one destination task.
pub struct AttachmentReplicator<'a> {
    storage: &'a AttachmentStorage,
    mode: AttachmentMode,
}

impl<'a> AttachmentReplicator<'a> {
    pub fn new(storage: &'a AttachmentStorage, mode: AttachmentMode) -> Self {
        Self { storage, mode }
    }

    pub fn mode(&self) -> AttachmentMode {
        self.mode
    }

    /// Count and byte size a real run would replicate. Read-only.
    pub fn preview(
        &self,
        attachments: &dyn AttachmentRepository,
        source_task: TaskId,
    ) -> Result<AttachmentSummary, CopyError> {
        if !self.mode.replicates() {
            return Ok(AttachmentSummary::default());
        }
        Ok(attachments.summarize_attachments(source_task)?)
    }

    /// Replaces the destination's attachment rows with copies of the
    /// source's rows.
    ///
    /// Must run inside the item's transaction. `effects` is filled even on
    /// error so the caller can clean up files written before the failure.
    pub fn replicate(
        &self,
        attachments: &dyn AttachmentRepository,
        source_task: TaskId,
        destination_task: TaskId,
        effects: &mut FileEffects,
    ) -> Result<Vec<ReplicatedAttachment>, CopyError> {
        if !self.mode.replicates() {
            return Ok(Vec::new());
        }

        let sources = attachments.list_attachments(source_task)?;
        let previous = attachments.list_attachments(destination_task)?;
        if !previous.is_empty() {
            attachments.delete_attachments(destination_task)?;
        }

        let mut replicated = Vec::with_capacity(sources.len());
        for source in &sources {
            let row = self.replicate_one(source, destination_task, effects)?;
            replicated.push(ReplicatedAttachment {
                source_uuid: source.uuid,
                attachment: attachments.insert_attachment(&row)?,
            });
        }

        let kept: BTreeSet<&str> = replicated
            .iter()
            .map(|item| item.attachment.rel_path.as_str())
            .collect();
        effects.stale.extend(
            previous
                .into_iter()
                .map(|attachment| attachment.rel_path)
                .filter(|rel_path| !kept.contains(rel_path.as_str())),
        );

        debug!(
            "event=attachment_replicate module=copy status=ok source={} destination={} mode={} count={}",
            source_task,
            destination_task,
            self.mode.as_str(),
            replicated.len()
        );
        Ok(replicated)
    }

    fn replicate_one(
        &self,
        source: &Attachment,
        destination_task: TaskId,
        effects: &mut FileEffects,
    ) -> Result<NewAttachment, CopyError> {
        let mut row = NewAttachment::for_task(source, destination_task);
        if self.mode == AttachmentMode::Full {
            let to_rel = attachment_rel_path(destination_task, &source.filename);
            let stored = self.storage.replicate(&source.rel_path, &to_rel)?;
            row.size_bytes = stored.size_bytes;
            row.checksum = stored.checksum;
            match stored.backup {
                Some(backup) => effects.replaced.push(ReplacedFile {
                    rel_path: stored.rel_path,
                    backup,
                }),
                None => effects.created.push(stored.rel_path),
            }
        }
        Ok(row)
    }
}
