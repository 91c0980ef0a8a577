//! Attachment metadata repository.
//!
//! # Invariants
//! - `rel_path` is always derived from the owning task; callers cannot
//!   supply a path of their own.
//! - Rows never reference content outside `tasks/<task_uuid>/`.

use crate::model::attachment::{owner_segment, Attachment, AttachmentId, NewAttachment};
use crate::model::task::TaskId;
use crate::model::ValidationError;
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Attachment count and aggregate byte size for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentSummary {
    pub count: usize,
    pub total_bytes: u64,
}

/// Repository interface for attachment metadata.
pub trait AttachmentRepository {
    /// Inserts one attachment row under its owning task.
    fn insert_attachment(&self, attachment: &NewAttachment) -> RepoResult<Attachment>;
    /// Lists attachments of one task ordered by filename.
    fn list_attachments(&self, task_uuid: TaskId) -> RepoResult<Vec<Attachment>>;
    /// Deletes all attachment rows of one task. Returns deleted row count.
    fn delete_attachments(&self, task_uuid: TaskId) -> RepoResult<usize>;
    /// Counts attachments of one task and sums their sizes.
    fn summarize_attachments(&self, task_uuid: TaskId) -> RepoResult<AttachmentSummary>;
}

/// SQLite-backed attachment repository.
pub struct SqliteAttachmentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAttachmentRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn get_attachment(&self, uuid: AttachmentId) -> RepoResult<Option<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, task_uuid, filename, rel_path, mime_type, size_bytes, checksum, created_at
             FROM attachments
             WHERE uuid = ?1;",
        )?;
        let mut rows = stmt.query([uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_attachment_row(row)?));
        }
        Ok(None)
    }
}

impl AttachmentRepository for SqliteAttachmentRepository<'_> {
    fn insert_attachment(&self, attachment: &NewAttachment) -> RepoResult<Attachment> {
        attachment.validate()?;
        let size_bytes = i64::try_from(attachment.size_bytes).map_err(|_| {
            RepoError::InvalidData(format!(
                "attachment size {} exceeds storable range",
                attachment.size_bytes
            ))
        })?;

        let uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO attachments (
                uuid,
                task_uuid,
                filename,
                rel_path,
                mime_type,
                size_bytes,
                checksum
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                uuid.to_string(),
                attachment.task_uuid.to_string(),
                attachment.filename.as_str(),
                attachment.rel_path(),
                attachment.mime_type.as_str(),
                size_bytes,
                attachment.checksum.as_str(),
            ],
        )?;

        self.get_attachment(uuid)?.ok_or(RepoError::NotFound(uuid))
    }

    fn list_attachments(&self, task_uuid: TaskId) -> RepoResult<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, task_uuid, filename, rel_path, mime_type, size_bytes, checksum, created_at
             FROM attachments
             WHERE task_uuid = ?1
             ORDER BY filename ASC, uuid ASC;",
        )?;
        let mut rows = stmt.query([task_uuid.to_string()])?;
        let mut attachments = Vec::new();
        while let Some(row) = rows.next()? {
            attachments.push(parse_attachment_row(row)?);
        }
        Ok(attachments)
    }

    fn delete_attachments(&self, task_uuid: TaskId) -> RepoResult<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM attachments WHERE task_uuid = ?1;",
            [task_uuid.to_string()],
        )?;
        Ok(deleted)
    }

    fn summarize_attachments(&self, task_uuid: TaskId) -> RepoResult<AttachmentSummary> {
        let (count, total_bytes): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0)
             FROM attachments
             WHERE task_uuid = ?1;",
            [task_uuid.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(AttachmentSummary {
            count: usize::try_from(count).map_err(|_| {
                RepoError::InvalidData(format!("invalid attachment count {count}"))
            })?,
            total_bytes: u64::try_from(total_bytes).map_err(|_| {
                RepoError::InvalidData(format!("invalid attachment byte total {total_bytes}"))
            })?,
        })
    }
}

fn parse_attachment_row(row: &Row<'_>) -> RepoResult<Attachment> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "attachments.uuid")?;
    let task_text: String = row.get("task_uuid")?;
    let task_uuid = parse_uuid(&task_text, "attachments.task_uuid")?;

    let rel_path: String = row.get("rel_path")?;
    if owner_segment(&rel_path) != Some(task_text.as_str()) {
        return Err(RepoError::Validation(ValidationError::ForeignStoragePath {
            rel_path,
        }));
    }

    let size_bytes: i64 = row.get("size_bytes")?;
    let size_bytes = u64::try_from(size_bytes).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid size `{size_bytes}` in attachments.size_bytes"
        ))
    })?;

    Ok(Attachment {
        uuid,
        task_uuid,
        filename: row.get("filename")?,
        rel_path,
        mime_type: row.get("mime_type")?,
        size_bytes,
        checksum: row.get("checksum")?,
        created_at: row.get("created_at")?,
    })
}
