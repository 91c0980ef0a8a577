//! Attachment domain model and storage path convention.
//!
//! # Invariants
//! - `rel_path` is always `tasks/<owning task uuid>/<filename>`.
//! - An attachment row never points into another task's subtree, including
//!   rows produced by a copy.

use crate::model::task::TaskId;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable internal attachment identity.
pub type AttachmentId = Uuid;

const TASKS_PREFIX: &str = "tasks";

/// Persisted attachment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub uuid: AttachmentId,
    pub task_uuid: TaskId,
    pub filename: String,
    /// Path relative to the attachment storage root.
    pub rel_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Lowercase hex sha-256 of the content.
    pub checksum: String,
    pub created_at: i64,
}

/// Insert payload for one attachment row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub task_uuid: TaskId,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub checksum: String,
}

impl NewAttachment {
    /// Storage path derived from the owning task.
    pub fn rel_path(&self) -> String {
        attachment_rel_path(self.task_uuid, &self.filename)
    }

    /// Re-targets this metadata at another task, keeping content facts.
    pub fn for_task(source: &Attachment, task_uuid: TaskId) -> Self {
        Self {
            task_uuid,
            filename: source.filename.clone(),
            mime_type: source.mime_type.clone(),
            size_bytes: source.size_bytes,
            checksum: source.checksum.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_filename(&self.filename)
    }
}

/// Builds the storage-relative path `tasks/<task>/<filename>`.
pub fn attachment_rel_path(task_uuid: TaskId, filename: &str) -> String {
    format!("{TASKS_PREFIX}/{task_uuid}/{filename}")
}

/// Extracts the task-identity segment of a storage-relative path.
pub fn owner_segment(rel_path: &str) -> Option<&str> {
    let mut parts = rel_path.split('/');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(TASKS_PREFIX), Some(owner), Some(name), None) if !name.is_empty() => Some(owner),
        _ => None,
    }
}

/// Filenames must be a single, non-special path component.
pub fn validate_filename(filename: &str) -> Result<(), ValidationError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(ValidationError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{attachment_rel_path, owner_segment, validate_filename};
    use uuid::Uuid;

    #[test]
    fn rel_path_is_rooted_under_owning_task() {
        let task = Uuid::new_v4();
        let path = attachment_rel_path(task, "brief.pdf");
        assert_eq!(path, format!("tasks/{task}/brief.pdf"));
        assert_eq!(owner_segment(&path), Some(task.to_string().as_str()));
    }

    #[test]
    fn owner_segment_rejects_foreign_layouts() {
        assert_eq!(owner_segment("files/abc/brief.pdf"), None);
        assert_eq!(owner_segment("tasks/abc/nested/brief.pdf"), None);
        assert_eq!(owner_segment("tasks/abc/"), None);
    }

    #[test]
    fn filename_must_be_single_component() {
        assert!(validate_filename("report.txt").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("a/b.txt").is_err());
        assert!(validate_filename("a\\b.txt").is_err());
    }
}
