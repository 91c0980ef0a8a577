//! Attachment content storage on the local filesystem.
//!
//! # Responsibility
//! - Map storage-relative paths (`tasks/<task>/<filename>`) onto the
//!   configured root directory.
//! - Import external files and duplicate stored content between tasks.
//!
//! # Invariants
//! - Content is written to a temporary file in the target directory and
//!   renamed into place, so a reader never sees a partially written file.
//! - Each task owns its own subdirectory; writers for different tasks never
//!   touch the same directory entry.
//! - Content displaced by a write is kept as a backup next to it until the
//!   caller either restores or discards it.

use crate::model::attachment::attachment_rel_path;
use crate::model::task::TaskId;
use log::warn;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

const HASH_BUFFER_BYTES: usize = 64 * 1024;
const BACKUP_SUFFIX: &str = "replaced";

/// Filesystem failure tied to the path being touched.
#[derive(Debug)]
pub struct StorageError {
    pub operation: &'static str,
    pub path: PathBuf,
    pub source: io::Error,
}

impl StorageError {
    fn new(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "attachment storage {} failed for `{}`: {}",
            self.operation,
            self.path.display(),
            self.source
        )
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Facts about content written into storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredContent {
    /// Storage-relative path of the written file.
    pub rel_path: String,
    pub size_bytes: u64,
    /// Lowercase hex sha-256.
    pub checksum: String,
    /// `false` when an existing file at the same path was replaced.
    pub created: bool,
    /// Storage-relative path holding the replaced content, if any.
    pub backup: Option<String>,
}

/// Attachment content root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentStorage {
    root: PathBuf,
}

impl AttachmentStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a storage-relative path.
    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        rel_path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Copies an external file into `tasks/<task_uuid>/<filename>`.
    pub fn import_file(
        &self,
        task_uuid: TaskId,
        filename: &str,
        source: &Path,
    ) -> Result<StoredContent, StorageError> {
        let rel_path = attachment_rel_path(task_uuid, filename);
        self.write_from(source, rel_path)
    }

    /// Duplicates stored content from one relative path to another.
    ///
    /// Intermediate directories are created as needed.
    pub fn replicate(&self, from_rel: &str, to_rel: &str) -> Result<StoredContent, StorageError> {
        let source = self.resolve(from_rel);
        self.write_from(&source, to_rel.to_string())
    }

    /// Removes one stored file; a missing file is not an error.
    pub fn remove_file(&self, rel_path: &str) -> Result<(), StorageError> {
        let path = self.resolve(rel_path);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::new("remove", path, err)),
        }
    }

    /// Moves backed-up content back to `rel_path`, dropping whatever was
    /// written there since.
    pub fn restore_backup(&self, backup_rel: &str, rel_path: &str) -> Result<(), StorageError> {
        let target = self.resolve(rel_path);
        fs::rename(self.resolve(backup_rel), &target)
            .map_err(|err| StorageError::new("restore", target, err))
    }

    /// Returns whether content exists at a relative path.
    pub fn exists(&self, rel_path: &str) -> bool {
        self.resolve(rel_path).is_file()
    }

    fn write_from(&self, source: &Path, rel_path: String) -> Result<StoredContent, StorageError> {
        let target = self.resolve(&rel_path);
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).map_err(|err| StorageError::new("mkdir", &parent, err))?;

        let mut reader =
            File::open(source).map_err(|err| StorageError::new("open", source, err))?;
        let mut staged =
            NamedTempFile::new_in(&parent).map_err(|err| StorageError::new("stage", &parent, err))?;
        let size_bytes = io::copy(&mut reader, staged.as_file_mut())
            .map_err(|err| StorageError::new("copy", source, err))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|err| StorageError::new("sync", staged.path().to_path_buf(), err))?;

        let backup = if target.exists() {
            let backup_rel = backup_rel_path(&rel_path);
            fs::rename(&target, self.resolve(&backup_rel))
                .map_err(|err| StorageError::new("backup", &target, err))?;
            Some(backup_rel)
        } else {
            None
        };

        let installed = staged
            .persist(&target)
            .map_err(|err| StorageError::new("persist", &target, err.error))
            .and_then(|_| {
                checksum_file(&target).map_err(|err| StorageError::new("checksum", &target, err))
            });
        let checksum = match installed {
            Ok(checksum) => checksum,
            Err(err) => {
                if let Some(backup_rel) = &backup {
                    if let Err(restore_err) = self.restore_backup(backup_rel, &rel_path) {
                        warn!(
                            "event=attachment_restore module=storage status=error path={} error={}",
                            rel_path, restore_err
                        );
                    }
                }
                return Err(err);
            }
        };

        Ok(StoredContent {
            rel_path,
            size_bytes,
            checksum,
            created: backup.is_none(),
            backup,
        })
    }
}

/// Sibling of `rel_path` that holds displaced content: `.<name>.<uuid>.replaced`.
fn backup_rel_path(rel_path: &str) -> String {
    let (dir, name) = rel_path.rsplit_once('/').unwrap_or(("", rel_path));
    let backup_name = format!(".{name}.{}.{BACKUP_SUFFIX}", Uuid::new_v4().simple());
    if dir.is_empty() {
        backup_name
    } else {
        format!("{dir}/{backup_name}")
    }
}

/// Computes the lowercase hex sha-256 of a file.
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; HASH_BUFFER_BYTES];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::{checksum_file, AttachmentStorage};
    use std::fs;
    use uuid::Uuid;

    #[test]
    fn resolve_maps_relative_segments_under_root() {
        let storage = AttachmentStorage::new("/data/attachments");
        let task = Uuid::new_v4();
        let path = storage.resolve(&format!("tasks/{task}/a.txt"));
        assert_eq!(
            path,
            std::path::Path::new("/data/attachments")
                .join("tasks")
                .join(task.to_string())
                .join("a.txt")
        );
    }

    #[test]
    fn replicate_creates_directories_and_preserves_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AttachmentStorage::new(dir.path());
        let source_task = Uuid::new_v4();
        let external = dir.path().join("external.txt");
        fs::write(&external, b"hello attachments").unwrap();

        let imported = storage
            .import_file(source_task, "notes.txt", &external)
            .unwrap();
        assert!(imported.created);
        assert_eq!(imported.size_bytes, 17);

        let dest_task = Uuid::new_v4();
        let to_rel = format!("tasks/{dest_task}/notes.txt");
        let copied = storage.replicate(&imported.rel_path, &to_rel).unwrap();
        assert_eq!(copied.checksum, imported.checksum);
        assert_eq!(
            fs::read(storage.resolve(&to_rel)).unwrap(),
            b"hello attachments"
        );
    }

    #[test]
    fn replacing_content_keeps_a_restorable_backup() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AttachmentStorage::new(dir.path());
        let task = Uuid::new_v4();
        let old = dir.path().join("old.txt");
        let new = dir.path().join("new.txt");
        fs::write(&old, b"OLD").unwrap();
        fs::write(&new, b"NEW").unwrap();

        let first = storage.import_file(task, "notes.txt", &old).unwrap();
        assert!(first.backup.is_none());

        let rel_path = format!("tasks/{task}/notes.txt");
        let second = storage.replicate("new.txt", &rel_path).unwrap();
        assert!(!second.created);
        let backup = second.backup.unwrap();
        assert!(backup.starts_with(&format!("tasks/{task}/.notes.txt.")));
        assert_eq!(fs::read(storage.resolve(&backup)).unwrap(), b"OLD");
        assert_eq!(fs::read(storage.resolve(&rel_path)).unwrap(), b"NEW");

        storage.restore_backup(&backup, &rel_path).unwrap();
        assert_eq!(fs::read(storage.resolve(&rel_path)).unwrap(), b"OLD");
        assert!(!storage.exists(&backup));
    }

    #[test]
    fn checksum_is_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();
        assert_eq!(
            checksum_file(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn remove_file_ignores_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = AttachmentStorage::new(dir.path());
        storage.remove_file("tasks/missing/file.txt").unwrap();
    }
}
