//! Copy engine error taxonomy.

use crate::db::DbError;
use crate::model::container::ContainerId;
use crate::model::task::TaskId;
use crate::repo::RepoError;
use crate::service::resolver::ResolveError;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable classification of copy failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    PreconditionFailed,
    AlreadyExists,
    IoFailure,
    StoreFailure,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::PreconditionFailed => "precondition_failed",
            Self::AlreadyExists => "already_exists",
            Self::IoFailure => "io_failure",
            Self::StoreFailure => "store_failure",
        }
    }
}

/// Serializable error record for per-item output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

/// Copy engine error.
#[derive(Debug)]
pub enum CopyError {
    /// Reference or record does not resolve.
    NotFound(String),
    /// Source moved past the caller's expected version.
    PreconditionFailed {
        task_uuid: TaskId,
        expected: i64,
        actual: i64,
    },
    /// Destination already holds the slug and overwrite is off, or a
    /// concurrent copy claimed it first.
    AlreadyExists {
        container_uuid: ContainerId,
        slug: String,
    },
    /// Overwrite would target the source task itself.
    SelfOverwrite(TaskId),
    /// Attachment content could not be read or written.
    Io(StorageError),
    /// Store-level failure (transaction, constraint, connection).
    Store(RepoError),
}

impl CopyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::AlreadyExists { .. } | Self::SelfOverwrite(_) => ErrorKind::AlreadyExists,
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Store(_) => ErrorKind::StoreFailure,
        }
    }

    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl Display for CopyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(reference) => write!(f, "not found: {reference}"),
            Self::PreconditionFailed {
                task_uuid,
                expected,
                actual,
            } => write!(
                f,
                "task {task_uuid} is at version {actual}, expected {expected}"
            ),
            Self::AlreadyExists {
                container_uuid,
                slug,
            } => write!(f, "task `{slug}` already exists in container {container_uuid}"),
            Self::SelfOverwrite(task_uuid) => {
                write!(f, "task {task_uuid} cannot be copied over itself")
            }
            Self::Io(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CopyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CopyError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::NotFound(id.to_string()),
            RepoError::SlugConflict {
                parent_uuid: Some(container_uuid),
                slug,
            } => Self::AlreadyExists {
                container_uuid,
                slug,
            },
            other => Self::Store(other),
        }
    }
}

impl From<DbError> for CopyError {
    fn from(value: DbError) -> Self {
        Self::Store(RepoError::Db(value))
    }
}

impl From<rusqlite::Error> for CopyError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(RepoError::from(value))
    }
}

impl From<StorageError> for CopyError {
    fn from(value: StorageError) -> Self {
        Self::Io(value)
    }
}

impl From<ResolveError> for CopyError {
    fn from(value: ResolveError) -> Self {
        match value {
            ResolveError::NotFound(reference) | ResolveError::InvalidReference(reference) => {
                Self::NotFound(reference)
            }
            ResolveError::Repo(err) => Self::from(err),
        }
    }
}
