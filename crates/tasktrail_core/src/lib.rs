//! Core of the TaskTrail work-item tracker.
//!
//! Tasks live in a tree of containers, carry attachments and leave an
//! append-only audit trail. The `copy` module is the concurrent bulk copy
//! engine built on top of the store, resolver and storage layers.

pub mod copy;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod storage;

pub use copy::error::{CopyError, ErrorDescriptor, ErrorKind};
pub use copy::executor::{BatchState, CancelHandle};
pub use copy::options::{AttachmentMode, CopyOptions, CopySource, FailurePolicy};
pub use copy::report::{BatchSummary, CopyReport, ExitClass, ItemResult, ItemStatus};
pub use copy::CopyEngine;
pub use db::{open_db, open_db_in_memory, ConnectionSource, DbError, DbResult, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::attachment::Attachment;
pub use model::container::{Container, ContainerId};
pub use model::task::{Priority, Task, TaskFields, TaskId, TaskState};
pub use repo::{RepoError, RepoResult};
pub use service::resolver::{PathResolver, ResolveError};
pub use service::task_service::{ServiceError, TaskService};
pub use storage::{AttachmentStorage, StorageError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
