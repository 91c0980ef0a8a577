//! Container domain model.
//!
//! Containers group tasks and other containers into a tree. A container's
//! display path is the `/`-joined slug chain from the root.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable internal container identity.
pub type ContainerId = Uuid;

/// Persisted container record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub uuid: ContainerId,
    /// Store-assigned friendly label, e.g. `C-3`.
    pub label: String,
    /// `None` for root-level containers.
    pub parent_uuid: Option<ContainerId>,
    /// Unique among siblings.
    pub slug: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
}
