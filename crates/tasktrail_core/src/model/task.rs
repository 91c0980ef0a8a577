//! Task domain model.
//!
//! # Responsibility
//! - Define the task record and its copyable field projection.
//! - Validate field invariants before persistence.
//!
//! # Invariants
//! - `uuid` and `label` are immutable once assigned.
//! - `version` starts at 1 and grows by one on every mutation.
//! - `completed_at` is never part of the copyable projection.

use crate::model::container::ContainerId;
use crate::model::slug::is_normalized_slug;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Stable internal task identity.
pub type TaskId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Todo,
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Caller-controlled task fields.
///
/// This is exactly the set a copy carries over from source to destination.
/// Identity, label, version and the completion timestamp are owned by the
/// store and never travel with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFields {
    pub slug: String,
    pub title: String,
    pub state: TaskState,
    pub priority: Priority,
    /// Free-text markdown body.
    pub body: String,
    /// Label set, kept sorted and de-duplicated.
    pub labels: BTreeSet<String>,
    /// Unix epoch milliseconds.
    pub start_at: Option<i64>,
    /// Unix epoch milliseconds. Must be >= `start_at` when both are set.
    pub due_at: Option<i64>,
}

impl TaskFields {
    /// Creates a `todo`/`normal` field set with an empty body.
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            state: TaskState::Todo,
            priority: Priority::Normal,
            body: String::new(),
            labels: BTreeSet::new(),
            start_at: None,
            due_at: None,
        }
    }

    /// Checks field invariants.
    ///
    /// # Errors
    /// - `EmptySlug` / `SlugNotNormalized` when the slug is not storable.
    /// - `BlankTitle` when the title is blank.
    /// - `DueBeforeStart` when the schedule is inverted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.slug.is_empty() {
            return Err(ValidationError::EmptySlug);
        }
        if !is_normalized_slug(&self.slug) {
            return Err(ValidationError::SlugNotNormalized(self.slug.clone()));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle);
        }
        if let (Some(start_at), Some(due_at)) = (self.start_at, self.due_at) {
            if due_at < start_at {
                return Err(ValidationError::DueBeforeStart { start_at, due_at });
            }
        }
        Ok(())
    }
}

/// Persisted task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub uuid: TaskId,
    /// Store-assigned friendly label, e.g. `T-12`.
    pub label: String,
    pub container_uuid: ContainerId,
    #[serde(flatten)]
    pub fields: TaskFields,
    /// Unix epoch milliseconds, set when the task reached `completed`.
    pub completed_at: Option<i64>,
    /// Optimistic concurrency counter (etag).
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Task {
    /// Returns the projection carried over by a copy.
    pub fn copy_fields(&self) -> TaskFields {
        self.fields.clone()
    }

    pub fn slug(&self) -> &str {
        &self.fields.slug
    }
}
