//! Domain model for the work-item tracker.
//!
//! # Responsibility
//! - Define tasks, containers, attachments and audit events.
//! - Hold the pure invariants (slugs, storage paths, field validation) that
//!   repositories enforce before persistence.
//!
//! # Invariants
//! - Every entity is identified by a stable UUID that is never reused.
//! - Friendly labels are assigned by the store, never by callers.

pub mod attachment;
pub mod container;
pub mod event;
pub mod slug;
pub mod task;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Violations of model invariants detected before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Slug is empty after normalization.
    EmptySlug,
    /// Slug is not in normalized form.
    SlugNotNormalized(String),
    /// Title is blank after trim.
    BlankTitle,
    /// Due timestamp is earlier than start timestamp.
    DueBeforeStart { start_at: i64, due_at: i64 },
    /// Attachment filename is empty or not a single path component.
    InvalidFilename(String),
    /// Attachment storage path does not belong to the owning task.
    ForeignStoragePath { rel_path: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySlug => write!(f, "slug must not be empty"),
            Self::SlugNotNormalized(slug) => write!(f, "slug `{slug}` is not normalized"),
            Self::BlankTitle => write!(f, "title must not be blank"),
            Self::DueBeforeStart { start_at, due_at } => {
                write!(f, "due_at {due_at} is earlier than start_at {start_at}")
            }
            Self::InvalidFilename(name) => write!(f, "invalid attachment filename `{name}`"),
            Self::ForeignStoragePath { rel_path } => {
                write!(f, "attachment path `{rel_path}` is outside its task subtree")
            }
        }
    }
}

impl Error for ValidationError {}
