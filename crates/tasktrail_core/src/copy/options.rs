//! Immutable copy options and source references.

use serde::{Deserialize, Serialize};

const DEFAULT_ACTOR: &str = "local";

/// How attachments travel with a copied task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentMode {
    /// Neither metadata nor content is copied.
    Skip,
    /// Metadata rows are re-pointed at the destination task; content is not
    /// duplicated and may be missing at the new path.
    #[default]
    MetadataOnly,
    /// Content is duplicated under the destination task before metadata.
    Full,
}

impl AttachmentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::MetadataOnly => "metadata_only",
            Self::Full => "full",
        }
    }

    pub fn replicates(self) -> bool {
        self != Self::Skip
    }
}

/// What the batch does after an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Stop scheduling new items; in-flight items still finish.
    FailFast,
    /// Run every item regardless of earlier failures.
    ContinueOnError,
}

/// One source reference plus its optional optimistic-concurrency guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySource {
    /// Friendly label, UUID or slug path; the last path segment may be a glob.
    pub reference: String,
    /// Copy only if the source is still at this version.
    pub expected_version: Option<i64>,
}

impl CopySource {
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            expected_version: None,
        }
    }

    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

impl From<&str> for CopySource {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Options for one copy batch. Built once and passed down by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub dry_run: bool,
    /// Concurrent workers; values below 1 behave as 1.
    pub worker_count: usize,
    pub continue_on_error: bool,
    pub attachment_mode: AttachmentMode,
    pub overwrite_existing: bool,
    pub allow_zero_matches: bool,
    /// Actor recorded on audit events.
    pub actor: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            worker_count: 1,
            continue_on_error: false,
            attachment_mode: AttachmentMode::default(),
            overwrite_existing: false,
            allow_zero_matches: false,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }
}

impl CopyOptions {
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_workers(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_attachment_mode(mut self, attachment_mode: AttachmentMode) -> Self {
        self.attachment_mode = attachment_mode;
        self
    }

    pub fn with_overwrite(mut self, overwrite_existing: bool) -> Self {
        self.overwrite_existing = overwrite_existing;
        self
    }

    pub fn with_allow_zero_matches(mut self, allow_zero_matches: bool) -> Self {
        self.allow_zero_matches = allow_zero_matches;
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        if self.continue_on_error {
            FailurePolicy::ContinueOnError
        } else {
            FailurePolicy::FailFast
        }
    }

    pub fn effective_workers(&self) -> usize {
        self.worker_count.max(1)
    }
}
