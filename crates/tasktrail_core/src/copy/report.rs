//! Per-item results, batch summary and exit classification.

use crate::copy::coordinator::{CopiedTask, CopyItem};
use crate::copy::error::{CopyError, ErrorDescriptor};
use crate::copy::executor::BatchState;
use crate::copy::options::{AttachmentMode, FailurePolicy};
use crate::model::task::TaskId;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Final status of one source item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Created,
    Overwritten,
    /// Dry run: the item would be copied.
    Planned,
    Failed,
    NotAttempted,
}

impl ItemStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Created | Self::Overwritten | Self::Planned)
    }
}

/// Structured per-item record, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemResult {
    pub index: usize,
    pub source_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uuid: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_uuid: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_path: Option<String>,
    /// Dry run only: `create` or `overwrite`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_action: Option<&'static str>,
    pub attachment_mode: AttachmentMode,
    pub attachments: usize,
    pub attachment_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

impl ItemResult {
    fn for_item(index: usize, item: &CopyItem, mode: AttachmentMode, status: ItemStatus) -> Self {
        Self {
            index,
            source_ref: item.source_ref.clone(),
            source_uuid: Some(item.source_uuid),
            source_label: Some(item.source_label.clone()),
            status,
            destination_uuid: None,
            destination_label: None,
            display_path: None,
            planned_action: None,
            attachment_mode: mode,
            attachments: 0,
            attachment_bytes: 0,
            error: None,
        }
    }
}

/// Batch-level outcome as seen by a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitClass {
    AllSucceeded,
    Partial,
    NoneSucceeded,
}

impl ExitClass {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::AllSucceeded => 0,
            Self::NoneSucceeded => 1,
            Self::Partial => 2,
        }
    }
}

/// Aggregate counters for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub state: BatchState,
    pub dry_run: bool,
    pub total: usize,
    /// Resolved items a worker ran (dry run: items previewed). References
    /// that never resolved are not counted.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub attachments: usize,
    pub attachment_bytes: u64,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn exit_class(&self) -> ExitClass {
        if self.failed == 0 && self.not_attempted == 0 {
            ExitClass::AllSucceeded
        } else if self.succeeded == 0 {
            ExitClass::NoneSucceeded
        } else {
            ExitClass::Partial
        }
    }
}

/// Ordered item results plus summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub results: Vec<ItemResult>,
    pub summary: BatchSummary,
}

impl CopyReport {
    pub fn exit_class(&self) -> ExitClass {
        self.summary.exit_class()
    }

    /// One JSON object per item, newline separated.
    pub fn to_ndjson(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for result in &self.results {
            out.push_str(&serde_json::to_string(result)?);
            out.push('\n');
        }
        Ok(out)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|result| result.status.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemResult> {
        self.results
            .iter()
            .filter(|result| result.status == ItemStatus::Failed)
    }
}

impl fmt::Display for CopyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = &self.summary;
        write!(
            f,
            "[COPY] state={} total={} succeeded={} failed={} not_attempted={} attachments={} bytes={}",
            summary.state.as_str(),
            summary.total,
            summary.succeeded,
            summary.failed,
            summary.not_attempted,
            summary.attachments,
            summary.attachment_bytes
        )
    }
}

/// Accumulates item results in input order.
#[derive(Debug, Clone)]
pub struct CopyReportBuilder {
    mode: AttachmentMode,
    dry_run: bool,
    results: Vec<ItemResult>,
    attempted: usize,
}

impl CopyReportBuilder {
    pub fn new(mode: AttachmentMode, dry_run: bool) -> Self {
        Self {
            mode,
            dry_run,
            results: Vec::new(),
            attempted: 0,
        }
    }

    /// Reference that never resolved to a task.
    pub fn add_unresolved(&mut self, source_ref: &str, err: &CopyError) {
        let index = self.results.len();
        self.results.push(ItemResult {
            index,
            source_ref: source_ref.to_string(),
            source_uuid: None,
            source_label: None,
            status: ItemStatus::Failed,
            destination_uuid: None,
            destination_label: None,
            display_path: None,
            planned_action: None,
            attachment_mode: self.mode,
            attachments: 0,
            attachment_bytes: 0,
            error: Some(err.descriptor()),
        });
    }

    pub fn add_copied(&mut self, item: &CopyItem, copied: CopiedTask) {
        let status = if copied.overwritten {
            ItemStatus::Overwritten
        } else {
            ItemStatus::Created
        };
        let mut result = ItemResult::for_item(self.results.len(), item, self.mode, status);
        result.destination_uuid = Some(copied.task_uuid);
        result.destination_label = Some(copied.label);
        result.display_path = Some(copied.display_path);
        result.attachments = copied.attachments;
        result.attachment_bytes = copied.attachment_bytes;
        self.results.push(result);
        self.attempted += 1;
    }

    /// Dry-run preview of an item that would be copied.
    pub fn add_planned(
        &mut self,
        item: &CopyItem,
        action: &'static str,
        display_path: String,
        attachments: usize,
        attachment_bytes: u64,
    ) {
        let mut result =
            ItemResult::for_item(self.results.len(), item, self.mode, ItemStatus::Planned);
        result.planned_action = Some(action);
        result.display_path = Some(display_path);
        result.attachments = attachments;
        result.attachment_bytes = attachment_bytes;
        self.results.push(result);
        self.attempted += 1;
    }

    pub fn add_failed(&mut self, item: &CopyItem, err: &CopyError) {
        let mut result =
            ItemResult::for_item(self.results.len(), item, self.mode, ItemStatus::Failed);
        result.error = Some(err.descriptor());
        self.results.push(result);
        self.attempted += 1;
    }

    pub fn add_not_attempted(&mut self, item: &CopyItem) {
        let result =
            ItemResult::for_item(self.results.len(), item, self.mode, ItemStatus::NotAttempted);
        self.results.push(result);
    }

    /// Finalizes counters; the terminal state follows from `policy`.
    pub fn build(self, policy: FailurePolicy, elapsed: Duration) -> CopyReport {
        let count = |status: ItemStatus| {
            self.results
                .iter()
                .filter(|result| result.status == status)
                .count()
        };
        let failed = count(ItemStatus::Failed);
        let not_attempted = count(ItemStatus::NotAttempted);
        let succeeded = self
            .results
            .iter()
            .filter(|result| result.status.is_success())
            .count();
        let summary = BatchSummary {
            state: BatchState::settle(policy, failed, not_attempted),
            dry_run: self.dry_run,
            total: self.results.len(),
            attempted: self.attempted,
            succeeded,
            failed,
            not_attempted,
            attachments: self.results.iter().map(|result| result.attachments).sum(),
            attachment_bytes: self
                .results
                .iter()
                .map(|result| result.attachment_bytes)
                .sum(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        };
        CopyReport {
            results: self.results,
            summary,
        }
    }
}
