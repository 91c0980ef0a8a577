//! Reference resolution for tasks and containers.
//!
//! # Responsibility
//! - Map friendly labels, UUIDs and `/`-delimited slug paths to entities.
//! - Expand a trailing glob segment into zero or more tasks.
//!
//! # Invariants
//! - Resolution is read-only.
//! - A reference without `/` that looks like a friendly label (`T-12`,
//!   `C-3`) is looked up by label only; prefix it with `/` to force path
//!   resolution.
//! - Root-level segments resolve against containers without a parent.

use crate::model::container::{Container, ContainerId};
use crate::model::slug::normalize_slug;
use crate::model::task::Task;
use crate::repo::container_repo::{ContainerRepository, SqliteContainerRepository};
use crate::repo::task_repo::{SqliteTaskRepository, TaskRepository};
use crate::repo::RepoError;
use globset::{GlobBuilder, GlobMatcher};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

static FRIENDLY_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z]{1,8}-[0-9]+$").expect("valid label regex"));

const PATH_SEPARATOR: char = '/';
const GLOB_CHARS: [char; 3] = ['*', '?', '['];

/// Errors from reference resolution.
#[derive(Debug)]
pub enum ResolveError {
    /// Reference (or one of its segments) does not resolve.
    NotFound(String),
    /// Reference is syntactically unusable.
    InvalidReference(String),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ResolveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(reference) => write!(f, "reference not found: `{reference}`"),
            Self::InvalidReference(reference) => write!(f, "invalid reference: `{reference}`"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ResolveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ResolveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Returns whether `reference` is syntactically a friendly label.
pub fn is_friendly_label(reference: &str) -> bool {
    FRIENDLY_LABEL_RE.is_match(reference)
}

/// Read-only resolver over one connection.
pub struct PathResolver<'conn> {
    containers: SqliteContainerRepository<'conn>,
    tasks: SqliteTaskRepository<'conn>,
    scope: Option<ContainerId>,
}

impl<'conn> PathResolver<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            containers: SqliteContainerRepository::new(conn),
            tasks: SqliteTaskRepository::new(conn),
            scope: None,
        }
    }

    /// Resolver where single-segment task references resolve inside `scope`.
    pub fn with_scope(conn: &'conn Connection, scope: ContainerId) -> Self {
        Self {
            scope: Some(scope),
            ..Self::new(conn)
        }
    }

    /// Resolves a container reference.
    pub fn resolve_container(&self, reference: &str) -> ResolveResult<Container> {
        let trimmed = reference.trim();
        if let Some(found) = self.lookup_direct_container(trimmed)? {
            return Ok(found);
        }
        let segments = split_segments(trimmed)?;
        self.walk_containers(&segments, reference)
    }

    /// Resolves a reference to exactly one task.
    pub fn resolve_task(&self, reference: &str) -> ResolveResult<Task> {
        let trimmed = reference.trim();
        if let Some(found) = self.lookup_direct_task(trimmed)? {
            return Ok(found);
        }
        let (container, last) = self.split_task_path(trimmed, reference)?;
        self.tasks
            .find_task_by_slug(container, &normalize_slug(last))?
            .ok_or_else(|| ResolveError::NotFound(reference.to_string()))
    }

    /// Resolves a source reference to the tasks it names.
    ///
    /// A glob in the last segment may match zero tasks; every other form
    /// resolves to exactly one task or fails with `NotFound`.
    pub fn resolve_tasks(&self, reference: &str) -> ResolveResult<Vec<Task>> {
        let trimmed = reference.trim();
        let last = trimmed.rsplit(PATH_SEPARATOR).next().unwrap_or_default();
        if !last.contains(GLOB_CHARS) {
            return self.resolve_task(reference).map(|task| vec![task]);
        }

        let matcher = compile_glob(last, reference)?;
        let (container, _) = self.split_task_path(trimmed, reference)?;
        let matched = self
            .tasks
            .list_tasks(container)?
            .into_iter()
            .filter(|task| matcher.is_match(task.slug()))
            .collect();
        Ok(matched)
    }

    /// Human-readable path `<container path>/<task slug>`.
    pub fn task_display_path(&self, task: &Task) -> ResolveResult<String> {
        let container_path = self.containers.container_path(task.container_uuid)?;
        Ok(format!("{container_path}{PATH_SEPARATOR}{}", task.slug()))
    }

    /// Human-readable path of a container.
    pub fn container_display_path(&self, container_uuid: ContainerId) -> ResolveResult<String> {
        Ok(self.containers.container_path(container_uuid)?)
    }

    fn lookup_direct_container(&self, reference: &str) -> ResolveResult<Option<Container>> {
        if reference.contains(PATH_SEPARATOR) {
            return Ok(None);
        }
        if let Ok(uuid) = Uuid::parse_str(reference) {
            return match self.containers.get_container(uuid)? {
                Some(found) => Ok(Some(found)),
                None => Err(ResolveError::NotFound(reference.to_string())),
            };
        }
        if is_friendly_label(reference) {
            return match self
                .containers
                .get_container_by_label(&reference.to_ascii_uppercase())?
            {
                Some(found) => Ok(Some(found)),
                None => Err(ResolveError::NotFound(reference.to_string())),
            };
        }
        Ok(None)
    }

    fn lookup_direct_task(&self, reference: &str) -> ResolveResult<Option<Task>> {
        if reference.contains(PATH_SEPARATOR) {
            return Ok(None);
        }
        if let Ok(uuid) = Uuid::parse_str(reference) {
            return match self.tasks.get_task(uuid)? {
                Some(found) => Ok(Some(found)),
                None => Err(ResolveError::NotFound(reference.to_string())),
            };
        }
        if is_friendly_label(reference) {
            return match self
                .tasks
                .get_task_by_label(&reference.to_ascii_uppercase())?
            {
                Some(found) => Ok(Some(found)),
                None => Err(ResolveError::NotFound(reference.to_string())),
            };
        }
        Ok(None)
    }

    /// Splits a task path into its resolved container and the last segment.
    fn split_task_path<'r>(
        &self,
        trimmed: &'r str,
        reference: &str,
    ) -> ResolveResult<(ContainerId, &'r str)> {
        let segments = split_segments(trimmed)?;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ResolveError::InvalidReference(reference.to_string()))?;
        let container = if parents.is_empty() {
            self.scope
                .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?
        } else {
            self.walk_containers(parents, reference)?.uuid
        };
        Ok((container, *last))
    }

    fn walk_containers(&self, segments: &[&str], reference: &str) -> ResolveResult<Container> {
        let mut parent: Option<Container> = None;
        for segment in segments {
            let slug = normalize_slug(segment);
            if slug.is_empty() {
                return Err(ResolveError::InvalidReference(reference.to_string()));
            }
            let next = self
                .containers
                .find_child(parent.as_ref().map(|container| container.uuid), &slug)?
                .ok_or_else(|| ResolveError::NotFound(reference.to_string()))?;
            parent = Some(next);
        }
        parent.ok_or_else(|| ResolveError::InvalidReference(reference.to_string()))
    }
}

fn split_segments(reference: &str) -> ResolveResult<Vec<&str>> {
    let segments: Vec<&str> = reference
        .split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Err(ResolveError::InvalidReference(reference.to_string()));
    }
    Ok(segments)
}

fn compile_glob(pattern: &str, reference: &str) -> ResolveResult<GlobMatcher> {
    GlobBuilder::new(&pattern.trim().to_lowercase())
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|_| ResolveError::InvalidReference(reference.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{is_friendly_label, split_segments};

    #[test]
    fn friendly_label_syntax() {
        assert!(is_friendly_label("T-12"));
        assert!(is_friendly_label("c-3"));
        assert!(!is_friendly_label("fix-login"));
        assert!(!is_friendly_label("T-"));
        assert!(!is_friendly_label("work/T-1"));
    }

    #[test]
    fn split_segments_ignores_empty_parts() {
        assert_eq!(
            split_segments("/work//backend/ fix-login ").unwrap(),
            vec!["work", "backend", "fix-login"]
        );
        assert!(split_segments(" / ").is_err());
    }
}
