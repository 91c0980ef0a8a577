//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide insert/update/lookup APIs over `tasks` and `task_labels`.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Identity is generated here and the friendly label is read back after
//!   insert; both are never rewritten afterwards.
//! - Every write increments `version` by exactly one.
//! - Label sets are replaced as a whole, inside the caller's transaction.

use crate::model::container::ContainerId;
use crate::model::task::{Priority, Task, TaskFields, TaskId, TaskState};
use crate::repo::{is_unique_violation, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::collections::BTreeSet;
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    uuid,
    label,
    container_uuid,
    slug,
    title,
    state,
    priority,
    body,
    start_at,
    due_at,
    completed_at,
    version,
    created_at,
    updated_at
FROM tasks";

/// Repository interface for task operations.
pub trait TaskRepository {
    /// Inserts a new task and returns it with store-assigned label/version.
    fn insert_task(
        &self,
        container_uuid: ContainerId,
        fields: &TaskFields,
        completed_at: Option<i64>,
    ) -> RepoResult<Task>;
    /// Rewrites all caller-controlled fields and the completion timestamp
    /// of an existing task, keeping identity, label and container.
    fn update_task(
        &self,
        uuid: TaskId,
        fields: &TaskFields,
        completed_at: Option<i64>,
    ) -> RepoResult<Task>;
    /// Loads one task by identity.
    fn get_task(&self, uuid: TaskId) -> RepoResult<Option<Task>>;
    /// Loads one task by friendly label.
    fn get_task_by_label(&self, label: &str) -> RepoResult<Option<Task>>;
    /// Finds the task with `slug` in `container_uuid`.
    fn find_task_by_slug(
        &self,
        container_uuid: ContainerId,
        slug: &str,
    ) -> RepoResult<Option<Task>>;
    /// Lists tasks in one container ordered by slug.
    fn list_tasks(&self, container_uuid: ContainerId) -> RepoResult<Vec<Task>>;
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_tasks(&self, where_sql: &str, bind: &[&dyn ToSql]) -> RepoResult<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!("{TASK_SELECT_SQL} {where_sql}"))?;
        let mut rows = stmt.query(bind)?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        for task in &mut tasks {
            task.fields.labels = load_labels(self.conn, task.uuid)?;
        }
        Ok(tasks)
    }

    fn query_one(&self, where_sql: &str, bind: &[&dyn ToSql]) -> RepoResult<Option<Task>> {
        Ok(self.query_tasks(where_sql, bind)?.into_iter().next())
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn insert_task(
        &self,
        container_uuid: ContainerId,
        fields: &TaskFields,
        completed_at: Option<i64>,
    ) -> RepoResult<Task> {
        fields.validate()?;
        ensure_container_exists(self.conn, container_uuid)?;

        let uuid = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO tasks (
                uuid,
                container_uuid,
                slug,
                title,
                state,
                priority,
                body,
                start_at,
                due_at,
                completed_at,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1);",
            params![
                uuid.to_string(),
                container_uuid.to_string(),
                fields.slug.as_str(),
                fields.title.as_str(),
                fields.state.as_str(),
                fields.priority.as_str(),
                fields.body.as_str(),
                fields.start_at,
                fields.due_at,
                completed_at,
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::SlugConflict {
                    parent_uuid: Some(container_uuid),
                    slug: fields.slug.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        replace_labels(self.conn, uuid, &fields.labels)?;
        self.get_task(uuid)?.ok_or(RepoError::NotFound(uuid))
    }

    fn update_task(
        &self,
        uuid: TaskId,
        fields: &TaskFields,
        completed_at: Option<i64>,
    ) -> RepoResult<Task> {
        fields.validate()?;
        let current = self.get_task(uuid)?.ok_or(RepoError::NotFound(uuid))?;

        let updated = self.conn.execute(
            "UPDATE tasks
             SET
                slug = ?2,
                title = ?3,
                state = ?4,
                priority = ?5,
                body = ?6,
                start_at = ?7,
                due_at = ?8,
                completed_at = ?9,
                version = version + 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                uuid.to_string(),
                fields.slug.as_str(),
                fields.title.as_str(),
                fields.state.as_str(),
                fields.priority.as_str(),
                fields.body.as_str(),
                fields.start_at,
                fields.due_at,
                completed_at,
            ],
        );
        match updated {
            Ok(0) => return Err(RepoError::NotFound(uuid)),
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::SlugConflict {
                    parent_uuid: Some(current.container_uuid),
                    slug: fields.slug.clone(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        replace_labels(self.conn, uuid, &fields.labels)?;
        self.get_task(uuid)?.ok_or(RepoError::NotFound(uuid))
    }

    fn get_task(&self, uuid: TaskId) -> RepoResult<Option<Task>> {
        self.query_one("WHERE uuid = ?1;", params![uuid.to_string()])
    }

    fn get_task_by_label(&self, label: &str) -> RepoResult<Option<Task>> {
        self.query_one("WHERE label = ?1;", params![label])
    }

    fn find_task_by_slug(
        &self,
        container_uuid: ContainerId,
        slug: &str,
    ) -> RepoResult<Option<Task>> {
        self.query_one(
            "WHERE container_uuid = ?1 AND slug = ?2;",
            params![container_uuid.to_string(), slug],
        )
    }

    fn list_tasks(&self, container_uuid: ContainerId) -> RepoResult<Vec<Task>> {
        self.query_tasks(
            "WHERE container_uuid = ?1 ORDER BY slug ASC;",
            params![container_uuid.to_string()],
        )
    }
}

fn ensure_container_exists(conn: &Connection, container_uuid: ContainerId) -> RepoResult<()> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM containers WHERE uuid = ?1;",
            [container_uuid.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(RepoError::NotFound(container_uuid));
    }
    Ok(())
}

fn replace_labels(
    conn: &Connection,
    task_uuid: TaskId,
    labels: &BTreeSet<String>,
) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM task_labels WHERE task_uuid = ?1;",
        [task_uuid.to_string()],
    )?;
    let mut stmt = conn.prepare("INSERT INTO task_labels (task_uuid, label) VALUES (?1, ?2);")?;
    for label in labels {
        stmt.execute(params![task_uuid.to_string(), label.as_str()])?;
    }
    Ok(())
}

fn load_labels(conn: &Connection, task_uuid: TaskId) -> RepoResult<BTreeSet<String>> {
    let mut stmt = conn.prepare(
        "SELECT label
         FROM task_labels
         WHERE task_uuid = ?1
         ORDER BY label ASC;",
    )?;
    let mut rows = stmt.query([task_uuid.to_string()])?;
    let mut labels = BTreeSet::new();
    while let Some(row) = rows.next()? {
        labels.insert(row.get::<_, String>(0)?);
    }
    Ok(labels)
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "tasks.uuid")?;
    let container_text: String = row.get("container_uuid")?;
    let container_uuid = parse_uuid(&container_text, "tasks.container_uuid")?;

    let label = row
        .get::<_, Option<String>>("label")?
        .ok_or_else(|| RepoError::InvalidData(format!("task {uuid} has no assigned label")))?;

    let state_text: String = row.get("state")?;
    let state = TaskState::parse(&state_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid task state `{state_text}` in tasks.state"))
    })?;
    let priority_text: String = row.get("priority")?;
    let priority = Priority::parse(&priority_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid task priority `{priority_text}` in tasks.priority"
        ))
    })?;

    Ok(Task {
        uuid,
        label,
        container_uuid,
        fields: TaskFields {
            slug: row.get("slug")?,
            title: row.get("title")?,
            state,
            priority,
            body: row.get("body")?,
            labels: BTreeSet::new(),
            start_at: row.get("start_at")?,
            due_at: row.get("due_at")?,
        },
        completed_at: row.get("completed_at")?,
        version: row.get("version")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
