//! Container repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Create containers and look them up by identity, label or (parent, slug).
//! - Derive display paths by walking parent links to the root.
//!
//! # Invariants
//! - Identity is generated here; the friendly label is assigned by the store
//!   on insert and read back.
//! - Slugs are unique among siblings, root level included.

use crate::model::container::{Container, ContainerId};
use crate::model::slug::is_normalized_slug;
use crate::model::ValidationError;
use crate::repo::{is_unique_violation, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, params_from_iter, Connection, Row};
use uuid::Uuid;

const CONTAINER_SELECT_SQL: &str = "SELECT
    uuid,
    label,
    parent_uuid,
    slug,
    title,
    created_at,
    updated_at
FROM containers";

const MAX_PATH_DEPTH: i64 = 256;

/// Repository interface for container operations.
pub trait ContainerRepository {
    /// Creates one container under an optional parent.
    fn create_container(
        &self,
        parent_uuid: Option<ContainerId>,
        slug: &str,
        title: &str,
    ) -> RepoResult<Container>;
    /// Loads one container by identity.
    fn get_container(&self, uuid: ContainerId) -> RepoResult<Option<Container>>;
    /// Loads one container by friendly label.
    fn get_container_by_label(&self, label: &str) -> RepoResult<Option<Container>>;
    /// Finds the child with `slug` under `parent_uuid` (`None` = root level).
    fn find_child(
        &self,
        parent_uuid: Option<ContainerId>,
        slug: &str,
    ) -> RepoResult<Option<Container>>;
    /// Returns the `/`-joined slug chain from the root to `uuid`.
    fn container_path(&self, uuid: ContainerId) -> RepoResult<String>;
}

/// SQLite-backed container repository.
pub struct SqliteContainerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteContainerRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ContainerRepository for SqliteContainerRepository<'_> {
    fn create_container(
        &self,
        parent_uuid: Option<ContainerId>,
        slug: &str,
        title: &str,
    ) -> RepoResult<Container> {
        if !is_normalized_slug(slug) {
            return Err(if slug.is_empty() {
                ValidationError::EmptySlug.into()
            } else {
                ValidationError::SlugNotNormalized(slug.to_string()).into()
            });
        }
        if title.trim().is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }
        if let Some(parent_uuid) = parent_uuid {
            if self.get_container(parent_uuid)?.is_none() {
                return Err(RepoError::NotFound(parent_uuid));
            }
        }

        let uuid = Uuid::new_v4();
        let inserted = self.conn.execute(
            "INSERT INTO containers (uuid, parent_uuid, slug, title)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                uuid.to_string(),
                parent_uuid.map(|value| value.to_string()),
                slug,
                title.trim(),
            ],
        );
        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::SlugConflict {
                    parent_uuid,
                    slug: slug.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        }

        self.get_container(uuid)?.ok_or(RepoError::NotFound(uuid))
    }

    fn get_container(&self, uuid: ContainerId) -> RepoResult<Option<Container>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTAINER_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_container_row(row)?));
        }
        Ok(None)
    }

    fn get_container_by_label(&self, label: &str) -> RepoResult<Option<Container>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{CONTAINER_SELECT_SQL} WHERE label = ?1;"))?;
        let mut rows = stmt.query([label])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_container_row(row)?));
        }
        Ok(None)
    }

    fn find_child(
        &self,
        parent_uuid: Option<ContainerId>,
        slug: &str,
    ) -> RepoResult<Option<Container>> {
        let (sql, bind) = match parent_uuid {
            Some(parent_uuid) => (
                format!("{CONTAINER_SELECT_SQL} WHERE parent_uuid = ?1 AND slug = ?2;"),
                vec![parent_uuid.to_string(), slug.to_string()],
            ),
            None => (
                format!("{CONTAINER_SELECT_SQL} WHERE parent_uuid IS NULL AND slug = ?1;"),
                vec![slug.to_string()],
            ),
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind))?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_container_row(row)?));
        }
        Ok(None)
    }

    fn container_path(&self, uuid: ContainerId) -> RepoResult<String> {
        let mut stmt = self.conn.prepare(
            "WITH RECURSIVE lineage(uuid, parent_uuid, slug, depth) AS (
                SELECT uuid, parent_uuid, slug, 0
                FROM containers
                WHERE uuid = ?1
                UNION ALL
                SELECT parent.uuid, parent.parent_uuid, parent.slug, lineage.depth + 1
                FROM containers parent
                INNER JOIN lineage ON parent.uuid = lineage.parent_uuid
                WHERE lineage.depth < ?2
            )
            SELECT slug FROM lineage ORDER BY depth DESC;",
        )?;
        let mut rows = stmt.query(params![uuid.to_string(), MAX_PATH_DEPTH])?;
        let mut segments = Vec::new();
        while let Some(row) = rows.next()? {
            segments.push(row.get::<_, String>(0)?);
        }
        if segments.is_empty() {
            return Err(RepoError::NotFound(uuid));
        }
        Ok(segments.join("/"))
    }
}

fn parse_container_row(row: &Row<'_>) -> RepoResult<Container> {
    let uuid_text: String = row.get("uuid")?;
    let uuid = parse_uuid(&uuid_text, "containers.uuid")?;
    let parent_uuid = row
        .get::<_, Option<String>>("parent_uuid")?
        .map(|value| parse_uuid(&value, "containers.parent_uuid"))
        .transpose()?;
    let label = row.get::<_, Option<String>>("label")?.ok_or_else(|| {
        RepoError::InvalidData(format!("container {uuid} has no assigned label"))
    })?;

    Ok(Container {
        uuid,
        label,
        parent_uuid,
        slug: row.get("slug")?,
        title: row.get("title")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
