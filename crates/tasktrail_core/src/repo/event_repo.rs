//! Append-only audit event repository.
//!
//! # Invariants
//! - Events are only ever inserted; the schema rejects updates and deletes.
//! - Payloads are stored as JSON text.

use crate::model::event::{EventRecord, NewEvent, ResourceType};
use crate::repo::{parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Repository interface for audit events.
pub trait EventRepository {
    /// Appends one event and returns its sequence id.
    fn append_event(&self, event: &NewEvent) -> RepoResult<i64>;
    /// Lists events about one resource in append order.
    fn list_events(
        &self,
        resource_type: ResourceType,
        resource_uuid: Uuid,
    ) -> RepoResult<Vec<EventRecord>>;
    /// Counts all events in the store.
    fn count_events(&self) -> RepoResult<u64>;
}

/// SQLite-backed audit event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn append_event(&self, event: &NewEvent) -> RepoResult<i64> {
        let payload = serde_json::to_string(&event.payload)
            .map_err(|err| RepoError::InvalidData(format!("unserializable payload: {err}")))?;
        self.conn.execute(
            "INSERT INTO events (actor, resource_type, resource_uuid, event_type, payload)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                event.actor.as_str(),
                event.resource_type.as_str(),
                event.resource_uuid.to_string(),
                event.event_type,
                payload,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn list_events(
        &self,
        resource_type: ResourceType,
        resource_uuid: Uuid,
    ) -> RepoResult<Vec<EventRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, actor, resource_type, resource_uuid, event_type, payload, created_at
             FROM events
             WHERE resource_type = ?1
               AND resource_uuid = ?2
             ORDER BY id ASC;",
        )?;
        let mut rows = stmt.query(params![resource_type.as_str(), resource_uuid.to_string()])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }

    fn count_events(&self) -> RepoResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| RepoError::InvalidData(format!("invalid event count {count}")))
    }
}

fn parse_event_row(row: &Row<'_>) -> RepoResult<EventRecord> {
    let type_text: String = row.get("resource_type")?;
    let resource_type = ResourceType::parse(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid resource type `{type_text}` in events.resource_type"
        ))
    })?;
    let resource_text: String = row.get("resource_uuid")?;
    let payload_text: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        RepoError::InvalidData(format!("invalid JSON in events.payload: {err}"))
    })?;

    Ok(EventRecord {
        id: row.get("id")?,
        actor: row.get("actor")?,
        resource_type,
        resource_uuid: parse_uuid(&resource_text, "events.resource_uuid")?,
        event_type: row.get("event_type")?,
        payload,
        created_at: row.get("created_at")?,
    })
}
