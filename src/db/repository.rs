use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Essay, EssayPatch, NewEssay, NewSecret, Secret};

use super::filter::parse_filter;
use super::schema::{ESSAY_FILTER_FIELDS, SCHEMA, SECRET_FILTER_FIELDS};

const ESSAY_COLUMNS: &str = "id, title, content, thumb, file, file_id, task_id, sentences, \
     telegraph, essay_type, video_link, revision, created, updated";

const SECRET_COLUMNS: &str =
    "id, name, uri, api_key, secret_key, description, ext, created, updated";

#[derive(Clone)]
pub struct Repository {
    conn: Connection,
}

enum UpdateOutcome {
    Applied,
    Stale,
    Missing,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Essay operations

    /// Inserts a new essay, generating an id unless the caller reserved one
    /// with [`new_record_id`].
    pub async fn insert_essay(&self, essay: NewEssay) -> Result<Essay> {
        let id = if essay.id.is_empty() {
            new_record_id()
        } else {
            essay.id.clone()
        };
        let now = now_string();
        let lookup_id = id.clone();

        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO essays (id, title, content, thumb, essay_type, video_link, created, updated)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)"#,
                    params![
                        id,
                        essay.title,
                        essay.content,
                        essay.thumb.unwrap_or_default(),
                        essay.essay_type,
                        essay.video_link,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;

        self.get_essay(&lookup_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("essay {lookup_id}")))
    }

    pub async fn get_essay(&self, id: &str) -> Result<Option<Essay>> {
        let id = id.to_string();
        let essay = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {ESSAY_COLUMNS} FROM essays WHERE id = ?1"))?;
                let essay = stmt.query_row(params![id], essay_from_row).optional()?;
                Ok(essay)
            })
            .await?;
        Ok(essay)
    }

    /// Essays carrying `task_id`, earliest created first.
    pub async fn find_essays_by_task_id(&self, task_id: &str) -> Result<Vec<Essay>> {
        let task_id = task_id.to_string();
        let essays = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ESSAY_COLUMNS} FROM essays WHERE task_id = ?1 ORDER BY created ASC, id ASC"
                ))?;
                let essays = stmt
                    .query_map(params![task_id], essay_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(essays)
            })
            .await?;
        Ok(essays)
    }

    /// Lists essays matching `filter`, newest first.
    pub async fn list_essays(&self, filter: &str, limit: u32, offset: u32) -> Result<Vec<Essay>> {
        let filter = parse_filter(filter, ESSAY_FILTER_FIELDS)?;
        let essays = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {ESSAY_COLUMNS} FROM essays{} ORDER BY created DESC, id DESC LIMIT ? OFFSET ?",
                    filter.where_sql()
                );
                let mut values = filter.params;
                values.push(Value::Integer(i64::from(limit)));
                values.push(Value::Integer(i64::from(offset)));

                let mut stmt = conn.prepare(&sql)?;
                let essays = stmt
                    .query_map(params_from_iter(values), essay_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(essays)
            })
            .await?;
        Ok(essays)
    }

    /// Applies `patch` only if the stored revision still equals
    /// `expected_revision`, bumping the revision on success.
    pub async fn update_essay(
        &self,
        id: &str,
        expected_revision: i64,
        patch: EssayPatch,
    ) -> Result<Essay> {
        let (assignments, mut values) = patch_assignments(patch)?;
        let essay_id = id.to_string();
        let now = now_string();

        let outcome = self
            .conn
            .call(move |conn| {
                let mut sets = assignments;
                sets.push("revision = revision + 1".to_string());
                sets.push("updated = ?".to_string());
                values.push(Value::Text(now));
                values.push(Value::Text(essay_id.clone()));
                values.push(Value::Integer(expected_revision));

                let sql = format!(
                    "UPDATE essays SET {} WHERE id = ? AND revision = ?",
                    sets.join(", ")
                );
                let changed = conn.execute(&sql, params_from_iter(values))?;
                if changed > 0 {
                    return Ok(UpdateOutcome::Applied);
                }

                let exists: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM essays WHERE id = ?1",
                    params![essay_id],
                    |row| row.get(0),
                )?;
                Ok(if exists > 0 {
                    UpdateOutcome::Stale
                } else {
                    UpdateOutcome::Missing
                })
            })
            .await?;

        match outcome {
            UpdateOutcome::Applied => self
                .get_essay(id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("essay {id}"))),
            UpdateOutcome::Stale => Err(AppError::Conflict(format!("essay {id}"))),
            UpdateOutcome::Missing => Err(AppError::NotFound(format!("essay {id}"))),
        }
    }

    /// Returns `false` when no essay had that id.
    pub async fn delete_essay(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        let deleted = self
            .conn
            .call(move |conn| {
                let changed = conn.execute("DELETE FROM essays WHERE id = ?1", params![id])?;
                Ok(changed > 0)
            })
            .await?;
        Ok(deleted)
    }

    // Secret operations

    /// First secret matching `filter`, oldest first.
    pub async fn find_secret(&self, filter: &str) -> Result<Option<Secret>> {
        let filter = parse_filter(filter, SECRET_FILTER_FIELDS)?;
        let secret = self
            .conn
            .call(move |conn| {
                let sql = format!(
                    "SELECT {SECRET_COLUMNS} FROM secrets{} ORDER BY created ASC, id ASC LIMIT 1",
                    filter.where_sql()
                );
                let mut stmt = conn.prepare(&sql)?;
                let secret = stmt
                    .query_row(params_from_iter(filter.params), secret_from_row)
                    .optional()?;
                Ok(secret)
            })
            .await?;
        Ok(secret)
    }

    pub async fn upsert_secret(&self, secret: NewSecret) -> Result<()> {
        let ext = serde_json::to_string(&secret.ext)?;
        let id = new_record_id();
        let now = now_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO secrets (id, name, uri, api_key, secret_key, description, ext, created, updated)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                       ON CONFLICT(name) DO UPDATE SET
                           uri = excluded.uri,
                           api_key = excluded.api_key,
                           secret_key = excluded.secret_key,
                           description = excluded.description,
                           ext = excluded.ext,
                           updated = excluded.updated"#,
                    params![
                        id,
                        secret.name,
                        secret.uri,
                        secret.api_key,
                        secret.secret_key,
                        secret.description,
                        ext,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

pub fn new_record_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Microsecond RFC 3339 in UTC; fixed width, so text order is time order.
fn now_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn patch_assignments(patch: EssayPatch) -> Result<(Vec<String>, Vec<Value>)> {
    let mut sets = Vec::new();
    let mut values = Vec::new();
    let mut set = |column: &str, value: String| {
        sets.push(format!("{column} = ?"));
        values.push(Value::Text(value));
    };

    if let Some(v) = patch.title {
        set("title", v);
    }
    if let Some(v) = patch.content {
        set("content", v);
    }
    if let Some(v) = patch.thumb {
        set("thumb", v.unwrap_or_default());
    }
    if let Some(v) = patch.file {
        set("file", v.unwrap_or_default());
    }
    if let Some(v) = patch.file_id {
        set("file_id", v);
    }
    if let Some(v) = patch.task_id {
        set("task_id", v);
    }
    if let Some(v) = patch.sentences {
        set("sentences", serde_json::to_string(&v)?);
    }
    if let Some(v) = patch.telegraph {
        set("telegraph", v);
    }
    if let Some(v) = patch.essay_type {
        set("essay_type", v);
    }
    if let Some(v) = patch.video_link {
        set("video_link", v);
    }

    Ok((sets, values))
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Decodes a JSON column, logging and falling back to the default when the
/// stored text is corrupt.
fn json_column<T: serde::de::DeserializeOwned + Default>(raw: &str, column: &str, id: &str) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Corrupt {} column on record {}: {}", column, id, e);
            T::default()
        }
    }
}

fn essay_from_row(row: &Row) -> rusqlite::Result<Essay> {
    let id: String = row.get(0)?;
    let sentences: String = row.get(7)?;
    Ok(Essay {
        sentences: json_column(&sentences, "sentences", &id),
        id,
        title: row.get(1)?,
        content: row.get(2)?,
        thumb: non_empty(row.get(3)?),
        file: non_empty(row.get(4)?),
        file_id: row.get(5)?,
        task_id: row.get(6)?,
        telegraph: row.get(8)?,
        essay_type: row.get(9)?,
        video_link: row.get(10)?,
        revision: row.get(11)?,
        created: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated: row
            .get::<_, String>(13)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn secret_from_row(row: &Row) -> rusqlite::Result<Secret> {
    let id: String = row.get(0)?;
    let ext: String = row.get(6)?;
    Ok(Secret {
        ext: json_column::<HashMap<String, String>>(&ext, "ext", &id),
        id,
        name: row.get(1)?,
        uri: row.get(2)?,
        api_key: row.get(3)?,
        secret_key: row.get(4)?,
        description: row.get(5)?,
        created: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated: row
            .get::<_, String>(8)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}
