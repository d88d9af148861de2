//! SQLite 实体存储
//!
//! 单连接 + Mutex，所有调用经 spawn_blocking 执行；每次写入在一个事务内完成。
//! 名称匹配需要 Unicode 小写，因此在 Rust 侧过滤（目录规模下全表扫描可接受）。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::entity::ensure_acyclic;
use super::{rank_results, Entity, EntityId, EntityKind, EntityPatch, EntityStore, NewGroup, NewPerson, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id           TEXT PRIMARY KEY,
    kind         TEXT NOT NULL CHECK (kind IN ('person', 'group')),
    first_name   TEXT,
    last_name    TEXT,
    display_name TEXT NOT NULL,
    role         TEXT,
    email        TEXT,
    phone        TEXT,
    bio          TEXT,
    parent_id    TEXT REFERENCES entities(id),
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_entities_parent ON entities(parent_id);
"#;

const COLUMNS: &str = "id, kind, first_name, last_name, display_name, role, email, phone, bio, parent_id, created_at, updated_at";

/// SQLite 存储
#[derive(Clone)]
pub struct SqliteEntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEntityStore {
    /// 打开（或创建）数据库文件并建表
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let conn = Connection::open(path).map_err(map_sql_error)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sql_error)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(map_sql_error)?;
        conn.execute_batch(SCHEMA).map_err(map_sql_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 在阻塞线程池中持锁执行
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite task failed: {e}")))?
    }
}

fn map_sql_error(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Constraint(e.to_string())
        }
        _ => StoreError::Unavailable(e.to_string()),
    }
}

fn parse_id(raw: String) -> rusqlite::Result<EntityId> {
    EntityId::parse(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let kind: String = row.get(1)?;
    let kind = EntityKind::parse(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown entity kind '{kind}'").into(),
        )
    })?;
    let parent: Option<String> = row.get(9)?;
    Ok(Entity {
        id: parse_id(row.get(0)?)?,
        kind,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        display_name: row.get(4)?,
        role: row.get(5)?,
        email: row.get(6)?,
        phone: row.get(7)?,
        bio: row.get(8)?,
        parent_id: parent.map(parse_id).transpose()?,
        created_at: row.get::<_, DateTime<Utc>>(10)?,
        updated_at: row.get::<_, DateTime<Utc>>(11)?,
    })
}

fn load(tx: &Connection, id: EntityId) -> Result<Option<Entity>, StoreError> {
    tx.query_row(
        &format!("SELECT {COLUMNS} FROM entities WHERE id = ?1"),
        params![id.to_string()],
        row_to_entity,
    )
    .optional()
    .map_err(map_sql_error)
}

fn check_parent(tx: &Connection, parent: Option<EntityId>) -> Result<(), StoreError> {
    let Some(parent) = parent else {
        return Ok(());
    };
    match load(tx, parent)? {
        None => Err(StoreError::NotFound(parent)),
        Some(p) if !p.is_group() => Err(StoreError::Constraint(format!(
            "{parent} is a person, not a group"
        ))),
        Some(_) => Ok(()),
    }
}

fn check_group_name(tx: &Connection, group: &Entity) -> Result<(), StoreError> {
    let mut stmt = tx
        .prepare(
            "SELECT id, display_name FROM entities WHERE kind = 'group' AND id <> ?1 AND parent_id IS ?2",
        )
        .map_err(map_sql_error)?;
    let siblings = stmt
        .query_map(
            params![group.id.to_string(), group.parent_id.map(|p| p.to_string())],
            |row| row.get::<_, String>(1),
        )
        .map_err(map_sql_error)?;
    let name = group.display_name.to_lowercase();
    for sibling in siblings {
        if sibling.map_err(map_sql_error)?.to_lowercase() == name {
            return Err(StoreError::Constraint(format!(
                "a group named '{}' already exists at this level",
                group.display_name
            )));
        }
    }
    Ok(())
}

fn insert(tx: &Transaction<'_>, e: &Entity) -> Result<(), StoreError> {
    tx.execute(
        &format!("INSERT INTO entities ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"),
        params![
            e.id.to_string(),
            e.kind.as_str(),
            e.first_name,
            e.last_name,
            e.display_name,
            e.role,
            e.email,
            e.phone,
            e.bio,
            e.parent_id.map(|p| p.to_string()),
            e.created_at,
            e.updated_at,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

fn write_back(tx: &Transaction<'_>, e: &Entity) -> Result<(), StoreError> {
    tx.execute(
        "UPDATE entities SET first_name = ?2, last_name = ?3, display_name = ?4, role = ?5, email = ?6,
         phone = ?7, bio = ?8, parent_id = ?9, updated_at = ?10 WHERE id = ?1",
        params![
            e.id.to_string(),
            e.first_name,
            e.last_name,
            e.display_name,
            e.role,
            e.email,
            e.phone,
            e.bio,
            e.parent_id.map(|p| p.to_string()),
            e.updated_at,
        ],
    )
    .map_err(map_sql_error)?;
    Ok(())
}

#[async_trait]
impl EntityStore for SqliteEntityStore {
    async fn search(
        &self,
        query: &str,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<Entity>, StoreError> {
        let query = query.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM entities WHERE ?1 IS NULL OR kind = ?1"
                ))
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![kind.map(|k| k.as_str())], row_to_entity)
                .map_err(map_sql_error)?;
            let mut found = Vec::new();
            for row in rows {
                let entity = row.map_err(map_sql_error)?;
                if entity.matches(&query) {
                    found.push(entity);
                }
            }
            Ok(rank_results(found, limit))
        })
        .await
    }

    async fn get(&self, id: EntityId) -> Result<Option<Entity>, StoreError> {
        self.with_conn(move |conn| load(conn, id)).await
    }

    async fn create_person(&self, person: NewPerson) -> Result<Entity, StoreError> {
        let entity = Entity::person(person)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            check_parent(&tx, entity.parent_id)?;
            insert(&tx, &entity)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(entity)
        })
        .await
    }

    async fn create_group(&self, group: NewGroup) -> Result<Entity, StoreError> {
        let entity = Entity::group(group)?;
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            check_parent(&tx, entity.parent_id)?;
            check_group_name(&tx, &entity)?;
            insert(&tx, &entity)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(entity)
        })
        .await
    }

    async fn update(&self, id: EntityId, patch: EntityPatch) -> Result<Entity, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction().map_err(map_sql_error)?;
            let mut entity = load(&tx, id)?.ok_or(StoreError::NotFound(id))?;
            entity.apply(&patch)?;
            if patch.parent_id.is_some() {
                check_parent(&tx, entity.parent_id)?;
                if let (true, Some(parent)) = (entity.is_group(), entity.parent_id) {
                    ensure_acyclic(id, parent, |cur| Ok(load(&tx, cur)?.and_then(|e| e.parent_id)))?;
                }
            }
            if entity.is_group() {
                check_group_name(&tx, &entity)?;
            }
            write_back(&tx, &entity)?;
            tx.commit().map_err(map_sql_error)?;
            Ok(entity)
        })
        .await
    }
}
