//! 进程内实体存储（默认后端，也用于测试）

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entity::ensure_acyclic;
use super::{rank_results, Entity, EntityId, EntityKind, EntityPatch, EntityStore, NewGroup, NewPerson, StoreError};

/// 内存存储：RwLock<HashMap>，写锁内完成校验与写入，保证单记录原子
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<HashMap<EntityId, Entity>>,
    /// 成功写入次数（create + update）
    writes: AtomicUsize,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置记录（导入已有目录、测试数据）；不计入写入次数
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let map = entities.into_iter().map(|e| (e.id, e)).collect();
        Self {
            entities: RwLock::new(map),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }
}

/// 校验上级必须存在且为群组
fn check_parent(map: &HashMap<EntityId, Entity>, parent: Option<EntityId>) -> Result<(), StoreError> {
    let Some(parent) = parent else {
        return Ok(());
    };
    match map.get(&parent) {
        None => Err(StoreError::NotFound(parent)),
        Some(p) if !p.is_group() => Err(StoreError::Constraint(format!(
            "{parent} is a person, not a group"
        ))),
        Some(_) => Ok(()),
    }
}

/// 同一上级下群组名不可重复（大小写不敏感）
fn check_group_name(
    map: &HashMap<EntityId, Entity>,
    group: &Entity,
) -> Result<(), StoreError> {
    let name = group.display_name.to_lowercase();
    let clash = map.values().any(|other| {
        other.id != group.id
            && other.is_group()
            && other.parent_id == group.parent_id
            && other.display_name.to_lowercase() == name
    });
    if clash {
        return Err(StoreError::Constraint(format!(
            "a group named '{}' already exists at this level",
            group.display_name
        )));
    }
    Ok(())
}

#[async_trait]
impl EntityStore for InMemoryEntityStore {
    async fn search(
        &self,
        query: &str,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<Entity>, StoreError> {
        let map = self.entities.read().await;
        let found = map
            .values()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .filter(|e| e.matches(query))
            .cloned()
            .collect();
        Ok(rank_results(found, limit))
    }

    async fn get(&self, id: EntityId) -> Result<Option<Entity>, StoreError> {
        Ok(self.entities.read().await.get(&id).cloned())
    }

    async fn create_person(&self, person: NewPerson) -> Result<Entity, StoreError> {
        let entity = Entity::person(person)?;
        let mut map = self.entities.write().await;
        check_parent(&map, entity.parent_id)?;
        map.insert(entity.id, entity.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entity)
    }

    async fn create_group(&self, group: NewGroup) -> Result<Entity, StoreError> {
        let entity = Entity::group(group)?;
        let mut map = self.entities.write().await;
        check_parent(&map, entity.parent_id)?;
        check_group_name(&map, &entity)?;
        map.insert(entity.id, entity.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(entity)
    }

    async fn update(&self, id: EntityId, patch: EntityPatch) -> Result<Entity, StoreError> {
        let mut map = self.entities.write().await;
        let mut updated = map.get(&id).cloned().ok_or(StoreError::NotFound(id))?;
        updated.apply(&patch)?;
        if patch.parent_id.is_some() {
            check_parent(&map, updated.parent_id)?;
            if let (true, Some(parent)) = (updated.is_group(), updated.parent_id) {
                ensure_acyclic(id, parent, |cur| Ok(map.get(&cur).and_then(|e| e.parent_id)))?;
            }
        }
        if updated.is_group() {
            check_group_name(&map, &updated)?;
        }
        map.insert(id, updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}
