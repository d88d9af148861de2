//! 实体存储客户端：目录的读（按查询）/ 写（新建、按标识符更新）
//!
//! 每次 create / update 在单条记录上原子；不提供跨记录事务。
//! 两种实现：进程内（默认）与 SQLite。

pub mod entity;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use entity::{
    ClearableField, Entity, EntityId, EntityKind, EntityPatch, NewGroup, NewPerson,
};
pub use memory::InMemoryEntityStore;
pub use sqlite::SqliteEntityStore;

/// 存储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("constraint violated: {0}")]
    Constraint(String),

    /// 暂时性 I/O 失败（连接、锁、超时等）
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// 实体存储接口
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// 按名称查询，kind 为 None 时人员与群组都参与匹配；结果按 display_name 排序
    async fn search(
        &self,
        query: &str,
        kind: Option<EntityKind>,
        limit: usize,
    ) -> Result<Vec<Entity>, StoreError>;

    async fn get(&self, id: EntityId) -> Result<Option<Entity>, StoreError>;

    /// 新建人员，返回含生成标识符的记录
    async fn create_person(&self, person: NewPerson) -> Result<Entity, StoreError>;

    /// 新建群组（可挂在上级群组下）
    async fn create_group(&self, group: NewGroup) -> Result<Entity, StoreError>;

    /// 按标识符原地更新；不存在时返回 NotFound
    async fn update(&self, id: EntityId, patch: EntityPatch) -> Result<Entity, StoreError>;
}

/// 排序并截断查询结果（两种实现共用）
pub(crate) fn rank_results(mut found: Vec<Entity>, limit: usize) -> Vec<Entity> {
    found.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });
    found.truncate(limit);
    found
}
