//! 目录实体：人员与群组（部门/小组）
//!
//! 标识符只由存储生成（UUID v4）；人员的 display_name 由 first_name + last_name 推导。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;

/// 实体标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// 生成新标识符；仅供存储实现调用
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// 语法校验：必须是合法 UUID
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s.trim()).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for EntityId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Person,
    Group,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Group => "group",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "person" => Some(EntityKind::Person),
            "group" => Some(EntityKind::Group),
            _ => None,
        }
    }
}

/// 目录记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// 人员为「名 姓」，群组为群组名
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// 自由文本简介（群组为描述）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// 所属群组（人员）或上级群组（群组）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn is_group(&self) -> bool {
        self.kind == EntityKind::Group
    }

    /// 由 NewPerson 构建记录（校验姓名非空）
    pub fn person(new: NewPerson) -> Result<Self, StoreError> {
        let first_name = required_name("first_name", &new.first_name)?;
        let last_name = required_name("last_name", &new.last_name)?;
        let now = Utc::now();
        Ok(Self {
            id: EntityId::generate(),
            kind: EntityKind::Person,
            display_name: full_name(&first_name, &last_name),
            first_name: Some(first_name),
            last_name: Some(last_name),
            role: normalize(new.role),
            email: normalize(new.email),
            phone: normalize(new.phone),
            bio: normalize(new.bio),
            parent_id: new.group_id,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn group(new: NewGroup) -> Result<Self, StoreError> {
        let name = required_name("name", &new.name)?;
        let now = Utc::now();
        Ok(Self {
            id: EntityId::generate(),
            kind: EntityKind::Group,
            first_name: None,
            last_name: None,
            display_name: name,
            role: None,
            email: None,
            phone: None,
            bio: normalize(new.description),
            parent_id: new.parent_id,
            created_at: now,
            updated_at: now,
        })
    }

    /// 应用补丁；字段与实体类型不符时返回 Constraint
    pub fn apply(&mut self, patch: &EntityPatch) -> Result<(), StoreError> {
        match self.kind {
            EntityKind::Person => {
                if patch.name.is_some() {
                    return Err(StoreError::Constraint(
                        "people are renamed through first_name / last_name, not name".to_string(),
                    ));
                }
                if let Some(first) = &patch.first_name {
                    self.first_name = Some(required_name("first_name", first)?);
                }
                if let Some(last) = &patch.last_name {
                    self.last_name = Some(required_name("last_name", last)?);
                }
                self.display_name = full_name(
                    self.first_name.as_deref().unwrap_or_default(),
                    self.last_name.as_deref().unwrap_or_default(),
                );
            }
            EntityKind::Group => {
                let person_only = [
                    ("first_name", patch.first_name.is_some()),
                    ("last_name", patch.last_name.is_some()),
                    ("role", patch.role.is_some()),
                    ("email", patch.email.is_some()),
                    ("phone", patch.phone.is_some()),
                ];
                if let Some((field, _)) = person_only.iter().find(|(_, set)| *set) {
                    return Err(StoreError::Constraint(format!(
                        "field '{field}' does not apply to a group"
                    )));
                }
                if let Some(name) = &patch.name {
                    self.display_name = required_name("name", name)?;
                }
            }
        }

        for field in &patch.clear {
            match (field, self.kind) {
                (ClearableField::Bio, _) => self.bio = None,
                (ClearableField::ParentId, _) => self.parent_id = None,
                (ClearableField::Role, EntityKind::Person) => self.role = None,
                (ClearableField::Email, EntityKind::Person) => self.email = None,
                (ClearableField::Phone, EntityKind::Person) => self.phone = None,
                (other, EntityKind::Group) => {
                    return Err(StoreError::Constraint(format!(
                        "field '{}' does not apply to a group",
                        other.as_str()
                    )))
                }
            }
        }

        if patch.role.is_some() {
            self.role = normalize(patch.role.clone());
        }
        if patch.email.is_some() {
            self.email = normalize(patch.email.clone());
        }
        if patch.phone.is_some() {
            self.phone = normalize(patch.phone.clone());
        }
        if patch.bio.is_some() {
            self.bio = normalize(patch.bio.clone());
        }
        if let Some(parent) = patch.parent_id {
            if parent == self.id {
                return Err(StoreError::Constraint(
                    "an entity cannot be its own parent".to_string(),
                ));
            }
            self.parent_id = Some(parent);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// 大小写不敏感、按空白分词的子串匹配：任一词命中 first_name / last_name / display_name 即匹配
    pub fn matches(&self, query: &str) -> bool {
        let fields: Vec<String> = [
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            Some(self.display_name.as_str()),
        ]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .collect();

        query
            .split_whitespace()
            .map(str::to_lowercase)
            .any(|token| fields.iter().any(|f| f.contains(&token)))
    }
}

/// create_person 的输入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub group_id: Option<EntityId>,
}

/// create_group 的输入
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub description: Option<String>,
    pub parent_id: Option<EntityId>,
}

/// 可被显式清空的可选字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearableField {
    Role,
    Email,
    Phone,
    Bio,
    ParentId,
}

impl ClearableField {
    pub const NAMES: &'static [&'static str] = &["role", "email", "phone", "bio", "parent_id"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "role" => Some(Self::Role),
            "email" => Some(Self::Email),
            "phone" => Some(Self::Phone),
            "bio" | "description" => Some(Self::Bio),
            "parent_id" | "group_id" => Some(Self::ParentId),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Bio => "bio",
            Self::ParentId => "parent_id",
        }
    }
}

/// 按标识符原地更新的补丁；None 表示不修改
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// 仅群组
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub parent_id: Option<EntityId>,
    pub clear: Vec<ClearableField>,
}

impl EntityPatch {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.name.is_none()
            && self.role.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.bio.is_none()
            && self.parent_id.is_none()
            && self.clear.is_empty()
    }
}

/// 沿 parent 链向上检查，防止群组成为自己的祖先；parent_of 返回某实体的上级
pub fn ensure_acyclic<F>(id: EntityId, new_parent: EntityId, mut parent_of: F) -> Result<(), StoreError>
where
    F: FnMut(EntityId) -> Result<Option<EntityId>, StoreError>,
{
    let mut cursor = Some(new_parent);
    let mut hops = 0usize;
    while let Some(current) = cursor {
        if current == id {
            return Err(StoreError::Constraint(
                "a group cannot be nested under one of its own sub-groups".to_string(),
            ));
        }
        hops += 1;
        if hops > 1024 {
            return Err(StoreError::Constraint("group hierarchy is too deep".to_string()));
        }
        cursor = parent_of(current)?;
    }
    Ok(())
}

pub(crate) fn full_name(first: &str, last: &str) -> String {
    format!("{} {}", first.trim(), last.trim()).trim().to_string()
}

fn required_name(field: &str, value: &str) -> Result<String, StoreError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(StoreError::Constraint(format!("{field} must not be blank")));
    }
    Ok(v.to_string())
}

fn normalize(value: Option<String>) -> Option<String> {
    value.and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}
