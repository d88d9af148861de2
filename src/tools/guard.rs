//! 标识符校验守卫
//!
//! 请求级集合：只有本次请求中搜索结果返回过的标识符才可作为变更目标。
//! 模型凭记忆或猜测给出的标识符在到达存储前即被拦截，并以结构化错误回传。

use std::collections::HashSet;

use serde_json::Value;

use crate::store::EntityId;
use crate::tools::registry::{Tool, ToolKind};
use crate::tools::result::{ToolError, ToolResult, VerificationFailure};

/// 本次请求的已校验标识符集合（只增不减，请求结束即丢弃）
#[derive(Debug, Clone, Default)]
pub struct VerificationGuard {
    verified: HashSet<EntityId>,
    /// 新建实体的标识符也计入集合
    trust_created_ids: bool,
}

impl VerificationGuard {
    pub fn new(trust_created_ids: bool) -> Self {
        Self {
            verified: HashSet::new(),
            trust_created_ids,
        }
    }

    /// 从成功的工具结果中收集标识符：搜索结果的每个 id；可信时加上新建实体的 id
    pub fn observe(&mut self, kind: ToolKind, result: &ToolResult) {
        let Ok(payload) = &result.payload else {
            return;
        };
        match kind {
            ToolKind::Search => {
                let ids = payload
                    .get("results")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(|entity| entity.get("id").and_then(Value::as_str))
                    .filter_map(|raw| EntityId::parse(raw).ok());
                self.verified.extend(ids);
            }
            k if k.creates_entity() && self.trust_created_ids => {
                if let Some(id) = payload
                    .get("entity")
                    .and_then(|e| e.get("id"))
                    .and_then(Value::as_str)
                    .and_then(|raw| EntityId::parse(raw).ok())
                {
                    self.verified.insert(id);
                }
            }
            _ => {}
        }
    }

    /// 变更前校验：工具声明的每个标识符参数（若提供）都必须合法且已校验
    pub fn authorize(&self, tool: &dyn Tool, args: &Value) -> Result<(), ToolError> {
        for field in tool.identifier_params() {
            let Some(raw) = args.get(*field).and_then(Value::as_str) else {
                continue;
            };
            let reason = match EntityId::parse(raw) {
                Err(_) => VerificationFailure::Malformed,
                Ok(id) if !self.verified.contains(&id) => VerificationFailure::Unverified,
                Ok(_) => continue,
            };
            tracing::warn!(
                tool = tool.name(),
                field = *field,
                value = raw,
                reason = reason.as_str(),
                "identifier rejected"
            );
            return Err(ToolError::Verification {
                field: field.to_string(),
                value: raw.to_string(),
                reason,
            });
        }
        Ok(())
    }

    pub fn is_verified(&self, id: &EntityId) -> bool {
        self.verified.contains(id)
    }

    pub fn len(&self) -> usize {
        self.verified.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verified.is_empty()
    }
}
