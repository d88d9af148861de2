//! 工具箱：目录搜索 / 新建人员 / 更新实体 / 新建群组，以及注册表、校验守卫与执行器

pub mod create;
pub mod create_group;
pub mod executor;
pub mod guard;
pub mod registry;
pub mod result;
pub mod schema;
pub mod search;
pub mod update;

pub use create::CreatePersonTool;
pub use create_group::CreateGroupTool;
pub use executor::ToolExecutor;
pub use guard::VerificationGuard;
pub use registry::{Tool, ToolClass, ToolKind, ToolRegistry};
pub use result::{ToolError, ToolResult, VerificationFailure};
pub use schema::{ParamType, ParameterSchema, SchemaViolation};
pub use search::SearchTool;
pub use update::UpdateEntityTool;

use serde_json::Value;

use crate::store::{Entity, EntityId};

/// 可选字符串参数（去首尾空白；null / 缺失为 None）
pub(crate) fn opt_str(args: &Value, name: &str) -> Option<String> {
    args.get(name)
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}

pub(crate) fn required_str(args: &Value, name: &str) -> Result<String, ToolError> {
    opt_str(args, name)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::SchemaValidation {
            tool: String::new(),
            violation: SchemaViolation::Missing(name.to_string()),
        })
}

/// 可选标识符参数；守卫之后仍不合法时按 malformed 处理
pub(crate) fn opt_id(args: &Value, name: &str) -> Result<Option<EntityId>, ToolError> {
    match args.get(name).and_then(Value::as_str) {
        None => Ok(None),
        Some(raw) => EntityId::parse(raw)
            .map(Some)
            .map_err(|_| ToolError::Verification {
                field: name.to_string(),
                value: raw.to_string(),
                reason: VerificationFailure::Malformed,
            }),
    }
}

pub(crate) fn required_id(args: &Value, name: &str) -> Result<EntityId, ToolError> {
    opt_id(args, name)?.ok_or_else(|| ToolError::SchemaValidation {
        tool: String::new(),
        violation: SchemaViolation::Missing(name.to_string()),
    })
}

pub(crate) fn entity_json(entity: &Entity) -> Result<Value, ToolError> {
    serde_json::to_value(entity)
        .map_err(|e| ToolError::StoreUnavailable(format!("cannot encode entity: {e}")))
}
