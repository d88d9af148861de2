//! 更新实体工具：按已校验的标识符原地修改人员或群组

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::{ClearableField, EntityStore, EntityPatch};
use crate::tools::registry::{Tool, ToolKind};
use crate::tools::result::ToolError;
use crate::tools::schema::{ParamType, ParameterSchema, SchemaViolation};
use crate::tools::{entity_json, opt_id, opt_str, required_id};

pub struct UpdateEntityTool {
    store: Arc<dyn EntityStore>,
}

impl UpdateEntityTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    fn patch(args: &Value) -> Result<EntityPatch, ToolError> {
        let clear = args
            .get("clear")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|name| {
                ClearableField::parse(name).ok_or_else(|| ToolError::SchemaValidation {
                    tool: ToolKind::UpdateEntity.name().to_string(),
                    violation: SchemaViolation::WrongType {
                        field: "clear".to_string(),
                        expected: format!("a list of {}", ClearableField::NAMES.join(", ")),
                    },
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let patch = EntityPatch {
            first_name: opt_str(args, "first_name"),
            last_name: opt_str(args, "last_name"),
            name: opt_str(args, "name"),
            role: opt_str(args, "role"),
            email: opt_str(args, "email"),
            phone: opt_str(args, "phone"),
            bio: opt_str(args, "bio"),
            parent_id: opt_id(args, "parent_id")?,
            clear,
        };
        if patch.is_empty() {
            return Err(ToolError::SchemaValidation {
                tool: ToolKind::UpdateEntity.name().to_string(),
                violation: SchemaViolation::NothingToChange,
            });
        }
        Ok(patch)
    }
}

#[async_trait]
impl Tool for UpdateEntityTool {
    fn kind(&self) -> ToolKind {
        ToolKind::UpdateEntity
    }

    fn description(&self) -> &str {
        "Update an existing person or group in place. The id MUST be an identifier returned by search_directory in this conversation; never reuse an identifier from memory or guess one. Only the provided fields change. For a person use first_name/last_name, for a group use name. parent_id moves the entity to another group; list fields in clear (role, email, phone, bio, parent_id) to erase them."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("id", ParamType::String, "Identifier of the entity to update")
            .optional("first_name", ParamType::String, "New first name (person)")
            .optional("last_name", ParamType::String, "New last name (person)")
            .optional("name", ParamType::String, "New name (group)")
            .optional("role", ParamType::String, "New role (person)")
            .optional("email", ParamType::String, "New email address (person)")
            .optional("phone", ParamType::String, "New phone number (person)")
            .optional("bio", ParamType::String, "New biography, or description for a group")
            .optional("parent_id", ParamType::String, "Identifier of the new enclosing group")
            .optional("clear", ParamType::StringList, "Optional fields to erase")
    }

    fn identifier_params(&self) -> &'static [&'static str] {
        &["id", "parent_id"]
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let id = required_id(&args, "id")?;
        let patch = Self::patch(&args)?;
        let updated = self.store.update(id, patch).await?;
        tracing::info!(id = %updated.id, name = %updated.display_name, "entity updated");
        Ok(json!({ "entity": entity_json(&updated)? }))
    }
}
