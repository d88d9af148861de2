//! 新建群组工具（部门、小组、分部）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::{EntityStore, NewGroup};
use crate::tools::registry::{Tool, ToolKind};
use crate::tools::result::ToolError;
use crate::tools::schema::{ParamType, ParameterSchema};
use crate::tools::{entity_json, opt_id, opt_str, required_str};

pub struct CreateGroupTool {
    store: Arc<dyn EntityStore>,
}

impl CreateGroupTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreateGroupTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CreateGroup
    }

    fn description(&self) -> &str {
        "Create a group (department, team, section). Optionally nest it under an existing group with parent_id, an identifier obtained from search_directory in this conversation. Group names must be unique under the same parent. The returned identifier can be used in later calls of this conversation."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("name", ParamType::String, "Group name")
            .optional("description", ParamType::String, "What the group does")
            .optional("parent_id", ParamType::String, "Identifier of the enclosing group")
    }

    fn identifier_params(&self) -> &'static [&'static str] {
        &["parent_id"]
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let group = NewGroup {
            name: required_str(&args, "name")?,
            description: opt_str(&args, "description"),
            parent_id: opt_id(&args, "parent_id")?,
        };
        let created = self.store.create_group(group).await?;
        tracing::info!(id = %created.id, name = %created.display_name, "group created");
        Ok(json!({ "entity": entity_json(&created)? }))
    }
}
