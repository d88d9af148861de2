//! 新建人员工具

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::{EntityStore, NewPerson};
use crate::tools::registry::{Tool, ToolKind};
use crate::tools::result::ToolError;
use crate::tools::schema::{ParamType, ParameterSchema};
use crate::tools::{entity_json, opt_id, opt_str, required_str};

pub struct CreatePersonTool {
    store: Arc<dyn EntityStore>,
}

impl CreatePersonTool {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for CreatePersonTool {
    fn kind(&self) -> ToolKind {
        ToolKind::CreatePerson
    }

    fn description(&self) -> &str {
        "Create a new person in the directory. Search first to make sure the person does not already exist. To place the person in a group, pass the group's identifier as group_id; that identifier must come from a search_directory result (or a group created) in this conversation."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("first_name", ParamType::String, "First name")
            .required("last_name", ParamType::String, "Last name")
            .optional("role", ParamType::String, "Role or position, e.g. \"Trésorier\"")
            .optional("email", ParamType::String, "Email address")
            .optional("phone", ParamType::String, "Phone number")
            .optional("bio", ParamType::String, "Free-text biography")
            .optional("group_id", ParamType::String, "Identifier of the group the person belongs to")
    }

    fn identifier_params(&self) -> &'static [&'static str] {
        &["group_id"]
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let person = NewPerson {
            first_name: required_str(&args, "first_name")?,
            last_name: required_str(&args, "last_name")?,
            role: opt_str(&args, "role"),
            email: opt_str(&args, "email"),
            phone: opt_str(&args, "phone"),
            bio: opt_str(&args, "bio"),
            group_id: opt_id(&args, "group_id")?,
        };
        let created = self.store.create_person(person).await?;
        tracing::info!(id = %created.id, name = %created.display_name, "person created");
        Ok(json!({ "entity": entity_json(&created)? }))
    }
}
