//! 目录搜索工具（只读）
//!
//! 大小写不敏感、按空白分词、任一词命中名/姓/全名即返回；空结果是 found=false，不是错误。
//! 结果中的每个 id 会被 VerificationGuard 记为已校验。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::store::{EntityKind, EntityStore};
use crate::tools::registry::{Tool, ToolKind};
use crate::tools::result::ToolError;
use crate::tools::schema::{ParamType, ParameterSchema};
use crate::tools::{entity_json, opt_str, required_str};

/// 单次搜索返回条数上限
pub const MAX_SEARCH_LIMIT: usize = 50;

pub struct SearchTool {
    store: Arc<dyn EntityStore>,
    default_limit: usize,
}

impl SearchTool {
    pub fn new(store: Arc<dyn EntityStore>, default_limit: usize) -> Self {
        Self {
            store,
            default_limit: default_limit.clamp(1, MAX_SEARCH_LIMIT),
        }
    }

    fn limit(&self, args: &Value) -> usize {
        match args.get("limit").and_then(Value::as_i64) {
            Some(n) => n.clamp(1, MAX_SEARCH_LIMIT as i64) as usize,
            None => self.default_limit,
        }
    }
}

#[async_trait]
impl Tool for SearchTool {
    fn kind(&self) -> ToolKind {
        ToolKind::Search
    }

    fn description(&self) -> &str {
        "Search the organization directory by name. Matching is case-insensitive; every word of the query is matched separately against first name, last name and full name (a group matches on its name). Returns the matching people and groups with their identifiers. Always call this before updating an entity or attaching something to a group: only identifiers returned by a search in this conversation may be used."
    }

    fn parameters_schema(&self) -> ParameterSchema {
        ParameterSchema::new()
            .required("query", ParamType::String, "Name or part of a name to look up, e.g. \"Jean Dupont\"")
            .optional(
                "kind",
                ParamType::Enum(&["person", "group"]),
                "Restrict the search to people or to groups",
            )
            .optional("limit", ParamType::Integer, "Maximum number of results (1-50)")
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let query = required_str(&args, "query")?;
        let kind = opt_str(&args, "kind").and_then(|k| EntityKind::parse(&k));
        let limit = self.limit(&args);

        let found = self.store.search(&query, kind, limit).await?;
        tracing::debug!(query = %query, count = found.len(), "directory search");

        let results = found.iter().map(entity_json).collect::<Result<Vec<_>, _>>()?;
        Ok(json!({
            "found": !results.is_empty(),
            "count": results.len(),
            "results": results,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryEntityStore, NewGroup, NewPerson};

    async fn seeded() -> Arc<InMemoryEntityStore> {
        let store = Arc::new(InMemoryEntityStore::new());
        for (first, last) in [("Jean", "Dupont"), ("Marie", "Jean"), ("Luc", "Moreau")] {
            store
                .create_person(NewPerson {
                    first_name: first.into(),
                    last_name: last.into(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        store
            .create_group(NewGroup {
                name: "Jeunesse".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_matches_first_and_last_names() {
        let tool = SearchTool::new(seeded().await, 20);
        let out = tool.execute(json!({"query": "jean", "kind": "person"})).await.unwrap();
        assert_eq!(out["found"], true);
        assert_eq!(out["count"], 2);
        let names: Vec<&str> = out["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["display_name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Jean Dupont", "Marie Jean"]);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let tool = SearchTool::new(seeded().await, 20);
        let out = tool.execute(json!({"query": "Inconnu"})).await.unwrap();
        assert_eq!(out, json!({"found": false, "count": 0, "results": []}));
    }

    #[tokio::test]
    async fn test_limit_is_clamped() {
        let tool = SearchTool::new(seeded().await, 20);
        let out = tool.execute(json!({"query": "jean", "limit": 0})).await.unwrap();
        assert_eq!(out["count"], 1);
        assert_eq!(tool.limit(&json!({"limit": 1000})), MAX_SEARCH_LIMIT);
        assert_eq!(tool.limit(&json!({})), 20);
    }
}
