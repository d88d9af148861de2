//! 工具注册表
//!
//! 工具集合是封闭的（ToolKind）：搜索、新建人员、更新实体、新建群组。
//! 每个工具实现 Tool trait（描述 / 参数 schema / 执行），由 ToolRegistry 按名注册与查找；
//! catalog() 按注册顺序生成发给模型网关的工具目录。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::ToolSpec;
use crate::store::EntityStore;
use crate::tools::result::ToolError;
use crate::tools::schema::ParameterSchema;
use crate::tools::{CreateGroupTool, CreatePersonTool, SearchTool, UpdateEntityTool};

/// 工具类别：只读搜索 / 变更
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolClass {
    Search,
    Mutation,
}

/// 封闭的工具集合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Search,
    CreatePerson,
    UpdateEntity,
    CreateGroup,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Search,
        ToolKind::CreatePerson,
        ToolKind::UpdateEntity,
        ToolKind::CreateGroup,
    ];

    /// 模型看到的工具名
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Search => "search_directory",
            ToolKind::CreatePerson => "create_person",
            ToolKind::UpdateEntity => "update_entity",
            ToolKind::CreateGroup => "create_group",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn class(&self) -> ToolClass {
        match self {
            ToolKind::Search => ToolClass::Search,
            _ => ToolClass::Mutation,
        }
    }

    /// 结果中含新建实体（其标识符来自存储）
    pub fn creates_entity(&self) -> bool {
        matches!(self, ToolKind::CreatePerson | ToolKind::CreateGroup)
    }
}

/// 工具 trait：类型、描述（供 LLM 理解）、参数 schema、异步执行（args 为已校验的 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    fn name(&self) -> &str {
        self.kind().name()
    }

    /// 工具描述（作为模型指令的一部分）
    fn description(&self) -> &str;

    fn parameters_schema(&self) -> ParameterSchema;

    /// 引用实体标识符的参数名；变更类工具执行前由 VerificationGuard 逐一校验
    fn identifier_params(&self) -> &'static [&'static str] {
        &[]
    }

    /// 执行工具；args 已通过 schema 校验
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，保留注册顺序
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 目录智能体的标准工具集
    pub fn directory(store: Arc<dyn EntityStore>, search_limit: usize) -> Self {
        let mut registry = Self::new();
        registry.register(SearchTool::new(store.clone(), search_limit));
        registry.register(CreatePersonTool::new(store.clone()));
        registry.register(UpdateEntityTool::new(store.clone()));
        registry.register(CreateGroupTool::new(store));
        registry
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// 工具目录（name / description / JSON Schema），按注册顺序
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema().to_json_schema(),
            })
            .collect()
    }
}
