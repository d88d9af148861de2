//! 工具参数 schema：声明式参数表 + 调用前校验
//!
//! 校验在触达存储之前完成；失败时由执行器包装为 SchemaValidation 结果回传给模型。
//! to_json_schema 生成发给模型网关的 JSON Schema（function parameters）。

use serde_json::{json, Map, Value};
use thiserror::Error;

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    StringList,
    /// 取值受限的字符串
    Enum(&'static [&'static str]),
}

/// 单个参数声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: ParamType,
    pub required: bool,
    pub description: &'static str,
}

/// 校验失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    #[error("arguments must be a JSON object")]
    NotAnObject,

    #[error("missing required parameter '{0}'")]
    Missing(String),

    #[error("parameter '{0}' must not be blank")]
    Blank(String),

    #[error("parameter '{field}' must be {expected}")]
    WrongType { field: String, expected: String },

    #[error("unknown parameter '{0}'")]
    Unknown(String),

    #[error("no field to change was provided")]
    NothingToChange,
}

/// 工具参数表（保持声明顺序）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSchema {
    params: Vec<ParamSpec>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &'static str, ty: ParamType, description: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            ty,
            required: true,
            description,
        });
        self
    }

    pub fn optional(mut self, name: &'static str, ty: ParamType, description: &'static str) -> Self {
        self.params.push(ParamSpec {
            name,
            ty,
            required: false,
            description,
        });
        self
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// 校验参数：对象、必填、类型、未知字段；null 视为未提供
    pub fn validate(&self, args: &Value) -> Result<(), SchemaViolation> {
        let obj = args.as_object().ok_or(SchemaViolation::NotAnObject)?;

        if let Some(unknown) = obj.keys().find(|k| self.get(k).is_none()) {
            return Err(SchemaViolation::Unknown(unknown.clone()));
        }

        for spec in &self.params {
            match obj.get(spec.name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        return Err(SchemaViolation::Missing(spec.name.to_string()));
                    }
                }
                Some(value) => check_type(spec, value)?,
            }
        }
        Ok(())
    }

    /// 生成 JSON Schema（type=object），供模型网关的 tools 字段使用
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for spec in &self.params {
            let mut prop = match spec.ty {
                ParamType::String => json!({ "type": "string" }),
                ParamType::Integer => json!({ "type": "integer" }),
                ParamType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
                ParamType::Enum(values) => json!({ "type": "string", "enum": values }),
            };
            prop["description"] = Value::String(spec.description.to_string());
            properties.insert(spec.name.to_string(), prop);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }
}

fn wrong_type(spec: &ParamSpec, expected: impl Into<String>) -> SchemaViolation {
    SchemaViolation::WrongType {
        field: spec.name.to_string(),
        expected: expected.into(),
    }
}

fn check_type(spec: &ParamSpec, value: &Value) -> Result<(), SchemaViolation> {
    match spec.ty {
        ParamType::String => {
            let s = value.as_str().ok_or_else(|| wrong_type(spec, "a string"))?;
            if spec.required && s.trim().is_empty() {
                return Err(SchemaViolation::Blank(spec.name.to_string()));
            }
        }
        ParamType::Integer => {
            if value.as_i64().is_none() {
                return Err(wrong_type(spec, "an integer"));
            }
        }
        ParamType::StringList => {
            let items = value
                .as_array()
                .ok_or_else(|| wrong_type(spec, "a list of strings"))?;
            if items.iter().any(|v| !v.is_string()) {
                return Err(wrong_type(spec, "a list of strings"));
            }
        }
        ParamType::Enum(values) => {
            let s = value
                .as_str()
                .ok_or_else(|| wrong_type(spec, format!("one of {}", values.join(", "))))?;
            if !values.contains(&s.trim()) {
                return Err(wrong_type(spec, format!("one of {}", values.join(", "))));
            }
        }
    }
    Ok(())
}
