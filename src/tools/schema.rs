//! 工具参数 Schema 与参数解析（schemars 自动生成工具 Schema）
//!
//! 每个工具用一个 `#[derive(Deserialize, JsonSchema)]` 参数结构体：schema 由它生成，
//! 模型给出的 JSON 参数也在这里一次性转成该结构体。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 参数结构体的 JSON Schema（去掉 $schema / title，直接可作为 function.parameters）
pub fn parameters_schema_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
    }
    value
}

/// 把模型给出的参数解析为工具的参数类型
pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("invalid arguments for {tool}: {e}"))
}
