//! 工具参数校验与决策格式 Schema
//!
//! validate_args 按工具声明的 JSON Schema 子集（required + 属性 type）校验参数，
//! 在任何外部调用之前拦截非法输入；decision_schema_json 用 schemars 生成
//! 决策 JSON 的结构描述，注入 system prompt 以减少格式错误。

use std::collections::HashMap;

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 校验 args 是否满足 schema：args 必须是对象，required 字段齐全，
/// 已声明属性的 type（string/number/integer/boolean/array/object）匹配。
/// 未声明的多余属性不视为错误。
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let Some(args_obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for field in required {
            let Some(name) = field.as_str() else { continue };
            match args_obj.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required argument \"{name}\""));
                }
                Some(_) => {}
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };
    for (name, prop) in properties {
        let Some(value) = args_obj.get(name) else { continue };
        if value.is_null() {
            continue;
        }
        let Some(expected) = prop.get("type").and_then(|t| t.as_str()) else {
            continue;
        };
        let ok = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !ok {
            return Err(format!(
                "argument \"{name}\" must be of type {expected}, got {value}"
            ));
        }
    }
    Ok(())
}

/// 决策 JSON 格式：action = "tool_call"（附 tool/args/rationale）或 "final_answer"（附 content）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DecisionFormat {
    /// "tool_call" 或 "final_answer"
    pub action: String,
    /// 工具名（action = tool_call 时必填）
    pub tool: Option<String>,
    /// 工具参数，依工具 schema 而定
    pub args: Option<HashMap<String, Value>>,
    /// 选择该行动的理由（tool_call 必填且非空）
    pub rationale: Option<String>,
    /// 最终回复文本（action = final_answer 时必填）
    pub content: Option<String>,
}

/// 返回决策 JSON 的 Schema 字符串，可拼入 system prompt
pub fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}
