//! 工具参数 Schema（schemars 自动生成）与参数解析
//!
//! 每个内置工具的参数是一个 derive(JsonSchema, Deserialize) 的结构体，
//! 字段文档注释会成为 schema 中的 description（发给 LLM，故用英文）。

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

/// 生成参数 schema，去掉 LLM 不需要的 $schema / title
pub fn schema_of<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("type").or_insert_with(|| Value::String("object".into()));
        obj.entry("properties").or_insert_with(|| Value::Object(Map::new()));
    }
    value
}

/// 把模型给出的参数映射解析为结构体
pub fn parse_args<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| format!("Invalid arguments: {e}"))
}

/// 无参数工具
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TapArgs {
    /// Node id from get_screen_content. Use either this or x/y.
    pub node_id: Option<String>,
    /// Horizontal screen coordinate in pixels
    pub x: Option<i32>,
    /// Vertical screen coordinate in pixels
    pub y: Option<i32>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TypeTextArgs {
    /// Text to type
    pub text: String,
    /// Editable node id; the focused field is used when omitted
    pub node_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SwipeArgs {
    /// One of: up, down, left, right
    pub direction: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct PressKeyArgs {
    /// One of: back, home, recents, enter
    pub key: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct LaunchAppArgs {
    /// Package name, e.g. com.android.settings
    pub package: String,
    /// Optional intent action, e.g. android.intent.action.SEARCH
    pub action: Option<String>,
    /// Intent extras
    #[serde(default)]
    pub extras: Map<String, Value>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CallAppToolArgs {
    /// Package of the app that advertises the tool
    pub package: String,
    /// Tool name as advertised by the app
    pub tool_name: String,
    /// Arguments passed to the app tool
    #[serde(default)]
    pub arguments: Map<String, Value>,
}
