//! 动作工具：点击、输入、滑动、按键（同步，经 ActionDispatcher 执行）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::device::{ActionDispatcher, ActionKind, ActionTarget};
use crate::tools::schema::{parse_args, schema_of, PressKeyArgs, SwipeArgs, TapArgs, TypeTextArgs};
use crate::tools::{Tool, ToolOutput};

const SWIPE_DIRECTIONS: &[&str] = &["up", "down", "left", "right"];
const KEYS: &[&str] = &["back", "home", "recents", "enter"];

pub struct TapTool {
    actions: Arc<dyn ActionDispatcher>,
}

impl TapTool {
    pub fn new(actions: Arc<dyn ActionDispatcher>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl Tool for TapTool {
    fn name(&self) -> &str {
        "tap"
    }

    fn description(&self) -> &str {
        "Tap a UI node by id, or a screen point given as x and y."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TapArgs>()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let args: TapArgs = parse_args(args)?;
        let target = match (args.node_id, args.x, args.y) {
            (Some(id), _, _) => ActionTarget::Node(id),
            (None, Some(x), Some(y)) => ActionTarget::Point { x, y },
            _ => return Err("Provide node_id or both x and y".to_string()),
        };
        self.actions
            .dispatch_action(ActionKind::Tap, target, Value::Null)
            .await
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}

pub struct TypeTextTool {
    actions: Arc<dyn ActionDispatcher>,
}

impl TypeTextTool {
    pub fn new(actions: Arc<dyn ActionDispatcher>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl Tool for TypeTextTool {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type text into an editable node, or into the focused field when node_id is omitted."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TypeTextArgs>()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let args: TypeTextArgs = parse_args(args)?;
        let target = args.node_id.map(ActionTarget::Node).unwrap_or(ActionTarget::Screen);
        self.actions
            .dispatch_action(ActionKind::TypeText, target, json!({ "text": args.text }))
            .await
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}

pub struct SwipeTool {
    actions: Arc<dyn ActionDispatcher>,
}

impl SwipeTool {
    pub fn new(actions: Arc<dyn ActionDispatcher>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl Tool for SwipeTool {
    fn name(&self) -> &str {
        "swipe"
    }

    fn description(&self) -> &str {
        "Swipe the screen in a direction to scroll or page."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SwipeArgs>()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let args: SwipeArgs = parse_args(args)?;
        let direction = args.direction.to_lowercase();
        if !SWIPE_DIRECTIONS.contains(&direction.as_str()) {
            return Err(format!("Unknown direction '{}'", args.direction));
        }
        self.actions
            .dispatch_action(ActionKind::Swipe, ActionTarget::Screen, json!({ "direction": direction }))
            .await
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}

pub struct PressKeyTool {
    actions: Arc<dyn ActionDispatcher>,
}

impl PressKeyTool {
    pub fn new(actions: Arc<dyn ActionDispatcher>) -> Self {
        Self { actions }
    }
}

#[async_trait]
impl Tool for PressKeyTool {
    fn name(&self) -> &str {
        "press_key"
    }

    fn description(&self) -> &str {
        "Press a system key: back, home, recents or enter."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<PressKeyArgs>()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let args: PressKeyArgs = parse_args(args)?;
        let key = args.key.to_lowercase();
        if !KEYS.contains(&key.as_str()) {
            return Err(format!("Unknown key '{}'", args.key));
        }
        self.actions
            .dispatch_action(ActionKind::PressKey, ActionTarget::Screen, json!({ "key": key }))
            .await
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}
