//! 读屏与截屏工具（同步）

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::device::{ScreenCapture, ScreenInspector};
use crate::tools::schema::{schema_of, NoArgs};
use crate::tools::{Tool, ToolOutput};

/// get_screen_content：返回当前屏幕的 UI 树（JSON）
pub struct GetScreenContentTool {
    inspector: Arc<dyn ScreenInspector>,
}

impl GetScreenContentTool {
    pub fn new(inspector: Arc<dyn ScreenInspector>) -> Self {
        Self { inspector }
    }
}

#[async_trait]
impl Tool for GetScreenContentTool {
    fn name(&self) -> &str {
        "get_screen_content"
    }

    fn description(&self) -> &str {
        "Read the current screen as a tree of UI nodes (id, text, bounds, clickable, editable). \
         Use node ids with tap and type_text."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<NoArgs>()
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let tree = self.inspector.inspect_screen().await.map_err(|e| e.to_string())?;
        serde_json::to_string(&tree)
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}

/// take_screenshot：截屏，图片随工具结果消息一起回传给模型
pub struct TakeScreenshotTool {
    capture: Arc<dyn ScreenCapture>,
}

impl TakeScreenshotTool {
    pub fn new(capture: Arc<dyn ScreenCapture>) -> Self {
        Self { capture }
    }
}

#[async_trait]
impl Tool for TakeScreenshotTool {
    fn name(&self) -> &str {
        "take_screenshot"
    }

    fn description(&self) -> &str {
        "Capture an image of the current screen. Use when the UI tree is not enough, e.g. for images or canvases."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<NoArgs>()
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let shot = self.capture.capture_screen().await.map_err(|e| e.to_string())?;
        Ok(ToolOutput {
            text: format!("Screenshot captured ({}x{})", shot.width, shot.height),
            image: Some(shot.to_image_ref()),
        })
    }
}
