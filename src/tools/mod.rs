//! 工具层：工具 trait 与注册表、调用模型、异步结果关联表、调度器、内置移动端工具

pub mod actions;
pub mod apps;
pub mod call;
pub mod correlation;
pub mod dispatcher;
pub mod notifications;
pub mod registry;
pub mod schema;
pub mod screen;

pub use actions::{PressKeyTool, SwipeTool, TapTool, TypeTextTool};
pub use apps::{CallAppToolTool, LaunchAppTool, ListAppsTool, StartAppForResultTool, APP_TOOL_CALL_ACTION};
pub use call::{DispatchMode, ToolCall, ToolResult};
pub use correlation::{CorrelationRegistry, PendingSlot, RegistryError, Resolution, SlotCancelled, SlotResult};
pub use dispatcher::{Dispatched, ToolDispatcher};
pub use notifications::ReadNotificationsTool;
pub use registry::{Tool, ToolOutput, ToolRegistry, ToolSpec};
pub use screen::{GetScreenContentTool, TakeScreenshotTool};

use crate::device::Capabilities;

/// 注册全部内置工具（目录顺序即此处顺序）
pub fn register_builtin_tools(registry: &mut ToolRegistry, caps: &Capabilities) {
    registry.register(GetScreenContentTool::new(caps.inspector.clone()));
    registry.register(TakeScreenshotTool::new(caps.capture.clone()));
    registry.register(TapTool::new(caps.actions.clone()));
    registry.register(TypeTextTool::new(caps.actions.clone()));
    registry.register(SwipeTool::new(caps.actions.clone()));
    registry.register(PressKeyTool::new(caps.actions.clone()));
    registry.register(LaunchAppTool::new(caps.launcher.clone()));
    registry.register(ListAppsTool::new(caps.apps.clone()));
    registry.register(ReadNotificationsTool::new(caps.notifications.clone()));
    registry.register(StartAppForResultTool::new(caps.launcher.clone()));
    registry.register(CallAppToolTool::new(caps.launcher.clone()));
}
