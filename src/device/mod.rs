//! 设备能力层：编排器只通过这些 trait 访问设备环境
//!
//! 读屏（UI 树）、截屏、动作派发（点击/输入/滑动/按键）、启动应用（含异步回报结果）、
//! 通知读取、已安装应用目录。具体实现依平台而定；本 crate 自带一个内存模拟设备。

pub mod app_catalog;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use app_catalog::{classify_package, AppInfo, AppKind};
pub use simulated::SimulatedDevice;

use crate::memory::ImageRef;

/// 设备能力调用失败
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Action rejected: {0}")]
    Rejected(String),
}

/// 屏幕 UI 树节点（无障碍节点快照）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_description: Option<String>,
    /// [left, top, right, bottom]
    #[serde(default)]
    pub bounds: [i32; 4],
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
}

impl UiNode {
    /// 深度优先查找
    pub fn find(&self, id: &str) -> Option<&UiNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    pub fn center(&self) -> (i32, i32) {
        let [l, t, r, b] = self.bounds;
        ((l + r) / 2, (t + b) / 2)
    }
}

/// 截屏句柄
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    pub uri: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_mime")]
    pub mime_type: String,
}

fn default_mime() -> String {
    "image/png".to_string()
}

impl ImageHandle {
    pub fn to_image_ref(&self) -> ImageRef {
        ImageRef {
            uri: self.uri.clone(),
            mime_type: Some(self.mime_type.clone()),
        }
    }
}

/// 动作类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Tap,
    TypeText,
    Swipe,
    PressKey,
}

/// 动作目标：节点 id 或屏幕坐标
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTarget {
    Node(String),
    Point { x: i32, y: i32 },
    Screen,
}

/// 启动应用请求（包名 + intent action + extras）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppLaunch {
    pub package: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub extras: Map<String, Value>,
}

/// 设备通知
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceNotification {
    pub package: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: String,
}

#[async_trait]
pub trait ScreenInspector: Send + Sync {
    async fn inspect_screen(&self) -> Result<UiNode, DeviceError>;
}

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture_screen(&self) -> Result<ImageHandle, DeviceError>;
}

#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// 执行动作，返回给模型的文本结果
    async fn dispatch_action(
        &self,
        kind: ActionKind,
        target: ActionTarget,
        payload: Value,
    ) -> Result<String, DeviceError>;
}

#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// 启动应用并立即返回
    async fn launch_app(&self, request: AppLaunch) -> Result<String, DeviceError>;

    /// 启动应用并要求回报结果；结果稍后由平台以 correlation_id 调用 CorrelationRegistry 完成
    async fn start_for_result(
        &self,
        correlation_id: &str,
        request: AppLaunch,
    ) -> Result<(), DeviceError>;
}

#[async_trait]
pub trait NotificationReader: Send + Sync {
    async fn recent_notifications(&self) -> Result<Vec<DeviceNotification>, DeviceError>;
}

#[async_trait]
pub trait AppCatalog: Send + Sync {
    async fn installed_apps(&self) -> Result<Vec<AppInfo>, DeviceError>;
}

/// 编排器所需的全部设备能力
#[derive(Clone)]
pub struct Capabilities {
    pub inspector: std::sync::Arc<dyn ScreenInspector>,
    pub capture: std::sync::Arc<dyn ScreenCapture>,
    pub actions: std::sync::Arc<dyn ActionDispatcher>,
    pub launcher: std::sync::Arc<dyn AppLauncher>,
    pub notifications: std::sync::Arc<dyn NotificationReader>,
    pub apps: std::sync::Arc<dyn AppCatalog>,
}

impl Capabilities {
    /// 由一个实现了全部能力的设备构造
    pub fn from_device<D>(device: std::sync::Arc<D>) -> Self
    where
        D: ScreenInspector
            + ScreenCapture
            + ActionDispatcher
            + AppLauncher
            + NotificationReader
            + AppCatalog
            + 'static,
    {
        Self {
            inspector: device.clone(),
            capture: device.clone(),
            actions: device.clone(),
            launcher: device.clone(),
            notifications: device.clone(),
            apps: device,
        }
    }
}
