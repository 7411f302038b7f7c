//! 内存模拟设备（无需真机）
//!
//! 实现全部设备能力 trait：固定的主屏 UI 树、已安装应用表、通知队列，并记录每个动作。
//! 可选 auto_reply：start_for_result 后由后台任务经 CorrelationRegistry 回报结果，
//! 模拟「另一个应用稍后返回」的外部事件。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::device::{
    ActionDispatcher, ActionKind, ActionTarget, AppCatalog, AppInfo, AppLaunch, AppLauncher,
    DeviceError, DeviceNotification, ImageHandle, NotificationReader, ScreenCapture,
    ScreenInspector, UiNode,
};
use crate::tools::CorrelationRegistry;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 自动回报配置
#[derive(Clone)]
struct AutoReply {
    registry: Arc<CorrelationRegistry>,
    delay: Duration,
}

pub struct SimulatedDevice {
    screen: RwLock<UiNode>,
    actions: Mutex<Vec<String>>,
    launches: Mutex<Vec<(Option<String>, AppLaunch)>>,
    apps: Vec<AppInfo>,
    notifications: Mutex<Vec<DeviceNotification>>,
    screenshots: AtomicU64,
    auto_reply: Option<AutoReply>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self {
            screen: RwLock::new(home_screen()),
            actions: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            apps: default_apps(),
            notifications: Mutex::new(Vec::new()),
            screenshots: AtomicU64::new(0),
            auto_reply: None,
        }
    }

    pub fn with_apps(mut self, apps: Vec<AppInfo>) -> Self {
        self.apps = apps;
        self
    }

    /// start_for_result 后经 delay 自动以成功结果完成对应 correlation
    pub fn with_auto_reply(mut self, registry: Arc<CorrelationRegistry>, delay: Duration) -> Self {
        self.auto_reply = Some(AutoReply { registry, delay });
        self
    }

    pub fn set_screen(&self, root: UiNode) {
        *self.screen.write().unwrap_or_else(PoisonError::into_inner) = root;
    }

    pub fn push_notification(&self, notification: DeviceNotification) {
        lock(&self.notifications).push(notification);
    }

    /// 已执行动作的文字记录（按执行顺序）
    pub fn action_log(&self) -> Vec<String> {
        lock(&self.actions).clone()
    }

    /// (correlation id, 请求) 列表；同步启动的 correlation id 为 None
    pub fn launches(&self) -> Vec<(Option<String>, AppLaunch)> {
        lock(&self.launches).clone()
    }

    fn find_app(&self, package: &str) -> Result<&AppInfo, DeviceError> {
        self.apps
            .iter()
            .find(|a| a.package == package)
            .ok_or_else(|| DeviceError::TargetNotFound(format!("app {package} is not installed")))
    }

    fn record(&self, entry: String) {
        tracing::debug!(action = %entry, "Simulated device action");
        lock(&self.actions).push(entry);
    }
}

#[async_trait]
impl ScreenInspector for SimulatedDevice {
    async fn inspect_screen(&self) -> Result<UiNode, DeviceError> {
        Ok(self.screen.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

#[async_trait]
impl ScreenCapture for SimulatedDevice {
    async fn capture_screen(&self) -> Result<ImageHandle, DeviceError> {
        let n = self.screenshots.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(ImageHandle {
            uri: format!("memory://screenshots/{n}.png"),
            width: 1080,
            height: 2400,
            mime_type: "image/png".to_string(),
        })
    }
}

#[async_trait]
impl ActionDispatcher for SimulatedDevice {
    async fn dispatch_action(
        &self,
        kind: ActionKind,
        target: ActionTarget,
        payload: Value,
    ) -> Result<String, DeviceError> {
        let node = match &target {
            ActionTarget::Node(id) => {
                let screen = self.screen.read().unwrap_or_else(PoisonError::into_inner);
                let node = screen
                    .find(id)
                    .cloned()
                    .ok_or_else(|| DeviceError::TargetNotFound(format!("node {id}")))?;
                Some(node)
            }
            _ => None,
        };

        let outcome = match kind {
            ActionKind::Tap => match (&target, &node) {
                (_, Some(n)) if !n.clickable => {
                    return Err(DeviceError::Rejected(format!("node {} is not clickable", n.id)))
                }
                (_, Some(n)) => format!("Tapped {}", n.id),
                (ActionTarget::Point { x, y }, None) => format!("Tapped at ({x}, {y})"),
                _ => return Err(DeviceError::Rejected("tap needs a node or a point".into())),
            },
            ActionKind::TypeText => {
                if let Some(n) = node.as_ref().filter(|n| !n.editable) {
                    return Err(DeviceError::Rejected(format!("node {} is not editable", n.id)));
                }
                let text = payload.get("text").and_then(|v| v.as_str()).unwrap_or("");
                format!("Typed \"{text}\"")
            }
            ActionKind::Swipe => {
                let direction = payload.get("direction").and_then(|v| v.as_str()).unwrap_or("up");
                format!("Swiped {direction}")
            }
            ActionKind::PressKey => {
                let key = payload.get("key").and_then(|v| v.as_str()).unwrap_or("back");
                format!("Pressed {key}")
            }
        };
        self.record(outcome.clone());
        Ok(outcome)
    }
}

#[async_trait]
impl AppLauncher for SimulatedDevice {
    async fn launch_app(&self, request: AppLaunch) -> Result<String, DeviceError> {
        let label = self.find_app(&request.package)?.label.clone();
        lock(&self.launches).push((None, request));
        self.record(format!("Launched {label}"));
        Ok(format!("Launched {label}"))
    }

    async fn start_for_result(
        &self,
        correlation_id: &str,
        request: AppLaunch,
    ) -> Result<(), DeviceError> {
        let label = self.find_app(&request.package)?.label.clone();
        lock(&self.launches).push((Some(correlation_id.to_string()), request.clone()));
        self.record(format!("Started {label} for result"));

        if let Some(reply) = self.auto_reply.clone() {
            let id = correlation_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(reply.delay).await;
                let payload = serde_json::json!({
                    "package": request.package,
                    "action": request.action,
                    "status": "ok",
                });
                reply.registry.resolve(&id, payload.to_string());
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationReader for SimulatedDevice {
    async fn recent_notifications(&self) -> Result<Vec<DeviceNotification>, DeviceError> {
        Ok(lock(&self.notifications).clone())
    }
}

#[async_trait]
impl AppCatalog for SimulatedDevice {
    async fn installed_apps(&self) -> Result<Vec<AppInfo>, DeviceError> {
        Ok(self.apps.clone())
    }
}

fn home_screen() -> UiNode {
    let icon = |id: &str, text: &str, left: i32| UiNode {
        id: id.to_string(),
        class_name: Some("android.widget.TextView".to_string()),
        text: Some(text.to_string()),
        bounds: [left, 2000, left + 200, 2200],
        clickable: true,
        ..Default::default()
    };
    UiNode {
        id: "root".to_string(),
        class_name: Some("android.widget.FrameLayout".to_string()),
        bounds: [0, 0, 1080, 2400],
        children: vec![
            UiNode {
                id: "search".to_string(),
                class_name: Some("android.widget.EditText".to_string()),
                content_description: Some("Search".to_string()),
                bounds: [40, 120, 1040, 240],
                clickable: true,
                editable: true,
                ..Default::default()
            },
            icon("icon_messages", "Messages", 40),
            icon("icon_camera", "Camera", 300),
            icon("icon_settings", "Settings", 560),
        ],
        ..Default::default()
    }
}

fn default_apps() -> Vec<AppInfo> {
    vec![
        AppInfo::new("com.android.messaging", "Messages").with_actions(&[
            "android.intent.action.MAIN",
            "android.intent.action.SENDTO",
        ]),
        AppInfo::new("com.android.camera", "Camera"),
        AppInfo::new("com.android.settings", "Settings"),
        AppInfo::new("com.venmo", "Venmo"),
        AppInfo::new("com.booking", "Booking.com").with_actions(&[
            "android.intent.action.MAIN",
            "android.intent.action.SEARCH",
        ]),
    ]
}
