//! 非用户命令触发的轮次：收到通知、用户截屏
//!
//! 两者都按 [triggers] 配置过滤（截屏偏好可由调用方给出，缺省取配置），通过后构造提示并走 process_command。
//! 被过滤时返回 Ok(None)，不创建对话、不广播。

use crate::core::{Agent, AgentError, TriggerType};
use crate::device::DeviceNotification;
use crate::memory::ImageRef;

/// 本应用自身的包名，其通知总是忽略
pub const AGENT_PACKAGE: &str = "xyz.block.gosling";

impl Agent {
    pub fn should_process_notification(&self, notification: &DeviceNotification) -> bool {
        self.triggers.process_notifications
            && notification.package != AGENT_PACKAGE
            && !self
                .triggers
                .ignored_packages
                .iter()
                .any(|p| p == &notification.package)
    }

    pub async fn handle_notification(
        &self,
        notification: &DeviceNotification,
    ) -> Result<Option<String>, AgentError> {
        if !self.should_process_notification(notification) {
            tracing::debug!(package = %notification.package, "Notification ignored");
            return Ok(None);
        }
        let prompt = notification_prompt(notification);
        self.process_command(&prompt, TriggerType::Notification, None)
            .await
            .map(Some)
    }

    /// preferences 为空时使用 [triggers] screenshot_preferences
    pub async fn process_screenshot(
        &self,
        image: ImageRef,
        preferences: &str,
    ) -> Result<Option<String>, AgentError> {
        let preferences = match preferences.trim() {
            "" => self.triggers.screenshot_preferences.trim(),
            given => given,
        };
        if !self.triggers.handle_screenshots || preferences.is_empty() {
            tracing::debug!("Screenshot ignored");
            return Ok(None);
        }
        let prompt = format!(
            "I just took the attached screenshot. Handle it according to my preferences:\n{preferences}"
        );
        self.process_command(&prompt, TriggerType::Screenshot, Some(image))
            .await
            .map(Some)
    }
}

fn notification_prompt(n: &DeviceNotification) -> String {
    let mut prompt = format!("A notification arrived from {}.\n", n.package);
    if !n.title.is_empty() {
        prompt.push_str(&format!("Title: {}\n", n.title));
    }
    if !n.content.is_empty() {
        prompt.push_str(&format!("Content: {}\n", n.content));
    }
    if !n.category.is_empty() {
        prompt.push_str(&format!("Category: {}\n", n.category));
    }
    prompt.push_str("Decide whether it needs handling and act on it if so.");
    prompt
}
