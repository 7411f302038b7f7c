//! 通知读取工具

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::device::NotificationReader;
use crate::tools::schema::{schema_of, NoArgs};
use crate::tools::{Tool, ToolOutput};

pub struct ReadNotificationsTool {
    reader: Arc<dyn NotificationReader>,
}

impl ReadNotificationsTool {
    pub fn new(reader: Arc<dyn NotificationReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl Tool for ReadNotificationsTool {
    fn name(&self) -> &str {
        "read_notifications"
    }

    fn description(&self) -> &str {
        "Read recent notifications (package, title, content, category)."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<NoArgs>()
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let notifications = self.reader.recent_notifications().await.map_err(|e| e.to_string())?;
        if notifications.is_empty() {
            return Ok("No notifications".into());
        }
        serde_json::to_string(&notifications)
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}
