//! 应用相关工具
//!
//! launch_app / list_apps 为同步工具；start_app_for_result 与 call_app_tool 为异步工具：
//! 只发出请求，结果由目标应用返回后经 CorrelationRegistry 送达。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::device::{AppCatalog, AppLaunch, AppLauncher};
use crate::tools::schema::{parse_args, schema_of, CallAppToolArgs, LaunchAppArgs, NoArgs};
use crate::tools::{DispatchMode, Tool, ToolOutput};

/// 应用间工具调用的 intent action；extras 中带 tool_name 与 arguments（JSON 字符串）
pub const APP_TOOL_CALL_ACTION: &str = "com.example.mMCP.ACTION_TOOL_CALL";

impl From<LaunchAppArgs> for AppLaunch {
    fn from(args: LaunchAppArgs) -> Self {
        AppLaunch {
            package: args.package,
            action: args.action,
            extras: args.extras,
        }
    }
}

pub struct LaunchAppTool {
    launcher: Arc<dyn AppLauncher>,
}

impl LaunchAppTool {
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Tool for LaunchAppTool {
    fn name(&self) -> &str {
        "launch_app"
    }

    fn description(&self) -> &str {
        "Open an installed app, optionally with an intent action and extras. Returns once the app is started."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<LaunchAppArgs>()
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let args: LaunchAppArgs = parse_args(args)?;
        self.launcher
            .launch_app(args.into())
            .await
            .map(ToolOutput::from)
            .map_err(|e| e.to_string())
    }
}

pub struct ListAppsTool {
    catalog: Arc<dyn AppCatalog>,
}

impl ListAppsTool {
    pub fn new(catalog: Arc<dyn AppCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for ListAppsTool {
    fn name(&self) -> &str {
        "list_apps"
    }

    fn description(&self) -> &str {
        "List installed apps with package name, label, kind and supported intent actions."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<NoArgs>()
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
        let apps = self.catalog.installed_apps().await.map_err(|e| e.to_string())?;
        let listed: Vec<Value> = apps
            .iter()
            .map(|a| {
                json!({
                    "package": a.package,
                    "label": a.label,
                    "kind": a.kind.label(),
                    "actions": a.actions,
                })
            })
            .collect();
        Ok(Value::Array(listed).to_string().into())
    }
}

/// start_app_for_result：打开应用并等待它回报结果
pub struct StartAppForResultTool {
    launcher: Arc<dyn AppLauncher>,
}

impl StartAppForResultTool {
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Tool for StartAppForResultTool {
    fn name(&self) -> &str {
        "start_app_for_result"
    }

    fn description(&self) -> &str {
        "Open another app with an intent and wait until it reports a result back."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<LaunchAppArgs>()
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Async
    }

    async fn start(&self, correlation_id: &str, args: &Map<String, Value>) -> Result<(), String> {
        let args: LaunchAppArgs = parse_args(args)?;
        self.launcher
            .start_for_result(correlation_id, args.into())
            .await
            .map_err(|e| e.to_string())
    }
}

/// call_app_tool：调用其他应用公开的工具，结果异步返回
pub struct CallAppToolTool {
    launcher: Arc<dyn AppLauncher>,
}

impl CallAppToolTool {
    pub fn new(launcher: Arc<dyn AppLauncher>) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl Tool for CallAppToolTool {
    fn name(&self) -> &str {
        "call_app_tool"
    }

    fn description(&self) -> &str {
        "Call a tool advertised by another installed app and wait for its JSON result."
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CallAppToolArgs>()
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Async
    }

    async fn start(&self, correlation_id: &str, args: &Map<String, Value>) -> Result<(), String> {
        let args: CallAppToolArgs = parse_args(args)?;
        let mut extras = Map::new();
        extras.insert("tool_name".into(), Value::String(args.tool_name));
        extras.insert(
            "arguments".into(),
            Value::String(Value::Object(args.arguments).to_string()),
        );
        let request = AppLaunch {
            package: args.package,
            action: Some(APP_TOOL_CALL_ACTION.to_string()),
            extras,
        };
        self.launcher
            .start_for_result(correlation_id, request)
            .await
            .map_err(|e| e.to_string())
    }
}
