//! 工具调度器
//!
//! 持有 ToolRegistry、CorrelationRegistry 与两个超时：
//! - 同步工具在 tool_timeout 内执行，失败或超时都转为失败的 ToolResult（不终止本轮）；
//! - 异步工具先以调用 id 注册结果槽，再发出请求，返回 Pending；
//!   await_result 在 async_timeout 内等待外部 resolve，超时则取消条目并返回 AsyncTimeout；
//!   外部 resolve_error 返回 ToolExecutionFailed，由编排器交给 RecoveryEngine 决定去向。
//! 每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::tools::call::preview;
use crate::tools::{
    CorrelationRegistry, DispatchMode, PendingSlot, ToolCall, ToolRegistry, ToolResult, ToolSpec,
};

/// dispatch 的结果：当场可用的结果，或等待外部事件的结果槽
#[derive(Debug)]
pub enum Dispatched {
    Ready(ToolResult),
    Pending { call: ToolCall, slot: PendingSlot },
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    correlations: Arc<CorrelationRegistry>,
    tool_timeout: Duration,
    async_timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        correlations: Arc<CorrelationRegistry>,
        tool_timeout: Duration,
        async_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            correlations,
            tool_timeout,
            async_timeout,
        }
    }

    /// 发给模型的静态工具目录
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }

    pub fn mode_of(&self, name: &str) -> Option<DispatchMode> {
        self.registry.get(name).map(|t| t.mode())
    }

    pub fn correlations(&self) -> &Arc<CorrelationRegistry> {
        &self.correlations
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// 派发一次调用。未知工具与同步失败均返回 Ready(失败结果)。
    pub async fn dispatch(&self, call: &ToolCall) -> Dispatched {
        let started = Instant::now();
        let Some(tool) = self.registry.get(&call.name) else {
            audit(call, call.mode, "not_found", started);
            let err = AgentError::ToolNotFound(call.name.clone());
            return Dispatched::Ready(ToolResult::failed(call, err.to_string()));
        };

        match tool.mode() {
            DispatchMode::Sync => {
                let result = match timeout(self.tool_timeout, tool.execute(&call.arguments)).await {
                    Ok(Ok(output)) => {
                        audit(call, DispatchMode::Sync, "ok", started);
                        let result = ToolResult::ok(call, output.text);
                        match output.image {
                            Some(image) => result.with_image(image),
                            None => result,
                        }
                    }
                    Ok(Err(e)) => {
                        audit(call, DispatchMode::Sync, "error", started);
                        ToolResult::failed(call, AgentError::ToolExecutionFailed(e).to_string())
                    }
                    Err(_) => {
                        audit(call, DispatchMode::Sync, "timeout", started);
                        let msg = format!(
                            "{} timed out after {}s",
                            call.name,
                            self.tool_timeout.as_secs()
                        );
                        ToolResult::failed(call, AgentError::ToolExecutionFailed(msg).to_string())
                    }
                };
                Dispatched::Ready(result)
            }
            DispatchMode::Async => {
                let slot = match self.correlations.register(&call.id) {
                    Ok(slot) => slot,
                    Err(e) => {
                        audit(call, DispatchMode::Async, "duplicate", started);
                        return Dispatched::Ready(ToolResult::failed(call, e.to_string()));
                    }
                };
                let failure = match timeout(self.tool_timeout, tool.start(&call.id, &call.arguments)).await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(("error", e)),
                    Err(_) => Some(("timeout", format!("{} did not start in time", call.name))),
                };
                match failure {
                    None => {
                        audit(call, DispatchMode::Async, "pending", started);
                        let mut call = call.clone();
                        call.mode = DispatchMode::Async;
                        Dispatched::Pending { call, slot }
                    }
                    Some((outcome, e)) => {
                        self.correlations.cancel(&call.id);
                        audit(call, DispatchMode::Async, outcome, started);
                        Dispatched::Ready(ToolResult::failed(
                            call,
                            AgentError::ToolExecutionFailed(e).to_string(),
                        ))
                    }
                }
            }
        }
    }

    /// 等待异步调用的结果。外部 resolve_error 返回 ToolExecutionFailed；
    /// 超时或 cancel 触发时取消条目，之后的外部 resolve 为 Miss。
    pub async fn await_result(
        &self,
        call: &ToolCall,
        slot: PendingSlot,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, AgentError> {
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.correlations.cancel(&call.id);
                audit(call, DispatchMode::Async, "cancelled", started);
                Err(AgentError::Cancelled)
            }
            waited = timeout(self.async_timeout, slot) => match waited {
                Ok(Ok(Ok(payload))) => {
                    audit(call, DispatchMode::Async, "ok", started);
                    Ok(ToolResult::ok(call, payload))
                }
                Ok(Ok(Err(e))) => {
                    audit(call, DispatchMode::Async, "error", started);
                    Err(AgentError::ToolExecutionFailed(e))
                }
                Ok(Err(_)) => {
                    audit(call, DispatchMode::Async, "cancelled", started);
                    Err(AgentError::Cancelled)
                }
                Err(_) => {
                    self.correlations.cancel(&call.id);
                    audit(call, DispatchMode::Async, "timeout", started);
                    Err(AgentError::AsyncTimeout {
                        tool: call.name.clone(),
                        call_id: call.id.clone(),
                        waited_secs: self.async_timeout.as_secs(),
                    })
                }
            }
        }
    }
}

fn audit(call: &ToolCall, mode: DispatchMode, outcome: &str, started: Instant) {
    let args = Value::Object(call.arguments.clone()).to_string();
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": call.name,
        "call_id": call.id,
        "mode": mode.to_string(),
        "outcome": outcome,
        "duration_ms": started.elapsed().as_millis() as u64,
        "args_preview": preview(&args, 200),
    });
    tracing::info!(audit = %audit, "tool");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SimulatedDevice;
    use crate::tools::{register_builtin_tools, Resolution, Tool, ToolOutput};
    use crate::device::Capabilities;
    use async_trait::async_trait;
    use serde_json::{json, Map};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        async fn execute(&self, _args: &Map<String, Value>) -> Result<ToolOutput, String> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("late".into())
        }
    }

    fn dispatcher(async_timeout: Duration) -> (ToolDispatcher, Arc<SimulatedDevice>) {
        let device = Arc::new(SimulatedDevice::new());
        let mut registry = ToolRegistry::new();
        register_builtin_tools(&mut registry, &Capabilities::from_device(device.clone()));
        registry.register(SlowTool);
        let dispatcher = ToolDispatcher::new(
            registry,
            Arc::new(CorrelationRegistry::new()),
            Duration::from_millis(50),
            async_timeout,
        );
        (dispatcher, device)
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
    }

    async fn run(
        d: &ToolDispatcher,
        c: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, AgentError> {
        match d.dispatch(c).await {
            Dispatched::Ready(result) => Ok(result),
            Dispatched::Pending { call, slot } => d.await_result(&call, slot, cancel).await,
        }
    }

    fn ready(d: Dispatched) -> ToolResult {
        match d {
            Dispatched::Ready(r) => r,
            Dispatched::Pending { .. } => panic!("expected a ready result"),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let (d, _) = dispatcher(Duration::from_secs(1));
        let result = ready(d.dispatch(&call("c1", "fly", json!({}))).await);
        assert!(!result.success);
        assert_eq!(result.content, "Tool not found: fly");
        assert_eq!(result.call_id, "c1");
    }

    #[tokio::test]
    async fn test_sync_tool_runs_against_device() {
        let (d, device) = dispatcher(Duration::from_secs(1));
        let result = ready(d.dispatch(&call("c1", "tap", json!({"node_id": "icon_camera"}))).await);
        assert!(result.success);
        assert_eq!(result.content, "Tapped icon_camera");
        assert_eq!(device.action_log(), vec!["Tapped icon_camera"]);
    }

    #[tokio::test]
    async fn test_sync_failure_and_timeout_are_not_errors() {
        let (d, _) = dispatcher(Duration::from_secs(1));
        let rejected = ready(
            d.dispatch(&call("c1", "type_text", json!({"text": "x", "node_id": "icon_camera"})))
                .await,
        );
        assert!(!rejected.success);
        assert!(rejected.content.contains("not editable"));

        let slow = ready(d.dispatch(&call("c2", "slow", json!({}))).await);
        assert!(!slow.success);
        assert!(slow.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_async_resolve_error_is_a_tool_failure() {
        let (d, _) = dispatcher(Duration::from_secs(5));
        let c = call("c1", "start_app_for_result", json!({"package": "com.booking"}));
        let Dispatched::Pending { call, slot } = d.dispatch(&c).await else {
            panic!("expected pending");
        };
        assert_eq!(call.mode, DispatchMode::Async);
        assert!(d.correlations().is_pending("c1"));

        let registry = d.correlations().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            registry.resolve_error("c1", "app crashed");
        });
        let err = d.await_result(&call, slot, &CancellationToken::new()).await.unwrap_err();
        assert_eq!(err, AgentError::ToolExecutionFailed("app crashed".to_string()));
        assert!(!d.correlations().is_pending("c1"));
    }

    #[tokio::test]
    async fn test_async_timeout_cancels_entry() {
        let (d, _) = dispatcher(Duration::from_millis(30));
        let c = call("c1", "call_app_tool", json!({"package": "com.booking", "tool_name": "hi"}));
        let err = run(&d, &c, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::AsyncTimeout { ref call_id, .. } if call_id == "c1"));
        assert!(!d.correlations().is_pending("c1"));
        assert_eq!(d.correlations().resolve("c1", "late"), Resolution::Miss);
    }

    #[tokio::test]
    async fn test_cancellation_while_waiting() {
        let (d, _) = dispatcher(Duration::from_secs(5));
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let c = call("c1", "start_app_for_result", json!({"package": "com.venmo"}));
        let err = run(&d, &c, &token).await.unwrap_err();
        assert_eq!(err, AgentError::Cancelled);
        assert_eq!(d.correlations().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_async_start_failure_releases_entry() {
        let (d, _) = dispatcher(Duration::from_secs(5));
        let c = call("c1", "start_app_for_result", json!({"package": "org.unknown"}));
        let result = ready(d.dispatch(&c).await);
        assert!(!result.success);
        assert!(result.content.contains("not installed"));
        assert!(!d.correlations().is_pending("c1"));
    }

    #[test]
    fn test_catalog_reports_modes() {
        let (d, _) = dispatcher(Duration::from_secs(1));
        assert_eq!(d.mode_of("call_app_tool"), Some(DispatchMode::Async));
        assert_eq!(d.mode_of("tap"), Some(DispatchMode::Sync));
        assert_eq!(d.mode_of("fly"), None);
        assert!(d.catalog().iter().any(|s| s.name == "get_screen_content"));
    }
}
