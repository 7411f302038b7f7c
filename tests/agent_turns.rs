//! 编排器端到端测试：Scripted LLM + 内存模拟设备

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gosling::config::AppConfig;
use gosling::core::{
    Agent, AgentBuilder, AgentError, AgentStatus, StatusListener, TriggerType, TurnOutcome,
    TurnPhase, AGENT_PACKAGE, THINKING,
};
use gosling::device::{Capabilities, DeviceNotification, SimulatedDevice};
use gosling::llm::{LlmError, ModelResponse, ScriptedLlmClient};
use gosling::memory::Role;
use gosling::tools::{CorrelationRegistry, Resolution, ToolCall};
use serde_json::{json, Value};

struct Harness {
    agent: Arc<Agent>,
    llm: Arc<ScriptedLlmClient>,
    device: Arc<SimulatedDevice>,
    statuses: Arc<Mutex<Vec<AgentStatus>>>,
}

impl Harness {
    fn new(llm: ScriptedLlmClient, config: AppConfig) -> Self {
        Self::with_device(llm, config, Arc::new(SimulatedDevice::new()), None)
    }

    fn with_device(
        llm: ScriptedLlmClient,
        config: AppConfig,
        device: Arc<SimulatedDevice>,
        correlations: Option<Arc<CorrelationRegistry>>,
    ) -> Self {
        let llm = Arc::new(llm);
        let mut builder = AgentBuilder::new(config)
            .with_llm(llm.clone())
            .with_capabilities(Capabilities::from_device(device.clone()));
        if let Some(correlations) = correlations {
            builder = builder.with_correlations(correlations);
        }
        let agent = Arc::new(builder.build().unwrap());

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let listener: Arc<dyn StatusListener> =
            Arc::new(move |s: &AgentStatus| sink.lock().unwrap().push(s.clone()));
        agent.set_status_listener(listener);

        Self {
            agent,
            llm,
            device,
            statuses,
        }
    }

    fn statuses(&self) -> Vec<AgentStatus> {
        self.statuses.lock().unwrap().clone()
    }

    fn current_roles(&self) -> Vec<Role> {
        self.agent
            .conversations()
            .current()
            .unwrap()
            .messages
            .iter()
            .map(|m| m.role)
            .collect()
    }

    fn spawn_command(&self, input: &str) -> tokio::task::JoinHandle<Result<String, AgentError>> {
        let agent = self.agent.clone();
        let input = input.to_string();
        tokio::spawn(async move { agent.process_command(&input, TriggerType::Command, None).await })
    }
}

fn call(id: &str, name: &str, args: Value) -> ToolCall {
    ToolCall::new(id, name, args.as_object().cloned().unwrap_or_default())
}

fn tool_calls(calls: Vec<ToolCall>) -> Result<ModelResponse, LlmError> {
    Ok(ModelResponse::ToolCalls {
        text: String::new(),
        calls,
    })
}

fn text(s: &str) -> Result<ModelResponse, LlmError> {
    Ok(ModelResponse::Text(s.to_string()))
}

async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_final_text_needs_two_messages_and_one_success() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![text("Flashlight is on")]),
        AppConfig::default(),
    );
    let reply = h
        .agent
        .process_command("Turn on flashlight", TriggerType::Command, None)
        .await
        .unwrap();

    assert_eq!(reply, "Flashlight is on");
    assert_eq!(h.current_roles(), vec![Role::User, Role::Assistant]);
    assert!(h.agent.conversations().current().unwrap().is_open());
    assert_eq!(
        h.statuses(),
        vec![
            AgentStatus::Processing(THINKING.to_string()),
            AgentStatus::Success("Flashlight is on".to_string()),
        ]
    );
    assert_eq!(
        h.agent.phase(),
        TurnPhase::Terminal {
            outcome: TurnOutcome::Success
        }
    );
}

#[tokio::test]
async fn test_one_sync_tool_then_answer() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![call("c1", "get_screen_content", json!({}))]),
            text("You are on the home screen"),
        ]),
        AppConfig::default(),
    );
    h.agent
        .process_command("What is on my screen?", TriggerType::Command, None)
        .await
        .unwrap();

    assert_eq!(
        h.current_roles(),
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let statuses = h.statuses();
    let processing = statuses
        .iter()
        .filter(|s| matches!(s, AgentStatus::Processing(_)))
        .count();
    assert_eq!(processing, 2);
    assert_eq!(statuses[1], AgentStatus::Processing("get_screen_content done".to_string()));
    assert_eq!(
        statuses.last(),
        Some(&AgentStatus::Success("You are on the home screen".to_string()))
    );

    // 第二次请求带上工具结果与工具目录
    let requests = h.llm.requests();
    assert_eq!(requests.len(), 2);
    let tool_message = &requests[1].messages[2];
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("c1"));
    assert!(tool_message.content.contains("icon_camera"));
    assert!(requests[0].tools.iter().any(|t| t.name == "tap"));
}

#[tokio::test]
async fn test_tool_failures_are_fed_back() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![
                call("c1", "fly_to_moon", json!({})),
                call("c2", "type_text", json!({"text": "hi", "node_id": "icon_camera"})),
            ]),
            text("I could not do that"),
        ]),
        AppConfig::default(),
    );
    let reply = h
        .agent
        .process_command("do something odd", TriggerType::Command, None)
        .await
        .unwrap();
    assert_eq!(reply, "I could not do that");

    let messages = h.agent.conversations().current().unwrap().messages;
    assert_eq!(messages[2].content, "Error: Tool not found: fly_to_moon");
    assert!(messages[3].content.starts_with("Error: Tool execution failed"));
    assert!(h.device.action_log().is_empty());
}

#[tokio::test]
async fn test_async_resolve_error_continues_the_loop() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![call("c1", "start_app_for_result", json!({"package": "com.booking"}))]),
            text("Booking crashed, try again later"),
        ]),
        AppConfig::default(),
    );
    let turn = h.spawn_command("Book a hotel");
    let registry = h.agent.correlations().clone();
    wait_until(|| registry.is_pending("c1")).await;

    assert_eq!(registry.resolve_error("c1", "app crashed"), Resolution::Delivered);
    let reply = turn.await.unwrap().unwrap();
    assert_eq!(reply, "Booking crashed, try again later");

    let messages = h.agent.conversations().current().unwrap().messages;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].content, "Error: Tool execution failed: app crashed");
    assert!(h.statuses().contains(&AgentStatus::Processing(
        "start_app_for_result failed: Tool execution failed: app crashed".to_string()
    )));
    assert_eq!(registry.resolve("c1", "late"), Resolution::Miss);
}

#[tokio::test]
async fn test_async_result_from_other_app() {
    let correlations = Arc::new(CorrelationRegistry::new());
    let device = Arc::new(
        SimulatedDevice::new().with_auto_reply(correlations.clone(), Duration::from_millis(10)),
    );
    let h = Harness::with_device(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![call(
                "c1",
                "call_app_tool",
                json!({"package": "com.booking", "tool_name": "search_hotels", "arguments": {"city": "Lisbon"}}),
            )]),
            text("Found hotels"),
        ]),
        AppConfig::default(),
        device,
        Some(correlations),
    );
    h.agent
        .process_command("Find hotels in Lisbon", TriggerType::Command, None)
        .await
        .unwrap();

    let messages = h.agent.conversations().current().unwrap().messages;
    assert!(messages[2].content.contains("\"status\":\"ok\""));
    assert_eq!(h.device.launches().len(), 1);
}

#[tokio::test]
async fn test_busy_while_turn_is_running() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![call("c1", "start_app_for_result", json!({"package": "com.venmo"}))]),
            text("Paid"),
        ]),
        AppConfig::default(),
    );
    let turn = h.spawn_command("Pay Alice");
    let registry = h.agent.correlations().clone();
    wait_until(|| registry.is_pending("c1")).await;

    let before = h.current_roles();
    let statuses_before = h.statuses().len();
    let err = h
        .agent
        .process_command("Something else", TriggerType::Command, None)
        .await
        .unwrap_err();
    assert_eq!(err, AgentError::Busy);
    assert_eq!(h.current_roles(), before);
    assert_eq!(h.statuses().len(), statuses_before);
    assert!(matches!(h.agent.new_conversation(), Err(AgentError::Busy)));
    assert!(h.agent.is_busy());

    registry.resolve("c1", "{\"paid\":true}");
    assert_eq!(turn.await.unwrap().unwrap(), "Paid");
    assert!(!h.agent.is_busy());
}

#[tokio::test]
async fn test_destroy_mid_turn_cancels_outstanding_call() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![tool_calls(vec![call(
            "c1",
            "start_app_for_result",
            json!({"package": "com.booking"}),
        )])]),
        AppConfig::default(),
    );
    let turn = h.spawn_command("Book a flight");
    let registry = h.agent.correlations().clone();
    wait_until(|| registry.is_pending("c1")).await;
    let conversation = h.agent.conversations().current_id().unwrap();

    h.agent.destroy();

    assert_eq!(turn.await.unwrap(), Err(AgentError::Cancelled));
    let ended = h.agent.conversations().get(&conversation).unwrap();
    assert!(ended.end_time.is_some());
    assert_eq!(ended.messages.len(), 2);
    assert!(!registry.is_pending("c1"));
    assert_eq!(registry.resolve("c1", "too late"), Resolution::Miss);
    assert_eq!(h.statuses(), vec![AgentStatus::Processing(THINKING.to_string())]);

    let after = h
        .agent
        .process_command("anything", TriggerType::Command, None)
        .await;
    assert_eq!(after, Err(AgentError::Cancelled));
}

#[tokio::test]
async fn test_turn_limit_is_terminal() {
    let mut config = AppConfig::default();
    config.agent.max_turns = 3;
    let h = Harness::new(
        ScriptedLlmClient::repeating(tool_calls(vec![call("", "press_key", json!({"key": "back"}))])),
        config,
    );
    let err = h
        .agent
        .process_command("Keep going", TriggerType::Command, None)
        .await
        .unwrap_err();

    assert_eq!(err, AgentError::TurnLimitExceeded(3));
    assert_eq!(h.llm.requests().len(), 3);
    assert_eq!(h.device.action_log().len(), 3);
    assert!(matches!(h.statuses().last(), Some(AgentStatus::Error(_))));
    // user + 3 x (assistant, tool)
    assert_eq!(h.current_roles().len(), 7);
}

#[tokio::test]
async fn test_model_unavailable_leaves_conversation_open() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            Err(LlmError::Authentication("invalid api key".into())),
            text("Hello again"),
        ]),
        AppConfig::default(),
    );
    let err = h
        .agent
        .process_command("Hello", TriggerType::Command, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ModelUnavailable(LlmError::Authentication(_))));
    match h.statuses().last() {
        Some(AgentStatus::Error(msg)) => assert!(msg.contains("API key")),
        other => panic!("expected an error status, got {other:?}"),
    }
    let first = h.agent.conversations().current_id().unwrap();
    assert_eq!(h.current_roles(), vec![Role::User]);

    // 重试沿用同一对话
    h.agent
        .process_command("Hello", TriggerType::Command, None)
        .await
        .unwrap();
    assert_eq!(h.agent.conversations().current_id().unwrap(), first);
    assert_eq!(h.current_roles(), vec![Role::User, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_async_timeout_records_results_and_fails() {
    let mut config = AppConfig::default();
    config.agent.async_tool_timeout_secs = 1;
    let h = Harness::new(
        ScriptedLlmClient::new(vec![tool_calls(vec![
            call("c1", "call_app_tool", json!({"package": "com.booking", "tool_name": "search"})),
            call("c2", "tap", json!({"node_id": "icon_camera"})),
        ])]),
        config,
    );
    let err = h
        .agent
        .process_command("Search hotels", TriggerType::Command, None)
        .await
        .unwrap_err();

    assert!(matches!(err, AgentError::AsyncTimeout { ref call_id, .. } if call_id == "c1"));
    let messages = h.agent.conversations().current().unwrap().messages;
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("c1"));
    assert!(messages[3].content.contains("Skipped"));
    assert_eq!(h.device.action_log(), vec!["Started Booking.com for result"]);
    assert!(!h.agent.correlations().is_pending("c1"));
    assert!(matches!(h.statuses().last(), Some(AgentStatus::Error(_))));
}

#[tokio::test]
async fn test_notification_trigger_filters_and_runs() {
    let mut config = AppConfig::default();
    config.triggers.process_notifications = true;
    config.triggers.ignored_packages = vec!["com.spam".to_string()];
    let h = Harness::new(
        ScriptedLlmClient::new(vec![text("Nothing to do")]),
        config,
    );

    for package in [AGENT_PACKAGE, "com.spam"] {
        let ignored = h
            .agent
            .handle_notification(&DeviceNotification {
                package: package.to_string(),
                title: "hi".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(ignored, None);
    }
    assert!(h.agent.conversations().is_empty());

    let reply = h
        .agent
        .handle_notification(&DeviceNotification {
            package: "com.android.messaging".into(),
            title: "Mom".into(),
            content: "Call me".into(),
            category: "msg".into(),
        })
        .await
        .unwrap();
    assert_eq!(reply.as_deref(), Some("Nothing to do"));
    let request = &h.llm.requests()[0];
    assert!(request.system_prompt.contains("incoming notification"));
    assert!(request.messages[0].content.contains("Title: Mom"));
}

#[tokio::test]
async fn test_screenshot_trigger_attaches_image() {
    let mut config = AppConfig::default();
    config.triggers.handle_screenshots = true;
    let h = Harness::new(ScriptedLlmClient::new(vec![text("Saved the receipt")]), config);

    let image = gosling::memory::ImageRef::new("content://screenshots/7");
    assert_eq!(h.agent.process_screenshot(image.clone(), "  ").await.unwrap(), None);

    let reply = h
        .agent
        .process_screenshot(image.clone(), "Save receipts to expenses")
        .await
        .unwrap();
    assert_eq!(reply.as_deref(), Some("Saved the receipt"));
    let messages = h.agent.conversations().current().unwrap().messages;
    assert_eq!(messages[0].image.as_ref(), Some(&image));
}

#[tokio::test]
async fn test_new_and_end_conversation() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![text("one"), text("two")]),
        AppConfig::default(),
    );
    h.agent
        .process_command("first", TriggerType::Command, None)
        .await
        .unwrap();
    let first = h.agent.conversations().current_id().unwrap();

    let second = h.agent.new_conversation().unwrap();
    assert_ne!(first, second);
    // 旧对话不会被隐式关闭
    assert!(h.agent.conversations().get(&first).unwrap().is_open());

    h.agent
        .process_command("second", TriggerType::Command, None)
        .await
        .unwrap();
    assert_eq!(h.agent.end_current_conversation().unwrap(), Some(second.clone()));
    assert_eq!(h.agent.end_current_conversation().unwrap(), None);

    let listed = h.agent.conversations().list_conversations();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, second);
    assert_eq!(listed[0].title(), "second");
}

#[tokio::test]
async fn test_phase_projection_follows_the_turn() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![call("c1", "start_app_for_result", json!({"package": "com.booking"}))]),
            text("done"),
        ]),
        AppConfig::default(),
    );
    let phases = h.agent.subscribe_phase();
    assert_eq!(*phases.borrow(), TurnPhase::Idle);

    let turn = h.spawn_command("Book");
    let registry = h.agent.correlations().clone();
    wait_until(|| registry.is_pending("c1")).await;
    assert_eq!(
        *phases.borrow(),
        TurnPhase::Executing {
            tool: "start_app_for_result".into(),
            call_id: "c1".into()
        }
    );

    registry.resolve("c1", "ok");
    turn.await.unwrap().unwrap();
    assert_eq!(
        *phases.borrow(),
        TurnPhase::Terminal {
            outcome: TurnOutcome::Success
        }
    );
}

#[tokio::test]
async fn test_generated_ids_for_model_calls_without_ids() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![
            tool_calls(vec![
                call("", "swipe", json!({"direction": "up"})),
                call("", "swipe", json!({"direction": "down"})),
            ]),
            text("scrolled"),
        ]),
        AppConfig::default(),
    );
    h.agent
        .process_command("scroll around", TriggerType::Command, None)
        .await
        .unwrap();
    let messages = h.agent.conversations().current().unwrap().messages;
    let ids: Vec<String> = messages[1].tool_calls.iter().map(|c| c.id.clone()).collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some(ids[0].as_str()));
    assert_eq!(messages[3].tool_call_id.as_deref(), Some(ids[1].as_str()));
    assert_eq!(h.device.action_log(), vec!["Swiped up", "Swiped down"]);
}

#[tokio::test]
async fn test_network_error_reports_connection_status() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![Err(LlmError::Network("connection reset".into()))]),
        AppConfig::default(),
    );
    let err = h
        .agent
        .process_command("Open settings", TriggerType::Command, None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        AgentError::ModelUnavailable(LlmError::Network("connection reset".into()))
    );
    assert_eq!(
        h.statuses(),
        vec![
            AgentStatus::Processing(THINKING.to_string()),
            AgentStatus::Error(
                "Could not reach the language model. Check your connection and try again."
                    .to_string()
            ),
        ]
    );
    assert!(h.agent.conversations().current().unwrap().is_open());
    assert_eq!(
        h.agent.phase(),
        TurnPhase::Terminal {
            outcome: TurnOutcome::Error
        }
    );
}

#[tokio::test]
async fn test_destroy_while_waiting_for_model() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![text("too late")]).with_delay(Duration::from_millis(300)),
        AppConfig::default(),
    );
    let turn = h.spawn_command("Call Mom");
    let llm = h.llm.clone();
    wait_until(|| llm.requests().len() == 1).await;
    let conversation = h.agent.conversations().current_id().unwrap();

    h.agent.destroy();
    assert_eq!(turn.await.unwrap(), Err(AgentError::Cancelled));

    // 模型迟到的回答不会再写入对话
    tokio::time::sleep(Duration::from_millis(400)).await;
    let ended = h.agent.conversations().get(&conversation).unwrap();
    assert_eq!(ended.messages.len(), 1);
    assert!(ended.end_time.is_some());
    assert_eq!(h.statuses(), vec![AgentStatus::Processing(THINKING.to_string())]);
    assert_eq!(
        h.agent.phase(),
        TurnPhase::Terminal {
            outcome: TurnOutcome::Cancelled
        }
    );
}

#[tokio::test]
async fn test_screenshot_preferences_from_config() {
    let mut config = AppConfig::default();
    config.triggers.handle_screenshots = true;
    config.triggers.screenshot_preferences = "Add receipts to my expense sheet".to_string();
    let h = Harness::new(ScriptedLlmClient::new(vec![text("Receipt filed")]), config);

    let reply = h
        .agent
        .process_screenshot(gosling::memory::ImageRef::new("content://screenshots/9"), "")
        .await
        .unwrap();
    assert_eq!(reply.as_deref(), Some("Receipt filed"));
    let request = &h.llm.requests()[0];
    assert!(request.messages[0]
        .content
        .contains("Add receipts to my expense sheet"));
}

#[tokio::test]
async fn test_empty_tool_call_list_is_a_final_answer() {
    let h = Harness::new(
        ScriptedLlmClient::new(vec![Ok(ModelResponse::ToolCalls {
            text: "All done".to_string(),
            calls: Vec::new(),
        })]),
        AppConfig::default(),
    );
    let reply = h
        .agent
        .process_command("Mute the phone", TriggerType::Command, None)
        .await
        .unwrap();

    assert_eq!(reply, "All done");
    assert_eq!(h.current_roles(), vec![Role::User, Role::Assistant]);
    assert_eq!(h.llm.requests().len(), 1);
    assert_eq!(
        h.statuses(),
        vec![
            AgentStatus::Processing(THINKING.to_string()),
            AgentStatus::Success("All done".to_string()),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_polling_is_busy_never_rejects_commands() {
    let h = Harness::new(ScriptedLlmClient::repeating(text("ok")), AppConfig::default());
    let stop = Arc::new(AtomicBool::new(false));
    let poller = {
        let agent = h.agent.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            while !stop.load(Ordering::Relaxed) {
                let _ = agent.is_busy();
                tokio::task::yield_now().await;
            }
        })
    };

    for i in 0..50 {
        let reply = h
            .agent
            .process_command(&format!("command {i}"), TriggerType::Command, None)
            .await;
        assert_eq!(reply, Ok("ok".to_string()));
    }
    stop.store(true, Ordering::Relaxed);
    poller.await.unwrap();
    assert!(!h.agent.is_busy());
}
