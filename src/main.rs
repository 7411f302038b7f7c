//! Gosling 命令行入口
//!
//! 初始化日志、加载配置，在内存模拟设备上构建 Agent，并从标准输入逐行读取命令。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use gosling::core::{create_agent_builder, Agent, AgentError, AgentStatus};
use gosling::device::{Capabilities, DeviceNotification, SimulatedDevice};
use gosling::tools::CorrelationRegistry;
use gosling::TriggerType;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "Commands: /new, /list, /end, /notify <package>|<title>|<text>, /quit. Anything else is sent to the agent.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gosling::observability::init();

    // 模拟设备在启动应用后稍等片刻即回报结果
    let correlations = Arc::new(CorrelationRegistry::new());
    let device = Arc::new(
        SimulatedDevice::new().with_auto_reply(correlations.clone(), Duration::from_millis(300)),
    );
    let agent = create_agent_builder(None)
        .with_capabilities(Capabilities::from_device(device.clone()))
        .with_correlations(correlations)
        .build()
        .context("Failed to build agent")?;
    let agent = Arc::new(agent);

    agent.set_status_listener(Arc::new(|status: &AgentStatus| println!("{status}")));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" => break,
            "/help" => println!("{HELP}"),
            "/new" => match agent.new_conversation() {
                Ok(id) => println!("Started conversation {id}"),
                Err(e) => println!("{e}"),
            },
            "/end" => match agent.end_current_conversation() {
                Ok(Some(id)) => println!("Ended conversation {id}"),
                Ok(None) => println!("No open conversation"),
                Err(e) => println!("{e}"),
            },
            "/list" => list_conversations(&agent),
            _ if line.starts_with("/notify ") => {
                notify(&agent, &device, line.trim_start_matches("/notify ")).await
            }
            command => {
                if let Err(e) = agent.process_command(command, TriggerType::Command, None).await {
                    // 终止性错误已作为 Error 状态打印
                    tracing::debug!("Command ended with {}", e);
                }
            }
        }
    }

    agent.destroy();
    Ok(())
}

fn list_conversations(agent: &Agent) {
    let conversations = agent.conversations().list_conversations();
    if conversations.is_empty() {
        println!("No conversations");
    }
    for c in conversations {
        let state = if c.is_open() { "open" } else { "ended" };
        println!(
            "{}  {}  {} messages  [{}]  {}",
            c.start_time.format("%Y-%m-%d %H:%M"),
            c.id,
            c.messages.len(),
            state,
            c.title()
        );
    }
}

async fn notify(agent: &Agent, device: &SimulatedDevice, spec: &str) {
    let mut parts = spec.splitn(3, '|').map(str::trim);
    let notification = DeviceNotification {
        package: parts.next().unwrap_or_default().to_string(),
        title: parts.next().unwrap_or_default().to_string(),
        content: parts.next().unwrap_or_default().to_string(),
        category: String::new(),
    };
    if notification.package.is_empty() {
        println!("Usage: /notify <package>|<title>|<text>");
        return;
    }
    device.push_notification(notification.clone());
    match agent.handle_notification(&notification).await {
        Ok(None) => println!("Notification ignored"),
        Ok(Some(_)) => {}
        Err(AgentError::Busy) => println!("Agent is busy, notification dropped"),
        Err(e) => tracing::debug!("Notification turn ended with {}", e),
    }
}
