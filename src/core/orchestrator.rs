//! Agent 编排器：主控循环
//!
//! 一轮 = 用户输入 → (调用模型 → 执行工具 → 回灌结果)* → 最终文本或错误。
//! 同一 Agent 同时只跑一轮：进行中再来的命令直接返回 Busy，不追加任何消息。
//! 每次迭代恰好广播一个 AgentStatus；TurnPhase 经 watch 通道投影。

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::TriggersSection;
use crate::core::{
    AgentError, AgentStatus, RecoveryAction, RecoveryEngine, SessionSupervisor, StatusBroadcaster,
    StatusListener, TriggerType, TurnOutcome, TurnPhase,
};
use crate::llm::{ensure_unique_call_ids, LlmClient, ModelRequest, ModelResponse};
use crate::memory::{ConversationStore, ImageRef, Message};
use crate::tools::{CorrelationRegistry, Dispatched, ToolCall, ToolDispatcher, ToolResult};

/// 第一条 Processing 状态
pub const THINKING: &str = "Thinking...";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Gosling, an assistant that operates an Android phone on the user's behalf.\n\
You can read what is on screen, take screenshots, tap, type, swipe, press system keys, \
open apps, list installed apps, read notifications and call tools that other apps expose.\n\
Work step by step: inspect the screen before acting on it, prefer node ids from get_screen_content \
over raw coordinates, and verify the result of important actions.\n\
When a tool fails, read the error and try another approach instead of repeating the same call.\n\
When the task is done, answer with a short plain-text summary of what you did.";

pub(crate) const SKIPPED_RESULT: &str = "Skipped because an earlier tool call in this batch failed";

pub struct Agent {
    pub(crate) llm: Arc<dyn LlmClient>,
    pub(crate) dispatcher: ToolDispatcher,
    pub(crate) store: Arc<ConversationStore>,
    pub(crate) status: Arc<StatusBroadcaster>,
    pub(crate) recovery: RecoveryEngine,
    pub(crate) supervisor: SessionSupervisor,
    pub(crate) phase_tx: watch::Sender<TurnPhase>,
    /// 持有期间即有一轮在进行
    pub(crate) turn_guard: Mutex<()>,
    pub(crate) system_prompt: String,
    pub(crate) max_turns: usize,
    pub(crate) triggers: TriggersSection,
}

impl Agent {
    /// 处理一条命令，返回最终回答。
    ///
    /// - 进行中：立即返回 Busy，不修改状态、不广播
    /// - 当前对话已结束或不存在时新建对话
    /// - 模型不可用、异步工具超时、超出轮次上限：广播 Error 并返回错误，对话保持打开
    /// - Agent 已销毁：返回 Cancelled，不再追加、不再广播
    pub async fn process_command(
        &self,
        input: &str,
        trigger: TriggerType,
        image: Option<ImageRef>,
    ) -> Result<String, AgentError> {
        if self.supervisor.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let Ok(_turn) = self.turn_guard.try_lock() else {
            tracing::debug!("Command rejected, a turn is already running");
            return Err(AgentError::Busy);
        };

        let conversation = self.open_conversation();
        let span = tracing::info_span!("turn", conversation = %conversation, trigger = %trigger);
        self.run_turn(&conversation, input, trigger, image)
            .instrument(span)
            .await
    }

    async fn run_turn(
        &self,
        conversation: &str,
        input: &str,
        trigger: TriggerType,
        image: Option<ImageRef>,
    ) -> Result<String, AgentError> {
        let cancel = self.supervisor.cancel_token();
        tracing::info!("Turn started");

        let outcome = match self.append(conversation, Message::user_with_image(input, image), &cancel) {
            Ok(()) => {
                self.status.emit(AgentStatus::Processing(THINKING.to_string()));
                self.turn_loop(conversation, trigger, &cancel).await
            }
            Err(e) => Err(e),
        };
        // 销毁后的任何失败都归为 Cancelled
        let outcome = match outcome {
            Err(_) if cancel.is_cancelled() => Err(AgentError::Cancelled),
            other => other,
        };

        match &outcome {
            Ok(text) => {
                self.set_phase(TurnPhase::Terminal {
                    outcome: TurnOutcome::Success,
                });
                self.status.emit(AgentStatus::Success(text.clone()));
                tracing::info!("Turn finished");
            }
            Err(AgentError::Cancelled) => {
                self.set_phase(TurnPhase::Terminal {
                    outcome: TurnOutcome::Cancelled,
                });
                tracing::info!("Turn cancelled");
            }
            Err(e) => {
                self.set_phase(TurnPhase::Terminal {
                    outcome: TurnOutcome::Error,
                });
                self.status.emit(AgentStatus::Error(self.recovery.status_text(e)));
                tracing::warn!("Turn failed: {}", e);
            }
        }
        let (prompt_tokens, completion_tokens, total_tokens) = self.llm.token_usage();
        tracing::debug!(prompt_tokens, completion_tokens, total_tokens, "Token usage so far");
        outcome
    }

    async fn turn_loop(
        &self,
        conversation: &str,
        trigger: TriggerType,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let system_prompt = format!("{}\n\n{}", self.system_prompt, trigger.policy_line());
        let tools = self.dispatcher.catalog();

        for iteration in 1..=self.max_turns {
            self.set_phase(TurnPhase::Dispatched { iteration });
            let request = ModelRequest {
                system_prompt: system_prompt.clone(),
                messages: self.store.messages(conversation)?,
                tools: tools.clone(),
            };
            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AgentError::Cancelled),
                response = self.llm.complete(&request) => response?,
            };

            let (text, mut calls) = match response {
                ModelResponse::ToolCalls { text, calls } if !calls.is_empty() => (text, calls),
                // 空的工具调用列表等同最终回答
                ModelResponse::Text(text) | ModelResponse::ToolCalls { text, .. } => {
                    self.append(conversation, Message::assistant(text.clone()), cancel)?;
                    return Ok(text);
                }
            };

            ensure_unique_call_ids(&mut calls);
            for call in calls.iter_mut() {
                if let Some(mode) = self.dispatcher.mode_of(&call.name) {
                    call.mode = mode;
                }
            }
            tracing::debug!(iteration, calls = calls.len(), "Model requested tools");
            self.append(conversation, Message::assistant_tool_calls(text, calls.clone()), cancel)?;

            let mut summaries = Vec::with_capacity(calls.len());
            for (index, call) in calls.iter().enumerate() {
                self.set_phase(TurnPhase::Executing {
                    tool: call.name.clone(),
                    call_id: call.id.clone(),
                });
                let result = match self.execute_call(call, cancel).await {
                    Ok(result) => result,
                    Err(AgentError::Cancelled) => return Err(AgentError::Cancelled),
                    Err(e) => match self.recovery.handle(&e) {
                        RecoveryAction::FeedBackToModel(text) => {
                            tracing::debug!(tool = %call.name, "Tool failure fed back to model");
                            ToolResult::failed(call, text)
                        }
                        RecoveryAction::Abort(_) => {
                            // 保持每个调用都有结果消息，对话可继续
                            self.append(
                                conversation,
                                Message::tool_result(&ToolResult::failed(call, e.to_string())),
                                cancel,
                            )?;
                            for skipped in &calls[index + 1..] {
                                self.append(
                                    conversation,
                                    Message::tool_result(&ToolResult::failed(skipped, SKIPPED_RESULT)),
                                    cancel,
                                )?;
                            }
                            return Err(e);
                        }
                    },
                };
                self.append(conversation, Message::tool_result(&result), cancel)?;
                summaries.push(result.summary());
            }
            self.status.emit(AgentStatus::Processing(summaries.join("; ")));
        }

        Err(AgentError::TurnLimitExceeded(self.max_turns))
    }

    async fn execute_call(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolResult, AgentError> {
        let dispatched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.dispatcher.correlations().cancel(&call.id);
                return Err(AgentError::Cancelled);
            }
            dispatched = self.dispatcher.dispatch(call) => dispatched,
        };
        match dispatched {
            Dispatched::Ready(result) => Ok(result),
            Dispatched::Pending { call, slot } => {
                self.dispatcher.await_result(&call, slot, cancel).await
            }
        }
    }

    fn append(
        &self,
        conversation: &str,
        message: Message,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        if cancel.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        self.store.append_message(conversation, message)?;
        Ok(())
    }

    /// 当前对话仍打开则沿用，否则新建
    fn open_conversation(&self) -> String {
        match self.store.current() {
            Some(c) if c.is_open() => c.id,
            _ => self.store.start_conversation(),
        }
    }

    fn set_phase(&self, phase: TurnPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// 开始新话题；旧对话保持打开，需显式关闭
    pub fn new_conversation(&self) -> Result<String, AgentError> {
        if self.supervisor.is_cancelled() {
            return Err(AgentError::Cancelled);
        }
        let _turn = self.turn_guard.try_lock().map_err(|_| AgentError::Busy)?;
        Ok(self.store.start_conversation())
    }

    /// 以当前时间关闭当前对话；没有打开的对话时返回 None
    pub fn end_current_conversation(&self) -> Result<Option<String>, AgentError> {
        let _turn = self.turn_guard.try_lock().map_err(|_| AgentError::Busy)?;
        match self.store.current() {
            Some(c) if c.is_open() => {
                self.store.end_conversation(&c.id, Utc::now())?;
                Ok(Some(c.id))
            }
            _ => Ok(None),
        }
    }

    /// 持有 Agent 的组件销毁：取消令牌、取消全部待完成的异步调用、关闭当前对话。
    /// 等待中的轮次返回 Cancelled；之后的命令也返回 Cancelled。
    pub fn destroy(&self) {
        if self.supervisor.is_cancelled() {
            return;
        }
        self.supervisor.cancel();
        let cancelled = self.dispatcher.correlations().cancel_all();
        if let Some(c) = self.store.current().filter(|c| c.is_open()) {
            if let Err(e) = self.store.end_conversation(&c.id, Utc::now()) {
                tracing::warn!("Failed to close conversation on destroy: {}", e);
            }
        }
        tracing::info!(pending_cancelled = cancelled, "Agent destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.supervisor.is_cancelled()
    }

    /// 是否有一轮正在进行；只读阶段投影，不触碰 turn_guard
    pub fn is_busy(&self) -> bool {
        self.phase().is_active()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<TurnPhase> {
        self.phase_tx.subscribe()
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase_tx.borrow().clone()
    }

    /// 替换状态监听器，返回旧监听器（单槽，后注册者生效）
    pub fn set_status_listener(
        &self,
        listener: Arc<dyn StatusListener>,
    ) -> Option<Arc<dyn StatusListener>> {
        self.status.set_listener(listener)
    }

    pub fn status_broadcaster(&self) -> &Arc<StatusBroadcaster> {
        &self.status
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// 外部事件源（其他应用回报结果）用它完成异步调用
    pub fn correlations(&self) -> &Arc<CorrelationRegistry> {
        self.dispatcher.correlations()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.dispatcher.tool_names()
    }

    pub fn llm(&self) -> &Arc<dyn LlmClient> {
        &self.llm
    }
}
