//! The core agent loop that orchestrates conversation with tool use.

use cairn_hooks::{HookDispatcher, HookEvent, HookPayload, NoopHooks};
use cairn_session::SessionStore;
use cairn_tools::ToolRegistry;
use cairn_types::{
    CairnError, ContentBlock, CreateMessageRequest, Message, ModelClient, Role, StopReason,
    ToolCall, ToolContext, ToolOutput, Usage, truncate_for_display,
};
use futures_util::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;

/// Default cap on model round-trips per run.
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Bytes of tool output shown in [`AgentEvent::ToolEnd`].
const DISPLAY_OUTPUT_LEN: usize = 200;

/// Events emitted by the agent during execution.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Text from an assistant reply.
    Text(String),
    /// A tool is about to be executed.
    ToolStart {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// A tool has finished executing. `output` is truncated for display.
    ToolEnd {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },
    /// A non-fatal condition ended or degraded the run.
    Warning(String),
    /// Accumulated usage for the run so far.
    Usage(Usage),
    /// The loop finished.
    Done(RunOutcome),
    /// The model call failed; the run ends with an error.
    Error(String),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The model ended its turn.
    Completed,
    /// The model hit its output token limit; partial content is kept.
    LengthLimit,
    /// The iteration cap was reached while the model still wanted tools.
    IterationLimit,
}

/// Result of a successful [`Agent::run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// Number of model calls made.
    pub iterations: usize,
    pub usage: Usage,
}

/// Counts model calls against a hard cap.
#[derive(Debug, Clone, Copy)]
pub struct IterationBudget {
    cap: usize,
    used: usize,
}

impl IterationBudget {
    pub fn new(cap: usize) -> Self {
        Self { cap, used: 0 }
    }

    /// Take one iteration. Returns false once the cap is spent.
    pub fn try_take(&mut self) -> bool {
        if self.used >= self.cap {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

/// Where the loop is between model calls.
enum LoopState {
    AwaitingModel,
    AwaitingTools(Vec<ToolCall>),
    Done(RunOutcome),
}

/// Drives the conversation with the model and executes the tools it asks for.
pub struct Agent {
    client: Arc<dyn ModelClient>,
    registry: Arc<ToolRegistry>,
    hooks: Arc<dyn HookDispatcher>,
    session: Option<Arc<dyn SessionStore>>,
    model: String,
    max_tokens: u32,
    system_prompt: Option<String>,
    max_iterations: usize,
    cwd: PathBuf,
}

impl Agent {
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
        max_tokens: u32,
        cwd: PathBuf,
    ) -> Self {
        Self {
            client,
            registry,
            hooks: Arc::new(NoopHooks),
            session: None,
            model: model.into(),
            max_tokens,
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            cwd,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HookDispatcher>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session = Some(store);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Cap on model calls per run. Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Append `prompt` as a user message and run the loop until the model
    /// stops asking for tools, the length limit is hit, or the iteration cap
    /// is spent.
    ///
    /// The callback receives [`AgentEvent`]s as they occur. A model failure
    /// emits [`AgentEvent::Error`] and returns `Err`; the transcript keeps
    /// everything appended before the failure.
    pub async fn run<F>(
        &self,
        messages: &mut Vec<Message>,
        prompt: impl Into<String>,
        mut on_event: F,
    ) -> Result<RunSummary, CairnError>
    where
        F: FnMut(AgentEvent),
    {
        self.append(messages, Message::user_text(prompt));

        let mut budget = IterationBudget::new(self.max_iterations);
        let mut usage = Usage::default();
        let result = self
            .drive(messages, &mut budget, &mut usage, &mut on_event)
            .await;

        if let Some(store) = &self.session {
            if let Err(e) = store.persist().await {
                tracing::warn!("Failed to persist session: {e}");
            }
        }

        let outcome = result?;
        on_event(AgentEvent::Usage(usage.clone()));
        on_event(AgentEvent::Done(outcome));
        Ok(RunSummary {
            outcome,
            iterations: budget.used(),
            usage,
        })
    }

    async fn drive<F>(
        &self,
        messages: &mut Vec<Message>,
        budget: &mut IterationBudget,
        usage: &mut Usage,
        on_event: &mut F,
    ) -> Result<RunOutcome, CairnError>
    where
        F: FnMut(AgentEvent),
    {
        let mut state = LoopState::AwaitingModel;
        loop {
            state = match state {
                LoopState::Done(outcome) => return Ok(outcome),
                LoopState::AwaitingModel => {
                    if !budget.try_take() {
                        let msg = format!(
                            "Stopped after {} iterations (iteration limit reached)",
                            budget.cap()
                        );
                        tracing::warn!("{msg}");
                        on_event(AgentEvent::Warning(msg));
                        LoopState::Done(RunOutcome::IterationLimit)
                    } else {
                        self.call_model(messages, usage, on_event).await?
                    }
                }
                LoopState::AwaitingTools(calls) => {
                    let results = self.execute_tools(&calls, on_event).await;
                    self.append(
                        messages,
                        Message {
                            role: Role::User,
                            content: results,
                        },
                    );
                    LoopState::AwaitingModel
                }
            };
        }
    }

    /// One model round-trip: send the transcript, append the reply, decide
    /// what happens next from the stop reason.
    async fn call_model<F>(
        &self,
        messages: &mut Vec<Message>,
        usage: &mut Usage,
        on_event: &mut F,
    ) -> Result<LoopState, CairnError>
    where
        F: FnMut(AgentEvent),
    {
        let mut request = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: std::mem::take(messages),
            system: self.system_prompt.clone(),
            tools: self.registry.definitions(),
        };

        tracing::debug!(
            "Calling {} with {} messages and {} tools",
            self.client.name(),
            request.messages.len(),
            request.tools.len()
        );
        let result = self.client.create_message(&request).await;

        // Restore the transcript without cloning it
        *messages = std::mem::take(&mut request.messages);

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Model call failed: {e}");
                on_event(AgentEvent::Error(e.to_string()));
                return Err(e.into());
            }
        };
        usage.add(&response.usage);

        let (content, unknown): (Vec<_>, Vec<_>) = response
            .content
            .into_iter()
            .partition(|block| !matches!(block, ContentBlock::Unknown));
        if !unknown.is_empty() {
            tracing::debug!("Dropped {} unrecognised content blocks", unknown.len());
        }

        let reply = Message {
            role: Role::Assistant,
            content,
        };
        let text = reply.text();
        if !text.is_empty() {
            on_event(AgentEvent::Text(text));
        }
        let calls = reply.tool_calls();
        self.append(messages, reply);

        let outcome = match response.stop_reason {
            Some(StopReason::ToolUse) if !calls.is_empty() => {
                return Ok(LoopState::AwaitingTools(calls));
            }
            Some(StopReason::ToolUse) => {
                on_event(AgentEvent::Warning(
                    "Model requested tool use but sent no tool calls".into(),
                ));
                RunOutcome::Completed
            }
            Some(StopReason::MaxTokens) => {
                on_event(AgentEvent::Warning(
                    "Response truncated: max_tokens reached".into(),
                ));
                RunOutcome::LengthLimit
            }
            Some(StopReason::Unknown) => {
                on_event(AgentEvent::Warning(
                    "Model stopped for an unrecognised reason".into(),
                ));
                RunOutcome::Completed
            }
            Some(StopReason::EndTurn) | Some(StopReason::StopSequence) | None => {
                RunOutcome::Completed
            }
        };

        if !calls.is_empty() {
            self.decline_calls(messages, &calls, outcome);
        }
        Ok(LoopState::Done(outcome))
    }

    /// Answer tool calls the loop is not going to run, so the transcript
    /// never carries an unanswered invocation into a later model call.
    fn decline_calls(&self, messages: &mut Vec<Message>, calls: &[ToolCall], outcome: RunOutcome) {
        let reason = match outcome {
            RunOutcome::LengthLimit => "not executed: response truncated",
            _ => "not executed: model ended its turn",
        };
        tracing::warn!("Declining {} tool calls ({reason})", calls.len());
        let results = calls
            .iter()
            .map(|call| ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content: reason.to_string(),
                is_error: true,
            })
            .collect();
        self.append(
            messages,
            Message {
                role: Role::User,
                content: results,
            },
        );
    }

    /// Run every call concurrently and return one result block per call, in
    /// call order.
    async fn execute_tools<F>(&self, calls: &[ToolCall], on_event: &mut F) -> Vec<ContentBlock>
    where
        F: FnMut(AgentEvent),
    {
        for call in calls {
            on_event(AgentEvent::ToolStart {
                id: call.id.clone(),
                name: call.name.clone(),
                input: call.input.clone(),
            });
        }

        let ctx = ToolContext {
            cwd: self.cwd.clone(),
        };
        let outputs = join_all(calls.iter().map(|call| self.execute_tool(call, ctx.clone()))).await;

        calls
            .iter()
            .zip(outputs)
            .map(|(call, output)| {
                on_event(AgentEvent::ToolEnd {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    output: truncate_for_display(&output.content, DISPLAY_OUTPUT_LEN),
                    is_error: output.is_error,
                });
                ContentBlock::ToolResult {
                    tool_use_id: call.id.clone(),
                    content: output.content,
                    is_error: output.is_error,
                }
            })
            .collect()
    }

    async fn execute_tool(&self, call: &ToolCall, ctx: ToolContext) -> ToolOutput {
        let before = HookPayload::before_tool(&call.name, call.input.clone());
        if let Err(e) = self.hooks.trigger(HookEvent::BeforeTool, &before).await {
            tracing::warn!("before_tool hook failed for '{}': {e}", call.name);
        }

        let output = self
            .registry
            .execute(&call.name, call.input.clone(), ctx)
            .await;

        let after = HookPayload::after_tool(
            &call.name,
            call.input.clone(),
            &output.content,
            output.is_error,
        );
        if let Err(e) = self.hooks.trigger(HookEvent::AfterTool, &after).await {
            tracing::warn!("after_tool hook failed for '{}': {e}", call.name);
        }

        output
    }

    /// Push onto the transcript and forward to the session store.
    fn append(&self, messages: &mut Vec<Message>, message: Message) {
        if let Some(store) = &self.session {
            if let Err(e) = store.append(&message) {
                tracing::warn!("Failed to record message in session: {e}");
            }
        }
        messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_stops_at_cap() {
        let mut budget = IterationBudget::new(2);
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(!budget.try_take());
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn zero_budget_allows_nothing() {
        let mut budget = IterationBudget::new(0);
        assert!(!budget.try_take());
        assert_eq!(budget.used(), 0);
    }
}
