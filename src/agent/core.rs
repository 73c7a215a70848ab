//! Agent execution loop
//!
//! This module drives one run from goal to final answer:
//! - seeds the conversation with operating instructions and the goal
//! - alternates model turns and tool turns through [`LoopState::transition`]
//! - enforces the step budget
//! - reports every step to the observers and writes the audit record

use crate::agent::audit::{AuditSink, RunRecord};
use crate::agent::conversation::ConversationState;
use crate::agent::observer::{ObserverSet, RunEvent, RunObserver};
use crate::agent::state::{AbortReason, LoopInput, LoopState, RunStatus, StepBudget};
use crate::config::{AgentConfig, ObjectStoreConfig};
use crate::error::{Result, StratumError};
use crate::prompts::pipeline_prompt;
use crate::providers::{CompletionResponse, Message, Provider, ToolCall};
use crate::tools::{ToolInvocationResult, ToolRegistry, ToolResult};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Result of a finished run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Run identifier (UUID v4)
    pub run_id: String,
    /// Terminal status
    pub status: RunStatus,
    /// Final answer when the run is done
    pub final_answer: Option<String>,
    /// Full conversation in order
    pub transcript: Vec<Message>,
    /// Model turns taken
    pub steps: usize,
    /// Why the run stopped early
    pub abort_reason: Option<AbortReason>,
    /// Set when the audit record could not be written
    pub audit_error: Option<String>,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl RunOutcome {
    /// Number of tool calls the model requested during the run
    pub fn tool_call_count(&self) -> usize {
        self.transcript.iter().map(|m| m.tool_calls.len()).sum()
    }
}

/// The pipeline agent
///
/// The agent is immutable once built. Each call to [`Agent::run`] owns its
/// conversation, so one agent may serve several runs concurrently.
///
/// # Examples
///
/// ```ignore
/// use stratum::agent::Agent;
/// use stratum::config::AgentConfig;
/// use stratum::tools::ToolRegistry;
///
/// # async fn example() -> stratum::error::Result<()> {
/// # let provider = unimplemented!();
/// let agent = Agent::new(provider, ToolRegistry::new(), AgentConfig::default())?;
/// let outcome = agent.run_with_default_budget("Load every CSV in the demos bucket").await?;
/// println!("{:?}: {:?}", outcome.status, outcome.final_answer);
/// # Ok(())
/// # }
/// ```
pub struct Agent {
    provider: Arc<dyn Provider>,
    tools: ToolRegistry,
    observers: ObserverSet,
    audit: Option<Arc<dyn AuditSink>>,
    system_prompt: String,
    config: AgentConfig,
}

impl Agent {
    /// Creates a new agent
    ///
    /// The agent starts with the built-in operating instructions, no
    /// observers and no audit sink.
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Config` if `max_steps` is zero
    pub fn new(
        provider: impl Provider + 'static,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Result<Self> {
        Self::from_arc(Arc::new(provider), tools, config)
    }

    /// Creates a new agent from a boxed provider
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Config` if `max_steps` is zero
    pub fn new_boxed(
        provider: Box<dyn Provider>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Result<Self> {
        Self::from_arc(Arc::from(provider), tools, config)
    }

    fn from_arc(
        provider: Arc<dyn Provider>,
        tools: ToolRegistry,
        config: AgentConfig,
    ) -> Result<Self> {
        if config.max_steps == 0 {
            return Err(
                StratumError::Config("max_steps must be greater than 0".to_string()).into(),
            );
        }

        Ok(Self {
            provider,
            tools,
            observers: ObserverSet::new(),
            audit: None,
            system_prompt: pipeline_prompt::generate_pipeline_prompt(
                &ObjectStoreConfig::default().bucket,
            ),
            config,
        })
    }

    /// Adds an observer after the ones already registered
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sets the sink receiving one record per finished run
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Replaces the operating instructions sent as the system message
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// The tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// The operating instructions
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Runs a goal with the configured `max_steps` budget
    ///
    /// # Errors
    ///
    /// See [`Agent::run`]
    pub async fn run_with_default_budget(&self, goal: impl Into<String>) -> Result<RunOutcome> {
        self.run(goal, self.config.max_steps).await
    }

    /// Runs a goal with at most `step_budget` model turns
    ///
    /// Running out of budget is not an error: the outcome is returned with
    /// `RunStatus::Aborted`. Tool failures are handed back to the model and
    /// never end the run.
    ///
    /// # Errors
    ///
    /// Returns `StratumError::AgentExecution` when a model call fails or the
    /// loop cannot continue. The run is audited before the error is returned,
    /// and a failed audit write is carried in the error's `audit_error`.
    pub async fn run(&self, goal: impl Into<String>, step_budget: usize) -> Result<RunOutcome> {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.drive(run_id, goal.into(), step_budget)
            .instrument(span)
            .await
    }

    async fn drive(&self, run_id: String, goal: String, step_budget: usize) -> Result<RunOutcome> {
        let started = Instant::now();
        let definitions = self.tools.definitions();
        let mut steps = StepBudget::new(step_budget);
        let mut conversation = ConversationState::new(run_id.clone());
        let mut state = LoopState::Init;

        info!(step_budget, tools = definitions.len(), "Starting run");
        self.observers.notify(
            &run_id,
            &RunEvent::RunStarted {
                goal: &goal,
                step_budget,
            },
        );

        while !state.is_terminal() {
            let input = match &mut state {
                LoopState::Init => conversation
                    .append(Message::system(self.system_prompt.clone()))
                    .and_then(|()| conversation.append(Message::user(goal.clone())))
                    .map(|()| LoopInput::Seeded),
                LoopState::AwaitingModel => {
                    if steps.begin_step() {
                        Ok(self
                            .ask_model(&mut conversation, &definitions, steps.used())
                            .await)
                    } else {
                        warn!(budget = steps.budget(), "Step budget exhausted");
                        Ok(LoopInput::BudgetExhausted {
                            budget: steps.budget(),
                        })
                    }
                }
                LoopState::AwaitingTools(queue) => {
                    debug!("Dispatching {} tool calls", queue.len());
                    let mut drained = Ok(LoopInput::ToolsDrained);
                    while let Some(call) = queue.pop_front() {
                        let message = self.invoke_tool(&run_id, &call).await;
                        if let Err(e) = conversation.append(message) {
                            drained = Err(e);
                            break;
                        }
                    }
                    drained
                }
                LoopState::Done(_) | LoopState::Aborted(_) => break,
            };
            let from = state.name();
            state = advance(state, input);
            debug!(from, to = state.name(), "Loop transition");
        }

        let (status, final_answer, abort_reason) = match state {
            LoopState::Done(answer) => (RunStatus::Done, Some(answer), None),
            LoopState::Aborted(reason) => (RunStatus::Aborted, None, Some(reason)),
            other => {
                return Err(StratumError::AgentExecution {
                    run_id,
                    message: format!("run ended in non-terminal state {}", other.name()),
                    audit_error: None,
                }
                .into())
            }
        };

        let transcript = conversation.into_messages();
        let audit_error = self
            .write_audit(RunRecord {
                run_id: run_id.clone(),
                timestamp: Utc::now(),
                goal,
                status,
                final_answer: final_answer.clone(),
                steps: steps.used(),
                abort_reason: abort_reason.clone(),
                messages: transcript.clone(),
            })
            .await;

        let elapsed = started.elapsed();
        self.observers.notify(
            &run_id,
            &RunEvent::RunFinished {
                status,
                final_answer: final_answer.as_deref(),
                abort_reason: abort_reason.as_ref(),
                steps: steps.used(),
                elapsed,
            },
        );
        info!(
            status = %status,
            steps = steps.used(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Run finished"
        );

        if let Some(
            AbortReason::ModelFailure { message } | AbortReason::LoopFailure { message },
        ) = &abort_reason
        {
            return Err(StratumError::AgentExecution {
                run_id,
                message: message.clone(),
                audit_error,
            }
            .into());
        }

        Ok(RunOutcome {
            run_id,
            status,
            final_answer,
            transcript,
            steps: steps.used(),
            abort_reason,
            audit_error,
            elapsed,
        })
    }

    /// Sends the conversation to the model and appends its answer
    async fn ask_model(
        &self,
        conversation: &mut ConversationState,
        definitions: &[Value],
        step: usize,
    ) -> LoopInput {
        let run_id = conversation.run_id().to_string();
        debug!(
            step,
            max_steps = self.config.max_steps,
            estimated_tokens = conversation.estimated_tokens(),
            "Calling model {}",
            self.provider.model_name()
        );
        self.observers.notify(
            &run_id,
            &RunEvent::ModelCallStarted {
                step,
                messages: conversation.messages(),
            },
        );

        let started = Instant::now();
        let response = self
            .provider
            .complete(conversation.messages(), definitions)
            .await;
        let elapsed = started.elapsed();

        let CompletionResponse { message, usage } = match response {
            Ok(response) => response,
            Err(e) => return self.model_failed(&run_id, step, format!("{:#}", e), elapsed),
        };

        if !message.has_tool_calls() && message.content.trim().is_empty() {
            return self.model_failed(
                &run_id,
                step,
                "model returned neither content nor tool calls".to_string(),
                elapsed,
            );
        }

        if let Err(e) = conversation.append(message.clone()) {
            return self.model_failed(&run_id, step, e.to_string(), elapsed);
        }

        self.observers.notify(
            &run_id,
            &RunEvent::ModelCallFinished {
                step,
                response: &message,
                usage,
                elapsed,
            },
        );
        LoopInput::ModelResponded(message)
    }

    fn model_failed(&self, run_id: &str, step: usize, error: String, elapsed: Duration) -> LoopInput {
        warn!(step, "Model call failed: {}", error);
        self.observers.notify(
            run_id,
            &RunEvent::ModelCallFailed {
                step,
                error: &error,
                elapsed,
            },
        );
        LoopInput::ModelFailed(error)
    }

    /// Dispatches one call and wraps the result as a tool message
    async fn invoke_tool(&self, run_id: &str, call: &ToolCall) -> Message {
        self.observers
            .notify(run_id, &RunEvent::ToolCallStarted { call });

        let started = Instant::now();
        let result = match self.tools.dispatch(&call.name, &call.arguments_value()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, "Tool call rejected: {}", e);
                ToolResult::error(e.to_string())
            }
        };
        let elapsed = started.elapsed();

        self.observers.notify(
            run_id,
            &RunEvent::ToolCallFinished {
                call,
                result: &result,
                elapsed,
            },
        );

        ToolInvocationResult {
            tool_call_id: call.id.clone(),
            result,
        }
        .to_message()
    }

    /// Writes the run record, returning a description of any failure
    async fn write_audit(&self, record: RunRecord) -> Option<String> {
        let sink = Arc::clone(self.audit.as_ref()?);
        let outcome = tokio::task::spawn_blocking(move || sink.record(&record)).await;
        let error = match outcome {
            Ok(Ok(())) => return None,
            Ok(Err(e)) => e.to_string(),
            Err(join_error) => format!("audit task failed: {}", join_error),
        };
        warn!("Failed to write audit record: {}", error);
        Some(error)
    }
}

/// Applies `input` to `state`; a failed step or a rejected transition
/// aborts the run so it still reaches the audit trail
fn advance(state: LoopState, input: Result<LoopInput>) -> LoopState {
    match input.and_then(|input| state.transition(input)) {
        Ok(next) => next,
        Err(e) => {
            error!("Agent loop failed: {:#}", e);
            LoopState::Aborted(AbortReason::LoopFailure {
                message: format!("{:#}", e),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::providers::Role;
    use crate::test_utils::{FailingAuditSink, RecordingObserver, ScriptedProvider};
    use crate::tools::{ParamType, ParameterSpec, ToolDescriptor, ToolExecutor};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolExecutor for EchoTool {
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success(args["text"].as_str().unwrap_or_default()))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl ToolExecutor for BrokenTool {
        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Err(StratumError::Statement("no such column: amount".to_string()).into())
        }
    }

    fn registry() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools
            .register(
                ToolDescriptor::new(
                    "echo",
                    "Echo text",
                    vec![ParameterSpec::required("text", ParamType::String, "Text")],
                ),
                Arc::new(EchoTool),
            )
            .unwrap();
        tools
            .register(
                ToolDescriptor::new("broken", "Always fails", vec![]),
                Arc::new(BrokenTool),
            )
            .unwrap();
        tools
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall::new(id, name, args)
    }

    #[test]
    fn test_new_rejects_zero_steps() {
        let config = AgentConfig {
            max_steps: 0,
            ..AgentConfig::default()
        };
        assert!(Agent::new(ScriptedProvider::new(vec![]), registry(), config).is_err());
    }

    #[tokio::test]
    async fn test_direct_answer() {
        let provider = ScriptedProvider::new(vec![Message::assistant("nothing to do")]);
        let agent = Agent::new(provider, registry(), AgentConfig::default())
            .unwrap()
            .with_system_prompt("be brief");

        let outcome = agent.run("say hi", 3).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.final_answer.as_deref(), Some("nothing to do"));
        assert_eq!(outcome.steps, 1);
        assert_eq!(outcome.transcript[0].content, "be brief");
        assert_eq!(outcome.transcript.len(), 3);
        assert!(outcome.audit_error.is_none());
    }

    #[tokio::test]
    async fn test_tool_results_follow_emission_order() {
        let provider = ScriptedProvider::new(vec![
            Message::assistant_with_tools(vec![
                call("a", "echo", json!({"text": "first"})),
                call("b", "broken", json!({})),
                call("c", "missing", json!({})),
                call("d", "echo", json!({"text": 5})),
            ]),
            Message::assistant("done"),
        ]);
        let agent = Agent::new(provider, registry(), AgentConfig::default()).unwrap();
        let outcome = agent.run("go", 5).await.unwrap();

        assert_eq!(outcome.status, RunStatus::Done);
        assert_eq!(outcome.steps, 2);
        assert_eq!(outcome.tool_call_count(), 4);

        let tool_messages: Vec<_> = outcome
            .transcript
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        let ids: Vec<_> = tool_messages
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(tool_messages[0].content, "first");
        assert!(tool_messages[1].content.contains("no such column: amount"));
        assert!(tool_messages[2].content.contains("Unknown tool: missing"));
        assert!(tool_messages[3].content.contains("text: expected string"));
    }

    #[tokio::test]
    async fn test_budget_exhaustion_aborts() {
        let provider = ScriptedProvider::new(
            ["c1", "c2", "c3"]
                .iter()
                .map(|id| {
                    Message::assistant_with_tools(vec![call(id, "echo", json!({"text": "x"}))])
                })
                .collect(),
        );
        let agent = Agent::new(provider.clone(), registry(), AgentConfig::default()).unwrap();

        let outcome = agent.run("never ends", 2).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Aborted);
        assert_eq!(outcome.steps, 2);
        assert_eq!(provider.calls(), 2);
        assert!(outcome.final_answer.is_none());
        assert_eq!(
            outcome.abort_reason,
            Some(AbortReason::StepBudgetExhausted { budget: 2 })
        );
    }

    #[tokio::test]
    async fn test_model_failure_is_an_error() {
        let provider = ScriptedProvider::new(vec![]);
        let agent = Agent::new(provider, registry(), AgentConfig::default()).unwrap();

        let err = agent.run("anything", 3).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StratumError>(),
            Some(StratumError::AgentExecution { .. })
        ));
    }

    #[tokio::test]
    async fn test_model_failure_carries_audit_failure() {
        let agent = Agent::new(ScriptedProvider::new(vec![]), registry(), AgentConfig::default())
            .unwrap()
            .with_audit_sink(Arc::new(FailingAuditSink));

        let err = agent.run("anything", 3).await.unwrap_err();
        match err.downcast_ref::<StratumError>() {
            Some(StratumError::AgentExecution {
                message,
                audit_error,
                ..
            }) => {
                assert!(message.contains("script exhausted"));
                assert!(audit_error.as_deref().unwrap().contains("disk full"));
            }
            other => panic!("expected AgentExecution, got {:?}", other),
        }
        assert!(err.to_string().contains("audit write failed: disk full"));
    }

    #[test]
    fn test_advance_aborts_on_failed_step() {
        let state = advance(
            LoopState::AwaitingTools(Default::default()),
            Err(StratumError::Conversation("unresolved tool call c1".to_string()).into()),
        );
        match state {
            LoopState::Aborted(AbortReason::LoopFailure { message }) => {
                assert!(message.contains("unresolved tool call c1"));
            }
            other => panic!("expected loop failure, got {:?}", other),
        }
    }

    #[test]
    fn test_advance_aborts_on_rejected_transition() {
        let state = advance(LoopState::Init, Ok(LoopInput::ToolsDrained));
        assert!(matches!(
            state,
            LoopState::Aborted(AbortReason::LoopFailure { .. })
        ));
        assert_eq!(advance(LoopState::Init, Ok(LoopInput::Seeded)), LoopState::AwaitingModel);
    }

    #[tokio::test]
    async fn test_empty_response_is_model_failure() {
        let provider = ScriptedProvider::new(vec![Message::assistant("   ")]);
        let agent = Agent::new(provider, registry(), AgentConfig::default()).unwrap();

        let err = agent.run("anything", 3).await.unwrap_err();
        assert!(err.to_string().contains("neither content nor tool calls"));
    }

    #[tokio::test]
    async fn test_observers_see_each_step() {
        let observer = Arc::new(RecordingObserver::default());
        let provider = ScriptedProvider::new(vec![
            Message::assistant_with_tools(vec![call("a", "echo", json!({"text": "hi"}))]),
            Message::assistant("done"),
        ]);
        let agent = Agent::new(provider, registry(), AgentConfig::default())
            .unwrap()
            .with_observer(observer.clone());

        agent.run("go", 5).await.unwrap();
        assert_eq!(
            observer.events(),
            vec![
                "run_started",
                "model_call_started",
                "model_call_finished",
                "tool_call_started",
                "tool_call_finished",
                "model_call_started",
                "model_call_finished",
                "run_finished"
            ]
        );
    }

    #[tokio::test]
    async fn test_audit_failure_is_reported_not_fatal() {
        let provider = ScriptedProvider::new(vec![Message::assistant("done")]);
        let agent = Agent::new(provider, registry(), AgentConfig::default())
            .unwrap()
            .with_audit_sink(Arc::new(FailingAuditSink));

        let outcome = agent.run("go", 1).await.unwrap();
        assert_eq!(outcome.status, RunStatus::Done);
        assert!(outcome.audit_error.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn test_duplicate_call_ids_are_model_failure() {
        let provider = ScriptedProvider::new(vec![Message::assistant_with_tools(vec![
            call("a", "echo", json!({"text": "1"})),
            call("a", "echo", json!({"text": "2"})),
        ])]);
        let agent = Agent::new(provider, registry(), AgentConfig::default()).unwrap();

        let err = agent.run("go", 2).await.unwrap_err();
        assert!(err.to_string().contains("duplicate tool call id"));
    }
}
