//! Run observers
//!
//! The agent loop reports every transition as a [`RunEvent`]. Observers are
//! invoked synchronously in registration order; a failing or panicking
//! observer is logged and skipped, and never affects the run.

use crate::agent::state::{AbortReason, RunStatus};
use crate::error::{panic_message, Result};
use crate::providers::{Message, TokenUsage, ToolCall};
use crate::tools::ToolResult;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// Something that happened during a run
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    /// A run began
    RunStarted {
        /// Goal given by the caller
        goal: &'a str,
        /// Step budget for the run
        step_budget: usize,
    },
    /// The model is about to be called
    ModelCallStarted {
        /// 1-based model turn
        step: usize,
        /// Conversation sent to the model
        messages: &'a [Message],
    },
    /// The model answered
    ModelCallFinished {
        /// 1-based model turn
        step: usize,
        /// The assistant message
        response: &'a Message,
        /// Token usage, when the provider reports it
        usage: Option<TokenUsage>,
        /// Wall time of the call
        elapsed: Duration,
    },
    /// The model call failed or returned an unusable response
    ModelCallFailed {
        /// 1-based model turn
        step: usize,
        /// Failure description
        error: &'a str,
        /// Wall time of the call
        elapsed: Duration,
    },
    /// A tool call is about to be dispatched
    ToolCallStarted {
        /// The requested call
        call: &'a ToolCall,
    },
    /// A tool call produced a result (possibly a captured failure)
    ToolCallFinished {
        /// The requested call
        call: &'a ToolCall,
        /// Output or captured failure
        result: &'a ToolResult,
        /// Wall time of the dispatch
        elapsed: Duration,
    },
    /// The run reached a terminal state
    RunFinished {
        /// Terminal status
        status: RunStatus,
        /// Final answer when the run is done
        final_answer: Option<&'a str>,
        /// Why the run stopped early
        abort_reason: Option<&'a AbortReason>,
        /// Model turns taken
        steps: usize,
        /// Wall time of the run
        elapsed: Duration,
    },
}

impl RunEvent<'_> {
    /// Short event label
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::ModelCallStarted { .. } => "model_call_started",
            Self::ModelCallFinished { .. } => "model_call_finished",
            Self::ModelCallFailed { .. } => "model_call_failed",
            Self::ToolCallStarted { .. } => "tool_call_started",
            Self::ToolCallFinished { .. } => "tool_call_finished",
            Self::RunFinished { .. } => "run_finished",
        }
    }
}

/// Listener for run events
///
/// # Examples
///
/// ```
/// use stratum::agent::{RunEvent, RunObserver};
/// use stratum::error::Result;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// #[derive(Default)]
/// struct ToolCounter(AtomicUsize);
///
/// impl RunObserver for ToolCounter {
///     fn name(&self) -> &str {
///         "tool_counter"
///     }
///
///     fn on_event(&self, _run_id: &str, event: &RunEvent<'_>) -> Result<()> {
///         if let RunEvent::ToolCallFinished { .. } = event {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait RunObserver: Send + Sync {
    /// Name used when reporting observer failures
    fn name(&self) -> &str;

    /// Handles one event
    ///
    /// # Errors
    ///
    /// Errors are logged by the agent and otherwise ignored
    fn on_event(&self, run_id: &str, event: &RunEvent<'_>) -> Result<()>;
}

/// Ordered list of observers that isolates their failures
#[derive(Clone, Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn RunObserver>>,
}

impl ObserverSet {
    /// Creates an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an observer after the existing ones
    pub fn push(&mut self, observer: Arc<dyn RunObserver>) {
        self.observers.push(observer);
    }

    /// Number of observers
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// True when no observer is registered
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Delivers an event to every observer in order
    pub fn notify(&self, run_id: &str, event: &RunEvent<'_>) {
        for observer in &self.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(run_id, event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(
                    observer = observer.name(),
                    event = event.name(),
                    "Observer failed: {}",
                    e
                ),
                Err(payload) => tracing::warn!(
                    observer = observer.name(),
                    event = event.name(),
                    "Observer panicked: {}",
                    panic_message(payload.as_ref())
                ),
            }
        }
    }
}

/// Writes one structured log line per step
///
/// Model turns are logged with the tool calls they request or the answer they
/// give, and tool turns with their outcome.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates the observer
    pub fn new() -> Self {
        Self
    }
}

const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

impl RunObserver for TracingObserver {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_event(&self, run_id: &str, event: &RunEvent<'_>) -> Result<()> {
        match event {
            RunEvent::RunStarted { goal, step_budget } => {
                tracing::info!(run_id, step_budget, "Starting run: \"{}\"", goal);
            }
            RunEvent::ModelCallStarted { step, messages } => {
                tracing::debug!(run_id, step, messages = messages.len(), "Calling model");
            }
            RunEvent::ModelCallFinished {
                step,
                response,
                usage,
                elapsed,
            } => {
                let tokens = usage.map(|u| u.total_tokens).unwrap_or(0);
                if response.has_tool_calls() {
                    for call in &response.tool_calls {
                        tracing::info!(
                            run_id,
                            step,
                            elapsed_ms = elapsed.as_millis() as u64,
                            tokens,
                            "Model: tool call to '{}' with args {}",
                            call.name,
                            call.arguments_value()
                        );
                    }
                } else {
                    tracing::info!(
                        run_id,
                        step,
                        elapsed_ms = elapsed.as_millis() as u64,
                        tokens,
                        "Model: response \"{}\"",
                        preview(&response.content)
                    );
                }
            }
            RunEvent::ModelCallFailed {
                step,
                error,
                elapsed,
            } => {
                tracing::error!(
                    run_id,
                    step,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Model call failed: {}",
                    error
                );
            }
            RunEvent::ToolCallStarted { call } => {
                tracing::debug!(run_id, tool = %call.name, call_id = %call.id, "Dispatching tool");
            }
            RunEvent::ToolCallFinished {
                call,
                result,
                elapsed,
            } => {
                let elapsed_ms = elapsed.as_millis() as u64;
                if result.success {
                    tracing::info!(
                        run_id,
                        tool = %call.name,
                        elapsed_ms,
                        truncated = result.truncated,
                        "Tool '{}' result: {}",
                        call.name,
                        preview(&result.output)
                    );
                } else {
                    tracing::warn!(
                        run_id,
                        tool = %call.name,
                        elapsed_ms,
                        "Tool '{}' failed: {}",
                        call.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            RunEvent::RunFinished {
                status,
                final_answer,
                abort_reason,
                steps,
                elapsed,
            } => match (final_answer, abort_reason) {
                (Some(answer), _) => tracing::info!(
                    run_id,
                    status = %status,
                    steps,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Run complete: \"{}\"",
                    preview(answer)
                ),
                (None, reason) => tracing::warn!(
                    run_id,
                    status = %status,
                    steps,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Run aborted: {}",
                    reason.map(|r| r.to_string()).unwrap_or_default()
                ),
            },
        }
        Ok(())
    }
}
