//! Agent loop state machine
//!
//! A run moves through `Init -> AwaitingModel -> (AwaitingTools ->
//! AwaitingModel)* -> Done | Aborted`. The loop computes an input for the
//! current state and hands it to [`LoopState::transition`], which is the only
//! place states change.

use crate::error::{Result, StratumError};
use crate::providers::{Message, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Why a run stopped without a final answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// The model asked for another turn after the budget was spent
    StepBudgetExhausted {
        /// Configured number of model turns
        budget: usize,
    },
    /// The model call failed or returned an unusable response
    ModelFailure {
        /// Description of the failure
        message: String,
    },
    /// The loop itself could not continue, e.g. a rejected transition
    LoopFailure {
        /// Description of the failure
        message: String,
    },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepBudgetExhausted { budget } => {
                write!(f, "step budget of {} model turns exhausted", budget)
            }
            Self::ModelFailure { message } => write!(f, "model failure: {}", message),
            Self::LoopFailure { message } => write!(f, "loop failure: {}", message),
        }
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The model produced a final answer
    Done,
    /// The run stopped before a final answer
    Aborted,
}

impl RunStatus {
    /// Lowercase label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one run of the agent loop
#[derive(Debug, Clone, PartialEq)]
pub enum LoopState {
    /// Conversation not yet seeded
    Init,
    /// Next step asks the model
    AwaitingModel,
    /// Tool calls of the last model turn still to dispatch, in emission order
    AwaitingTools(VecDeque<ToolCall>),
    /// Final answer produced
    Done(String),
    /// Run stopped early
    Aborted(AbortReason),
}

/// Event that moves the loop from one state to the next
#[derive(Debug, Clone)]
pub enum LoopInput {
    /// System prompt and goal were appended
    Seeded,
    /// No budget left for another model turn
    BudgetExhausted {
        /// The budget that was spent
        budget: usize,
    },
    /// The model answered; the message is already in the conversation
    ModelResponded(Message),
    /// The model call failed
    ModelFailed(String),
    /// Every queued tool call has a result in the conversation
    ToolsDrained,
}

impl LoopInput {
    fn name(&self) -> &'static str {
        match self {
            Self::Seeded => "seeded",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::ModelResponded(_) => "model_responded",
            Self::ModelFailed(_) => "model_failed",
            Self::ToolsDrained => "tools_drained",
        }
    }
}

impl LoopState {
    /// Short state label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::AwaitingModel => "awaiting_model",
            Self::AwaitingTools(_) => "awaiting_tools",
            Self::Done(_) => "done",
            Self::Aborted(_) => "aborted",
        }
    }

    /// True for `Done` and `Aborted`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Aborted(_))
    }

    /// Applies one input and returns the next state
    ///
    /// A model response with tool calls always leads to `AwaitingTools`,
    /// even when it also carries text. A response with neither text nor
    /// tool calls counts as a model failure.
    ///
    /// # Errors
    ///
    /// Returns `StratumError::InvalidTransition` when the input is not valid
    /// for the current state, including any input to a terminal state
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::agent::state::{LoopInput, LoopState};
    /// use stratum::providers::Message;
    ///
    /// let state = LoopState::Init.transition(LoopInput::Seeded).unwrap();
    /// assert_eq!(state, LoopState::AwaitingModel);
    ///
    /// let state = state
    ///     .transition(LoopInput::ModelResponded(Message::assistant("all loaded")))
    ///     .unwrap();
    /// assert_eq!(state, LoopState::Done("all loaded".to_string()));
    /// ```
    pub fn transition(self, input: LoopInput) -> Result<LoopState> {
        let next = match (self, input) {
            (Self::Init, LoopInput::Seeded) => Self::AwaitingModel,
            (Self::AwaitingModel, LoopInput::BudgetExhausted { budget }) => {
                Self::Aborted(AbortReason::StepBudgetExhausted { budget })
            }
            (Self::AwaitingModel, LoopInput::ModelFailed(message)) => {
                Self::Aborted(AbortReason::ModelFailure { message })
            }
            (Self::AwaitingModel, LoopInput::ModelResponded(message)) => {
                if message.has_tool_calls() {
                    Self::AwaitingTools(message.tool_calls.into_iter().collect())
                } else if !message.content.trim().is_empty() {
                    Self::Done(message.content)
                } else {
                    Self::Aborted(AbortReason::ModelFailure {
                        message: "model returned neither content nor tool calls".to_string(),
                    })
                }
            }
            (Self::AwaitingTools(queue), LoopInput::ToolsDrained) if queue.is_empty() => {
                Self::AwaitingModel
            }
            (state, input) => {
                return Err(StratumError::InvalidTransition {
                    state: state.name(),
                    input: input.name(),
                }
                .into())
            }
        };
        Ok(next)
    }
}

/// Counts model turns against a fixed budget
#[derive(Debug, Clone, Copy)]
pub struct StepBudget {
    budget: usize,
    used: usize,
}

impl StepBudget {
    /// Create a counter allowing `budget` model turns
    pub fn new(budget: usize) -> Self {
        Self { budget, used: 0 }
    }

    /// Claims the next step, returning false once the budget is spent
    ///
    /// # Examples
    ///
    /// ```
    /// use stratum::agent::state::StepBudget;
    ///
    /// let mut steps = StepBudget::new(2);
    /// assert!(steps.begin_step());
    /// assert!(steps.begin_step());
    /// assert!(!steps.begin_step());
    /// assert_eq!(steps.used(), 2);
    /// ```
    pub fn begin_step(&mut self) -> bool {
        if self.used >= self.budget {
            return false;
        }
        self.used += 1;
        true
    }

    /// Model turns taken so far
    pub fn used(&self) -> usize {
        self.used
    }

    /// Configured budget
    pub fn budget(&self) -> usize {
        self.budget
    }
}
