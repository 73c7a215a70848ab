//! Agent module for Stratum
//!
//! This module contains the pipeline agent: the loop state machine, the
//! per-run conversation, run observers, metrics and the audit trail.

pub mod audit;
pub mod conversation;
pub mod core;
pub mod metrics;
pub mod observer;
pub mod state;

pub use audit::{AuditSink, JsonlAuditSink, RunRecord};
pub use conversation::ConversationState;
pub use core::{Agent, RunOutcome};
pub use metrics::MetricsObserver;
pub use observer::{ObserverSet, RunEvent, RunObserver, TracingObserver};
pub use state::{AbortReason, LoopInput, LoopState, RunStatus, StepBudget};
