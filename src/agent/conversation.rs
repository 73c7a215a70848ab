//! Conversation state for a single run
//!
//! The conversation is the only memory a run has. It is append-only: every
//! message is checked against the tool-call correlation rules before it is
//! stored, and nothing is ever removed or rewritten.

use crate::error::{Result, StratumError};
use crate::providers::{Message, Role};
use std::collections::HashSet;

/// Ordered, append-only message log of one run
///
/// # Invariants
///
/// - a `tool` message answers one call of the closest preceding `assistant`
///   message, with only other `tool` messages in between
/// - each tool call is answered at most once
/// - no `system`, `user` or `assistant` message is appended while tool calls
///   of the last assistant message are unanswered
/// - only `assistant` messages carry tool calls
///
/// # Examples
///
/// ```
/// use stratum::agent::ConversationState;
/// use stratum::providers::{Message, ToolCall};
/// use serde_json::json;
///
/// let mut conversation = ConversationState::seeded("run-1", "instructions", "load demos").unwrap();
/// conversation
///     .append(Message::assistant_with_tools(vec![ToolCall::new("c1", "list_tables", json!({}))]))
///     .unwrap();
/// assert!(conversation.append(Message::user("hurry up")).is_err());
/// conversation.append(Message::tool_result("c1", "[]")).unwrap();
/// assert_eq!(conversation.len(), 4);
/// ```
#[derive(Debug, Clone)]
pub struct ConversationState {
    run_id: String,
    messages: Vec<Message>,
}

impl ConversationState {
    /// Creates an empty conversation for a run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            messages: Vec::new(),
        }
    }

    /// Creates a conversation holding the system prompt and the goal
    ///
    /// # Errors
    ///
    /// Never fails for a fresh conversation; the result mirrors `append`
    pub fn seeded(
        run_id: impl Into<String>,
        system_prompt: impl Into<String>,
        goal: impl Into<String>,
    ) -> Result<Self> {
        let mut conversation = Self::new(run_id);
        conversation.append(Message::system(system_prompt))?;
        conversation.append(Message::user(goal))?;
        Ok(conversation)
    }

    /// Identifier of the run this conversation belongs to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Appends a message after checking the correlation rules
    ///
    /// # Errors
    ///
    /// Returns `StratumError::Conversation` describing the violated rule;
    /// the conversation is left unchanged
    pub fn append(&mut self, message: Message) -> Result<()> {
        self.check(&message)
            .map_err(|reason| StratumError::Conversation(format!("run {}: {}", self.run_id, reason)))?;
        self.messages.push(message);
        Ok(())
    }

    fn check(&self, message: &Message) -> std::result::Result<(), String> {
        if message.role != Role::Assistant && message.has_tool_calls() {
            return Err(format!("{} message cannot carry tool calls", message.role));
        }

        if message.role == Role::Tool {
            return self.check_tool_result(message);
        }

        if message.tool_call_id.is_some() {
            return Err(format!("{} message cannot carry a tool_call_id", message.role));
        }

        let pending = self.pending_tool_calls();
        if !pending.is_empty() {
            return Err(format!(
                "cannot append {} message with unanswered tool calls: {}",
                message.role,
                pending.join(", ")
            ));
        }

        let mut ids = HashSet::new();
        if let Some(dup) = message.tool_calls.iter().find(|c| !ids.insert(c.id.as_str())) {
            return Err(format!("duplicate tool call id {}", dup.id));
        }

        Ok(())
    }

    fn check_tool_result(&self, message: &Message) -> std::result::Result<(), String> {
        let id = message
            .tool_call_id
            .as_deref()
            .ok_or_else(|| "tool message is missing tool_call_id".to_string())?;

        let (anchor, answered) = match self.open_tool_turn() {
            Some(turn) => turn,
            None => return Err(format!("tool result {} has no preceding tool call", id)),
        };

        if !anchor.tool_calls.iter().any(|c| c.id == id) {
            return Err(format!(
                "tool result {} does not match any call of the preceding assistant message",
                id
            ));
        }

        if answered.contains(id) {
            return Err(format!("duplicate result for tool call {}", id));
        }

        Ok(())
    }

    /// Assistant message whose tool calls are being answered, plus the ids
    /// already answered
    fn open_tool_turn(&self) -> Option<(&Message, HashSet<&str>)> {
        let trailing = self
            .messages
            .iter()
            .rev()
            .take_while(|m| m.role == Role::Tool)
            .count();
        let start = self.messages.len() - trailing;
        let anchor = self.messages.get(start.checked_sub(1)?)?;
        if anchor.role != Role::Assistant || !anchor.has_tool_calls() {
            return None;
        }
        let answered = self.messages[start..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        Some((anchor, answered))
    }

    /// Ids of tool calls in the last assistant message that have no result yet
    pub fn pending_tool_calls(&self) -> Vec<&str> {
        match self.open_tool_turn() {
            Some((anchor, answered)) => anchor
                .tool_calls
                .iter()
                .map(|c| c.id.as_str())
                .filter(|id| !answered.contains(id))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns the messages in order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns an owned copy that later appends do not affect
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    /// Consumes the conversation and returns its messages
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// The goal given by the caller, if seeded
    pub fn goal(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True before seeding
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rough token count (characters / 4) for logging
    pub fn estimated_tokens(&self) -> usize {
        self.messages
            .iter()
            .map(|m| {
                let calls: usize = m
                    .tool_calls
                    .iter()
                    .map(|c| c.name.len() + c.arguments_value().to_string().len())
                    .sum();
                (m.content.len() + calls) / 4
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolCall;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "describe_table", json!({"table": "t"}))
    }

    fn with_calls(ids: &[&str]) -> ConversationState {
        let mut conversation = ConversationState::seeded("run-1", "sys", "goal").unwrap();
        conversation
            .append(Message::assistant_with_tools(
                ids.iter().map(|id| call(id)).collect(),
            ))
            .unwrap();
        conversation
    }

    #[test]
    fn test_seeded_conversation() {
        let conversation = ConversationState::seeded("run-1", "sys", "load demos").unwrap();
        assert_eq!(conversation.run_id(), "run-1");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.goal(), Some("load demos"));
    }

    #[test]
    fn test_tool_results_in_any_order() {
        let mut conversation = with_calls(&["a", "b"]);
        assert_eq!(conversation.pending_tool_calls(), vec!["a", "b"]);
        conversation.append(Message::tool_result("b", "ok")).unwrap();
        assert_eq!(conversation.pending_tool_calls(), vec!["a"]);
        conversation.append(Message::tool_result("a", "ok")).unwrap();
        assert!(conversation.pending_tool_calls().is_empty());
        conversation.append(Message::assistant("done")).unwrap();
    }

    #[test]
    fn test_rejects_unknown_tool_call_id() {
        let mut conversation = with_calls(&["a"]);
        let err = conversation
            .append(Message::tool_result("zzz", "ok"))
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn test_rejects_duplicate_result() {
        let mut conversation = with_calls(&["a", "b"]);
        conversation.append(Message::tool_result("a", "ok")).unwrap();
        assert!(conversation.append(Message::tool_result("a", "again")).is_err());
    }

    #[test]
    fn test_rejects_tool_result_without_call() {
        let mut conversation = ConversationState::seeded("run-1", "sys", "goal").unwrap();
        assert!(conversation.append(Message::tool_result("a", "ok")).is_err());

        conversation.append(Message::assistant("plain answer")).unwrap();
        assert!(conversation.append(Message::tool_result("a", "ok")).is_err());
    }

    #[test]
    fn test_rejects_message_while_calls_pending() {
        let mut conversation = with_calls(&["a"]);
        let err = conversation
            .append(Message::assistant("done"))
            .unwrap_err();
        assert!(err.to_string().contains("unanswered tool calls: a"));
    }

    #[test]
    fn test_rejects_tool_calls_on_non_assistant() {
        let mut conversation = ConversationState::new("run-1");
        let mut message = Message::user("goal");
        message.tool_calls.push(call("a"));
        assert!(conversation.append(message).is_err());
    }

    #[test]
    fn test_rejects_duplicate_call_ids_in_one_turn() {
        let mut conversation = ConversationState::seeded("run-1", "sys", "goal").unwrap();
        let err = conversation
            .append(Message::assistant_with_tools(vec![call("a"), call("a")]))
            .unwrap_err();
        assert!(err.to_string().contains("duplicate tool call id a"));
    }

    #[test]
    fn test_rejects_tool_message_without_id() {
        let mut conversation = with_calls(&["a"]);
        let mut message = Message::tool_result("a", "ok");
        message.tool_call_id = None;
        assert!(conversation.append(message).is_err());
    }

    #[test]
    fn test_snapshot_is_prefix_of_later_state() {
        let mut conversation = with_calls(&["a"]);
        let before = conversation.snapshot();
        conversation.append(Message::tool_result("a", "ok")).unwrap();
        let after = conversation.snapshot();

        assert_eq!(before.len() + 1, after.len());
        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(after.last().unwrap().tool_call_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_estimated_tokens_grows() {
        let mut conversation = ConversationState::seeded("run-1", "a".repeat(400), "goal").unwrap();
        let before = conversation.estimated_tokens();
        assert!(before >= 100);
        conversation.append(Message::assistant("b".repeat(40))).unwrap();
        assert_eq!(conversation.estimated_tokens(), before + 10);
    }
}
