//! The conversation-level data model (§3): `AgentSession`, the
//! `Message` sequence it owns, and the small value types a turn carries
//! — `TurnBudget`, `SkillTransitionRequest`, `Skill`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One tool invocation the LLM asked for in an assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A single entry in a session's ordered message sequence. Assistant
/// messages may carry tool calls instead of (or alongside) text; tool
/// messages always reference the call they answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self { role: Role::Assistant, content: None, tool_calls, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One conversation thread with a single inbound channel and chat.
/// `history` is append-only across turns; a turn only ever appends to
/// it, never rewrites earlier entries.
#[derive(Debug, Clone)]
pub struct AgentSession {
    pub id: Uuid,
    pub channel_type: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<Message>,
}

impl AgentSession {
    pub fn new(channel_type: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel_type: channel_type.into(),
            chat_id: chat_id.into(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.history.push(message);
        self.updated_at = Utc::now();
    }

    pub fn append_all(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.history.push(message);
        }
        self.updated_at = Utc::now();
    }

    /// The most recent `max` messages, oldest first — what a fresh turn
    /// seeds its working message list from.
    pub fn recent(&self, max: usize) -> &[Message] {
        let start = self.history.len().saturating_sub(max);
        &self.history[start..]
    }
}

/// Per-turn resource ceiling (§4.7). All three fields are clamped to at
/// least their minimum useful value so a misconfigured budget degrades
/// to "do basically nothing" rather than "never terminate".
#[derive(Debug, Clone, Copy)]
pub struct TurnBudget {
    pub max_llm_calls: u32,
    pub max_tool_executions: u32,
    pub deadline: Duration,
}

impl TurnBudget {
    pub fn new(max_llm_calls: u32, max_tool_executions: u32, deadline: Duration) -> Self {
        Self {
            max_llm_calls: max_llm_calls.max(1),
            max_tool_executions: max_tool_executions.max(1),
            deadline: deadline.max(Duration::from_secs(1)),
        }
    }
}

/// Set by the `skill_transition` tool; read back by the engine after
/// the tool batch finishes to decide whether to hand off to a
/// different skill before the next `CALL_LLM`.
#[derive(Debug, Clone)]
pub struct SkillTransitionRequest {
    pub skill: String,
    pub reason: Option<String>,
}

/// A named capability bundle the `skill_transition` tool can switch
/// into. `name` must match `[a-z0-9][a-z0-9_-]*`.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub content: Option<String>,
    pub available: bool,
}

impl Skill {
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    }
}
