//! The Turn Engine (C7): `INIT -> PLAN -> CALL_LLM -> DISPATCH_TOOLS ->
//! APPEND_RESULTS -> ... -> FINALIZE -> DONE`. One call to `run_turn`
//! drives exactly one session turn to a terminal outcome; the caller
//! (a CLI harness, the Auto Scheduler) holds the session's mutex for
//! the duration.
//!
//! A turn's live message list (`AgentContext`'s scratchpad) is scoped
//! to this call only — it carries the user message, the LLM's tool
//! calls, and their results across CALL_LLM rounds. Cross-turn memory
//! comes from the system prompt's recent-conversation block and C4,
//! not from replaying every round's tool chatter back into the session.

use std::path::Path;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{error, info, warn};

use turnkeep_agent::context::AgentContext;
use turnkeep_agent::session::{AgentSession, Message, Role, SkillTransitionRequest, ToolCallRequest, TurnBudget};
use turnkeep_config::RuntimeConfig;
use turnkeep_exec::ToolExecutor;
use turnkeep_llm::{ChatMessage, LlmClient, LlmResponse, Provider, ToolCall as LlmToolCall};
use turnkeep_prompt::{build_system_prompt, ConversationTurn, PromptInputs};
use turnkeep_thinker::{ModelRouter, Tier, TurnRouterState};
use turnkeep_tools::ports::MemoryPort;
use turnkeep_tools::{Attachment, Milestone, ToolRegistry};

use crate::openai_tools::specs_to_openai_tools;

const RECENT_HISTORY_TURNS: usize = 2 * 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    Complete,
    Budget,
    Deadline,
}

/// Classifies an LLM-call failure for the CLI exit-code table (§6).
/// Orthogonal to `TerminationReason` — every provider failure still
/// ends the turn as `TerminationReason::Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderFailure {
    Unavailable,
    RateLimited,
    Timeout,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceOutcome {
    pub requested: bool,
    pub text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub final_text: String,
    pub attachments: Vec<Attachment>,
    pub voice: VoiceOutcome,
    pub milestones: Vec<Milestone>,
    pub skill_transition: Option<SkillTransitionRequest>,
    pub termination: TerminationReason,
    pub provider_failure: Option<ProviderFailure>,
}

pub struct TurnEngine<'a> {
    pub registry: &'a ToolRegistry,
    pub executor: &'a ToolExecutor,
    pub llm: &'a LlmClient,
    pub config: &'a RuntimeConfig,
}

impl<'a> TurnEngine<'a> {
    pub fn new(registry: &'a ToolRegistry, executor: &'a ToolExecutor, llm: &'a LlmClient, config: &'a RuntimeConfig) -> Self {
        Self { registry, executor, llm, config }
    }

    /// Drives one turn to completion. `budget_override` lets the Auto
    /// Scheduler bound a goal/task turn by `taskTimeLimitMinutes`
    /// instead of the configured default.
    #[allow(clippy::too_many_arguments)]
    pub async fn run_turn(
        &self,
        session: &mut AgentSession,
        workspace_root: &Path,
        user_message: &str,
        tier_override: Option<Tier>,
        tier_force: bool,
        plan_mode_active: bool,
        budget_override: Option<TurnBudget>,
        memory: Option<&dyn MemoryPort>,
    ) -> TurnOutcome {
        let budget = budget_override.unwrap_or_else(|| default_turn_budget(self.config));
        let deadline_at = Instant::now() + budget.deadline;

        let recent_turns = derive_recent_turns(session.history.as_slice());
        let ctx = AgentContext::new(workspace_root, budget, tier_force, plan_mode_active);
        ctx.push_message(Message::user(user_message));

        let mut turn_state = TurnRouterState::new();
        let mut empty_responses: u32 = 0;
        let mut last_assistant_text: Option<String> = None;
        let outcome = loop {
            if Instant::now() >= deadline_at {
                break self.terminate(&ctx, TerminationReason::Deadline, None, last_assistant_text.take());
            }
            if ctx.llm_calls() >= ctx.budget().max_llm_calls {
                break self.terminate(&ctx, TerminationReason::Budget, None, last_assistant_text.take());
            }

            let resolution = match ModelRouter::resolve(self.config, tier_override, tier_force, &turn_state) {
                Ok(r) => r,
                Err(err) => {
                    error!(error = %err, "model router could not resolve a provider for this turn");
                    break self.terminate(&ctx, TerminationReason::Complete, Some(ProviderFailure::Unavailable), None);
                }
            };

            ctx.record_llm_call();
            let tool_specs = self.registry.describe_for_llm(self.config, ctx.is_plan_mode_active_snapshot());
            let tools_json = if tool_specs.is_empty() { None } else { Some(specs_to_openai_tools(&tool_specs)) };

            let prompt = build_system_prompt(&PromptInputs {
                config: self.config,
                provider: provider_key(resolution.provider_config.provider),
                model: &resolution.model,
                workspace_root: &workspace_root.display().to_string(),
                plan_mode_active: ctx.is_plan_mode_active_snapshot(),
                tool_specs: &tool_specs,
                recent_turns: &recent_turns,
                user_message,
                memory,
            })
            .await;

            let mut chat_messages = vec![ChatMessage::system(prompt)];
            chat_messages.extend(ctx.messages().iter().map(to_chat_message));

            let response = self
                .llm
                .call(
                    &resolution.provider_config,
                    &resolution.model,
                    &chat_messages,
                    tools_json.as_ref(),
                    resolution.reasoning.as_deref(),
                    resolution.temperature,
                )
                .await;

            let response = match response {
                Ok(r) => r,
                Err(err) => {
                    let failure = classify_provider_failure(&err.to_string());
                    error!(error = %err, ?failure, "llm call failed");
                    break self.terminate(&ctx, TerminationReason::Complete, Some(failure), last_assistant_text.take());
                }
            };

            match response {
                LlmResponse::Final { text } if !text.trim().is_empty() => {
                    ctx.push_message(Message::assistant_text(text.clone()));
                    last_assistant_text = Some(text.clone());
                    break self.terminate(&ctx, TerminationReason::Complete, None, Some(text));
                }
                LlmResponse::Final { .. } => {
                    empty_responses += 1;
                    if empty_responses >= 2 {
                        break self.terminate_on_invariant_breach(&ctx);
                    }
                }
                LlmResponse::ToolCalls { calls } if !calls.is_empty() => {
                    empty_responses = 0;
                    let requests: Vec<ToolCallRequest> = calls
                        .iter()
                        .map(|c| ToolCallRequest { id: c.id.clone(), name: c.function.name.clone(), arguments: c.function.arguments.clone() })
                        .collect();
                    ctx.push_message(Message::assistant_tool_calls(requests));

                    if self.dispatch_tools(&ctx, &calls, &mut turn_state).await {
                        break self.terminate(&ctx, TerminationReason::Budget, None, last_assistant_text.take());
                    }
                    if Instant::now() >= deadline_at {
                        break self.terminate(&ctx, TerminationReason::Deadline, None, last_assistant_text.take());
                    }
                    if ctx.loop_complete() {
                        break self.terminate(&ctx, TerminationReason::Complete, None, last_assistant_text.take());
                    }
                }
                LlmResponse::ToolCalls { .. } => {
                    empty_responses += 1;
                    if empty_responses >= 2 {
                        break self.terminate_on_invariant_breach(&ctx);
                    }
                }
            }
        };

        if let Some(transition) = &outcome.skill_transition {
            info!(skill = %transition.skill, reason = ?transition.reason, "turn requested a skill transition");
        }

        session.append(Message::user(user_message));
        session.append(Message::assistant_text(outcome.final_text.clone()));
        outcome
    }

    /// Returns `true` if the tool-execution budget was exhausted mid
    /// batch — the caller still has all results appended up to that
    /// point ("partial work preserved").
    async fn dispatch_tools(&self, ctx: &AgentContext, calls: &[LlmToolCall], turn_state: &mut TurnRouterState) -> bool {
        for call in calls {
            if ctx.tool_executions() >= ctx.budget().max_tool_executions {
                warn!(tool = %call.function.name, "tool execution budget exhausted mid-batch");
                return true;
            }
            ctx.record_tool_execution();
            turn_state.note_tool_invocation(&call.function.name);

            let args = match &call.function.arguments {
                Value::Object(map) => map.clone().into_iter().collect(),
                _ => Default::default(),
            };
            let result = self.executor.execute(self.registry, self.config, ctx, &call.function.name, &args).await;

            if let Some(attachment) = &result.attachment {
                ctx.record_attachment(attachment.clone());
            }
            let content = if result.success { result.output.clone() } else { format!("error: {}", result.error.clone().unwrap_or_default()) };
            ctx.push_message(Message::tool_result(call.id.clone(), content));
        }
        false
    }

    fn terminate(
        &self,
        ctx: &AgentContext,
        reason: TerminationReason,
        provider_failure: Option<ProviderFailure>,
        final_text: Option<String>,
    ) -> TurnOutcome {
        let final_text = final_text.unwrap_or_else(|| match reason {
            TerminationReason::Budget => {
                let which = if ctx.llm_calls() >= ctx.budget().max_llm_calls { "max LLM calls" } else { "max tool executions" };
                format!("Turn budget exceeded ({which}). Partial work preserved.")
            }
            TerminationReason::Deadline => "Turn deadline exceeded. Partial work preserved.".to_string(),
            TerminationReason::Complete => match provider_failure {
                Some(ProviderFailure::RateLimited) => "The assistant is rate limited right now. Please try again shortly.".to_string(),
                Some(_) => "The assistant is temporarily unavailable. Please try again shortly.".to_string(),
                None => "Done.".to_string(),
            },
        });

        let voice_text = ctx.take_voice_text();
        let voice = VoiceOutcome { requested: voice_text.is_some(), text: voice_text.clone() };
        let final_text = voice_text.unwrap_or(final_text);

        TurnOutcome {
            final_text,
            attachments: ctx.take_attachments(),
            voice,
            milestones: ctx.take_milestones(),
            skill_transition: ctx.take_skill_transition(),
            termination: reason,
            provider_failure,
        }
    }

    /// The "progress" invariant (§4.7, §7): two consecutive empty LLM
    /// responses terminate the turn. Spec names only three terminal
    /// buckets, so this folds into `Complete` with an apologetic
    /// message and an internally-logged internal-error marker.
    fn terminate_on_invariant_breach(&self, ctx: &AgentContext) -> TurnOutcome {
        error!(kind = "internal_error", "turn made no progress across two consecutive LLM responses");
        self.terminate(
            ctx,
            TerminationReason::Complete,
            None,
            Some("I wasn't able to make progress on that. Could you rephrase or try again?".to_string()),
        )
    }
}

fn default_turn_budget(config: &RuntimeConfig) -> TurnBudget {
    let deadline = turnkeep_exec::parse_iso8601_duration(&config.turn.deadline).unwrap_or(Duration::from_secs(3600));
    TurnBudget::new(config.turn.max_llm_calls, config.turn.max_tool_executions, deadline)
}

/// Reverses `Provider::from_key`; only used to render a human-readable
/// provider name into the system prompt's environment block.
fn provider_key(provider: Provider) -> &'static str {
    match provider {
        Provider::OpenAi => "openai",
        Provider::OpenRouter => "openrouter",
        Provider::Anthropic => "anthropic",
        Provider::Google => "google",
        Provider::Moonshot => "moonshot",
        Provider::Groq => "groq",
        Provider::Together => "together",
        Provider::Fireworks => "fireworks",
        Provider::DeepSeek => "deepseek",
        Provider::Mistral => "mistral",
        Provider::XAi => "xai",
        Provider::Perplexity => "perplexity",
        Provider::Zhipu => "zhipu",
        Provider::Qwen => "qwen",
        Provider::Cerebras => "cerebras",
        Provider::DeepInfra => "deepinfra",
    }
}

fn classify_provider_failure(message: &str) -> ProviderFailure {
    let lower = message.to_ascii_lowercase();
    if lower.contains("timed out") {
        ProviderFailure::Timeout
    } else if lower.contains("429") || lower.contains("rate limit") {
        ProviderFailure::RateLimited
    } else {
        ProviderFailure::Unavailable
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match message.role {
        Role::System => ChatMessage::system(message.content.clone().unwrap_or_default()),
        Role::User => ChatMessage::user(message.content.clone().unwrap_or_default()),
        Role::Tool => ChatMessage::tool_result(message.tool_call_id.clone().unwrap_or_default(), message.content.clone().unwrap_or_default()),
        Role::Assistant if !message.tool_calls.is_empty() => {
            let calls = message
                .tool_calls
                .iter()
                .map(|c| LlmToolCall { id: c.id.clone(), r#type: "function".to_string(), function: turnkeep_llm::ToolCallFunction { name: c.name.clone(), arguments: c.arguments.clone() } })
                .collect();
            ChatMessage::assistant_tool_calls(calls)
        }
        Role::Assistant => ChatMessage::assistant(message.content.clone().unwrap_or_default()),
    }
}

/// Pairs up consecutive (user, assistant) entries in session history
/// into the recap blocks the system prompt renders. Session history
/// only ever contains those two roles — tool round-trips are turn-
/// scoped scratch that never gets persisted past `FINALIZE`.
fn derive_recent_turns(history: &[Message]) -> Vec<ConversationTurn> {
    let mut turns = Vec::new();
    let mut iter = history.iter().rev().take(RECENT_HISTORY_TURNS * 2).collect::<Vec<_>>();
    iter.reverse();
    let mut i = 0;
    while i + 1 < iter.len() {
        if iter[i].role == Role::User && iter[i + 1].role == Role::Assistant {
            turns.push(ConversationTurn {
                user: iter[i].content.clone().unwrap_or_default(),
                assistant: iter[i + 1].content.clone().unwrap_or_default(),
            });
            i += 2;
        } else {
            i += 1;
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_recent_turns_pairs_user_then_assistant() {
        let history = vec![Message::user("hi"), Message::assistant_text("hello"), Message::user("bye"), Message::assistant_text("goodbye")];
        let turns = derive_recent_turns(&history);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].user, "hi");
        assert_eq!(turns[1].assistant, "goodbye");
    }

    #[test]
    fn derive_recent_turns_skips_a_dangling_user_message() {
        let history = vec![Message::user("hi"), Message::assistant_text("hello"), Message::user("unanswered")];
        let turns = derive_recent_turns(&history);
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn classify_provider_failure_matches_timeout_and_rate_limit() {
        assert_eq!(classify_provider_failure("upstream: request to x timed out"), ProviderFailure::Timeout);
        assert_eq!(classify_provider_failure("upstream: 429 from x: {}"), ProviderFailure::RateLimited);
        assert_eq!(classify_provider_failure("upstream: no API key configured"), ProviderFailure::Unavailable);
    }

    #[test]
    fn default_turn_budget_falls_back_on_unparseable_deadline() {
        let mut config = RuntimeConfig::default();
        config.turn.deadline = "not-a-duration".to_string();
        let budget = default_turn_budget(&config);
        assert_eq!(budget.deadline, Duration::from_secs(3600));
    }
}
