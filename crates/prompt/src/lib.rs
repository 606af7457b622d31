//! Assembles the system prompt fed to the LLM client (C6) at the start
//! of every `CALL_LLM` state in the Turn Engine (C7): environment
//! context, the tool catalogue with grounding rules, recent
//! conversation, and a memory-budgeted context block pulled from C4.
//!
//! This crate only renders text. It never calls the LLM and never
//! mutates the turn context; the Turn Engine decides when to call
//! [`build_system_prompt`] and where the resulting string goes in the
//! message list.

use std::fmt::Write as _;

use turnkeep_config::RuntimeConfig;
use turnkeep_tools::ports::{MemoryPort, MemorySearchRequest};
use turnkeep_tools::ToolSpec;

/// One finished turn, kept for the conversation block. Intentionally
/// decoupled from any history-persistence type so this crate doesn't
/// pull in a storage dependency just to render text.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

const MAX_RECENT_TURNS: usize = 6;
const MEMORY_QUERY_LIMIT: usize = 8;
const MAX_TURN_CHARS: usize = 800;

pub struct PromptInputs<'a> {
    pub config: &'a RuntimeConfig,
    pub provider: &'a str,
    pub model: &'a str,
    pub workspace_root: &'a str,
    pub plan_mode_active: bool,
    pub tool_specs: &'a [ToolSpec],
    pub recent_turns: &'a [ConversationTurn],
    pub user_message: &'a str,
    /// `None` when memory is disabled or not configured for this turn;
    /// the memory block is then omitted rather than rendered empty.
    pub memory: Option<&'a dyn MemoryPort>,
}

/// Renders the full system prompt for one `CALL_LLM` invocation.
///
/// Async only because the memory context block queries C4, which is
/// itself async (the store sits behind a `tokio::sync::RwLock`).
pub async fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut out = String::new();

    out.push_str(&build_header());
    out.push('\n');
    out.push_str(&build_environment_block(inputs));
    out.push('\n');
    out.push_str(&build_tools_and_grounding(inputs.tool_specs, inputs.plan_mode_active));

    if let Some(turns_block) = build_conversation_block(inputs.recent_turns) {
        out.push('\n');
        out.push_str(&turns_block);
    }

    if let Some(memory_block) = build_memory_block(inputs).await {
        out.push('\n');
        out.push_str(&memory_block);
    }

    out
}

fn build_header() -> String {
    "You are the execution core of an autonomous agent. You receive one \
     user message per turn, may call any of the tools below zero or more \
     times, and must end the turn with a plain-text response. Tool \
     results are ground truth about the outside world; your own prior \
     assumptions are not."
        .to_string()
}

fn build_environment_block(inputs: &PromptInputs<'_>) -> String {
    let mut s = String::new();
    writeln!(s, "## Environment").unwrap();
    writeln!(s, "- utc_time: {}", chrono::Utc::now().to_rfc3339()).unwrap();
    writeln!(s, "- os: {}", std::env::consts::OS).unwrap();
    writeln!(s, "- arch: {}", std::env::consts::ARCH).unwrap();
    writeln!(s, "- workspace_root: {}", inputs.workspace_root).unwrap();
    writeln!(s, "- provider: {}", inputs.provider).unwrap();
    writeln!(s, "- model: {}", inputs.model).unwrap();
    writeln!(s, "- plan_mode_active: {}", inputs.plan_mode_active).unwrap();
    s
}

fn build_tools_and_grounding(specs: &[ToolSpec], plan_mode_active: bool) -> String {
    let mut s = String::new();
    writeln!(s, "## Tools").unwrap();
    if specs.is_empty() {
        writeln!(s, "(no tools available this turn)").unwrap();
    } else {
        for spec in specs {
            let required: Vec<&str> = spec.params.iter().filter(|p| p.required).map(|p| p.name.as_str()).collect();
            if required.is_empty() {
                writeln!(s, "- {}: {}", spec.name, spec.description).unwrap();
            } else {
                writeln!(s, "- {}: {} (required: {})", spec.name, spec.description, required.join(", ")).unwrap();
            }
        }
    }

    writeln!(s).unwrap();
    writeln!(s, "## Grounding rules").unwrap();
    writeln!(s, "1. Only call a tool listed above; any other name is invalid.").unwrap();
    writeln!(s, "2. Validate your own arguments against each tool's required fields before calling it.").unwrap();
    writeln!(s, "3. A failed tool call is information, not an obstacle to route around silently.").unwrap();
    writeln!(s, "4. Never assert a fact about the filesystem, a command's output, or a search result without having called the tool that would confirm it.").unwrap();
    writeln!(s, "5. Stop calling tools and respond in plain text once you have enough to answer.").unwrap();
    if plan_mode_active {
        writeln!(s, "6. Plan mode is active: only plan_* tools and skill_transition are available until plan_finalize is called.").unwrap();
    }
    s
}

fn build_conversation_block(recent_turns: &[ConversationTurn]) -> Option<String> {
    if recent_turns.is_empty() {
        return None;
    }
    let mut s = String::new();
    writeln!(s, "## Recent conversation").unwrap();
    let start = recent_turns.len().saturating_sub(MAX_RECENT_TURNS);
    for turn in &recent_turns[start..] {
        writeln!(s, "user: {}", truncate_for_prompt(&turn.user, MAX_TURN_CHARS)).unwrap();
        writeln!(s, "assistant: {}", truncate_for_prompt(&turn.assistant, MAX_TURN_CHARS)).unwrap();
    }
    Some(s)
}

async fn build_memory_block(inputs: &PromptInputs<'_>) -> Option<String> {
    let memory = inputs.memory?;
    if !inputs.config.is_memory_enabled() || inputs.user_message.trim().is_empty() {
        return None;
    }
    let req = MemorySearchRequest { query_text: inputs.user_message.to_string(), layer: None, limit: MEMORY_QUERY_LIMIT };
    let results = memory.search(req).await.ok()?;
    let mut s = String::new();
    writeln!(s, "## Memory context").unwrap();
    writeln!(s, "{results}").unwrap();
    Some(s)
}

fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use turnkeep_tools::ports::{
        MemoryAddRequest, MemoryForgetRequest, MemoryPortError, MemoryPromoteRequest, MemoryUpdateRequest,
    };
    use turnkeep_tools::{ToolMetadata, ToolParam};

    struct FakeMemory(&'static str);

    #[async_trait]
    impl MemoryPort for FakeMemory {
        async fn add(&self, _req: MemoryAddRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
        }
        async fn search(&self, _req: MemorySearchRequest) -> Result<String, MemoryPortError> {
            Ok(self.0.to_string())
        }
        async fn update(&self, _req: MemoryUpdateRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
        }
        async fn promote(&self, _req: MemoryPromoteRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
        }
        async fn forget(&self, _req: MemoryForgetRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
        }
    }

    fn sample_spec(name: &str, required: bool) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("does {name}"),
            params: vec![ToolParam { name: "arg".to_string(), description: "an arg".to_string(), required }],
            metadata: ToolMetadata::default(),
        }
    }

    #[test]
    fn truncate_for_prompt_leaves_short_text_untouched() {
        assert_eq!(truncate_for_prompt("hello", 10), "hello");
    }

    #[test]
    fn truncate_for_prompt_clips_long_text_with_ellipsis() {
        let out = truncate_for_prompt(&"a".repeat(20), 5);
        assert_eq!(out, format!("{}…", "a".repeat(5)));
    }

    #[test]
    fn conversation_block_omitted_when_empty() {
        assert!(build_conversation_block(&[]).is_none());
    }

    #[test]
    fn conversation_block_keeps_only_the_tail() {
        let turns: Vec<ConversationTurn> =
            (0..10).map(|i| ConversationTurn { user: format!("u{i}"), assistant: format!("a{i}") }).collect();
        let block = build_conversation_block(&turns).unwrap();
        assert!(!block.contains("u0"));
        assert!(block.contains("u9"));
    }

    #[test]
    fn tools_block_marks_required_params() {
        let specs = vec![sample_spec("read_file", true), sample_spec("loop_complete", false)];
        let block = build_tools_and_grounding(&specs, false);
        assert!(block.contains("read_file: does read_file (required: arg)"));
        assert!(block.contains("loop_complete: does loop_complete"));
        assert!(!block.contains("loop_complete: does loop_complete ("));
    }

    #[test]
    fn plan_mode_adds_a_grounding_rule() {
        let normal = build_tools_and_grounding(&[], false);
        let planning = build_tools_and_grounding(&[], true);
        assert!(!normal.contains("Plan mode is active"));
        assert!(planning.contains("Plan mode is active"));
    }

    #[tokio::test]
    async fn memory_block_included_when_enabled_and_provided() {
        let config = RuntimeConfig::default();
        let mem = FakeMemory("fact about redis");
        let inputs = PromptInputs {
            config: &config,
            provider: "openai",
            model: "gpt-5",
            workspace_root: "/work",
            plan_mode_active: false,
            tool_specs: &[],
            recent_turns: &[],
            user_message: "what do we use for caching",
            memory: Some(&mem),
        };
        let prompt = build_system_prompt(&inputs).await;
        assert!(prompt.contains("## Memory context"));
        assert!(prompt.contains("fact about redis"));
    }

    #[tokio::test]
    async fn memory_block_omitted_for_blank_user_message() {
        let config = RuntimeConfig::default();
        let mem = FakeMemory("fact about redis");
        let inputs = PromptInputs {
            config: &config,
            provider: "openai",
            model: "gpt-5",
            workspace_root: "/work",
            plan_mode_active: false,
            tool_specs: &[],
            recent_turns: &[],
            user_message: "   ",
            memory: Some(&mem),
        };
        let prompt = build_system_prompt(&inputs).await;
        assert!(!prompt.contains("## Memory context"));
    }
}
