//! Tool registry (C1) and built-in tool executors (C2).
//!
//! Tools never see the full per-turn context type (that would create a
//! dependency cycle: the engine crate owns the context and depends on
//! tools, not the reverse). Instead each tool talks to its scope
//! through [`ContextHandle`] — a narrow trait the engine's real
//! context implements — and to any upstream system (memory, goals)
//! through the small port traits in [`ports`]. This is the "pure logic
//! function plus a small interface for upstream calls" composition the
//! tool layer is built around.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod builtins;
pub mod injection_guard;
pub mod ports;

pub use injection_guard::InjectionGuard;
pub use ports::{GoalPort, MemoryPort};

// ─── data carried through tool results ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentType {
    Image,
    Document,
    Audio,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentType,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A structured event emitted when a task or goal changes lifecycle
/// state; consumed by the Auto Scheduler's notification sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub goal_id: String,
    pub task_id: Option<String>,
    pub kind: String,
    pub detail: String,
}

// ─── the scoped handle tools get instead of the full context ───────────────

/// The narrow surface of `AgentContext` that tool executors may touch.
/// Implemented by the engine's real context type; tools only ever see
/// this trait object, never the context struct itself.
pub trait ContextHandle: Send + Sync {
    fn workspace_root(&self) -> &Path;
    fn get_attr(&self, key: &str) -> Option<Value>;
    fn set_attr(&self, key: &str, value: Value);
    fn mark_loop_complete(&self);

    fn tier_force(&self) -> bool;
    /// Attempts to set the model tier override. `Err` when denied by
    /// `tierForce`.
    fn set_model_tier(&self, tier: &str) -> Result<(), &'static str>;

    fn request_skill_transition(&self, skill: String, reason: Option<String>);

    fn set_voice_response(&self, text: String);

    fn is_plan_mode_active(&self) -> bool;
    fn plan_content(&self) -> Option<String>;
    fn set_plan_content(&self, content: String);
    fn finalize_plan(&self);

    fn record_milestone(&self, milestone: Milestone);
}

// ─── tool trait and registry ────────────────────────────────────────────────

/// Describes a single parameter a tool accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl Default for ToolParam {
    fn default() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            required: false,
        }
    }
}

/// Relative sensitivity of a tool's effects; drives default enablement
/// and informs any future approval-gating policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SecurityLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Static metadata attached to every [`ToolSpec`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolMetadata {
    pub security_level: SecurityLevel,
    pub read_only: bool,
    pub group: String,
}

/// Schema description of a tool, as surfaced to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ToolParam>,
    pub metadata: ToolMetadata,
}

/// The raw result of running a tool's logic, before the dispatch layer
/// (`turnkeep_exec::ToolExecutor`) wraps it into a typed `ToolResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), attachment: None }
    }

    pub fn fail(output: impl Into<String>) -> Self {
        Self { success: false, output: output.into(), attachment: None }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// Trait implemented by every built-in tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    fn is_enabled(&self, _config: &turnkeep_config::RuntimeConfig) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &dyn ContextHandle,
        args: &HashMap<String, Value>,
    ) -> anyhow::Result<ToolOutput>;
}

/// Central registry for all available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    /// All registered specs, regardless of enablement. Used by admin
    /// introspection, not by the LLM-facing path.
    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.spec().name == name).map(|t| t.as_ref())
    }

    /// True if `name` resolves to a registered tool (enabled or not).
    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.spec().name == name)
    }

    /// True if `name` resolves to a registered tool AND that tool is
    /// currently enabled.
    pub fn is_enabled(&self, name: &str, config: &turnkeep_config::RuntimeConfig) -> bool {
        self.get(name).map(|t| t.is_enabled(config)).unwrap_or(false)
    }

    /// The schemas visible to the model: enabled tools only, further
    /// filtered by the plan-mode gate (C10) — while plan mode is
    /// active only `plan_*` tools and `skill_transition` are exposed.
    pub fn describe_for_llm(
        &self,
        config: &turnkeep_config::RuntimeConfig,
        plan_mode_active: bool,
    ) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .filter(|t| t.is_enabled(config))
            .map(|t| t.spec())
            .filter(|spec| {
                if plan_mode_active {
                    spec.name.starts_with("plan_") || spec.name == "skill_transition"
                } else {
                    true
                }
            })
            .collect()
    }
}

/// A minimal [`ContextHandle`] fake, shared by every builtin tool's unit
/// tests so each one doesn't hand-roll its own.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    pub struct FakeContext {
        pub workspace_root: std::path::PathBuf,
        pub attrs: Mutex<HashMap<String, Value>>,
        pub tier_force: bool,
        pub plan_mode: Mutex<bool>,
        pub plan_content: Mutex<Option<String>>,
    }

    impl FakeContext {
        pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
            Self {
                workspace_root: root.into(),
                attrs: Mutex::new(HashMap::new()),
                tier_force: false,
                plan_mode: Mutex::new(false),
                plan_content: Mutex::new(None),
            }
        }

        pub fn with_tier_force(mut self, force: bool) -> Self {
            self.tier_force = force;
            self
        }

        pub fn with_plan_mode(self, active: bool) -> Self {
            *self.plan_mode.lock().unwrap() = active;
            self
        }
    }

    impl ContextHandle for FakeContext {
        fn workspace_root(&self) -> &Path {
            &self.workspace_root
        }
        fn get_attr(&self, key: &str) -> Option<Value> {
            self.attrs.lock().unwrap().get(key).cloned()
        }
        fn set_attr(&self, key: &str, value: Value) {
            self.attrs.lock().unwrap().insert(key.to_string(), value);
        }
        fn mark_loop_complete(&self) {
            self.set_attr("loop.complete", Value::Bool(true));
        }
        fn tier_force(&self) -> bool {
            self.tier_force
        }
        fn set_model_tier(&self, tier: &str) -> Result<(), &'static str> {
            if self.tier_force {
                return Err("tier is force-locked");
            }
            self.set_attr("modelTier", Value::String(tier.to_string()));
            Ok(())
        }
        fn request_skill_transition(&self, skill: String, reason: Option<String>) {
            self.set_attr("skillTransitionRequest.skill", Value::String(skill));
            if let Some(r) = reason {
                self.set_attr("skillTransitionRequest.reason", Value::String(r));
            }
        }
        fn set_voice_response(&self, text: String) {
            self.set_attr("voiceRequested", Value::Bool(true));
            self.set_attr("voiceText", Value::String(text));
            self.mark_loop_complete();
        }
        fn is_plan_mode_active(&self) -> bool {
            *self.plan_mode.lock().unwrap()
        }
        fn plan_content(&self) -> Option<String> {
            self.plan_content.lock().unwrap().clone()
        }
        fn set_plan_content(&self, content: String) {
            *self.plan_content.lock().unwrap() = Some(content);
        }
        fn finalize_plan(&self) {
            *self.plan_mode.lock().unwrap() = false;
        }
        fn record_milestone(&self, _milestone: Milestone) {}
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use test_support::FakeContext;
    use turnkeep_config::RuntimeConfig;

    struct DummyTool {
        name: String,
        enabled: bool,
    }

    #[async_trait]
    impl Tool for DummyTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.name.clone(),
                description: format!("Dummy tool: {}", self.name),
                params: vec![ToolParam {
                    name: "input".to_string(),
                    description: "test param".to_string(),
                    required: true,
                }],
                metadata: ToolMetadata {
                    security_level: SecurityLevel::Low,
                    read_only: true,
                    group: "test".to_string(),
                },
            }
        }

        fn is_enabled(&self, _config: &RuntimeConfig) -> bool {
            self.enabled
        }

        async fn run(&self, _ctx: &dyn ContextHandle, _args: &HashMap<String, Value>) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::ok(format!("ran {}", self.name)))
        }
    }

    #[test]
    fn empty_registry() {
        let reg = ToolRegistry::default();
        assert!(reg.list_specs().is_empty());
        assert!(reg.get("anything").is_none());
    }

    #[test]
    fn register_and_get() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "alpha".into(), enabled: true }));
        reg.register(Box::new(DummyTool { name: "beta".into(), enabled: true }));

        assert!(reg.get("alpha").is_some());
        assert!(reg.get("beta").is_some());
        assert!(reg.get("gamma").is_none());
    }

    #[test]
    fn disabled_tool_is_absent_from_describe_for_llm() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "on".into(), enabled: true }));
        reg.register(Box::new(DummyTool { name: "off".into(), enabled: false }));

        let config = RuntimeConfig::default();
        let visible = reg.describe_for_llm(&config, false);
        let names: Vec<&str> = visible.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"on"));
        assert!(!names.contains(&"off"));
        assert!(reg.contains("off"));
        assert!(!reg.is_enabled("off", &config));
    }

    #[test]
    fn plan_mode_hides_non_plan_tools() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "plan_get".into(), enabled: true }));
        reg.register(Box::new(DummyTool { name: "read_file".into(), enabled: true }));

        let config = RuntimeConfig::default();
        let visible = reg.describe_for_llm(&config, true);
        let names: Vec<&str> = visible.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"plan_get"));
        assert!(!names.contains(&"read_file"));
    }

    #[tokio::test]
    async fn run_registered_tool() {
        let mut reg = ToolRegistry::default();
        reg.register(Box::new(DummyTool { name: "runner".into(), enabled: true }));

        let tool = reg.get("runner").unwrap();
        let ctx = FakeContext::new(std::env::temp_dir());
        let result = tool.run(&ctx, &HashMap::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "ran runner");
    }
}
