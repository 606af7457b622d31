//! Composition root: binds every builtin tool (C2) into a live
//! `ToolRegistry` (C1) and wires the memory/goal ports those tools call
//! upstream through. This is the "plugin contribution layer" other
//! crates only ever see through the finished registry.

use std::path::Path;
use std::sync::Arc;

use turnkeep_config::RuntimeConfig;
use turnkeep_memory::{HashingEmbedder, MemoryEngine, MemoryEngineConfig, MemoryPortAdapter};
use turnkeep_tools::builtins::{
    BrowserTool, CreateDirectoryTool, DateTimeTool, DeleteTool, EmailTool, FileInfoTool, GoalManagementTool,
    ListDirectoryTool, MemoryTool, PlanFinalizeTool, PlanGetTool, PlanSetContentTool, ReadFileTool, RemindMeTool,
    RunShellTool, SendFileTool, SendVoiceTool, SetTierTool, SkillTransitionTool, WebSearchTool, WeatherTool,
    WriteFileTool,
};
use turnkeep_tools::ports::{GoalPort, MemoryPort};
use turnkeep_tools::ToolRegistry;

/// Loads the memory engine rooted at `workspace_root` and wraps it as
/// the `MemoryPort` the `memory` tool depends on.
pub async fn load_memory_port(workspace_root: &Path, config: &RuntimeConfig) -> anyhow::Result<Arc<dyn MemoryPort>> {
    let engine_config = MemoryEngineConfig {
        soft_prompt_budget_tokens: config.memory.soft_prompt_budget_tokens,
        hard_prompt_budget_tokens: config.memory.max_prompt_budget_tokens,
        promotion_min_confidence: config.memory.promotion_min_confidence,
        ..MemoryEngineConfig::default()
    };
    let embedder = Arc::new(HashingEmbedder::default());
    let engine = MemoryEngine::load(workspace_root, embedder, engine_config).await?;
    Ok(Arc::new(MemoryPortAdapter::new(engine)))
}

/// Builds the registry every turn dispatches tool calls against.
/// `available_skills` feeds `skill_transition`'s valid-name list;
/// `memory`/`goals` are the upstream ports the composition root already
/// constructed (so tests can substitute fakes without touching this
/// function).
pub fn build_default_registry(
    config: &RuntimeConfig,
    workspace_root: &Path,
    memory: Arc<dyn MemoryPort>,
    goals: Arc<dyn GoalPort>,
    available_skills: Vec<String>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::default();
    let root = workspace_root.to_path_buf();
    let agent_data_dir = workspace_root.join(".agent");

    registry.register(Box::new(ReadFileTool { workspace_root: root.clone() }));
    registry.register(Box::new(WriteFileTool { workspace_root: root.clone() }));
    registry.register(Box::new(ListDirectoryTool { workspace_root: root.clone() }));
    registry.register(Box::new(CreateDirectoryTool { workspace_root: root.clone() }));
    registry.register(Box::new(DeleteTool { workspace_root: root.clone() }));
    registry.register(Box::new(FileInfoTool { workspace_root: root.clone() }));
    registry.register(Box::new(SendFileTool { workspace_root: root.clone() }));

    registry.register(Box::new(RunShellTool {
        workspace_root: root.clone(),
        env_whitelist: config.tools.shell_env_whitelist.clone(),
        max_timeout_secs: config.tools.shell_timeout_secs as u64,
    }));

    registry.register(Box::new(WebSearchTool {
        brave_api_key: Some(config.tools.brave_search_api_key.clone()).filter(|k| !k.is_empty()),
    }));
    registry.register(Box::new(BrowserTool { driver: None }));

    registry.register(Box::new(EmailTool {
        data_dir: agent_data_dir.clone(),
        smtp_username: config.tools.smtp.username.clone(),
        smtp_password: config.tools.smtp.password.clone(),
    }));

    registry.register(Box::new(MemoryTool { port: memory }));
    registry.register(Box::new(GoalManagementTool { port: goals }));

    registry.register(Box::new(PlanGetTool));
    registry.register(Box::new(PlanSetContentTool));
    registry.register(Box::new(PlanFinalizeTool));

    registry.register(Box::new(SkillTransitionTool { available_skills }));
    registry.register(Box::new(SetTierTool));
    registry.register(Box::new(SendVoiceTool { voice_enabled: config.is_voice_tool_enabled() }));

    registry.register(Box::new(DateTimeTool));
    registry.register(Box::new(WeatherTool));

    registry.register(Box::new(RemindMeTool { data_dir: agent_data_dir }));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnkeep_tools::ports::{
        GoalPortError, MemoryAddRequest, MemoryForgetRequest, MemoryPortError, MemoryPromoteRequest,
        MemorySearchRequest, MemoryUpdateRequest, NewTask, TaskStatus,
    };
    use turnkeep_tools::ports::Goal;

    struct NullMemory;
    #[async_trait::async_trait]
    impl MemoryPort for NullMemory {
        async fn add(&self, _req: MemoryAddRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
        }
        async fn search(&self, _req: MemorySearchRequest) -> Result<String, MemoryPortError> {
            unimplemented!()
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

    struct NullGoals;
    #[async_trait::async_trait]
    impl GoalPort for NullGoals {
        async fn create_goal(&self, _title: String) -> Result<Goal, GoalPortError> {
            unimplemented!()
        }
        async fn list_goals(&self) -> Result<Vec<Goal>, GoalPortError> {
            unimplemented!()
        }
        async fn plan_tasks(&self, _goal_id: &str, _tasks: Vec<NewTask>) -> Result<Goal, GoalPortError> {
            unimplemented!()
        }
        async fn update_task_status(&self, _goal_id: &str, _task_id: &str, _status: TaskStatus) -> Result<Goal, GoalPortError> {
            unimplemented!()
        }
        async fn complete_goal(&self, _goal_id: &str) -> Result<Goal, GoalPortError> {
            unimplemented!()
        }
        async fn write_diary(&self, _goal_id: &str, _text: String) -> Result<(), GoalPortError> {
            unimplemented!()
        }
    }

    #[test]
    fn registry_contains_every_builtin_tool_name() {
        let config = RuntimeConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let registry = build_default_registry(&config, dir.path(), Arc::new(NullMemory), Arc::new(NullGoals), vec![]);

        for name in [
            "read_file",
            "write_file",
            "list_directory",
            "create_directory",
            "delete",
            "file_info",
            "send_file",
            "run_shell",
            "web_search",
            "browser",
            "email",
            "memory",
            "goal_management",
            "plan_get",
            "plan_set_content",
            "plan_finalize",
            "skill_transition",
            "set_tier",
            "send_voice",
            "datetime",
            "weather",
            "remind_me",
        ] {
            assert!(registry.contains(name), "missing tool: {name}");
        }
    }
}
