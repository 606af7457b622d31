//! Auto Scheduler (C8): a 1-second heartbeat driving two independent
//! ticks — goal/task progress and due reminders — plus a piggybacked
//! memory tombstone sweep. Both ticks run a turn through the same
//! `TurnEngine` a manually-driven session would use; the only
//! difference is who synthesizes the inbound "user" message.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use turnkeep_agent::goal_store::GoalStore;
use turnkeep_agent::session::{AgentSession, TurnBudget};
use turnkeep_config::RuntimeConfig;
use turnkeep_exec::ToolExecutor;
use turnkeep_llm::LlmClient;
use turnkeep_memory::MemoryEngine;
use turnkeep_tools::ports::{GoalPort, TaskStatus};
use turnkeep_tools::ToolRegistry;

use crate::reminders::{due_reminders, mark_surfaced};
use crate::notify::NotificationSink;
use crate::turn::{TerminationReason, TurnEngine};

pub struct AutoScheduler<'a> {
    pub goals: Arc<GoalStore>,
    pub memory: Arc<MemoryEngine>,
    pub registry: &'a ToolRegistry,
    pub executor: &'a ToolExecutor,
    pub llm: &'a LlmClient,
    pub config: &'a RuntimeConfig,
    pub workspace_root: PathBuf,
    pub sink: &'a dyn NotificationSink,
}

impl<'a> AutoScheduler<'a> {
    /// Runs the heartbeat until `cancel` reports `true`. The interval is
    /// fixed at `config.auto.tick_interval_seconds`, which
    /// `AutoConfig::validate` already pins to 1.
    pub async fn run(&self, mut cancel: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.auto.tick_interval_seconds as u64));
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick_once().await,
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        break;
                    }
                }
            }
        }
    }

    pub async fn tick_once(&self) {
        self.memory.sweep_tombstones().await;

        if self.config.auto.auto_start {
            self.goal_tick().await;
        }
        self.reminder_tick().await;
    }

    /// Advances the oldest actionable goal's oldest pending/in-progress
    /// task by one turn, bounded by `taskTimeLimitMinutes`.
    async fn goal_tick(&self) {
        let Some(goal) = self.goals.oldest_actionable() else { return };
        let Some(task) = goal.tasks.iter().find(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress)) else { return };

        if let Err(err) = self.goals.update_task_status(&goal.id, &task.id, TaskStatus::InProgress).await {
            warn!(goal = %goal.id, task = %task.id, error = %err, "failed to mark task in progress");
            return;
        }

        let prompt = format!(
            "Work on task \"{}\" for goal \"{}\". {}",
            task.title,
            goal.title,
            task.description.as_deref().unwrap_or("No further detail was given.")
        );

        let budget = TurnBudget::new(
            self.config.turn.max_llm_calls,
            self.config.turn.max_tool_executions,
            Duration::from_secs(self.config.auto.task_time_limit_minutes as u64 * 60),
        );

        let mut session = AgentSession::new("auto", &goal.id);
        let engine = TurnEngine::new(self.registry, self.executor, self.llm, self.config);
        let outcome = engine
            .run_turn(&mut session, &self.workspace_root, &prompt, None, false, false, Some(budget), None)
            .await;

        let (status, diary_text) = match outcome.termination {
            TerminationReason::Complete => (TaskStatus::Completed, outcome.final_text.clone()),
            TerminationReason::Budget | TerminationReason::Deadline => (TaskStatus::Failed, outcome.final_text.clone()),
        };

        if let Err(err) = self.goals.update_task_status(&goal.id, &task.id, status).await {
            warn!(goal = %goal.id, task = %task.id, error = %err, "failed to record task outcome");
        }
        if let Err(err) = self.goals.write_diary(&goal.id, diary_text).await {
            warn!(goal = %goal.id, error = %err, "failed to write diary entry");
        }

        if self.config.auto.notify_milestones {
            self.sink.publish(&format!("goal '{}': task '{}' -> {:?}", goal.title, task.title, status));
            for milestone in &outcome.milestones {
                self.sink.publish(&milestone.detail);
            }
        }
    }

    /// Scans the reminder log for due entries and runs one turn per
    /// reminder so the assistant can act on it proactively.
    async fn reminder_tick(&self) {
        let now = chrono::Utc::now();
        let due = match due_reminders(&self.workspace_root, now) {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "failed to scan reminders");
                return;
            }
        };

        for reminder in due {
            let prompt = format!("A reminder is due: \"{}\". Decide whether to act on it or simply notify the user.", reminder.text);
            let mut session = AgentSession::new("auto", "reminders");
            let engine = TurnEngine::new(self.registry, self.executor, self.llm, self.config);
            let outcome = engine.run_turn(&mut session, &self.workspace_root, &prompt, None, false, false, None, None).await;

            self.sink.publish(&outcome.final_text);
            if let Err(err) = mark_surfaced(&self.workspace_root, &reminder.added_at) {
                warn!(error = %err, "failed to mark reminder surfaced");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnkeep_exec::ExecutorConfig;
    use turnkeep_memory::embedding::HashingEmbedder;
    use turnkeep_memory::MemoryEngineConfig;

    async fn engine_fixtures(dir: &std::path::Path) -> (ToolRegistry, ToolExecutor, LlmClient, RuntimeConfig, Arc<MemoryEngine>, Arc<GoalStore>) {
        let registry = ToolRegistry::default();
        let executor = ToolExecutor::new(ExecutorConfig::new(dir.to_path_buf()));
        let llm = LlmClient::new();
        let config = RuntimeConfig::default();
        let memory = Arc::new(MemoryEngine::load(dir, Arc::new(HashingEmbedder::default()), MemoryEngineConfig::default()).await.unwrap());
        let goals = Arc::new(GoalStore::load(dir.join("goals")).unwrap());
        (registry, executor, llm, config, memory, goals)
    }

    #[tokio::test]
    async fn tick_once_is_a_no_op_with_auto_disabled_and_no_due_reminders() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, executor, llm, mut config, memory, goals) = engine_fixtures(dir.path()).await;
        config.auto.auto_start = false;
        let sink = crate::notify::test_support::RecordingSink::default();

        let scheduler = AutoScheduler {
            goals,
            memory,
            registry: &registry,
            executor: &executor,
            llm: &llm,
            config: &config,
            workspace_root: dir.path().to_path_buf(),
            sink: &sink,
        };
        scheduler.tick_once().await;
        assert!(sink.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn goal_tick_skips_a_goal_with_no_actionable_task() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, executor, llm, mut config, memory, goals) = engine_fixtures(dir.path()).await;
        config.auto.auto_start = true;
        goals.create_goal("Ship v1".to_string()).await.unwrap();
        let sink = crate::notify::test_support::RecordingSink::default();

        let scheduler = AutoScheduler {
            goals,
            memory,
            registry: &registry,
            executor: &executor,
            llm: &llm,
            config: &config,
            workspace_root: dir.path().to_path_buf(),
            sink: &sink,
        };
        scheduler.goal_tick().await;
        assert!(sink.published.lock().unwrap().is_empty());
    }
}

