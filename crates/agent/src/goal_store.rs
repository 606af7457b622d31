//! File-backed `GoalPort` implementation (C8's persistence layer): one
//! `goals.json` snapshot plus an append-only `diary.jsonl`, locked with
//! `fs2` the same way `remind_me`'s reminder log is — no teacher file
//! ever persisted goals directly, so this follows that tool's
//! lock-then-write convention rather than copying a specific one.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use fs2::FileExt;
use uuid::Uuid;

use turnkeep_tools::ports::{AutoTask, DiaryEntry, Goal, GoalPort, GoalPortError, GoalStatus, NewTask, TaskStatus};

pub struct GoalStore {
    goals_path: PathBuf,
    diary_path: PathBuf,
    goals: Mutex<Vec<Goal>>,
}

impl GoalStore {
    /// Loads `goals.json` from `data_dir`, creating the directory (and
    /// starting from an empty goal list) if nothing exists yet.
    pub fn load(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        let goals_path = data_dir.join("goals.json");
        let diary_path = data_dir.join("diary.jsonl");
        let goals = if goals_path.exists() {
            let raw = fs::read_to_string(&goals_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            Vec::new()
        };
        Ok(Self { goals_path, diary_path, goals: Mutex::new(goals) })
    }

    fn persist(&self, goals: &[Goal]) -> Result<(), GoalPortError> {
        let rendered = serde_json::to_string_pretty(goals).map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.goals_path)
            .map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        file.lock_exclusive().map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        let result = file.write_all(rendered.as_bytes());
        let _ = file.unlock();
        result.map_err(|e| GoalPortError::Upstream(e.to_string()))
    }

    /// The oldest `ACTIVE` goal with at least one `PENDING`/`IN_PROGRESS`
    /// task — what the Auto Scheduler's goal tick (§4.8) acts on.
    pub fn oldest_actionable(&self) -> Option<Goal> {
        self.goals
            .lock()
            .unwrap()
            .iter()
            .find(|g| {
                g.status == GoalStatus::Active
                    && g.tasks.iter().any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            })
            .cloned()
    }
}

#[async_trait]
impl GoalPort for GoalStore {
    async fn create_goal(&self, title: String) -> Result<Goal, GoalPortError> {
        if title.trim().is_empty() {
            return Err(GoalPortError::Validation("title must not be empty".to_string()));
        }
        let goal = Goal { id: Uuid::new_v4().to_string(), title, status: GoalStatus::Active, tasks: Vec::new() };
        let mut goals = self.goals.lock().unwrap();
        goals.push(goal.clone());
        self.persist(&goals)?;
        Ok(goal)
    }

    async fn list_goals(&self) -> Result<Vec<Goal>, GoalPortError> {
        Ok(self.goals.lock().unwrap().clone())
    }

    async fn plan_tasks(&self, goal_id: &str, tasks: Vec<NewTask>) -> Result<Goal, GoalPortError> {
        if tasks.is_empty() {
            return Err(GoalPortError::Validation("plan_tasks requires at least one task".to_string()));
        }
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| GoalPortError::NotFound(format!("goal '{goal_id}'")))?;
        for task in tasks {
            goal.tasks.push(AutoTask {
                id: Uuid::new_v4().to_string(),
                title: task.title,
                description: task.description,
                status: TaskStatus::Pending,
            });
        }
        let updated = goal.clone();
        self.persist(&goals)?;
        Ok(updated)
    }

    async fn update_task_status(&self, goal_id: &str, task_id: &str, status: TaskStatus) -> Result<Goal, GoalPortError> {
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| GoalPortError::NotFound(format!("goal '{goal_id}'")))?;
        let task = goal
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| GoalPortError::NotFound(format!("task '{task_id}'")))?;
        task.status = status;
        let updated = goal.clone();
        self.persist(&goals)?;
        Ok(updated)
    }

    async fn complete_goal(&self, goal_id: &str) -> Result<Goal, GoalPortError> {
        let mut goals = self.goals.lock().unwrap();
        let goal = goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(|| GoalPortError::NotFound(format!("goal '{goal_id}'")))?;
        let unresolved = goal.tasks.iter().any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress));
        if unresolved {
            return Err(GoalPortError::Validation("goal has pending or in-progress tasks".to_string()));
        }
        goal.status = GoalStatus::Completed;
        let updated = goal.clone();
        self.persist(&goals)?;
        Ok(updated)
    }

    async fn write_diary(&self, goal_id: &str, text: String) -> Result<(), GoalPortError> {
        let entry = DiaryEntry { goal_id: goal_id.to_string(), text, created_at: chrono::Utc::now() };
        let line = serde_json::to_string(&entry).map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.diary_path)
            .map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        file.lock_exclusive().map_err(|e| GoalPortError::Upstream(e.to_string()))?;
        let result = writeln!(file, "{line}");
        let _ = file.unlock();
        result.map_err(|e| GoalPortError::Upstream(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let goal = store.create_goal("Write README".to_string()).await.unwrap();
        let goals = store.list_goals().await.unwrap();
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].id, goal.id);
        assert_eq!(goals[0].status, GoalStatus::Active);
    }

    #[tokio::test]
    async fn create_goal_rejects_blank_title() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let err = store.create_goal("   ".to_string()).await.unwrap_err();
        assert!(matches!(err, GoalPortError::Validation(_)));
    }

    #[tokio::test]
    async fn plan_tasks_then_oldest_actionable_finds_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let goal = store.create_goal("Write README".to_string()).await.unwrap();
        assert!(store.oldest_actionable().is_none());
        store
            .plan_tasks(&goal.id, vec![NewTask { title: "Draft intro paragraph".to_string(), description: None }])
            .await
            .unwrap();
        let actionable = store.oldest_actionable().unwrap();
        assert_eq!(actionable.id, goal.id);
    }

    #[tokio::test]
    async fn complete_goal_rejects_unresolved_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let goal = store.create_goal("Ship v1".to_string()).await.unwrap();
        store
            .plan_tasks(&goal.id, vec![NewTask { title: "Write tests".to_string(), description: None }])
            .await
            .unwrap();
        let err = store.complete_goal(&goal.id).await.unwrap_err();
        assert!(matches!(err, GoalPortError::Validation(_)));
    }

    #[tokio::test]
    async fn complete_goal_succeeds_once_all_tasks_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let goal = store.create_goal("Ship v1".to_string()).await.unwrap();
        let goal = store
            .plan_tasks(&goal.id, vec![NewTask { title: "Write tests".to_string(), description: None }])
            .await
            .unwrap();
        let task_id = goal.tasks[0].id.clone();
        store.update_task_status(&goal.id, &task_id, TaskStatus::Completed).await.unwrap();
        let completed = store.complete_goal(&goal.id).await.unwrap();
        assert_eq!(completed.status, GoalStatus::Completed);
    }

    #[tokio::test]
    async fn goals_survive_a_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = GoalStore::load(dir.path()).unwrap();
            store.create_goal("Write README".to_string()).await.unwrap();
        }
        let reloaded = GoalStore::load(dir.path()).unwrap();
        assert_eq!(reloaded.list_goals().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn write_diary_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::load(dir.path()).unwrap();
        let goal = store.create_goal("Write README".to_string()).await.unwrap();
        store.write_diary(&goal.id, "started drafting".to_string()).await.unwrap();
        store.write_diary(&goal.id, "finished drafting".to_string()).await.unwrap();
        let raw = fs::read_to_string(dir.path().join("diary.jsonl")).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }
}
