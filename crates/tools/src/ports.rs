//! Narrow interfaces the `memory` and `goal_management` tools call
//! upstream through, instead of depending on the crates that implement
//! them. The composition root (the engine crate) builds the concrete
//! adapters and hands an `Arc<dyn MemoryPort>` / `Arc<dyn GoalPort>` to
//! the relevant tool at registration time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MemoryLayer {
    #[default]
    Semantic,
    Episodic,
    Procedural,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAddRequest {
    pub layer: Option<MemoryLayer>,
    pub item_type: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub references: Vec<String>,
    pub confidence: Option<f32>,
    pub salience: Option<f32>,
    pub ttl_days: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MemorySearchRequest {
    pub query_text: String,
    pub layer: Option<MemoryLayer>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryUpdateRequest {
    pub id: Option<String>,
    pub fingerprint: Option<String>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub confidence: Option<f32>,
    pub salience: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPromoteRequest {
    pub id: Option<String>,
    pub fingerprint: Option<String>,
    pub content: Option<String>,
    pub target_layer: MemoryLayer,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryForgetRequest {
    pub id: Option<String>,
    pub fingerprint: Option<String>,
    pub layer: Option<MemoryLayer>,
    pub query_text: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryPortError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream: {0}")]
    Upstream(String),
}

/// What the `memory` builtin tool needs from the memory engine.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn add(&self, req: MemoryAddRequest) -> Result<String, MemoryPortError>;
    async fn search(&self, req: MemorySearchRequest) -> Result<String, MemoryPortError>;
    async fn update(&self, req: MemoryUpdateRequest) -> Result<String, MemoryPortError>;
    async fn promote(&self, req: MemoryPromoteRequest) -> Result<String, MemoryPortError>;
    async fn forget(&self, req: MemoryForgetRequest) -> Result<String, MemoryPortError>;
}

// ─── goals ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoTask {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub status: GoalStatus,
    pub tasks: Vec<AutoTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub goal_id: String,
    pub text: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum GoalPortError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream: {0}")]
    Upstream(String),
}

/// What the `goal_management` builtin tool needs from the Auto
/// Scheduler's goal store.
#[async_trait]
pub trait GoalPort: Send + Sync {
    async fn create_goal(&self, title: String) -> Result<Goal, GoalPortError>;
    async fn list_goals(&self) -> Result<Vec<Goal>, GoalPortError>;
    async fn plan_tasks(&self, goal_id: &str, tasks: Vec<NewTask>) -> Result<Goal, GoalPortError>;
    async fn update_task_status(
        &self,
        goal_id: &str,
        task_id: &str,
        status: TaskStatus,
    ) -> Result<Goal, GoalPortError>;
    async fn complete_goal(&self, goal_id: &str) -> Result<Goal, GoalPortError>;
    async fn write_diary(&self, goal_id: &str, text: String) -> Result<(), GoalPortError>;
}
