//! The real per-turn context (§3's `AgentContext`): owns the turn's
//! working message list, its attribute map, budget, and counters, and
//! is the sole production implementor of `turnkeep_tools::ContextHandle`.
//! Tools never see this struct directly — only the trait object.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use turnkeep_tools::{Attachment, ContextHandle, Milestone};

use crate::session::{Message, SkillTransitionRequest, TurnBudget};

const LOOP_COMPLETE_ATTR: &str = "loop.complete";

pub struct AgentContext {
    workspace_root: PathBuf,
    attrs: Mutex<HashMap<String, Value>>,
    tier_force: bool,
    model_tier: Mutex<Option<String>>,
    skill_transition: Mutex<Option<SkillTransitionRequest>>,
    voice_text: Mutex<Option<String>>,
    plan_mode: Mutex<bool>,
    plan_content: Mutex<Option<String>>,
    milestones: Mutex<Vec<Milestone>>,
    attachments: Mutex<Vec<Attachment>>,
    messages: Mutex<Vec<Message>>,
    budget: TurnBudget,
    llm_calls: AtomicU32,
    tool_executions: AtomicU32,
}

impl AgentContext {
    pub fn new(workspace_root: impl Into<PathBuf>, budget: TurnBudget, tier_force: bool, plan_mode_active: bool) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            attrs: Mutex::new(HashMap::new()),
            tier_force,
            model_tier: Mutex::new(None),
            skill_transition: Mutex::new(None),
            voice_text: Mutex::new(None),
            plan_mode: Mutex::new(plan_mode_active),
            plan_content: Mutex::new(None),
            milestones: Mutex::new(Vec::new()),
            attachments: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            budget,
            llm_calls: AtomicU32::new(0),
            tool_executions: AtomicU32::new(0),
        }
    }

    pub fn budget(&self) -> TurnBudget {
        self.budget
    }

    pub fn push_message(&self, message: Message) {
        self.messages.lock().unwrap().push(message);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    /// Returns the count *after* incrementing, so callers can compare
    /// directly against `budget().max_llm_calls`.
    pub fn record_llm_call(&self) -> u32 {
        self.llm_calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_tool_execution(&self) -> u32 {
        self.tool_executions.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn llm_calls(&self) -> u32 {
        self.llm_calls.load(Ordering::SeqCst)
    }

    pub fn tool_executions(&self) -> u32 {
        self.tool_executions.load(Ordering::SeqCst)
    }

    pub fn loop_complete(&self) -> bool {
        matches!(self.get_attr(LOOP_COMPLETE_ATTR), Some(Value::Bool(true)))
    }

    pub fn resolved_model_tier(&self) -> Option<String> {
        self.model_tier.lock().unwrap().clone()
    }

    pub fn take_skill_transition(&self) -> Option<SkillTransitionRequest> {
        self.skill_transition.lock().unwrap().take()
    }

    pub fn take_voice_text(&self) -> Option<String> {
        self.voice_text.lock().unwrap().take()
    }

    pub fn take_milestones(&self) -> Vec<Milestone> {
        std::mem::take(&mut *self.milestones.lock().unwrap())
    }

    /// Tool outputs that carried an attachment are staged here instead of
    /// being re-sent to the LLM; the engine surfaces them only at
    /// finalization.
    pub fn record_attachment(&self, attachment: Attachment) {
        self.attachments.lock().unwrap().push(attachment);
    }

    pub fn take_attachments(&self) -> Vec<Attachment> {
        std::mem::take(&mut *self.attachments.lock().unwrap())
    }

    pub fn plan_content_snapshot(&self) -> Option<String> {
        self.plan_content.lock().unwrap().clone()
    }

    pub fn is_plan_mode_active_snapshot(&self) -> bool {
        *self.plan_mode.lock().unwrap()
    }
}

impl ContextHandle for AgentContext {
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
        self.set_attr(LOOP_COMPLETE_ATTR, Value::Bool(true));
    }

    fn tier_force(&self) -> bool {
        self.tier_force
    }

    fn set_model_tier(&self, tier: &str) -> Result<(), &'static str> {
        if self.tier_force {
            return Err("tier is force-locked for this turn");
        }
        *self.model_tier.lock().unwrap() = Some(tier.to_string());
        Ok(())
    }

    fn request_skill_transition(&self, skill: String, reason: Option<String>) {
        *self.skill_transition.lock().unwrap() = Some(SkillTransitionRequest { skill, reason });
    }

    fn set_voice_response(&self, text: String) {
        *self.voice_text.lock().unwrap() = Some(text);
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

    fn record_milestone(&self, milestone: Milestone) {
        self.milestones.lock().unwrap().push(milestone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ctx() -> AgentContext {
        AgentContext::new("/work", TurnBudget::new(10, 10, Duration::from_secs(60)), false, false)
    }

    #[test]
    fn loop_complete_starts_false_and_latches_true() {
        let c = ctx();
        assert!(!c.loop_complete());
        c.mark_loop_complete();
        assert!(c.loop_complete());
    }

    #[test]
    fn set_model_tier_denied_when_tier_forced() {
        let c = AgentContext::new("/work", TurnBudget::new(10, 10, Duration::from_secs(60)), true, false);
        assert!(c.set_model_tier("deep").is_err());
        assert_eq!(c.resolved_model_tier(), None);
    }

    #[test]
    fn set_model_tier_allowed_without_force() {
        let c = ctx();
        assert!(c.set_model_tier("deep").is_ok());
        assert_eq!(c.resolved_model_tier(), Some("deep".to_string()));
    }

    #[test]
    fn voice_response_also_completes_the_loop() {
        let c = ctx();
        c.set_voice_response("hello".to_string());
        assert!(c.loop_complete());
        assert_eq!(c.take_voice_text(), Some("hello".to_string()));
        assert_eq!(c.take_voice_text(), None);
    }

    #[test]
    fn plan_mode_finalizes_once() {
        let c = AgentContext::new("/work", TurnBudget::new(10, 10, Duration::from_secs(60)), false, true);
        assert!(c.is_plan_mode_active());
        c.set_plan_content("draft".to_string());
        assert_eq!(c.plan_content(), Some("draft".to_string()));
        c.finalize_plan();
        assert!(!c.is_plan_mode_active());
    }

    #[test]
    fn counters_increment_independently() {
        let c = ctx();
        assert_eq!(c.record_llm_call(), 1);
        assert_eq!(c.record_llm_call(), 2);
        assert_eq!(c.record_tool_execution(), 1);
        assert_eq!(c.llm_calls(), 2);
        assert_eq!(c.tool_executions(), 1);
    }

    #[test]
    fn attachments_drain_on_take() {
        let c = ctx();
        c.record_attachment(turnkeep_tools::Attachment {
            kind: turnkeep_tools::AttachmentType::Document,
            filename: "notes.txt".to_string(),
            mime_type: "text/plain".to_string(),
            bytes: vec![1, 2, 3],
        });
        assert_eq!(c.take_attachments().len(), 1);
        assert!(c.take_attachments().is_empty());
    }

    #[test]
    fn milestones_drain_on_take() {
        let c = ctx();
        c.record_milestone(Milestone {
            goal_id: "g1".to_string(),
            task_id: None,
            kind: "task_completed".to_string(),
            detail: "done".to_string(),
        });
        assert_eq!(c.take_milestones().len(), 1);
        assert!(c.take_milestones().is_empty());
    }
}
