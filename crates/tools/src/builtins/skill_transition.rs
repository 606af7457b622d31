//! `skill_transition`, `set_tier`, and `send_voice` tools: thin writes
//! onto the [`ContextHandle`].

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

pub struct SkillTransitionTool {
    pub available_skills: Vec<String>,
}

#[async_trait]
impl Tool for SkillTransitionTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "skill_transition".to_string(),
            description: "Request a transition to a different skill for the rest of the turn."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "skill".to_string(),
                    description: "Target skill name".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "reason".to_string(),
                    description: "Why this transition is requested".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "meta".to_string(),
            },
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(skill) = args.get("skill").and_then(Value::as_str) else {
            return Ok(ToolOutput::fail("missing required param: skill"));
        };
        if !self.available_skills.iter().any(|s| s == skill) {
            return Ok(ToolOutput::fail(format!("NOT_FOUND: skill '{skill}' is not available")));
        }
        let reason = args.get("reason").and_then(Value::as_str).map(str::to_string);
        ctx.request_skill_transition(skill.to_string(), reason);
        Ok(ToolOutput::ok(format!("transition requested to '{skill}'")))
    }
}

pub struct SetTierTool;

const VALID_TIERS: &[&str] = &["balanced", "smart", "coding", "deep"];

#[async_trait]
impl Tool for SetTierTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "set_tier".to_string(),
            description: "Switch the active model tier for the remainder of the turn."
                .to_string(),
            params: vec![ToolParam {
                name: "tier".to_string(),
                description: "balanced | smart | coding | deep".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "meta".to_string(),
            },
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(tier) = args.get("tier").and_then(Value::as_str) else {
            return Ok(ToolOutput::fail("missing required param: tier"));
        };
        if !VALID_TIERS.contains(&tier) {
            return Ok(ToolOutput::fail(format!(
                "invalid tier '{tier}', expected one of {VALID_TIERS:?}"
            )));
        }
        match ctx.set_model_tier(tier) {
            Ok(()) => Ok(ToolOutput::ok(format!("model tier set to {tier}"))),
            Err(reason) => Ok(ToolOutput::fail(format!("POLICY_DENIED: {reason}"))),
        }
    }
}

pub struct SendVoiceTool {
    pub voice_enabled: bool,
}

#[async_trait]
impl Tool for SendVoiceTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "send_voice".to_string(),
            description: "Send the final response as a voice reply and end the turn."
                .to_string(),
            params: vec![ToolParam {
                name: "text".to_string(),
                description: "Text to speak".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "voice".to_string(),
            },
        }
    }

    fn is_enabled(&self, config: &turnkeep_config::RuntimeConfig) -> bool {
        self.voice_enabled && config.voice.enabled
    }

    async fn run(&self, ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let text = args.get("text").and_then(Value::as_str).unwrap_or("").to_string();
        ctx.set_voice_response(text);
        Ok(ToolOutput::ok("voice response queued"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeContext;

    #[tokio::test]
    async fn skill_transition_rejects_unknown_skill() {
        let ctx = FakeContext::new(std::env::temp_dir());
        let tool = SkillTransitionTool { available_skills: vec!["research".to_string()] };
        let mut args = HashMap::new();
        args.insert("skill".to_string(), Value::String("ghost".into()));
        let out = tool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("NOT_FOUND"));
    }

    #[tokio::test]
    async fn set_tier_rejects_invalid_value() {
        let ctx = FakeContext::new(std::env::temp_dir());
        let mut args = HashMap::new();
        args.insert("tier".to_string(), Value::String("ludicrous".into()));
        let out = SetTierTool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
    }

    #[tokio::test]
    async fn set_tier_denied_when_force_locked() {
        let ctx = FakeContext::new(std::env::temp_dir()).with_tier_force(true);
        let mut args = HashMap::new();
        args.insert("tier".to_string(), Value::String("deep".into()));
        let out = SetTierTool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("POLICY_DENIED"));
    }

    #[tokio::test]
    async fn send_voice_marks_loop_complete() {
        let ctx = FakeContext::new(std::env::temp_dir());
        let mut args = HashMap::new();
        args.insert("text".to_string(), Value::String("hello there".into()));
        let out = SendVoiceTool { voice_enabled: true }.run(&ctx, &args).await.unwrap();
        assert!(out.success);
    }
}
