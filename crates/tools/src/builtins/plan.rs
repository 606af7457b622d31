//! Plan Service tools: `plan_get`, `plan_set_content`, `plan_finalize`.
//! Each is gated by the context's plan-mode flag — called outside plan
//! mode, every one of them is POLICY_DENIED even if the tool is enabled.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

fn plan_metadata() -> ToolMetadata {
    ToolMetadata {
        security_level: SecurityLevel::Low,
        read_only: false,
        group: "plan".to_string(),
    }
}

pub struct PlanGetTool;

#[async_trait]
impl Tool for PlanGetTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "plan_get".to_string(),
            description: "Read the current plan document's markdown content.".to_string(),
            params: vec![],
            metadata: plan_metadata(),
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, _args: &HashMap<String, Value>) -> Result<ToolOutput> {
        if !ctx.is_plan_mode_active() {
            return Ok(ToolOutput::fail("POLICY_DENIED: plan mode is not active"));
        }
        Ok(ToolOutput::ok(ctx.plan_content().unwrap_or_default()))
    }
}

pub struct PlanSetContentTool;

#[async_trait]
impl Tool for PlanSetContentTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "plan_set_content".to_string(),
            description: "Replace the current plan document's markdown content.".to_string(),
            params: vec![ToolParam {
                name: "content".to_string(),
                description: "New plan markdown".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: plan_metadata(),
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        if !ctx.is_plan_mode_active() {
            return Ok(ToolOutput::fail("POLICY_DENIED: plan mode is not active"));
        }
        let Some(content) = args.get("content").and_then(Value::as_str) else {
            return Ok(ToolOutput::fail("missing required param: content"));
        };
        ctx.set_plan_content(content.to_string());
        Ok(ToolOutput::ok("plan content updated"))
    }
}

pub struct PlanFinalizeTool;

#[async_trait]
impl Tool for PlanFinalizeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "plan_finalize".to_string(),
            description: "Exit plan mode and return the plan content to the caller.".to_string(),
            params: vec![],
            metadata: plan_metadata(),
        }
    }

    async fn run(&self, ctx: &dyn ContextHandle, _args: &HashMap<String, Value>) -> Result<ToolOutput> {
        if !ctx.is_plan_mode_active() {
            return Ok(ToolOutput::fail("POLICY_DENIED: plan mode is not active"));
        }
        ctx.finalize_plan();
        Ok(ToolOutput::ok("plan finalized"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeContext;

    #[tokio::test]
    async fn plan_get_denied_outside_plan_mode() {
        let ctx = FakeContext::new(std::env::temp_dir());
        let out = PlanGetTool.run(&ctx, &HashMap::new()).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("POLICY_DENIED"));
    }

    #[tokio::test]
    async fn set_then_get_round_trips_in_plan_mode() {
        let ctx = FakeContext::new(std::env::temp_dir()).with_plan_mode(true);
        let mut args = HashMap::new();
        args.insert("content".to_string(), Value::String("# steps".into()));
        let set_out = PlanSetContentTool.run(&ctx, &args).await.unwrap();
        assert!(set_out.success);

        let get_out = PlanGetTool.run(&ctx, &HashMap::new()).await.unwrap();
        assert_eq!(get_out.output, "# steps");
    }

    #[tokio::test]
    async fn finalize_exits_plan_mode() {
        let ctx = FakeContext::new(std::env::temp_dir()).with_plan_mode(true);
        let out = PlanFinalizeTool.run(&ctx, &HashMap::new()).await.unwrap();
        assert!(out.success);
        assert!(!ctx.is_plan_mode_active());
    }
}
