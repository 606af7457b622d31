//! `remind_me`: appends a JSON-lines reminder record that the Auto
//! Scheduler's proactive tick surfaces later. Low-security, non-gated
//! convenience tool.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;

use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

pub struct RemindMeTool {
    pub data_dir: PathBuf,
}

#[async_trait]
impl Tool for RemindMeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "remind_me".to_string(),
            description: "Add a reminder that the agent will surface proactively.".to_string(),
            params: vec![
                ToolParam {
                    name: "text".to_string(),
                    description: "Reminder text".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "when".to_string(),
                    description: "When to surface the reminder (natural language, optional)"
                        .to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: false,
                group: "calendar".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(text) = args.get("text").and_then(Value::as_str) else {
            return Ok(ToolOutput::fail("missing required param: text"));
        };
        let when = args.get("when").and_then(Value::as_str).unwrap_or("");

        std::fs::create_dir_all(&self.data_dir)?;
        let path = self.data_dir.join("reminders.jsonl");

        let record = serde_json::json!({
            "text": text,
            "when": when,
            "added_at": chrono::Utc::now().to_rfc3339(),
            "surfaced": false,
        });

        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
        file.lock_exclusive()?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        file.unlock()?;

        let when_note = if when.is_empty() { String::new() } else { format!(" (when: {when})") };
        Ok(ToolOutput::ok(format!("reminder added: '{text}'{when_note}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeContext;

    #[tokio::test]
    async fn appends_jsonl_record() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FakeContext::new(dir.path().to_path_buf());
        let tool = RemindMeTool { data_dir: dir.path().to_path_buf() };

        let mut args = HashMap::new();
        args.insert("text".to_string(), Value::String("water the plants".into()));
        let out = tool.run(&ctx, &args).await.unwrap();
        assert!(out.success);

        let contents = std::fs::read_to_string(dir.path().join("reminders.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("water the plants"));
    }
}
