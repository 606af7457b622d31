//! Shell execution tool, gated by the injection guard and a config-driven
//! environment whitelist.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::injection_guard::InjectionGuard;
use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

pub struct RunShellTool {
    pub workspace_root: PathBuf,
    pub env_whitelist: Vec<String>,
    pub max_timeout_secs: u64,
}

#[async_trait]
impl Tool for RunShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_shell".to_string(),
            description: "Execute a shell command within the workspace directory. \
                Each invocation runs in a fresh shell — `cd` does not persist \
                between calls. Chain commands with `&&` if you need them to \
                share working directory or state."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "command".to_string(),
                    description: "Shell command to execute".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "timeout_secs".to_string(),
                    description: "Max execution time in seconds (default: 30)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: false,
                group: "shell".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("missing required param: command"))?;

        if let Some(pattern) = InjectionGuard::check_command(command) {
            return Ok(ToolOutput::fail(format!(
                "blocked: command matched denied pattern \"{pattern}\""
            )));
        }

        let requested: u64 = args.get("timeout_secs").and_then(Value::as_u64).unwrap_or(30);
        let timeout_secs = requested.clamp(1, self.max_timeout_secs);

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .env_clear();
        for key in &self.env_whitelist {
            if key == "LD_PRELOAD" {
                continue;
            }
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        if !self.env_whitelist.iter().any(|k| k == "PATH") {
            if let Ok(path) = std::env::var("PATH") {
                cmd.env("PATH", path);
            }
        }
        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();

        let output = match tokio::time::timeout(
            std::time::Duration::from_secs(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(out) => out?,
            Err(_) => {
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGKILL);
                    }
                }
                return Ok(ToolOutput::fail(format!(
                    "command timed out after {timeout_secs}s"
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}\n[stderr] {stderr}")
        };

        let max_output = 32768;
        let result = if combined.len() > max_output {
            format!("{}…[truncated at {} bytes]", &combined[..max_output], max_output)
        } else {
            combined
        };

        Ok(ToolOutput {
            success: output.status.success(),
            output: result,
            attachment: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeContext;

    fn tool(root: PathBuf) -> RunShellTool {
        RunShellTool {
            workspace_root: root,
            env_whitelist: vec!["PATH".to_string()],
            max_timeout_secs: 30,
        }
    }

    #[tokio::test]
    async fn runs_benign_command() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FakeContext::new(dir.path().to_path_buf());
        let t = tool(dir.path().to_path_buf());
        let mut args = HashMap::new();
        args.insert("command".to_string(), Value::String("echo hi".into()));
        let out = t.run(&ctx, &args).await.unwrap();
        assert!(out.success);
        assert!(out.output.contains("hi"));
    }

    #[tokio::test]
    async fn blocks_denied_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FakeContext::new(dir.path().to_path_buf());
        let t = tool(dir.path().to_path_buf());
        let mut args = HashMap::new();
        args.insert("command".to_string(), Value::String("rm -rf /".into()));
        let out = t.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("blocked"));
    }

    #[tokio::test]
    async fn clamps_timeout_to_configured_max() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FakeContext::new(dir.path().to_path_buf());
        let mut t = tool(dir.path().to_path_buf());
        t.max_timeout_secs = 2;
        let mut args = HashMap::new();
        args.insert("command".to_string(), Value::String("sleep 10".into()));
        args.insert("timeout_secs".to_string(), Value::from(999));
        let out = t.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("timed out after 2s"));
    }
}
