//! Tool dispatch: converts a raw `turnkeep_tools::ToolOutput` into the
//! typed `ToolResult`/`FailureKind` pair the turn engine matches on,
//! enforcing registry enablement, per-tool timeouts, and (on Unix) a
//! platform sandbox around shell children.

pub mod sandbox;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use turnkeep_config::RuntimeConfig;
use turnkeep_tools::{ContextHandle, ToolOutput, ToolRegistry};

// ── Failure taxonomy (§3, §7) ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureKind {
    #[error("validation")]
    Validation,
    #[error("policy denied")]
    PolicyDenied,
    #[error("rate limited")]
    RateLimited,
    #[error("timeout")]
    Timeout,
    #[error("upstream error")]
    UpstreamError,
    #[error("disabled")]
    Disabled,
    #[error("not found")]
    NotFound,
    #[error("internal error")]
    InternalError,
}

/// The typed result the turn engine appends as a tool-role message.
/// Invariant: `success ⇒ error.is_none()`; `!success ⇒ failure_kind.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub attachment: Option<turnkeep_tools::Attachment>,
}

impl ToolResult {
    fn ok(output: ToolOutput) -> Self {
        Self {
            success: true,
            output: output.output,
            error: None,
            failure_kind: None,
            attachment: output.attachment,
        }
    }

    fn fail(output: ToolOutput) -> Self {
        let kind = classify(&output.output);
        Self {
            success: false,
            error: Some(output.output.clone()),
            output: output.output,
            failure_kind: Some(kind),
            attachment: output.attachment,
        }
    }

    fn denied(message: impl Into<String>, kind: FailureKind) -> Self {
        let message = message.into();
        Self {
            success: false,
            output: message.clone(),
            error: Some(message),
            failure_kind: Some(kind),
            attachment: None,
        }
    }
}

/// Classifies a failed tool's message into a `FailureKind`. Tools are
/// written to surface a recognizable tag in their failure text
/// (`"validation: ..."`, `"upstream: ..."`, `"blocked: ..."`, a literal
/// `"NOT_FOUND"`/`"POLICY_DENIED"` prefix, or `"... timed out ..."`); this
/// mirrors how the teacher's tools format their own error strings rather
/// than carrying a second, parallel classification channel.
fn classify(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("rate-limit") || lower.contains("rate limit") {
        FailureKind::RateLimited
    } else if lower.contains("timed out") {
        FailureKind::Timeout
    } else if lower.contains("policy_denied")
        || lower.contains("blocked:")
        || lower.contains("force-locked")
        || lower.contains("plan mode is not active")
    {
        FailureKind::PolicyDenied
    } else if lower.contains("not_found") || lower.contains("not found") {
        FailureKind::NotFound
    } else if lower.contains("upstream") {
        FailureKind::UpstreamError
    } else {
        FailureKind::Validation
    }
}

// ── Workspace boundary helper ────────────────────────────────────────────────

/// Resolves `target` against `workspace_root` and rejects anything that
/// canonicalizes outside it. Built-in tools apply this per-call
/// (`fs::resolve_in_workspace`); this is the same guard exposed at the
/// dispatch layer for callers (e.g. the Auto Scheduler) that stage a
/// path before a tool call exists to validate it.
pub fn ensure_within_workspace(workspace_root: &Path, target: &Path) -> anyhow::Result<PathBuf> {
    let canonical_root = workspace_root.canonicalize()?;
    let joined = if target.is_absolute() {
        target.to_path_buf()
    } else {
        canonical_root.join(target)
    };
    let canonical_target = joined.canonicalize()?;

    if !canonical_target.starts_with(&canonical_root) {
        anyhow::bail!(
            "path escapes workspace boundary: {}",
            canonical_target.display()
        );
    }
    Ok(canonical_target)
}

// ── ISO-8601 duration parsing (turn deadlines, §3a) ──────────────────────────

/// Parses a small subset of ISO-8601 durations: `P[nD]T[nH][nM][nS]`, e.g.
/// `PT1H`, `PT30M`, `PT90S`, `P1DT2H`. Returns `None` on anything else —
/// the caller falls back to a configured default rather than failing a
/// turn over a malformed setting.
pub fn parse_iso8601_duration(raw: &str) -> Option<Duration> {
    let raw = raw.strip_prefix('P')?;
    let (days_part, rest) = match raw.split_once('T') {
        Some((d, t)) => (d, t),
        None => (raw, ""),
    };

    let mut total_secs: u64 = 0;
    if !days_part.is_empty() {
        let days: u64 = days_part.strip_suffix('D')?.parse().ok()?;
        total_secs += days * 86_400;
    }

    let mut remaining = rest;
    for (suffix, unit_secs) in [("H", 3_600u64), ("M", 60), ("S", 1)] {
        if let Some(idx) = remaining.find(suffix) {
            let (num, tail) = remaining.split_at(idx);
            let value: u64 = num.parse().ok()?;
            total_secs += value * unit_secs;
            remaining = &tail[1..];
        }
    }
    if !remaining.is_empty() {
        return None;
    }
    Some(Duration::from_secs(total_secs))
}

// ── Tool Executor (C2 dispatch seam) ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workspace_root: PathBuf,
    pub default_timeout: Duration,
    pub per_tool_timeout: HashMap<String, Duration>,
}

impl ExecutorConfig {
    pub fn new(workspace_root: PathBuf) -> Self {
        Self {
            workspace_root,
            default_timeout: Duration::from_secs(30),
            per_tool_timeout: HashMap::new(),
        }
    }

    fn timeout_for(&self, tool_name: &str) -> Duration {
        self.per_tool_timeout
            .get(tool_name)
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

/// Orchestrates a single tool invocation: registry lookup, enablement
/// gate, timeout enforcement, and conversion into a typed `ToolResult`.
/// Owns no session state — the turn engine calls `execute` once per
/// `ToolCall` in the batch the LLM returned.
pub struct ToolExecutor {
    config: ExecutorConfig,
}

impl ToolExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub async fn execute(
        &self,
        registry: &ToolRegistry,
        runtime_config: &RuntimeConfig,
        ctx: &dyn ContextHandle,
        tool_name: &str,
        args: &HashMap<String, Value>,
    ) -> ToolResult {
        let Some(tool) = registry.get(tool_name) else {
            return ToolResult::denied(
                format!("unknown tool: {tool_name}"),
                FailureKind::NotFound,
            );
        };

        if !tool.is_enabled(runtime_config) {
            return ToolResult::denied(
                format!("tool '{tool_name}' is currently disabled"),
                FailureKind::Disabled,
            );
        }

        let timeout = self.config.timeout_for(tool_name);
        info!(tool = tool_name, timeout_secs = timeout.as_secs(), "dispatching tool");

        match tokio::time::timeout(timeout, tool.run(ctx, args)).await {
            Ok(Ok(output)) if output.success => ToolResult::ok(output),
            Ok(Ok(output)) => ToolResult::fail(output),
            Ok(Err(err)) => {
                warn!(tool = tool_name, error = %err, "tool execution returned an error");
                ToolResult::denied(err.to_string(), FailureKind::UpstreamError)
            }
            Err(_) => {
                warn!(tool = tool_name, "tool execution exceeded its timeout");
                ToolResult::denied(
                    format!("'{tool_name}' timed out after {}s", timeout.as_secs()),
                    FailureKind::Timeout,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use std::fs;

    use async_trait::async_trait;
    use turnkeep_tools::test_support::FakeContext;
    use turnkeep_tools::{SecurityLevel, Tool, ToolMetadata, ToolParam, ToolSpec};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "slow".to_string(),
                description: "sleeps".to_string(),
                params: vec![],
                metadata: ToolMetadata {
                    security_level: SecurityLevel::Low,
                    read_only: true,
                    group: "test".to_string(),
                },
            }
        }

        async fn run(&self, _ctx: &dyn ContextHandle, _args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolOutput::ok("done"))
        }
    }

    struct DisabledTool;

    #[async_trait]
    impl Tool for DisabledTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "off".to_string(),
                description: "never enabled".to_string(),
                params: vec![ToolParam::default()],
                metadata: ToolMetadata::default(),
            }
        }

        fn is_enabled(&self, _config: &RuntimeConfig) -> bool {
            false
        }

        async fn run(&self, _ctx: &dyn ContextHandle, _args: &Map<String, Value>) -> anyhow::Result<ToolOutput> {
            Ok(ToolOutput::ok("should never run"))
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let registry = ToolRegistry::default();
        let config = RuntimeConfig::default();
        let executor = ToolExecutor::new(ExecutorConfig::new(std::env::temp_dir()));
        let ctx = FakeContext::new(std::env::temp_dir());

        let result = executor.execute(&registry, &config, &ctx, "nope", &Map::new()).await;
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::NotFound));
    }

    #[tokio::test]
    async fn disabled_tool_short_circuits() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(DisabledTool));
        let config = RuntimeConfig::default();
        let executor = ToolExecutor::new(ExecutorConfig::new(std::env::temp_dir()));
        let ctx = FakeContext::new(std::env::temp_dir());

        let result = executor.execute(&registry, &config, &ctx, "off", &Map::new()).await;
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Disabled));
    }

    #[tokio::test]
    async fn slow_tool_is_classified_as_timeout() {
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(SlowTool));
        let config = RuntimeConfig::default();
        let mut exec_config = ExecutorConfig::new(std::env::temp_dir());
        exec_config.default_timeout = Duration::from_millis(50);
        let executor = ToolExecutor::new(exec_config);
        let ctx = FakeContext::new(std::env::temp_dir());

        let result = executor.execute(&registry, &config, &ctx, "slow", &Map::new()).await;
        assert!(!result.success);
        assert_eq!(result.failure_kind, Some(FailureKind::Timeout));
    }

    #[test]
    fn workspace_guard_rejects_escape() -> anyhow::Result<()> {
        let base = std::env::temp_dir().join("turnkeep-exec-workspace-test");
        let child = base.join("safe");
        fs::create_dir_all(&child)?;
        assert!(ensure_within_workspace(&base, &PathBuf::from("../")).is_err());
        Ok(())
    }

    #[test]
    fn workspace_guard_accepts_child_path() -> anyhow::Result<()> {
        let base = std::env::temp_dir().join("turnkeep-exec-ws-accept-test");
        let child = base.join("subdir");
        fs::create_dir_all(&child)?;
        assert!(ensure_within_workspace(&base, &PathBuf::from("subdir")).is_ok());
        Ok(())
    }

    #[test]
    fn classifies_known_prefixes() {
        assert_eq!(classify("validation: bad field"), FailureKind::Validation);
        assert_eq!(classify("blocked: command matched denied pattern"), FailureKind::PolicyDenied);
        assert_eq!(classify("upstream: connection reset"), FailureKind::UpstreamError);
        assert_eq!(classify("not found: goal 'x'"), FailureKind::NotFound);
        assert_eq!(classify("search provider is rate-limited"), FailureKind::RateLimited);
        assert_eq!(classify("command timed out after 5s"), FailureKind::Timeout);
    }

    #[test]
    fn parses_simple_durations() {
        assert_eq!(parse_iso8601_duration("PT1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_iso8601_duration("PT30M"), Some(Duration::from_secs(1800)));
        assert_eq!(parse_iso8601_duration("PT90S"), Some(Duration::from_secs(90)));
        assert_eq!(parse_iso8601_duration("P1DT2H"), Some(Duration::from_secs(86400 + 7200)));
        assert_eq!(parse_iso8601_duration("garbage"), None);
    }
}
