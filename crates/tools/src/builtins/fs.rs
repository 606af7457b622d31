//! Filesystem tools: read_file, write_file, list_directory,
//! create_directory, delete, file_info, send_file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

use crate::{
    Attachment, AttachmentType, ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput,
    ToolParam, ToolSpec,
};

/// Finds the largest byte offset ≤ `max` that falls on a UTF-8 character
/// boundary. Safe to use as `&s[..truncate_byte_boundary(s, max)]`.
pub(super) fn truncate_byte_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

fn get_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// Resolves `rel_path` against `root`, rejecting any path that escapes it.
/// `must_exist = false` allows the resolved path to not exist yet, so long
/// as its deepest existing ancestor is still inside `root`.
fn resolve_in_workspace(root: &Path, rel_path: &str, must_exist: bool) -> Result<PathBuf> {
    let root_canonical = root
        .canonicalize()
        .map_err(|e| anyhow::anyhow!("invalid workspace root: {e}"))?;
    let full = root.join(rel_path);

    if let Ok(canonical) = full.canonicalize() {
        if !canonical.starts_with(&root_canonical) {
            bail!("path traversal / Invalid path");
        }
        return Ok(canonical);
    }
    if must_exist {
        bail!("path traversal / Invalid path");
    }

    let mut ancestor = full
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path traversal / Invalid path"))?
        .to_path_buf();
    while !ancestor.exists() {
        ancestor = match ancestor.parent() {
            Some(p) => p.to_path_buf(),
            None => bail!("path traversal / Invalid path"),
        };
    }
    let ancestor_canonical = ancestor.canonicalize()?;
    if !ancestor_canonical.starts_with(&root_canonical) {
        bail!("path traversal / Invalid path");
    }
    Ok(full)
}

pub struct ReadFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file".to_string(),
            description: "Read the contents of a file within the workspace.".to_string(),
            params: vec![
                ToolParam {
                    name: "path".to_string(),
                    description: "Relative path from workspace root".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "max_bytes".to_string(),
                    description: "Maximum bytes to read (default: 65536)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let max_bytes: usize = args
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|v| v as usize)
            .unwrap_or(65536);

        let canonical = match resolve_in_workspace(&self.workspace_root, rel_path, true) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };

        let content = std::fs::read_to_string(&canonical)?;
        let truncated = if content.len() > max_bytes {
            let end = truncate_byte_boundary(&content, max_bytes);
            format!("{}…[truncated at {} bytes]", &content[..end], max_bytes)
        } else {
            content
        };

        Ok(ToolOutput::ok(truncated))
    }
}

pub struct WriteFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file".to_string(),
            description: "Write content to a file within the workspace (creates, overwrites, \
                or appends)."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "path".to_string(),
                    description: "Relative path from workspace root".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "content".to_string(),
                    description: "File content to write".to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "append".to_string(),
                    description: "Append instead of overwrite (default: false)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let Some(content) = get_str(args, "content") else {
            return Ok(ToolOutput::fail("missing required param: content"));
        };
        let append = args.get("append").and_then(Value::as_bool).unwrap_or(false);

        let full = match resolve_in_workspace(&self.workspace_root, rel_path, false) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };

        if append {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)?;
            file.write_all(content.as_bytes())?;
        } else {
            std::fs::write(&full, content)?;
        }

        Ok(ToolOutput::ok(format!(
            "wrote {} bytes to {}",
            content.len(),
            rel_path
        )))
    }
}

pub struct ListDirectoryTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_directory".to_string(),
            description: "List entries of a directory within the workspace.".to_string(),
            params: vec![ToolParam {
                name: "path".to_string(),
                description: "Relative path from workspace root (default: \".\")".to_string(),
                required: false,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path").unwrap_or(".");
        let dir = match resolve_in_workspace(&self.workspace_root, rel_path, true) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };
        if !dir.is_dir() {
            return Ok(ToolOutput::fail(format!("not a directory: {rel_path}")));
        }

        let mut entries: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let marker = if entry.file_type()?.is_dir() { "/" } else { "" };
            entries.push(format!("{name}{marker}"));
        }
        entries.sort();
        Ok(ToolOutput::ok(entries.join("\n")))
    }
}

pub struct CreateDirectoryTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for CreateDirectoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "create_directory".to_string(),
            description: "Create a directory (and parents) within the workspace.".to_string(),
            params: vec![ToolParam {
                name: "path".to_string(),
                description: "Relative path from workspace root".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let full = match resolve_in_workspace(&self.workspace_root, rel_path, false) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };
        std::fs::create_dir_all(&full)?;
        Ok(ToolOutput::ok(format!("created directory {rel_path}")))
    }
}

pub struct DeleteTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for DeleteTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "delete".to_string(),
            description: "Delete a file or directory (recursively) within the workspace."
                .to_string(),
            params: vec![ToolParam {
                name: "path".to_string(),
                description: "Relative path from workspace root".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::High,
                read_only: false,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let target = match resolve_in_workspace(&self.workspace_root, rel_path, true) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };

        if target.is_dir() {
            std::fs::remove_dir_all(&target)?;
        } else {
            std::fs::remove_file(&target)?;
        }
        Ok(ToolOutput::ok(format!("deleted {rel_path}")))
    }
}

pub struct FileInfoTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for FileInfoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "file_info".to_string(),
            description: "Report size, kind, and modification time for a workspace path."
                .to_string(),
            params: vec![ToolParam {
                name: "path".to_string(),
                description: "Relative path from workspace root".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let target = match resolve_in_workspace(&self.workspace_root, rel_path, true) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };

        let meta = std::fs::metadata(&target)?;
        let kind = if meta.is_dir() { "directory" } else { "file" };
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Ok(ToolOutput::ok(format!(
            "kind={kind} size={} modified_unix={modified}",
            meta.len()
        )))
    }
}

fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "json" => "application/json",
        "yml" | "yaml" => "text/yaml",
        "py" => "text/x-python",
        "java" => "text/x-java",
        "js" => "text/javascript",
        "ts" => "text/typescript",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

pub struct SendFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for SendFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "send_file".to_string(),
            description: "Attach a workspace file to the turn's response.".to_string(),
            params: vec![ToolParam {
                name: "path".to_string(),
                description: "Relative path from workspace root".to_string(),
                required: true,
                ..Default::default()
            }],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Low,
                read_only: true,
                group: "filesystem".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let rel_path = get_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let target = match resolve_in_workspace(&self.workspace_root, rel_path, true) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(e.to_string())),
        };
        if target.is_dir() {
            return Ok(ToolOutput::fail("send_file requires a file, not a directory"));
        }

        let bytes = std::fs::read(&target)?;
        let filename = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| rel_path.to_string());
        let ext = target
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = mime_for_extension(&ext).to_string();
        let kind = if mime_type.starts_with("image/") {
            AttachmentType::Image
        } else {
            AttachmentType::Document
        };

        let note = format!("attached {filename} ({} bytes, {mime_type})", bytes.len());
        Ok(ToolOutput::ok(note).with_attachment(Attachment {
            kind,
            filename,
            mime_type,
            bytes,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_ascii() {
        assert_eq!(truncate_byte_boundary("abcdef", 3), 3);
    }

    #[test]
    fn truncate_beyond_string_len() {
        assert_eq!(truncate_byte_boundary("abc", 100), 3);
    }

    #[test]
    fn truncate_multibyte_char_boundary() {
        let s = "café";
        assert_eq!(truncate_byte_boundary(s, 4), 3);
        assert_eq!(truncate_byte_boundary(s, 5), 5);
    }

    #[test]
    fn mime_table_known_and_unknown() {
        assert_eq!(mime_for_extension("png"), "image/png");
        assert_eq!(mime_for_extension("PDF"), "application/pdf");
        assert_eq!(mime_for_extension("weird"), "application/octet-stream");
    }

    #[tokio::test]
    async fn write_then_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::test_support::FakeContext::new(dir.path().to_path_buf());
        let write = WriteFileTool {
            workspace_root: dir.path().to_path_buf(),
        };
        let mut args = HashMap::new();
        args.insert("path".to_string(), Value::String("note.txt".into()));
        args.insert("content".to_string(), Value::String("hello".into()));
        let out = write.run(&ctx, &args).await.unwrap();
        assert!(out.success);

        let read = ReadFileTool {
            workspace_root: dir.path().to_path_buf(),
        };
        let mut args = HashMap::new();
        args.insert("path".to_string(), Value::String("note.txt".into()));
        let out = read.run(&ctx, &args).await.unwrap();
        assert_eq!(out.output, "hello");
    }

    #[tokio::test]
    async fn read_file_rejects_path_escape() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = crate::test_support::FakeContext::new(dir.path().to_path_buf());
        let read = ReadFileTool {
            workspace_root: dir.path().to_path_buf(),
        };
        let mut args = HashMap::new();
        args.insert("path".to_string(), Value::String("../../etc/passwd".into()));
        let out = read.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
    }
}
