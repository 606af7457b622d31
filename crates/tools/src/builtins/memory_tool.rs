//! `memory` tool: a single tool name dispatching on an `operation` field
//! to the `MemoryPort`, per the memory_add/memory_search/memory_update/
//! memory_promote/memory_forget surface.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::ports::{
    MemoryAddRequest, MemoryForgetRequest, MemoryLayer, MemoryPort, MemoryPromoteRequest,
    MemorySearchRequest, MemoryUpdateRequest,
};
use crate::{ContextHandle, SecurityLevel, Tool, ToolMetadata, ToolOutput, ToolParam, ToolSpec};

fn get_str<'a>(args: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn get_f32(args: &HashMap<String, Value>, key: &str) -> Option<f32> {
    args.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn parse_layer(s: Option<&str>) -> Option<MemoryLayer> {
    match s?.to_lowercase().as_str() {
        "semantic" => Some(MemoryLayer::Semantic),
        "episodic" => Some(MemoryLayer::Episodic),
        "procedural" => Some(MemoryLayer::Procedural),
        _ => None,
    }
}

pub struct MemoryTool {
    pub port: Arc<dyn MemoryPort>,
}

#[async_trait]
impl Tool for MemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "memory".to_string(),
            description: "Manage long-term memory: memory_add, memory_search, memory_update, \
                memory_promote, memory_forget."
                .to_string(),
            params: vec![
                ToolParam {
                    name: "operation".to_string(),
                    description: "memory_add | memory_search | memory_update | memory_promote \
                        | memory_forget"
                        .to_string(),
                    required: true,
                    ..Default::default()
                },
                ToolParam {
                    name: "content".to_string(),
                    description: "Memory content (memory_add/update/promote)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "query".to_string(),
                    description: "Search query text (memory_search/forget)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "id".to_string(),
                    description: "Memory item id (update/promote/forget)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "fingerprint".to_string(),
                    description: "Memory item fingerprint (update/promote/forget)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "layer".to_string(),
                    description: "semantic | episodic | procedural".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "limit".to_string(),
                    description: "Max results for memory_search, 1-50 (default: 10)".to_string(),
                    required: false,
                    ..Default::default()
                },
                ToolParam {
                    name: "confidence".to_string(),
                    description: "0.0-1.0 (memory_add/update)".to_string(),
                    required: false,
                    ..Default::default()
                },
            ],
            metadata: ToolMetadata {
                security_level: SecurityLevel::Medium,
                read_only: false,
                group: "memory".to_string(),
            },
        }
    }

    async fn run(&self, _ctx: &dyn ContextHandle, args: &HashMap<String, Value>) -> Result<ToolOutput> {
        let Some(operation) = get_str(args, "operation") else {
            return Ok(ToolOutput::fail("missing required param: operation"));
        };

        let result = match operation {
            "memory_add" => {
                let Some(content) = get_str(args, "content") else {
                    return Ok(ToolOutput::fail("memory_add requires 'content'"));
                };
                self.port
                    .add(MemoryAddRequest {
                        layer: parse_layer(get_str(args, "layer")),
                        item_type: get_str(args, "item_type").map(str::to_string),
                        title: get_str(args, "title").map(str::to_string),
                        content: content.to_string(),
                        tags: Vec::new(),
                        references: Vec::new(),
                        confidence: get_f32(args, "confidence").map(|c| c.clamp(0.0, 1.0)),
                        salience: get_f32(args, "salience").map(|s| s.clamp(0.0, 1.0)),
                        ttl_days: args.get("ttl_days").and_then(Value::as_u64).map(|v| v as u32),
                    })
                    .await
            }
            "memory_search" => {
                let Some(query) = get_str(args, "query") else {
                    return Ok(ToolOutput::fail("memory_search requires 'query'"));
                };
                let limit = args
                    .get("limit")
                    .and_then(Value::as_u64)
                    .map(|v| v as usize)
                    .unwrap_or(10)
                    .clamp(1, 50);
                self.port
                    .search(MemorySearchRequest {
                        query_text: query.to_string(),
                        layer: parse_layer(get_str(args, "layer")),
                        limit,
                    })
                    .await
            }
            "memory_update" => {
                if get_str(args, "id").is_none() && get_str(args, "fingerprint").is_none() {
                    return Ok(ToolOutput::fail(
                        "memory_update requires 'id' or 'fingerprint'",
                    ));
                }
                if get_str(args, "content").is_none()
                    && get_str(args, "title").is_none()
                    && get_f32(args, "confidence").is_none()
                {
                    return Ok(ToolOutput::fail(
                        "memory_update requires at least one field to change",
                    ));
                }
                self.port
                    .update(MemoryUpdateRequest {
                        id: get_str(args, "id").map(str::to_string),
                        fingerprint: get_str(args, "fingerprint").map(str::to_string),
                        content: get_str(args, "content").map(str::to_string),
                        title: get_str(args, "title").map(str::to_string),
                        tags: None,
                        confidence: get_f32(args, "confidence").map(|c| c.clamp(0.0, 1.0)),
                        salience: get_f32(args, "salience").map(|s| s.clamp(0.0, 1.0)),
                    })
                    .await
            }
            "memory_promote" => {
                let Some(target_layer) = parse_layer(get_str(args, "layer")) else {
                    return Ok(ToolOutput::fail(
                        "memory_promote requires a valid 'layer' target",
                    ));
                };
                self.port
                    .promote(MemoryPromoteRequest {
                        id: get_str(args, "id").map(str::to_string),
                        fingerprint: get_str(args, "fingerprint").map(str::to_string),
                        content: get_str(args, "content").map(str::to_string),
                        target_layer,
                    })
                    .await
            }
            "memory_forget" => self
                .port
                .forget(MemoryForgetRequest {
                    id: get_str(args, "id").map(str::to_string),
                    fingerprint: get_str(args, "fingerprint").map(str::to_string),
                    layer: parse_layer(get_str(args, "layer")),
                    query_text: get_str(args, "query").map(str::to_string),
                })
                .await,
            other => {
                return Ok(ToolOutput::fail(format!("unknown memory operation '{other}'")));
            }
        };

        Ok(match result {
            Ok(summary) => ToolOutput::ok(summary),
            Err(e) => ToolOutput::fail(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MemoryPortError;
    use crate::test_support::FakeContext;
    use std::sync::Mutex;

    struct FakePort {
        added: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MemoryPort for FakePort {
        async fn add(&self, req: MemoryAddRequest) -> Result<String, MemoryPortError> {
            self.added.lock().unwrap().push(req.content.clone());
            Ok(format!("added: {}", req.content))
        }
        async fn search(&self, req: MemorySearchRequest) -> Result<String, MemoryPortError> {
            let matched = self
                .added
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.to_lowercase().contains(&req.query_text.to_lowercase()))
                .count();
            Ok(format!("{matched} match(es)"))
        }
        async fn update(&self, _req: MemoryUpdateRequest) -> Result<String, MemoryPortError> {
            Ok("updated".to_string())
        }
        async fn promote(&self, _req: MemoryPromoteRequest) -> Result<String, MemoryPortError> {
            Ok("promoted".to_string())
        }
        async fn forget(&self, _req: MemoryForgetRequest) -> Result<String, MemoryPortError> {
            Ok("forgotten".to_string())
        }
    }

    #[tokio::test]
    async fn add_then_search_finds_item() {
        let port = Arc::new(FakePort { added: Mutex::new(Vec::new()) });
        let tool = MemoryTool { port: port.clone() };
        let ctx = FakeContext::new(std::env::temp_dir());

        let mut add_args = HashMap::new();
        add_args.insert("operation".to_string(), Value::String("memory_add".into()));
        add_args.insert("content".to_string(), Value::String("Use Redis for caching".into()));
        let out = tool.run(&ctx, &add_args).await.unwrap();
        assert!(out.success);

        let mut search_args = HashMap::new();
        search_args.insert("operation".to_string(), Value::String("memory_search".into()));
        search_args.insert("query".to_string(), Value::String("redis".into()));
        let out = tool.run(&ctx, &search_args).await.unwrap();
        assert!(out.success);
        assert!(out.output.contains("1 match"));
    }

    #[tokio::test]
    async fn update_without_fields_is_validation_error() {
        let port = Arc::new(FakePort { added: Mutex::new(Vec::new()) });
        let tool = MemoryTool { port };
        let ctx = FakeContext::new(std::env::temp_dir());

        let mut args = HashMap::new();
        args.insert("operation".to_string(), Value::String("memory_update".into()));
        args.insert("id".to_string(), Value::String("abc".into()));
        let out = tool.run(&ctx, &args).await.unwrap();
        assert!(!out.success);
    }
}
