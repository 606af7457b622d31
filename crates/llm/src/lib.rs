use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

// ── Chat message types for structured tool calling ───────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in a chat conversation, shaped for the OpenAI-compatible
/// `/chat/completions` endpoint every provider in [`Provider`] accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only present on assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// When role == Tool, identifies which tool call this result is for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content: None, tool_calls, tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: Some(content.into()), tool_calls: vec![], tool_call_id: Some(tool_call_id.into()) }
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to correlate tool results).
    /// Some providers omit it, in which case we generate one.
    #[serde(default)]
    pub id: String,
    /// Always "function" for OpenAI-compatible APIs.
    #[serde(default = "default_tool_call_type")]
    pub r#type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

/// The function name and arguments within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Arguments, already parsed into a JSON object regardless of whether the
    /// wire response encoded them as a JSON string or an inline object.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Outcome of a single [`LlmClient::call`].
#[derive(Debug, Clone)]
pub enum LlmResponse {
    /// The model produced a terminal text reply.
    Final { text: String },
    /// The model wants to invoke one or more tools.
    ToolCalls { calls: Vec<ToolCall> },
}

/// LLM providers reachable through a `/v1/chat/completions`-style endpoint.
///
/// Every variant here is one a tier in the model router can name as
/// `"<provider>/<model-id>"`. The base URL is a default, always overridable
/// per provider via [`ProviderConfig::base_url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    OpenAi,
    OpenRouter,
    Anthropic,
    Google,
    Moonshot,
    Groq,
    Together,
    Fireworks,
    DeepSeek,
    Mistral,
    XAi,
    Perplexity,
    Zhipu,
    Qwen,
    Cerebras,
    DeepInfra,
}

impl Provider {
    /// Parses a provider key as it appears in a `"<provider>/<model-id>"`
    /// tier string or a settings `LLM providers` entry.
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "openai" => Self::OpenAi,
            "openrouter" => Self::OpenRouter,
            "anthropic" => Self::Anthropic,
            "google" => Self::Google,
            "moonshot" | "kimi" => Self::Moonshot,
            "groq" => Self::Groq,
            "together" => Self::Together,
            "fireworks" => Self::Fireworks,
            "deepseek" => Self::DeepSeek,
            "mistral" => Self::Mistral,
            "xai" => Self::XAi,
            "perplexity" => Self::Perplexity,
            "zhipu" => Self::Zhipu,
            "qwen" => Self::Qwen,
            "cerebras" => Self::Cerebras,
            "deepinfra" => Self::DeepInfra,
            _ => return None,
        })
    }

    /// Known default base URL, used unless the provider config overrides it.
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::Moonshot => "https://api.moonshot.ai/v1",
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::Together => "https://api.together.xyz/v1",
            Self::Fireworks => "https://api.fireworks.ai/inference/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::XAi => "https://api.x.ai/v1",
            Self::Perplexity => "https://api.perplexity.ai",
            Self::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Self::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
            Self::Cerebras => "https://api.cerebras.ai/v1",
            Self::DeepInfra => "https://api.deepinfra.com/v1/openai",
        }
    }
}

/// Per-provider settings, mirroring the `LLM providers` settings section:
/// name, `baseUrl`, `requestTimeoutSeconds`, `apiKey`, `apiKeyPresent`.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub request_timeout_secs: u32,
}

impl ProviderConfig {
    pub fn new(provider: Provider, api_key: Option<String>) -> Self {
        Self { provider, api_key, base_url: None, request_timeout_secs: 300 }
    }

    /// Whether this provider has a usable key and is eligible for the router
    /// to select. Mirrors settings' `apiKeyPresent` flag.
    pub fn api_key_present(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }

    fn resolved_base_url(&self) -> String {
        self.base_url.clone().unwrap_or_else(|| self.provider.default_base_url().to_string())
    }

    /// `requestTimeoutSeconds`, clamped to `[1, 3600]`.
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.clamp(1, 3600) as u64)
    }
}

/// A single client implementation serving every [`Provider`] by varying only
/// `base_url` + `api_key` + model id, since they all speak the same
/// OpenAI-compatible `/chat/completions` wire format.
#[derive(Debug, Clone, Default)]
pub struct LlmClient {
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// `call(model, messages, tools, reasoning?, temperature?, timeout) →
    /// LlmResponse`. Enforces `requestTimeoutSeconds` from `config` as an
    /// outer deadline; network errors surface as `Err` (the caller maps
    /// these to `UPSTREAM_ERROR`). HTTP 429 is returned as-is, not retried
    /// here.
    pub async fn call(
        &self,
        config: &ProviderConfig,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&serde_json::Value>,
        reasoning: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        if !config.api_key_present() {
            anyhow::bail!("upstream: no API key configured for provider {:?}", config.provider);
        }

        let mut payload = json!({
            "model": model,
            "messages": messages_to_openai(messages),
        });
        if let Some(tools_val) = tools {
            payload["tools"] = tools_val.clone();
        }
        // Reasoning models ignore the global temperature; the router is
        // responsible for not passing one when `reasoning` is set.
        if let (Some(temperature), None) = (temperature, reasoning) {
            payload["temperature"] = json!(temperature);
        }
        if let Some(reasoning) = reasoning {
            payload["reasoning_effort"] = json!(reasoning);
        }

        let url = format!("{}/chat/completions", config.resolved_base_url());
        let send = self
            .http
            .post(&url)
            .bearer_auth(config.api_key.as_deref().unwrap_or_default())
            .json(&payload)
            .send();

        let response = tokio::time::timeout(config.timeout(), send)
            .await
            .with_context(|| format!("upstream: request to {url} timed out"))?
            .with_context(|| format!("upstream: request to {url} failed"))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .with_context(|| format!("upstream: malformed response body from {url}"))?;

        if !status.is_success() {
            anyhow::bail!("upstream: {status} from {url}: {body}");
        }

        let (content, tool_calls, finish_reason) = parse_openai_chat_response(&body)?;
        if finish_reason == "tool_calls" || !tool_calls.is_empty() {
            Ok(LlmResponse::ToolCalls { calls: tool_calls })
        } else {
            Ok(LlmResponse::Final { text: content })
        }
    }
}

/// Convert our `ChatMessage` array to OpenAI-compatible message format.
fn messages_to_openai(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages.iter().map(|m| {
        let role = match m.role {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::Tool => "tool",
        };
        let mut msg = json!({ "role": role });
        msg["content"] = match &m.content {
            Some(content) => json!(content),
            None => json!(null),
        };
        if !m.tool_calls.is_empty() {
            let calls: Vec<serde_json::Value> = m.tool_calls.iter().map(|tc| {
                json!({
                    "id": tc.id,
                    "type": "function",
                    "function": {
                        "name": tc.function.name,
                        "arguments": if tc.function.arguments.is_string() {
                            tc.function.arguments.clone()
                        } else {
                            json!(tc.function.arguments.to_string())
                        }
                    }
                })
            }).collect();
            msg["tool_calls"] = json!(calls);
        }
        if let Some(ref id) = m.tool_call_id {
            msg["tool_call_id"] = json!(id);
        }
        msg
    }).collect()
}

/// Parse an OpenAI-compatible `/chat/completions` non-streaming response.
fn parse_openai_chat_response(body: &serde_json::Value) -> Result<(String, Vec<ToolCall>, String)> {
    let choice = body.get("choices").and_then(|c| c.get(0));
    let message = choice.and_then(|c| c.get("message"));

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let tool_calls = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(|v| v.as_array())
        .map(|calls| {
            calls.iter().enumerate().filter_map(|(i, tc)| {
                let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let func = tc.get("function")?;
                let name = func.get("name")?.as_str()?.to_string();
                let arguments = func.get("arguments")
                    .map(|v| {
                        if let Some(s) = v.as_str() {
                            serde_json::from_str(s).unwrap_or(json!({}))
                        } else {
                            v.clone()
                        }
                    })
                    .unwrap_or(json!({}));
                Some(ToolCall {
                    id: if id.is_empty() { format!("call_{i}") } else { id },
                    r#type: "function".to_string(),
                    function: ToolCallFunction { name, arguments },
                })
            }).collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok((content, tool_calls, finish_reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_from_key_accepts_kimi_alias() {
        assert_eq!(Provider::from_key("kimi"), Some(Provider::Moonshot));
        assert_eq!(Provider::from_key("moonshot"), Some(Provider::Moonshot));
    }

    #[test]
    fn provider_from_key_rejects_unknown() {
        assert_eq!(Provider::from_key("not-a-provider"), None);
    }

    #[test]
    fn provider_config_timeout_clamps_to_bounds() {
        let mut config = ProviderConfig::new(Provider::OpenAi, Some("k".into()));
        config.request_timeout_secs = 0;
        assert_eq!(config.timeout(), Duration::from_secs(1));
        config.request_timeout_secs = 100_000;
        assert_eq!(config.timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn api_key_present_rejects_blank_key() {
        let config = ProviderConfig::new(Provider::OpenAi, Some("   ".into()));
        assert!(!config.api_key_present());
        let config = ProviderConfig::new(Provider::OpenAi, None);
        assert!(!config.api_key_present());
        let config = ProviderConfig::new(Provider::OpenAi, Some("sk-real".into()));
        assert!(config.api_key_present());
    }

    #[test]
    fn parses_openai_style_final_response() {
        let body = json!({
            "choices": [{
                "message": {"content": "hello there"},
                "finish_reason": "stop"
            }]
        });
        let (content, calls, finish) = parse_openai_chat_response(&body).unwrap();
        assert_eq!(content, "hello there");
        assert!(calls.is_empty());
        assert_eq!(finish, "stop");
    }

    #[test]
    fn parses_tool_calls_with_string_encoded_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "function": {"name": "run_shell", "arguments": "{\"command\":\"ls\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let (_, calls, finish) = parse_openai_chat_response(&body).unwrap();
        assert_eq!(finish, "tool_calls");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.name, "run_shell");
        assert_eq!(calls[0].function.arguments["command"], "ls");
    }

    #[test]
    fn messages_to_openai_round_trips_tool_result() {
        let messages = vec![ChatMessage::tool_result("call_1", "ok")];
        let converted = messages_to_openai(&messages);
        assert_eq!(converted[0]["role"], "tool");
        assert_eq!(converted[0]["tool_call_id"], "call_1");
    }
}
