//! Typed view over the settings file.
//!
//! Every section here is independently round-trippable through TOML
//! (`#[serde(default)]` everywhere, so a partial file still loads) and
//! mirrors a settings section described for the runtime: Auto, Turn,
//! Voice, Memory, Tools, Mcp, LLM providers, Model Router, Rag,
//! Telegram. [`RuntimeConfig`] is the root; [`service::ConfigService`]
//! wraps it with hot reload.

mod service;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use service::ConfigService;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Validation(String),
}

// ─── Auto (C8) ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfig {
    pub enabled: bool,
    pub auto_start: bool,
    pub task_time_limit_minutes: u32,
    pub max_goals: u32,
    pub model_tier: String,
    pub notify_milestones: bool,
    pub tick_interval_seconds: u32,
}

impl Default for AutoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start: false,
            task_time_limit_minutes: 30,
            max_goals: 3,
            model_tier: "balanced".to_string(),
            notify_milestones: true,
            tick_interval_seconds: 1,
        }
    }
}

impl AutoConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_goals < 1 {
            return Err(ConfigError::Validation("auto.max_goals must be >= 1".into()));
        }
        if self.tick_interval_seconds != 1 {
            return Err(ConfigError::Validation(
                "auto.tick_interval_seconds must be 1".into(),
            ));
        }
        Ok(())
    }
}

// ─── Turn (C7) ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub max_llm_calls: u32,
    pub max_tool_executions: u32,
    /// ISO-8601 duration, e.g. "PT1H".
    pub deadline: String,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_llm_calls: 200,
            max_tool_executions: 500,
            deadline: "PT1H".to_string(),
        }
    }
}

impl TurnConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_llm_calls == 0 || self.max_tool_executions == 0 {
            return Err(ConfigError::Validation(
                "turn.max_llm_calls and turn.max_tool_executions must be > 0".into(),
            ));
        }
        parse_iso8601_duration(&self.deadline)
            .ok_or_else(|| ConfigError::Validation(format!("invalid deadline: {}", self.deadline)))?;
        Ok(())
    }
}

/// Parses a small subset of ISO-8601 durations: `PT<H>H<M>M<S>S`, any
/// component optional. Good enough for the turn/auto deadlines this
/// config carries; not a general-purpose ISO-8601 parser.
pub fn parse_iso8601_duration(s: &str) -> Option<chrono::Duration> {
    let rest = s.strip_prefix("PT")?;
    let mut hours = 0i64;
    let mut minutes = 0i64;
    let mut seconds = 0i64;
    let mut num = String::new();
    for ch in rest.chars() {
        match ch {
            '0'..='9' => num.push(ch),
            'H' => {
                hours = num.parse().ok()?;
                num.clear();
            }
            'M' => {
                minutes = num.parse().ok()?;
                num.clear();
            }
            'S' => {
                seconds = num.parse().ok()?;
                num.clear();
            }
            _ => return None,
        }
    }
    if !num.is_empty() {
        return None;
    }
    Some(chrono::Duration::seconds(hours * 3600 + minutes * 60 + seconds))
}

// ─── Voice ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub stt_provider: String,
    pub tts_provider: String,
    pub voice_id: String,
    pub speed: f32,
    pub whisper_stt_url: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            stt_provider: "whisper".to_string(),
            tts_provider: "elevenlabs".to_string(),
            voice_id: String::new(),
            speed: 1.0,
            whisper_stt_url: String::new(),
        }
    }
}

impl VoiceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.stt_provider.as_str(), "elevenlabs" | "whisper") {
            return Err(ConfigError::Validation(format!(
                "voice.stt_provider must be elevenlabs or whisper, got '{}'",
                self.stt_provider
            )));
        }
        if self.tts_provider != "elevenlabs" {
            return Err(ConfigError::Validation(
                "voice.tts_provider must be elevenlabs".into(),
            ));
        }
        if !(0.5..=2.0).contains(&self.speed) {
            return Err(ConfigError::Validation(
                "voice.speed must be in [0.5, 2.0]".into(),
            ));
        }
        if self.enabled
            && self.stt_provider == "whisper"
            && !self.whisper_stt_url.is_empty()
            && !(self.whisper_stt_url.starts_with("http://") || self.whisper_stt_url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(
                "voice.whisper_stt_url must be http(s)".into(),
            ));
        }
        Ok(())
    }
}

// ─── Memory (C4) ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub recent_days: u32,
    pub soft_prompt_budget_tokens: u32,
    pub max_prompt_budget_tokens: u32,
    pub promotion_min_confidence: f32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recent_days: 14,
            soft_prompt_budget_tokens: 1800,
            max_prompt_budget_tokens: 3500,
            promotion_min_confidence: 0.75,
        }
    }
}

impl MemoryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=90).contains(&self.recent_days) {
            return Err(ConfigError::Validation(
                "memory.recent_days must be in [1, 90]".into(),
            ));
        }
        if self.max_prompt_budget_tokens < self.soft_prompt_budget_tokens {
            return Err(ConfigError::Validation(
                "memory.max_prompt_budget_tokens must be >= soft_prompt_budget_tokens".into(),
            ));
        }
        Ok(())
    }
}

// ─── Tools (C2) ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapSmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: String,
    pub username: String,
    pub password: String,
    pub ssl_trust: bool,
}

impl Default for ImapSmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            security: "ssl".to_string(),
            username: String::new(),
            password: String::new(),
            ssl_trust: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub filesystem_enabled: bool,
    pub shell_enabled: bool,
    pub browser_enabled: bool,
    pub web_search_enabled: bool,
    pub email_enabled: bool,
    pub memory_enabled: bool,
    pub plan_enabled: bool,
    pub skill_transition_enabled: bool,
    pub tier_tool_enabled: bool,
    pub voice_tool_enabled: bool,
    pub goals_enabled: bool,
    pub datetime_enabled: bool,
    pub weather_enabled: bool,
    pub prompt_injection_detection_enabled: bool,
    pub command_injection_detection_enabled: bool,
    pub brave_search_api_key: String,
    pub browser_type: String,
    pub browser_api_provider: String,
    pub browser_timeout_ms: u32,
    pub shell_timeout_secs: u32,
    pub shell_env_whitelist: Vec<String>,
    pub imap: ImapSmtpConfig,
    pub smtp: ImapSmtpConfig,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            filesystem_enabled: true,
            shell_enabled: false,
            browser_enabled: true,
            web_search_enabled: true,
            email_enabled: false,
            memory_enabled: true,
            plan_enabled: true,
            skill_transition_enabled: true,
            tier_tool_enabled: true,
            voice_tool_enabled: false,
            goals_enabled: true,
            datetime_enabled: true,
            weather_enabled: true,
            prompt_injection_detection_enabled: true,
            command_injection_detection_enabled: true,
            brave_search_api_key: String::new(),
            browser_type: "playwright".to_string(),
            browser_api_provider: "brave".to_string(),
            browser_timeout_ms: 30_000,
            shell_timeout_secs: 30,
            shell_env_whitelist: vec!["PATH".to_string(), "HOME".to_string(), "LANG".to_string()],
            imap: ImapSmtpConfig::default(),
            smtp: ImapSmtpConfig {
                port: 587,
                security: "starttls".to_string(),
                ..ImapSmtpConfig::default()
            },
        }
    }
}

impl ToolsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(1000..=120_000).contains(&self.browser_timeout_ms) {
            return Err(ConfigError::Validation(
                "tools.browser_timeout_ms must be in [1000, 120000]".into(),
            ));
        }
        if !matches!(self.imap.security.as_str(), "ssl" | "starttls" | "none") {
            return Err(ConfigError::Validation("tools.imap.security invalid".into()));
        }
        if !matches!(self.smtp.security.as_str(), "ssl" | "starttls" | "none") {
            return Err(ConfigError::Validation("tools.smtp.security invalid".into()));
        }
        Ok(())
    }
}

// ─── MCP ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct McpConfig {
    pub enabled: bool,
    pub servers: Vec<String>,
}

// ─── LLM providers (C6) ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmProviderConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub request_timeout_seconds: u32,
}

impl Default for LlmProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            request_timeout_seconds: 300,
        }
    }
}

impl LlmProviderConfig {
    /// Whether an API key has been configured. Never serialized back out
    /// alongside the key itself — callers should report this flag instead
    /// of echoing `api_key`.
    pub fn api_key_present(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if !(1..=3600).contains(&self.request_timeout_seconds) {
            return Err(ConfigError::Validation(format!(
                "llm_providers.{name}.request_timeout_seconds must be in [1, 3600]"
            )));
        }
        Ok(())
    }
}

fn is_valid_provider_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

// ─── Model Router (C5) ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    /// "<provider>/<model-id>".
    pub model: String,
    pub reasoning: Option<String>,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            reasoning: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelRouterConfig {
    pub routing: TierConfig,
    pub balanced: TierConfig,
    pub smart: TierConfig,
    pub coding: TierConfig,
    pub deep: TierConfig,
    pub temperature: f32,
    pub dynamic_tier_enabled: bool,
}

impl Default for ModelRouterConfig {
    fn default() -> Self {
        Self {
            routing: TierConfig {
                model: "openai/gpt-4o-mini".to_string(),
                reasoning: None,
            },
            balanced: TierConfig {
                model: "openai/gpt-4o-mini".to_string(),
                reasoning: None,
            },
            smart: TierConfig {
                model: "anthropic/claude-3-5-sonnet".to_string(),
                reasoning: None,
            },
            coding: TierConfig {
                model: "anthropic/claude-3-5-sonnet".to_string(),
                reasoning: None,
            },
            deep: TierConfig {
                model: "openai/o3".to_string(),
                reasoning: Some("high".to_string()),
            },
            temperature: 0.7,
            dynamic_tier_enabled: true,
        }
    }
}

// ─── RAG ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub url: Option<String>,
    pub query_mode: String,
    pub timeout_seconds: u32,
    pub index_min_length: u32,
    pub api_key: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            url: None,
            query_mode: "hybrid".to_string(),
            timeout_seconds: 30,
            index_min_length: 200,
            api_key: String::new(),
        }
    }
}

impl RagConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(
            self.query_mode.as_str(),
            "hybrid" | "local" | "global" | "naive"
        ) {
            return Err(ConfigError::Validation("rag.query_mode invalid".into()));
        }
        if !(1..=120).contains(&self.timeout_seconds) {
            return Err(ConfigError::Validation(
                "rag.timeout_seconds must be in [1, 120]".into(),
            ));
        }
        if !(1..=2000).contains(&self.index_min_length) {
            return Err(ConfigError::Validation(
                "rag.index_min_length must be in [1, 2000]".into(),
            ));
        }
        Ok(())
    }
}

// ─── Telegram ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub token: String,
    pub auth_mode: String,
    pub allowed_users: Vec<i64>,
    pub invite_codes: Vec<String>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token: String::new(),
            auth_mode: "user".to_string(),
            allowed_users: Vec::new(),
            invite_codes: Vec::new(),
        }
    }
}

impl TelegramConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.auth_mode.as_str(), "user" | "invite_only") {
            return Err(ConfigError::Validation("telegram.auth_mode invalid".into()));
        }
        Ok(())
    }
}

// ─── Root ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workspace_root: String,
    pub auto: AutoConfig,
    pub turn: TurnConfig,
    pub voice: VoiceConfig,
    pub memory: MemoryConfig,
    pub tools: ToolsConfig,
    pub mcp: McpConfig,
    pub llm_providers: BTreeMap<String, LlmProviderConfig>,
    pub model_router: ModelRouterConfig,
    pub rag: RagConfig,
    pub telegram: TelegramConfig,
}

impl RuntimeConfig {
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        match fs::read_to_string(&path) {
            Ok(raw) => config = toml::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(self)?;
        fs::write(path, rendered)?;
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("BRAVE_SEARCH_API_KEY") {
            if !key.is_empty() {
                self.tools.brave_search_api_key = key;
            }
        }
        for (name, provider) in self.llm_providers.iter_mut() {
            let env_key = format!("{}_API_KEY", name.to_ascii_uppercase().replace('-', "_"));
            if let Ok(key) = env::var(&env_key) {
                if !key.is_empty() {
                    provider.api_key = key;
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auto.validate()?;
        self.turn.validate()?;
        self.voice.validate()?;
        self.memory.validate()?;
        self.tools.validate()?;
        self.rag.validate()?;
        self.telegram.validate()?;
        for (name, provider) in &self.llm_providers {
            if !is_valid_provider_name(name) {
                return Err(ConfigError::Validation(format!(
                    "invalid llm_providers key: '{name}'"
                )));
            }
            provider.validate(name)?;
        }
        Ok(())
    }

    // ── typed getters (C9) ──────────────────────────────────────────────

    pub fn is_filesystem_enabled(&self) -> bool {
        self.tools.filesystem_enabled
    }
    pub fn is_shell_enabled(&self) -> bool {
        self.tools.shell_enabled
    }
    pub fn is_browser_enabled(&self) -> bool {
        self.tools.browser_enabled
    }
    pub fn is_memory_enabled(&self) -> bool {
        self.tools.memory_enabled && self.memory.enabled
    }
    pub fn is_tier_tool_enabled(&self) -> bool {
        self.tools.tier_tool_enabled
    }
    pub fn is_voice_tool_enabled(&self) -> bool {
        self.tools.voice_tool_enabled && self.voice.enabled
    }
    pub fn get_memory_soft_prompt_budget_tokens(&self) -> u32 {
        self.memory.soft_prompt_budget_tokens
    }
    pub fn get_memory_max_prompt_budget_tokens(&self) -> u32 {
        self.memory.max_prompt_budget_tokens
    }
    pub fn get_memory_promotion_min_confidence(&self) -> f32 {
        self.memory.promotion_min_confidence
    }
    pub fn is_prompt_injection_detection_enabled(&self) -> bool {
        self.tools.prompt_injection_detection_enabled
    }
    pub fn is_command_injection_detection_enabled(&self) -> bool {
        self.tools.command_injection_detection_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = RuntimeConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        cfg.save_to(&path).unwrap();
        let loaded = RuntimeConfig::load_from(&path).unwrap();
        assert_eq!(loaded.turn.max_llm_calls, cfg.turn.max_llm_calls);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let loaded = RuntimeConfig::load_from("/nonexistent/settings.toml").unwrap();
        assert_eq!(loaded.turn.deadline, "PT1H");
    }

    #[test]
    fn rejects_bad_max_goals() {
        let mut cfg = RuntimeConfig::default();
        cfg.auto.max_goals = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_bad_provider_name() {
        let mut cfg = RuntimeConfig::default();
        cfg.llm_providers.insert(
            "Bad Name!".to_string(),
            LlmProviderConfig::default(),
        );
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn parses_iso8601_duration() {
        assert_eq!(
            parse_iso8601_duration("PT1H").unwrap(),
            chrono::Duration::hours(1)
        );
        assert_eq!(
            parse_iso8601_duration("PT30M").unwrap(),
            chrono::Duration::minutes(30)
        );
        assert!(parse_iso8601_duration("garbage").is_none());
    }
}
