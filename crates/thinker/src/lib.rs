//! Model Router (C5): resolves which provider/model/reasoning a turn's next
//! LLM call should use, and whether the global temperature applies.

use turnkeep_config::{ModelRouterConfig, RuntimeConfig, TierConfig};
use turnkeep_llm::{Provider, ProviderConfig};

/// One of the five routing tiers a turn can be pinned to or upgraded into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Routing,
    Balanced,
    Smart,
    Coding,
    Deep,
}

use serde::{Deserialize, Serialize};

impl Tier {
    pub fn from_str_loose(raw: &str) -> Option<Self> {
        Some(match raw.to_ascii_lowercase().as_str() {
            "routing" => Self::Routing,
            "balanced" => Self::Balanced,
            "smart" => Self::Smart,
            "coding" => Self::Coding,
            "deep" => Self::Deep,
            _ => return None,
        })
    }
}

/// Tool names whose invocation flags a turn's recent activity as
/// code-related, per the resolved classifier.
pub const CODE_RELATED_TOOLS: &[&str] = &["run_shell", "write_file", "read_file", "plan_tasks"];

/// Sticky, per-turn dynamic-tier-upgrade tracker. One instance lives on the
/// turn's context; `note_tool_invocation` is called after every dispatched
/// tool call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnRouterState {
    upgraded: bool,
}

impl TurnRouterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched tool call. Upgrades stick for the rest of the
    /// turn; never downgrade.
    pub fn note_tool_invocation(&mut self, tool_name: &str) {
        if CODE_RELATED_TOOLS.contains(&tool_name) {
            self.upgraded = true;
        }
    }

    pub fn is_upgraded(&self) -> bool {
        self.upgraded
    }
}

/// A fully resolved call target: which provider/model/reasoning to call,
/// and whether the global temperature should be sent.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub tier: Tier,
    pub model: String,
    pub reasoning: Option<String>,
    pub temperature: Option<f32>,
    pub provider_config: ProviderConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("tier '{0}' routes to unknown provider '{1}'")]
    UnknownProvider(String, String),
    #[error("tier '{0}' routes to provider '{1}' with no API key configured")]
    ProviderNotEligible(String, String),
    #[error("tier '{0}' model '{1}' is not in \"<provider>/<model-id>\" form")]
    MalformedModelId(String, String),
}

/// Resolves tiers against a loaded [`RuntimeConfig`]. Stateless: takes the
/// config fresh on every call so hot-reloads (C9) apply immediately.
pub struct ModelRouter;

impl ModelRouter {
    /// Resolution per §4.5:
    /// 1. `tier_override` applies only when `tier_force` is false.
    /// 2. Otherwise, if `dynamicTierEnabled` and the turn state has already
    ///    seen code-related tool usage, upgrade `balanced` to `coding`
    ///    (never downgrades away from an override or an earlier upgrade).
    /// 3. Falls back to `balanced`.
    pub fn resolve_tier(
        router_config: &ModelRouterConfig,
        tier_override: Option<Tier>,
        tier_force: bool,
        turn_state: &TurnRouterState,
    ) -> Tier {
        if let (Some(tier), false) = (tier_override, tier_force) {
            return tier;
        }
        if router_config.dynamic_tier_enabled && turn_state.is_upgraded() {
            return Tier::Coding;
        }
        Tier::Balanced
    }

    fn tier_config(router_config: &ModelRouterConfig, tier: Tier) -> &TierConfig {
        match tier {
            Tier::Routing => &router_config.routing,
            Tier::Balanced => &router_config.balanced,
            Tier::Smart => &router_config.smart,
            Tier::Coding => &router_config.coding,
            Tier::Deep => &router_config.deep,
        }
    }

    /// Full resolution: tier selection plus provider/model/reasoning/
    /// temperature, validated against the configured provider table.
    pub fn resolve(
        config: &RuntimeConfig,
        tier_override: Option<Tier>,
        tier_force: bool,
        turn_state: &TurnRouterState,
    ) -> Result<Resolution, RouterError> {
        let tier = Self::resolve_tier(&config.model_router, tier_override, tier_force, turn_state);
        let tier_cfg = Self::tier_config(&config.model_router, tier);

        let (provider_key, model) = tier_cfg
            .model
            .split_once('/')
            .ok_or_else(|| RouterError::MalformedModelId(format!("{tier:?}"), tier_cfg.model.clone()))?;

        let provider = Provider::from_key(provider_key)
            .ok_or_else(|| RouterError::UnknownProvider(format!("{tier:?}"), provider_key.to_string()))?;

        let settings = config.llm_providers.get(provider_key).ok_or_else(|| {
            RouterError::ProviderNotEligible(format!("{tier:?}"), provider_key.to_string())
        })?;
        if !settings.api_key_present() {
            return Err(RouterError::ProviderNotEligible(format!("{tier:?}"), provider_key.to_string()));
        }

        let mut provider_config = ProviderConfig::new(provider, Some(settings.api_key.clone()));
        provider_config.base_url = settings.base_url.clone();
        provider_config.request_timeout_secs = settings.request_timeout_seconds;

        // Reasoning models ignore the global temperature.
        let temperature = if tier_cfg.reasoning.is_some() {
            None
        } else {
            Some(config.model_router.temperature)
        };

        Ok(Resolution {
            tier,
            model: model.to_string(),
            reasoning: tier_cfg.reasoning.clone(),
            temperature,
            provider_config,
        })
    }
}
