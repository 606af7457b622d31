//! The Memory Engine (C4): a layered store with ranked query, prompt
//! budgeting, and promotion/forget, addressed by `id` and `fingerprint`.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use turnkeep_tools::ports::{
    MemoryAddRequest, MemoryForgetRequest, MemoryLayer as PortLayer, MemoryPortError,
    MemoryPromoteRequest, MemorySearchRequest, MemoryUpdateRequest,
};
use uuid::Uuid;

use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::event_log::{MemoryEventLog, MemoryRecordEvent};
use crate::schema::{DEFAULT_ITEM_TYPE, MemoryEntry, MemoryLayer, compute_fingerprint, normalize_tags, truncate_str};
use crate::scorer::{self, ScoreWeights};
use crate::store::MemoryStore;

fn layer_from_port(layer: PortLayer) -> MemoryLayer {
    match layer {
        PortLayer::Semantic => MemoryLayer::Semantic,
        PortLayer::Episodic => MemoryLayer::Episodic,
        PortLayer::Procedural => MemoryLayer::Procedural,
    }
}

/// Rough token estimate (≈4 chars/token), good enough for greedy prompt
/// budgeting — not a tokenizer-accurate count.
fn estimate_tokens(s: &str) -> u32 {
    ((s.chars().count() as f32) / 4.0).ceil() as u32
}

pub struct MemoryEngineConfig {
    pub soft_prompt_budget_tokens: u32,
    pub hard_prompt_budget_tokens: u32,
    pub promotion_min_confidence: f32,
    /// Grace period after `ttl_days` hits zero before the background sweep
    /// actually removes the tombstoned entry.
    pub tombstone_grace_days: i64,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            soft_prompt_budget_tokens: 1800,
            hard_prompt_budget_tokens: 3500,
            promotion_min_confidence: 0.75,
            tombstone_grace_days: 1,
        }
    }
}

pub struct MemoryEngine {
    store: RwLock<MemoryStore>,
    event_log: MemoryEventLog,
    embedder: Arc<dyn EmbeddingProvider>,
    weights: ScoreWeights,
    config: MemoryEngineConfig,
}

impl MemoryEngine {
    /// Loads the live set by replaying the event log at `workspace_root`
    /// (`memory/events.jsonl`). A missing log starts empty.
    pub async fn load(
        workspace_root: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: MemoryEngineConfig,
    ) -> anyhow::Result<Self> {
        let event_log = MemoryEventLog::new(workspace_root.as_ref().join("memory").join("events.jsonl"));
        let events = event_log.load()?;
        let mut store = MemoryStore::default();
        for event in events {
            store.upsert_by_fingerprint(event.entry);
        }
        Ok(Self { store: RwLock::new(store), event_log, embedder, weights: ScoreWeights::default(), config })
    }

    async fn persist(&self, entry: &MemoryEntry) -> Result<(), MemoryPortError> {
        self.event_log
            .append(&MemoryRecordEvent { event_id: Uuid::new_v4(), occurred_at: Utc::now(), entry: entry.clone() })
            .await
            .map_err(|e| MemoryPortError::Upstream(e.to_string()))
    }

    pub async fn add(&self, req: MemoryAddRequest) -> Result<String, MemoryPortError> {
        if req.content.trim().is_empty() {
            return Err(MemoryPortError::Validation("content must not be empty".to_string()));
        }
        let layer = req.layer.map(layer_from_port).unwrap_or(MemoryLayer::Semantic);
        let item_type = req.item_type.unwrap_or_else(|| DEFAULT_ITEM_TYPE.to_string());
        let confidence = req.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
        let salience = req.salience.unwrap_or(0.0).clamp(0.0, 1.0);
        let ttl_days = req.ttl_days.unwrap_or(90);
        let tags = normalize_tags(&req.tags);
        let fingerprint = compute_fingerprint(&req.content, &item_type, layer);
        let embedding = self.embedder.embed(&req.content).await;

        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            layer,
            item_type,
            title: req.title,
            content: req.content,
            tags,
            references: req.references,
            confidence,
            salience,
            ttl_days,
            fingerprint,
            created_at: Utc::now(),
            embedding,
        };

        let id = {
            let mut store = self.store.write().await;
            store.upsert_by_fingerprint(entry.clone())
        };
        self.persist(&entry).await?;
        Ok(format!("memory item {id} stored in {} ({})", layer.as_str(), entry.fingerprint))
    }

    pub async fn search(&self, req: MemorySearchRequest) -> Result<String, MemoryPortError> {
        let limit = req.limit.clamp(1, 50);
        let query_layer = req.layer.map(layer_from_port);
        let query_embedding = self.embedder.embed(&req.query_text).await;
        let now = Utc::now();

        let store = self.store.read().await;
        let mut ranked: Vec<(MemoryEntry, f32)> = store
            .all()
            .iter()
            .filter(|e| !e.is_tombstoned())
            .filter(|e| query_layer.is_none_or(|l| e.layer == l))
            .map(|entry| {
                let similarity = match (&query_embedding, &entry.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => lexical_overlap(&req.query_text, &entry.content),
                };
                let s = scorer::score(entry, similarity, self.weights, now);
                (entry.clone(), s)
            })
            .collect();
        ranked.sort_by(scorer::compare_ranked);
        ranked.truncate(limit);

        if ranked.is_empty() {
            return Ok("No memory items found.".to_string());
        }
        Ok(format_search_results(&ranked, self.config.soft_prompt_budget_tokens, self.config.hard_prompt_budget_tokens))
    }

    fn find_mut<'a>(store: &'a mut MemoryStore, id: Option<&str>, fingerprint: Option<&str>) -> Option<&'a mut MemoryEntry> {
        if let Some(id) = id {
            if let Ok(uuid) = Uuid::parse_str(id) {
                return store.get_mut(uuid);
            }
        }
        if let Some(fingerprint) = fingerprint {
            if let Some(entry) = store.get_by_fingerprint(fingerprint) {
                let id = entry.id;
                return store.get_mut(id);
            }
        }
        None
    }

    pub async fn update(&self, req: MemoryUpdateRequest) -> Result<String, MemoryPortError> {
        if req.id.is_none() && req.fingerprint.is_none() {
            return Err(MemoryPortError::Validation("update requires 'id' or 'fingerprint'".to_string()));
        }
        if req.content.is_none() && req.title.is_none() && req.tags.is_none() && req.confidence.is_none() && req.salience.is_none() {
            return Err(MemoryPortError::Validation("update requires at least one field to change".to_string()));
        }

        let updated = {
            let mut store = self.store.write().await;
            let Some(entry) = Self::find_mut(&mut store, req.id.as_deref(), req.fingerprint.as_deref()) else {
                return Err(MemoryPortError::NotFound("no matching memory item".to_string()));
            };
            if let Some(content) = req.content {
                entry.fingerprint = compute_fingerprint(&content, &entry.item_type, entry.layer);
                entry.content = content;
            }
            if let Some(title) = req.title {
                entry.title = Some(title);
            }
            if let Some(tags) = req.tags {
                entry.tags = normalize_tags(&tags);
            }
            if let Some(confidence) = req.confidence {
                entry.confidence = confidence.clamp(0.0, 1.0);
            }
            if let Some(salience) = req.salience {
                entry.salience = salience.clamp(0.0, 1.0);
            }
            entry.clone()
        };
        // Recompute the embedding outside the write lock if content changed.
        let updated = if let Some(embedding) = self.embedder.embed(&updated.content).await {
            let mut store = self.store.write().await;
            if let Some(entry) = store.get_mut(updated.id) {
                entry.embedding = Some(embedding);
                entry.clone()
            } else {
                updated
            }
        } else {
            updated
        };
        self.persist(&updated).await?;
        Ok(format!("memory item {} updated", updated.id))
    }

    pub async fn promote(&self, req: MemoryPromoteRequest) -> Result<String, MemoryPortError> {
        let target_layer = layer_from_port(req.target_layer);

        let resolved = if req.id.is_some() || req.fingerprint.is_some() {
            let mut store = self.store.write().await;
            Self::find_mut(&mut store, req.id.as_deref(), req.fingerprint.as_deref()).map(|e| e.id)
        } else if let Some(content) = &req.content {
            let query_embedding = self.embedder.embed(content).await;
            let now = Utc::now();
            let store = self.store.read().await;
            store
                .all()
                .iter()
                .filter(|e| !e.is_tombstoned())
                .map(|entry| {
                    let similarity = match (&query_embedding, &entry.embedding) {
                        (Some(q), Some(e)) => cosine_similarity(q, e),
                        _ => lexical_overlap(content, &entry.content),
                    };
                    (entry.id, scorer::score(entry, similarity, self.weights, now))
                })
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|(id, _)| id)
        } else {
            None
        };

        let Some(id) = resolved else {
            return Err(MemoryPortError::NotFound("no source resolves for promotion".to_string()));
        };

        let promoted = {
            let mut store = self.store.write().await;
            let Some(entry) = store.get_mut(id) else {
                return Err(MemoryPortError::NotFound("no source resolves for promotion".to_string()));
            };
            entry.confidence = entry.confidence.max(self.config.promotion_min_confidence);
            if entry.layer != target_layer {
                entry.layer = target_layer;
                entry.fingerprint = compute_fingerprint(&entry.content, &entry.item_type, target_layer);
            }
            entry.clone()
        };
        self.persist(&promoted).await?;
        Ok(format!("memory item {} promoted to {}", promoted.id, target_layer.as_str()))
    }

    pub async fn forget(&self, req: MemoryForgetRequest) -> Result<String, MemoryPortError> {
        let direct = req.id.is_some() || req.fingerprint.is_some();

        let id = if direct {
            let mut store = self.store.write().await;
            let Some(entry) = Self::find_mut(&mut store, req.id.as_deref(), req.fingerprint.as_deref()) else {
                return Err(MemoryPortError::NotFound("no matching memory item".to_string()));
            };
            entry.id
        } else {
            let Some(query_text) = &req.query_text else {
                return Err(MemoryPortError::Validation("forget requires an id, fingerprint, or query".to_string()));
            };
            let query_layer = req.layer.map(layer_from_port);
            let query_embedding = self.embedder.embed(query_text).await;
            let now = Utc::now();
            let store = self.store.read().await;
            let best = store
                .all()
                .iter()
                .filter(|e| !e.is_tombstoned())
                .filter(|e| query_layer.is_none_or(|l| e.layer == l))
                .map(|entry| {
                    let similarity = match (&query_embedding, &entry.embedding) {
                        (Some(q), Some(e)) => cosine_similarity(q, e),
                        _ => lexical_overlap(query_text, &entry.content),
                    };
                    (entry.id, scorer::score(entry, similarity, self.weights, now))
                })
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let Some((id, _)) = best else {
                return Err(MemoryPortError::Upstream("No memory items matched".to_string()));
            };
            id
        };

        let tombstoned = {
            let mut store = self.store.write().await;
            let entry = store.get_mut(id).expect("id just resolved above");
            entry.ttl_days = 0;
            entry.clone()
        };
        self.persist(&tombstoned).await?;
        Ok(format!("memory item {id} forgotten"))
    }

    /// Background maintenance: removes tombstoned entries past their grace
    /// period. Piggybacked on the Auto Scheduler's heartbeat (§4.8) rather
    /// than a dedicated timer.
    pub async fn sweep_tombstones(&self) -> usize {
        let mut store = self.store.write().await;
        store.sweep_tombstones(self.config.tombstone_grace_days)
    }
}

/// Crude lexical fallback similarity when one side has no embedding
/// (blank query or content): fraction of query tokens present in content.
fn lexical_overlap(query: &str, content: &str) -> f32 {
    let query_tokens: Vec<String> = query.to_lowercase().split_whitespace().map(str::to_string).collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_lower = content.to_lowercase();
    let hits = query_tokens.iter().filter(|t| content_lower.contains(t.as_str())).count();
    hits as f32 / query_tokens.len() as f32
}

/// Greedy prompt-budgeted formatting: includes items in rank order up to
/// `soft_budget`; if the single top item alone exceeds soft but not
/// `hard_budget` it's included alone; anything past `hard_budget` is
/// dropped.
fn format_search_results(ranked: &[(MemoryEntry, f32)], soft_budget: u32, hard_budget: u32) -> String {
    let mut lines = Vec::new();
    let mut used_tokens = 0u32;

    for (i, (entry, score)) in ranked.iter().enumerate() {
        let line = format!(
            "[{}] ({:.2}, {}) {}",
            &entry.id.to_string()[..8],
            score,
            entry.layer.as_str(),
            truncate_str(&entry.content, 400)
        );
        let line_tokens = estimate_tokens(&line);

        if i == 0 {
            if line_tokens > hard_budget {
                continue;
            }
            lines.push(line);
            used_tokens = line_tokens;
            continue;
        }

        if used_tokens + line_tokens > soft_budget {
            break;
        }
        lines.push(line);
        used_tokens += line_tokens;
    }

    if lines.is_empty() {
        return "No memory items found.".to_string();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use tempfile::tempdir;

    async fn engine() -> MemoryEngine {
        let dir = tempdir().unwrap();
        MemoryEngine::load(dir.into_path(), Arc::new(HashingEmbedder::default()), MemoryEngineConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn add_then_search_finds_item() {
        let engine = engine().await;
        engine.add(MemoryAddRequest { content: "Use Redis for caching".to_string(), ..Default::default() }).await.unwrap();
        let out = engine
            .search(MemorySearchRequest { query_text: "redis".to_string(), layer: None, limit: 10 })
            .await
            .unwrap();
        assert!(out.contains("Redis"), "{out}");
    }

    #[tokio::test]
    async fn add_upserts_by_fingerprint_not_duplicating() {
        let engine = engine().await;
        engine.add(MemoryAddRequest { content: "same fact".to_string(), ..Default::default() }).await.unwrap();
        engine.add(MemoryAddRequest { content: "Same Fact".to_string(), confidence: Some(0.9), ..Default::default() }).await.unwrap();
        let store = engine.store.read().await;
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn search_clamps_limit_to_fifty() {
        let engine = engine().await;
        for i in 0..5 {
            engine.add(MemoryAddRequest { content: format!("fact number {i}"), ..Default::default() }).await.unwrap();
        }
        let out = engine
            .search(MemorySearchRequest { query_text: "fact".to_string(), layer: None, limit: 999 })
            .await
            .unwrap();
        assert!(out.lines().count() <= 50);
    }

    #[tokio::test]
    async fn forget_by_id_excludes_from_subsequent_search() {
        let engine = engine().await;
        engine.add(MemoryAddRequest { content: "forget me please".to_string(), ..Default::default() }).await.unwrap();
        let id = {
            let store = engine.store.read().await;
            store.all()[0].id
        };
        engine.forget(MemoryForgetRequest { id: Some(id.to_string()), ..Default::default() }).await.unwrap();
        let out = engine
            .search(MemorySearchRequest { query_text: "forget me".to_string(), layer: None, limit: 10 })
            .await
            .unwrap();
        assert_eq!(out, "No memory items found.");
    }

    #[tokio::test]
    async fn forget_with_no_match_is_upstream_error() {
        let engine = engine().await;
        let err = engine
            .forget(MemoryForgetRequest { query_text: Some("nothing here".to_string()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryPortError::Upstream(_)));
    }

    #[tokio::test]
    async fn promote_raises_confidence_to_threshold() {
        let engine = engine().await;
        engine
            .add(MemoryAddRequest { content: "low confidence fact".to_string(), confidence: Some(0.2), ..Default::default() })
            .await
            .unwrap();
        let id = {
            let store = engine.store.read().await;
            store.all()[0].id
        };
        engine
            .promote(MemoryPromoteRequest { id: Some(id.to_string()), target_layer: PortLayer::Procedural, ..Default::default() })
            .await
            .unwrap();
        let store = engine.store.read().await;
        let entry = store.get(id).unwrap();
        assert!(entry.confidence >= engine.config.promotion_min_confidence);
        assert_eq!(entry.layer, MemoryLayer::Procedural);
    }

    #[tokio::test]
    async fn update_without_mutable_field_is_validation_error() {
        let engine = engine().await;
        let err = engine
            .update(MemoryUpdateRequest { id: Some(Uuid::new_v4().to_string()), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryPortError::Validation(_)));
    }

    #[tokio::test]
    async fn sweep_removes_tombstones_past_grace_period() {
        let dir = tempdir().unwrap();
        let mut config = MemoryEngineConfig::default();
        config.tombstone_grace_days = 0;
        let engine = MemoryEngine::load(dir.into_path(), Arc::new(HashingEmbedder::default()), config).await.unwrap();
        engine.add(MemoryAddRequest { content: "tombstoned soon".to_string(), ..Default::default() }).await.unwrap();
        let id = {
            let store = engine.store.read().await;
            store.all()[0].id
        };
        engine.forget(MemoryForgetRequest { id: Some(id.to_string()), ..Default::default() }).await.unwrap();
        let removed = engine.sweep_tombstones().await;
        assert_eq!(removed, 1);
    }
}
