use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLayer {
    Semantic,
    Episodic,
    Procedural,
}

impl MemoryLayer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Procedural => "procedural",
        }
    }
}

pub const DEFAULT_ITEM_TYPE: &str = "project_fact";

/// A single stored memory item, addressed by both `id` and `fingerprint`
/// (a deterministic hash of its normalized content, type, and layer — used
/// so repeated `memory_add` calls for the same fact upsert rather than
/// duplicate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: Uuid,
    pub layer: MemoryLayer,
    pub item_type: String,
    pub title: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    pub references: Vec<String>,
    pub confidence: f32,
    pub salience: f32,
    /// 0 means tombstoned; a background sweep removes it after a grace
    /// period.
    pub ttl_days: u32,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    /// Dense embedding of `content`, computed at write time by whatever
    /// `EmbeddingProvider` the engine was built with.
    pub embedding: Option<Vec<f32>>,
}

impl MemoryEntry {
    pub fn is_tombstoned(&self) -> bool {
        self.ttl_days == 0
    }
}

/// Normalizes `content` (trim, lowercase, collapse internal whitespace) and
/// hashes it together with `item_type` and `layer` so cosmetic differences
/// (casing, extra spaces) still fingerprint-match the same fact.
pub fn compute_fingerprint(content: &str, item_type: &str, layer: MemoryLayer) -> String {
    let normalized: String = content
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"\0");
    hasher.update(item_type.as_bytes());
    hasher.update(b"\0");
    hasher.update(layer.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trim, drop blank entries, de-dup preserving first occurrence.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.to_string()) {
            out.push(trimmed.to_string());
        }
    }
    out
}

pub fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut truncated: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_across_casing_and_spacing() {
        let a = compute_fingerprint("Use Redis for  caching", DEFAULT_ITEM_TYPE, MemoryLayer::Semantic);
        let b = compute_fingerprint("use redis for caching", DEFAULT_ITEM_TYPE, MemoryLayer::Semantic);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_by_layer() {
        let a = compute_fingerprint("same text", DEFAULT_ITEM_TYPE, MemoryLayer::Semantic);
        let b = compute_fingerprint("same text", DEFAULT_ITEM_TYPE, MemoryLayer::Episodic);
        assert_ne!(a, b);
    }

    #[test]
    fn normalize_tags_dedupes_preserving_first_occurrence() {
        let tags = vec!["rust".to_string(), " rust ".to_string(), "".to_string(), "wasm".to_string()];
        assert_eq!(normalize_tags(&tags), vec!["rust".to_string(), "wasm".to_string()]);
    }
}
