//! Similarity is computed behind a small provider trait; a real embedding
//! model is an external collaborator the engine doesn't depend on directly.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds `text` into a dense vector, or `None` if embedding is
    /// unavailable (the engine falls back to a confidence/recency/salience-
    /// only ranking when similarity can't be computed).
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// Deterministic, dependency-free fallback embedder: hashes sliding n-grams
/// of the normalized text into a fixed-width vector, giving a stable (if
/// crude) notion of lexical similarity with no external model to load.
/// Good enough for tests and for local/offline operation; the real
/// extension point is a provider backed by an actual embedding model.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let normalized: String = text.trim().to_lowercase();
        if normalized.is_empty() {
            return None;
        }
        let mut vector = vec![0f32; self.dims];
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        for window in tokens.windows(2).chain(tokens.chunks(1)) {
            let gram = window.join(" ");
            let mut hasher = Sha256::new();
            hasher.update(gram.as_bytes());
            let digest = hasher.finalize();
            let bucket = (u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % self.dims;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Some(vector)
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` if either vector is all-zero or
/// they differ in length.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn similar_phrases_score_higher_than_unrelated() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("use redis for caching sessions").await.unwrap();
        let b = embedder.embed("use redis for session caching").await.unwrap();
        let c = embedder.embed("the weather in paris is cold").await.unwrap();

        let sim_ab = cosine_similarity(&a, &b);
        let sim_ac = cosine_similarity(&a, &c);
        assert!(sim_ab > sim_ac, "sim_ab={sim_ab} sim_ac={sim_ac}");
    }

    #[tokio::test]
    async fn identical_text_is_perfectly_similar() {
        let embedder = HashingEmbedder::default();
        let a = embedder.embed("same text here").await.unwrap();
        let b = embedder.embed("same text here").await.unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn blank_text_has_no_embedding() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed("   ").await.is_none());
    }
}
