use chrono::{DateTime, Utc};

use crate::schema::MemoryEntry;

/// Weights for the ranking formula
/// `score = α·similarity + β·confidence + γ·recency + δ·salience`.
#[derive(Debug, Clone, Copy)]
pub struct ScoreWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
    pub delta: f32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self { alpha: 0.5, beta: 0.2, gamma: 0.15, delta: 0.15 }
    }
}

/// Half-life (days) for the recency component's exponential decay.
const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

/// Exponential decay of `created_at`'s age, in `[0, 1]`: 1.0 fresh, 0.5 at
/// one half-life, approaching 0 as age grows unbounded.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_days = (now - created_at).num_seconds() as f64 / 86_400.0;
    let age_days = age_days.max(0.0);
    2f64.powf(-age_days / RECENCY_HALF_LIFE_DAYS) as f32
}

/// Combined rank score for one entry against a query's `similarity`
/// (dense-embedding cosine, computed by the caller).
pub fn score(entry: &MemoryEntry, similarity: f32, weights: ScoreWeights, now: DateTime<Utc>) -> f32 {
    weights.alpha * similarity
        + weights.beta * entry.confidence
        + weights.gamma * recency_score(entry.created_at, now)
        + weights.delta * entry.salience
}

/// Ranking order: higher score first; ties broken by higher confidence,
/// then more recent `created_at`.
pub fn compare_ranked(
    a: &(MemoryEntry, f32),
    b: &(MemoryEntry, f32),
) -> std::cmp::Ordering {
    b.1.partial_cmp(&a.1)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| b.0.confidence.partial_cmp(&a.0.confidence).unwrap_or(std::cmp::Ordering::Equal))
        .then_with(|| b.0.created_at.cmp(&a.0.created_at))
}
