use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Which ranking signals a query uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    Dense,
    Tfidf,
    #[default]
    Rrf,
}

impl RankingMode {
    /// Parse a mode name. Unknown names fall back to `Rrf` with a warning.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "dense" => RankingMode::Dense,
            "tfidf" => RankingMode::Tfidf,
            "rrf" => RankingMode::Rrf,
            other => {
                warn!("Unknown ranking mode '{}', using rrf", other);
                RankingMode::Rrf
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingMode::Dense => "dense",
            RankingMode::Tfidf => "tfidf",
            RankingMode::Rrf => "rrf",
        }
    }
}

impl fmt::Display for RankingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedHit {
    pub position: usize,
    pub score: f32,
}

/// Reciprocal Rank Fusion
/// Each list holds chunk positions, best first; rank r (1-based) contributes 1/(k + r).
/// k is typically 60 (default constant from original RRF paper)
/// Equal fused scores are ordered by lower chunk position.
pub fn reciprocal_rank_fusion(k: f32, limit: usize, rankings: &[Vec<usize>]) -> Vec<FusedHit> {
    let mut scores: HashMap<usize, f32> = HashMap::new();

    for list in rankings {
        for (rank, &position) in list.iter().enumerate() {
            *scores.entry(position).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
        }
    }

    let mut results: Vec<FusedHit> = scores
        .into_iter()
        .map(|(position, score)| FusedHit { position, score })
        .collect();

    results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.position.cmp(&b.position)));
    results.truncate(limit);
    results
}
